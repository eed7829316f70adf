use serde::Serialize;
use tracing::info;

/// Counters collected by a planner during one search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    /// Main-loop iterations.
    pub steps: usize,
    /// Nodes belonging to visited cells.
    pub tree_nodes: usize,
    /// Pairwise line-of-sight calls.
    pub los_checks: usize,
    /// Cells examined by line-of-sight walks plus cells returned by shadowcasts.
    pub scanned_cells: usize,
}

/// One benchmark episode, written as a CSV row.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    pub map: String,
    #[serde(rename = "scenIndex")]
    pub scen_index: String,
    #[serde(rename = "dynamicObs")]
    pub dynamic_obstacles: usize,
    #[serde(rename = "scenId")]
    pub episode: usize,
    pub algorithm: String,
    #[serde(rename = "refTime")]
    pub ref_time: f64,
    #[serde(rename = "pathTime")]
    pub path_time: f64,
    #[serde(rename = "treeNodes")]
    pub tree_nodes: usize,
    #[serde(rename = "searchSteps")]
    pub search_steps: usize,
    #[serde(rename = "LOSchecks")]
    pub los_checks: usize,
    #[serde(rename = "scannedNodes")]
    pub scanned_cells: usize,
    #[serde(rename = "runtime_total")]
    pub runtime_ms: f64,
}

impl Record {
    pub(crate) fn print(&self) {
        info!(
            "{} scen {} obstacles {} episode {} {}: path time {:.2} (ref {:.2}) runtime(ms) {:.2} tree nodes {} steps {}",
            self.map,
            self.scen_index,
            self.dynamic_obstacles,
            self.episode,
            self.algorithm,
            self.path_time,
            self.ref_time,
            self.runtime_ms,
            self.tree_nodes,
            self.search_steps
        );
    }
}
