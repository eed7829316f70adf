use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace, warn};

use super::discovery::Discovery;
use super::frontier::Frontier;
use super::graph::{CellId, Graph, NodeId};
use crate::common::{distance, intersect_sets, line_seg_on_grid, GridSegment, IndexedHeap, Path, Waypoint};
use crate::map::Mesh;
use crate::stat::SearchStats;

/// Margin added to every computed wait so departures never land exactly on the end of a
/// risk interval.
pub const DEFAULT_TIME_BUFFER: f64 = 10e-3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlannerSettings {
    /// Maximum agent speed, in cells per time unit.
    pub speed: f64,
    /// Check transitions against the mesh's risk intervals.
    pub sipp: bool,
    /// Allow waiting at a node before departing. Ignored without `sipp`.
    pub can_wait: bool,
    pub time_buffer: f64,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        PlannerSettings {
            speed: 1.0,
            sipp: true,
            can_wait: true,
            time_buffer: DEFAULT_TIME_BUFFER,
        }
    }
}

impl PlannerSettings {
    pub fn new(speed: f64) -> Self {
        PlannerSettings {
            speed,
            ..Self::default()
        }
    }

    fn waits(&self) -> bool {
        self.sipp && self.can_wait
    }
}

/// A single-episode planner. Each instance owns its graph and must not be searched twice.
pub trait Planner {
    /// Plan from `start` to `end`. An empty path means no path exists.
    fn search(&mut self, start: [f64; 2], end: [f64; 2]) -> Path;

    fn stats(&self) -> SearchStats;
}

/// Search state shared by every variant: the graph arena, the open heap and the
/// bookkeeping lists the discovery and frontier strategies work on.
#[derive(Debug)]
pub struct Core<'a> {
    pub graph: Graph<'a>,
    pub open: IndexedHeap<NodeId>,
    /// Visited cells that still have an open node.
    pub open_cells: Vec<CellId>,
    /// Cells with at least one closed node, in closing order.
    pub closed_cells: Vec<CellId>,
    pub tree_cells: Vec<CellId>,
    pub steps: usize,
    settings: PlannerSettings,
}

fn f_score<'g>(graph: &'g Graph<'_>) -> impl Fn(NodeId) -> f64 + 'g {
    move |id| graph.node(id).f
}

impl<'a> Core<'a> {
    pub fn new(mesh: &'a Mesh, settings: PlannerSettings) -> Self {
        let graph = Graph::new(mesh, settings.waits());
        let nodes = graph.node_count();
        Core {
            graph,
            open: IndexedHeap::with_capacity(nodes),
            open_cells: Vec::new(),
            closed_cells: Vec::new(),
            tree_cells: Vec::new(),
            steps: 0,
            settings,
        }
    }

    /// Travel time between two points at full speed.
    pub fn heuristic(&self, a: [f64; 2], b: [f64; 2]) -> f64 {
        if a == b {
            return 0.0;
        }
        distance(a, b) / self.settings.speed
    }

    pub fn min_f(&self) -> f64 {
        self.open
            .peek()
            .map_or(f64::INFINITY, |id| self.graph.node(id).f)
    }

    /// Make a cell's nodes eligible for search by pushing them into the open heap.
    pub fn visit_cell(&mut self, cell: CellId, end: CellId) {
        let h = self.heuristic(self.graph.cell(cell).position, self.graph.cell(end).position);
        let target = self.graph.cell_mut(cell);
        target.h = h;
        target.visited = true;
        let nodes = target.nodes.clone();

        self.tree_cells.push(cell);
        self.open_cells.push(cell);
        for node in nodes {
            self.graph.node_mut(node).h = h;
            self.open.push(node, f_score(&self.graph));
        }
    }

    pub fn init_start(&mut self, start: CellId, end: CellId) {
        self.visit_cell(start, end);
        let node = self.graph.cell(start).nodes[0];
        let start_node = self.graph.node_mut(node);
        start_node.g = 0.0;
        start_node.f = start_node.h;
        self.open.reposition(node, f_score(&self.graph));
    }

    /// Pop the best open node and try to prove its cost optimal.
    ///
    /// Returns the node once it is closed. Otherwise the node goes back into the open heap,
    /// either because a better potential parent turned up or because something still open
    /// (or still bounded, see `bound`) might offer a cheaper path to it.
    pub fn find_next_closed_node(&mut self, bound: f64) -> Option<NodeId> {
        let current = self.open.pop(f_score(&self.graph))?;

        let node = self.graph.node_mut(current);
        if let Some(index) = node
            .potential_parents
            .iter()
            .position(|&parent| Some(parent) == node.best_potential_parent)
        {
            node.potential_parents.remove(index);
            node.g_low_array.remove(index);
        }

        let best = node.best_potential_parent;
        let g_new = match best {
            Some(parent) => self.transition(parent, current) + self.graph.node(parent).g,
            None => self.graph.node(current).g,
        };

        let node = self.graph.node_mut(current);
        if g_new < node.g {
            node.g = g_new;
            node.parent = best;
            node.wait_time = g_new - node.g_low;
        }
        node.g_low = node.g;
        node.best_potential_parent = node.parent;
        node.f = node.g_low + node.h;

        if self.new_best_potential_parent_exists(current) {
            self.open.push(current, f_score(&self.graph));
            return None;
        }

        // An unreachable node stays open so the loop can run dry.
        let node = self.graph.node(current);
        let cost = node.g + node.h;
        if cost.is_finite() && cost <= self.min_f() && cost <= bound {
            let cell = node.cell;
            self.graph.node_mut(current).closed = true;
            self.close_cell(cell);
            trace!("closed node {current:?} g={cost}");
            return Some(current);
        }

        self.open.push(current, f_score(&self.graph));
        None
    }

    fn close_cell(&mut self, cell: CellId) {
        let target = self.graph.cell_mut(cell);
        if !target.closed {
            target.closed = true;
            self.closed_cells.push(cell);
        }
    }

    /// Drop a cell from `open_cells` once all of its nodes are closed.
    pub fn update_open_cell(&mut self, cell: CellId) {
        let all_closed = self
            .graph
            .cell(cell)
            .nodes
            .iter()
            .all(|&node| self.graph.node(node).closed);
        if all_closed {
            if let Some(index) = self.open_cells.iter().position(|&open| open == cell) {
                self.open_cells.remove(index);
            }
        }
    }

    /// Register `parent` as a candidate predecessor of `node`.
    pub fn add_potential_parent(&mut self, parent: NodeId, node: NodeId) {
        let parent_node = self.graph.node(parent);
        let g_low_new = parent_node.g + self.heuristic(parent_node.position, self.graph.node(node).position);

        let target = self.graph.node_mut(node);
        if g_low_new < target.g_low {
            target.g_low = g_low_new;
            target.best_potential_parent = Some(parent);
            target.f = target.g_low + target.h;
            self.open.reposition(node, f_score(&self.graph));
        }
        let target = self.graph.node_mut(node);
        target.potential_parents.push(parent);
        target.g_low_array.push(g_low_new);
    }

    /// Every open node of the given cells gains `parent` as a potential parent.
    pub fn adopt(&mut self, parent: NodeId, cells: &[CellId]) {
        for &cell in cells {
            let nodes = self.graph.cell(cell).nodes.clone();
            for node in nodes {
                if !self.graph.node(node).closed {
                    self.add_potential_parent(parent, node);
                }
            }
        }
    }

    /// Every closed node of `from` becomes a potential parent of every node of `to`.
    pub fn adopt_closed(&mut self, from: CellId, to: CellId) {
        let parents = self.graph.cell(from).nodes.clone();
        let children = self.graph.cell(to).nodes.clone();
        for parent in parents {
            if !self.graph.node(parent).closed {
                continue;
            }
            for &child in &children {
                self.add_potential_parent(parent, child);
            }
        }
    }

    fn new_best_potential_parent_exists(&mut self, id: NodeId) -> bool {
        let node = self.graph.node_mut(id);
        let mut exists = false;
        for (&parent, &g_low_new) in node.potential_parents.iter().zip(&node.g_low_array) {
            if g_low_new < node.g_low {
                node.g_low = g_low_new;
                node.best_potential_parent = Some(parent);
                node.f = node.g_low + node.h;
                exists = true;
            }
        }
        exists
    }

    /// Cost of the collision-free move from `from` to `to`, waiting included.
    pub fn transition(&self, from: NodeId, to: NodeId) -> f64 {
        if from == to {
            return 0.0;
        }
        let (a, b) = (self.graph.node(from), self.graph.node(to));
        if !self.settings.sipp {
            return self.heuristic(a.position, b.position);
        }
        self.cost_sipp(from, to)
    }

    fn cost_sipp(&self, from: NodeId, to: NodeId) -> f64 {
        let (parent, node) = (self.graph.node(from), self.graph.node(to));
        let can_wait = self.settings.can_wait;
        let speed = self.settings.speed;
        let length = distance(parent.position, node.position);

        let mut wait_time = 0.0;
        if can_wait {
            let min_time = length / speed + parent.g;
            if min_time <= node.safe_interval[0] {
                wait_time = node.safe_interval[0] - min_time + self.settings.time_buffer;
            }
            if wait_time + parent.g >= parent.safe_interval[1] {
                return f64::INFINITY;
            }
        }

        let [x0, y0] = parent.position;
        let [x1, y1] = node.position;
        let trace = line_seg_on_grid(x0, y0, x1, y1, length);
        let mut intervals: Vec<[f64; 2]> = trace
            .iter()
            .map(|grid| {
                [
                    grid.dist[0] / speed + parent.g + wait_time,
                    grid.dist[1] / speed + parent.g + wait_time,
                ]
            })
            .collect();

        for index in 0..trace.len() {
            if !can_wait {
                if self.conflicts(&trace[index], intervals[index]) {
                    return f64::INFINITY;
                }
            } else {
                wait_time = self.update_wait_time(&trace, &mut intervals, index, wait_time);
                if wait_time + parent.g >= parent.safe_interval[1] {
                    return f64::INFINITY;
                }
            }
        }
        wait_time + self.heuristic(parent.position, node.position)
    }

    fn risk_intervals(&self, grid: &GridSegment) -> impl Iterator<Item = [f64; 2]> + 'a {
        self.graph
            .mesh()
            .get(grid.x, grid.y)
            .into_iter()
            .flat_map(|cell| cell.risk_intervals())
    }

    fn conflicts(&self, grid: &GridSegment, occupied: [f64; 2]) -> bool {
        self.risk_intervals(grid)
            .any(|risk| intersect_sets(risk, occupied).is_some())
    }

    /// Delay departure until the occupancy of `trace[index]` clears every risk interval of
    /// that cell, shifting all occupancy intervals along. A delay can reintroduce a conflict
    /// in an earlier cell, so those are re-resolved.
    fn update_wait_time(
        &self,
        trace: &[GridSegment],
        intervals: &mut [[f64; 2]],
        index: usize,
        mut wait_time: f64,
    ) -> f64 {
        let wait_time_old = wait_time;

        for risk in self.risk_intervals(&trace[index]) {
            if intersect_sets(risk, intervals[index]).is_none() {
                continue;
            }
            let delta = risk[1] - intervals[index][0] + self.settings.time_buffer;
            wait_time += delta;
            for interval in intervals.iter_mut() {
                interval[0] += delta;
                interval[1] += delta;
            }
        }

        if wait_time > wait_time_old {
            for earlier in 0..index {
                wait_time = self.update_wait_time(trace, intervals, earlier, wait_time);
            }
        }
        wait_time
    }

    /// Follow parent links back to the root.
    pub fn path_to(&self, node: NodeId) -> Path {
        let mut path = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            let node = self.graph.node(id);
            path.push(Waypoint {
                x: node.position[0],
                y: node.position[1],
                g: node.g,
                wait_time: node.wait_time,
            });
            current = node.parent;
        }
        path.reverse();
        path
    }

    pub fn stats(&self) -> SearchStats {
        SearchStats {
            steps: self.steps,
            tree_nodes: self
                .tree_cells
                .iter()
                .map(|&cell| self.graph.cell(cell).nodes.len())
                .sum(),
            los_checks: self.graph.checks,
            scanned_cells: self.graph.scanned_grids,
        }
    }
}

/// Time-optimal any-angle SIPP, parameterized by how visibility is discovered (`D`) and how
/// the search frontier grows (`F`).
#[derive(Debug)]
pub struct Sipp<'a, D, F> {
    core: Core<'a>,
    discovery: D,
    frontier: F,
    searched: bool,
}

impl<'a, D: Discovery, F: Frontier> Sipp<'a, D, F> {
    pub fn new(mesh: &'a Mesh, settings: PlannerSettings) -> Self {
        Sipp {
            core: Core::new(mesh, settings),
            discovery: D::with_settings(&settings),
            frontier: F::default(),
            searched: false,
        }
    }

    fn endpoint(&self, point: [f64; 2], role: &str) -> Option<CellId> {
        let Some(cell) = self.core.graph.locate(point) else {
            warn!("{role} {point:?} is outside the mesh");
            return None;
        };
        if !self.core.graph.cell(cell).is_passable() {
            warn!("{role} {point:?} is not passable");
            return None;
        }
        Some(cell)
    }
}

impl<'a, D: Discovery, F: Frontier> Planner for Sipp<'a, D, F> {
    #[instrument(skip_all, name = "sipp", fields(start = ?start, end = ?end), level = "debug")]
    fn search(&mut self, start: [f64; 2], end: [f64; 2]) -> Path {
        if std::mem::replace(&mut self.searched, true) {
            warn!("planner instance reused, returning no path");
            return Vec::new();
        }
        let (Some(start_cell), Some(end_cell)) =
            (self.endpoint(start, "start"), self.endpoint(end, "end"))
        else {
            return Vec::new();
        };

        self.core.init_start(start_cell, end_cell);
        self.frontier.init(&mut self.core, start_cell, end_cell);

        while self.core.min_f() < f64::INFINITY {
            self.core.steps += 1;
            let bound = self.frontier.bound(&self.core);
            if let Some(node) = self.core.find_next_closed_node(bound) {
                let cell = self.core.graph.node(node).cell;
                if cell == end_cell {
                    let path = self.core.path_to(node);
                    debug!(
                        "found path of {} waypoints, time {}, after {} steps",
                        path.len(),
                        self.core.graph.node(node).g,
                        self.core.steps
                    );
                    return path;
                }
                self.discovery.expand(&mut self.core, node, cell, end_cell);
            }
            self.frontier
                .advance(&mut self.core, &mut self.discovery, start_cell, end_cell);
        }

        debug!("cannot find solution after {} steps", self.core.steps);
        Vec::new()
    }

    fn stats(&self) -> SearchStats {
        self.core.stats()
    }
}
