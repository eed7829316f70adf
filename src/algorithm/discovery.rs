use std::f64::consts::SQRT_2;

use super::graph::{CellId, NodeId};
use super::shadowcast::Shadowcast;
use super::sipp::{Core, PlannerSettings};

/// How a planner finds the cells that can see each other.
pub trait Discovery {
    fn with_settings(settings: &PlannerSettings) -> Self;

    /// `node` was just closed in `cell`: make it a potential parent of every open node that
    /// can see it.
    fn expand(&mut self, core: &mut Core<'_>, node: NodeId, cell: CellId, end: CellId);

    /// `cell` was just visited by a bounded frontier: connect it to the closed cells that
    /// can see it and adopt their closed nodes as potential parents.
    fn link(&mut self, core: &mut Core<'_>, cell: CellId);
}

/// Pairwise line-of-sight tests between cell centers.
#[derive(Debug, Clone, Default)]
pub struct LineOfSight;

impl Discovery for LineOfSight {
    fn with_settings(_settings: &PlannerSettings) -> Self {
        LineOfSight
    }

    fn expand(&mut self, core: &mut Core<'_>, node: NodeId, cell: CellId, _end: CellId) {
        core.update_open_cell(cell);

        // The first closed node of a cell tests every open cell; later ones reuse the result.
        if core.graph.cell(cell).visible_cells.is_empty() {
            let Core {
                graph, open_cells, ..
            } = core;
            let mut visible = Vec::new();
            for &other in open_cells.iter() {
                if other != cell && graph.line_of_sight(cell, other) {
                    visible.push(other);
                }
            }
            graph.cell_mut(cell).visible_cells = visible;
        }

        let visible = core.graph.cell(cell).visible_cells.clone();
        core.adopt(node, &visible);
    }

    fn link(&mut self, core: &mut Core<'_>, cell: CellId) {
        let closed = core.closed_cells.clone();
        for other in closed {
            if core.graph.line_of_sight(other, cell) {
                core.graph.cell_mut(other).visible_cells.push(cell);
                core.adopt_closed(other, cell);
            }
        }
    }
}

/// One shadowcast per cell, visiting every newly seen cell.
#[derive(Debug, Clone, Default)]
pub struct FieldOfView {
    shadowcast: Shadowcast,
}

impl Discovery for FieldOfView {
    fn with_settings(_settings: &PlannerSettings) -> Self {
        FieldOfView {
            shadowcast: Shadowcast::new(),
        }
    }

    fn expand(&mut self, core: &mut Core<'_>, node: NodeId, cell: CellId, end: CellId) {
        if core.graph.cell(cell).visible_cells.is_empty() {
            let visible = self.shadowcast.scan(&core.graph, cell);
            core.graph.scanned_grids += visible.len();
            core.graph.cell_mut(cell).visible_cells = visible;
        }

        let visible = core.graph.cell(cell).visible_cells.clone();
        for &other in &visible {
            if !core.graph.cell(other).visited {
                core.visit_cell(other, end);
            }
        }
        core.adopt(node, &visible);
    }

    fn link(&mut self, core: &mut Core<'_>, cell: CellId) {
        symmetric_link(&mut self.shadowcast, core, cell);
    }
}

/// Shadowcasts run once per cell as the bound frontier reaches it, capped by the cell's
/// bound cost. Visibility is recorded on both ends, so expansion only replays the record.
#[derive(Debug, Clone)]
pub struct BoundedFieldOfView {
    shadowcast: Shadowcast,
    /// Extra cost allowance for the diagonal overshoot of one octant step.
    scan_buffer: f64,
}

impl Discovery for BoundedFieldOfView {
    fn with_settings(settings: &PlannerSettings) -> Self {
        BoundedFieldOfView {
            shadowcast: Shadowcast::bounded(),
            scan_buffer: SQRT_2 / settings.speed,
        }
    }

    fn expand(&mut self, core: &mut Core<'_>, node: NodeId, cell: CellId, _end: CellId) {
        let visible = core.graph.cell(cell).visible_cells.clone();
        core.adopt(node, &visible);
    }

    fn link(&mut self, core: &mut Core<'_>, cell: CellId) {
        self.shadowcast.max_cost = core.graph.cell(cell).fh + self.scan_buffer;
        symmetric_link(&mut self.shadowcast, core, cell);
    }
}

fn symmetric_link(shadowcast: &mut Shadowcast, core: &mut Core<'_>, cell: CellId) {
    let mut visible = shadowcast.scan(&core.graph, cell);
    core.graph.scanned_grids += visible.len();
    visible.retain(|&other| core.graph.cell(other).visited);
    core.graph.cell_mut(cell).visible_cells = visible.clone();

    for other in visible {
        core.graph.cell_mut(other).visible_cells.push(cell);
        if core.graph.cell(other).closed {
            core.adopt_closed(other, cell);
        }
    }
}
