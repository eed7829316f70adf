use super::discovery::Discovery;
use super::graph::{CellId, Graph};
use super::sipp::Core;
use crate::common::IndexedHeap;

/// How cells enter the search.
pub trait Frontier: Default {
    /// Called once the start node is in the open heap.
    fn init(&mut self, core: &mut Core<'_>, start: CellId, end: CellId);

    /// Lowest cost any not-yet-visited cell could still offer.
    fn bound(&self, _core: &Core<'_>) -> f64 {
        f64::INFINITY
    }

    /// Runs after every iteration of the main loop.
    fn advance<D: Discovery>(
        &mut self,
        _core: &mut Core<'_>,
        _discovery: &mut D,
        _start: CellId,
        _end: CellId,
    ) {
    }
}

/// Every passable cell is visited up front.
#[derive(Debug, Clone, Default)]
pub struct Eager;

impl Frontier for Eager {
    fn init(&mut self, core: &mut Core<'_>, start: CellId, end: CellId) {
        let cells: Vec<_> = core
            .graph
            .cell_ids()
            .filter(|&cell| cell != start && core.graph.cell(cell).is_passable())
            .collect();
        for cell in cells {
            core.visit_cell(cell, end);
        }
    }
}

/// Cells are only visited when discovery reaches them.
#[derive(Debug, Clone, Default)]
pub struct Lazy;

impl Frontier for Lazy {
    fn init(&mut self, _core: &mut Core<'_>, _start: CellId, _end: CellId) {}
}

/// Cells wait in a bound heap ordered by `fh`, the straight-line cost of a path through
/// them, and are visited once the open heap can no longer beat that bound.
#[derive(Debug, Clone, Default)]
pub struct Bounded {
    heap: IndexedHeap<CellId>,
}

fn fh_score<'g>(graph: &'g Graph<'_>) -> impl Fn(CellId) -> f64 + 'g {
    move |id| graph.cell(id).fh
}

impl Frontier for Bounded {
    fn init(&mut self, core: &mut Core<'_>, start: CellId, end: CellId) {
        let start_cell = core.graph.cell_mut(start);
        start_cell.fh = start_cell.h;

        let start_position = core.graph.cell(start).position;
        let end_position = core.graph.cell(end).position;
        let cells: Vec<_> = core
            .graph
            .cell_ids()
            .filter(|&cell| cell != start && core.graph.cell(cell).is_passable())
            .collect();
        for cell in cells {
            let position = core.graph.cell(cell).position;
            let h = core.heuristic(position, end_position);
            let fh = core.heuristic(start_position, position) + h;
            let target = core.graph.cell_mut(cell);
            target.h = h;
            target.fh = fh;
            self.heap.push(cell, fh_score(&core.graph));
        }
    }

    fn bound(&self, core: &Core<'_>) -> f64 {
        self.heap
            .peek()
            .map_or(f64::INFINITY, |cell| core.graph.cell(cell).fh)
    }

    fn advance<D: Discovery>(
        &mut self,
        core: &mut Core<'_>,
        discovery: &mut D,
        _start: CellId,
        end: CellId,
    ) {
        while !self.heap.is_empty() && (core.open.is_empty() || self.bound(core) <= core.min_f()) {
            let Some(cell) = self.heap.pop(fh_score(&core.graph)) else {
                break;
            };
            core.visit_cell(cell, end);
            discovery.link(core, cell);
        }
    }
}
