use std::collections::HashSet;

use super::graph::{CellId, Graph};

/// Maps canonical octant coordinates `(column, row)` onto grid offsets.
#[derive(Debug, Clone, Copy)]
struct Transform {
    xx: i64,
    xy: i64,
    yx: i64,
    yy: i64,
}

const TRANSFORMS: [Transform; 8] = [
    Transform { xx: 1, xy: 0, yx: 0, yy: 1 },
    Transform { xx: 1, xy: 0, yx: 0, yy: -1 },
    Transform { xx: -1, xy: 0, yx: 0, yy: 1 },
    Transform { xx: -1, xy: 0, yx: 0, yy: -1 },
    Transform { xx: 0, xy: 1, yx: 1, yy: 0 },
    Transform { xx: 0, xy: -1, yx: 1, yy: 0 },
    Transform { xx: 0, xy: 1, yx: -1, yy: 0 },
    Transform { xx: 0, xy: -1, yx: -1, yy: 0 },
];

/// Symmetric recursive shadowcasting over the planning graph.
///
/// In bounded mode a cell whose `fh` exceeds `max_cost` blocks vision like an obstacle,
/// which caps the scan to an elliptical region around the start and goal.
#[derive(Debug, Clone)]
pub struct Shadowcast {
    pub bounded: bool,
    pub max_cost: f64,
    visible: Vec<CellId>,
    seen: HashSet<CellId>,
}

impl Default for Shadowcast {
    fn default() -> Self {
        Self::new()
    }
}

impl Shadowcast {
    pub fn new() -> Self {
        Shadowcast {
            bounded: false,
            max_cost: f64::INFINITY,
            visible: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn bounded() -> Self {
        Shadowcast {
            bounded: true,
            ..Self::new()
        }
    }

    /// Every cell visible from `origin`, each reported once, origin excluded.
    pub fn scan(&mut self, graph: &Graph<'_>, origin: CellId) -> Vec<CellId> {
        self.seen.clear();
        let cell = graph.cell(origin);
        let origin = (cell.x as i64, cell.y as i64);
        for transform in &TRANSFORMS {
            self.compute(graph, origin, 1, 1.0, 0.0, transform);
        }
        std::mem::take(&mut self.visible)
    }

    fn blocked(&self, graph: &Graph<'_>, cell: Option<CellId>) -> bool {
        let Some(id) = cell else {
            return true;
        };
        let cell = graph.cell(id);
        !cell.is_passable() || (self.bounded && cell.fh > self.max_cost)
    }

    fn record(&mut self, id: CellId) {
        if self.seen.insert(id) {
            self.visible.push(id);
        }
    }

    /// Scan one column of an octant between `bottom_slope` and `top_slope`, splitting the
    /// window around obstructions and recursing into the next column.
    fn compute(
        &mut self,
        graph: &Graph<'_>,
        origin: (i64, i64),
        delta_x: i64,
        top_slope: f64,
        mut bottom_slope: f64,
        transform: &Transform,
    ) {
        if bottom_slope >= top_slope {
            return;
        }

        let column = delta_x as f64;
        let mut y_min = column * bottom_slope;
        let y_max = column * top_slope;
        let mut was_blocked = false;

        for y in (y_min.floor() as i64)..=(y_max.ceil() as i64) {
            let real_x = origin.0 + transform.xx * delta_x + transform.xy * y;
            let real_y = origin.1 + transform.yx * delta_x + transform.yy * y;
            let cell = graph.cell_at(real_x, real_y);

            if !self.blocked(graph, cell) {
                let row = y as f64;
                if let Some(id) = cell.filter(|_| row >= y_min && row <= y_max) {
                    self.record(id);
                }
                was_blocked = false;
                continue;
            }

            if !was_blocked {
                let new_top_slope = (y as f64 - 0.5) / (column + 0.5);
                self.compute(
                    graph,
                    origin,
                    delta_x + 1,
                    new_top_slope.min(top_slope),
                    bottom_slope,
                    transform,
                );
                was_blocked = true;
            }
            let new_bottom_slope = (y as f64 + 0.5) / (column - 0.5);
            bottom_slope = bottom_slope.max(new_bottom_slope);
            if bottom_slope >= top_slope {
                return;
            }
            y_min = column * bottom_slope;
        }

        self.compute(graph, origin, delta_x + 1, top_slope, bottom_slope, transform);
    }
}
