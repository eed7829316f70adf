mod geometry;
mod heap;

pub use geometry::{
    distance, intersect_sets, line_of_sight_grid, line_seg_on_grid, norm, subtract, union_all,
    GridSegment,
};
pub use heap::{Handle, IndexedHeap};

use serde::{Deserialize, Serialize};

/// One step of a planned trajectory.
///
/// `g` is the arrival time at `(x, y)`; `wait_time` is how long the agent waited at the
/// previous waypoint before departing towards this one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    pub g: f64,
    pub wait_time: f64,
}

/// Waypoints from start to goal. Empty when no path exists.
pub type Path = Vec<Waypoint>;

/// Total travel time of a path, zero when there is none.
pub fn path_time(path: &[Waypoint]) -> f64 {
    path.last().map_or(0.0, |waypoint| waypoint.g)
}
