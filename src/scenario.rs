use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter};
use std::path::Path;
use tracing::{debug, info, instrument};

use crate::algorithm::{Planner, PlannerSettings, ZetaStarSipp};
use crate::common::{distance, line_seg_on_grid, Waypoint};
use crate::map::Mesh;

/// A start/goal pair from a `.scen` file, in mesh `(x, y)` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub start: [usize; 2],
    pub end: [usize; 2],
    /// Optimal octile length reported by the scenario file.
    pub shortest: f64,
}

impl Route {
    pub fn start_point(&self) -> [f64; 2] {
        [self.start[0] as f64 + 0.5, self.start[1] as f64 + 0.5]
    }

    pub fn end_point(&self) -> [f64; 2] {
        [self.end[0] as f64 + 0.5, self.end[1] as f64 + 0.5]
    }

    pub fn is_passable(&self, mesh: &Mesh) -> bool {
        let passable = |[x, y]: [usize; 2]| mesh.is_passable(x as i64, y as i64);
        passable(self.start) && passable(self.end)
    }
}

/// Parse a MovingAI scenario file.
///
/// Each line after the version header holds bucket, map, map width, map height, start
/// column, start row, goal column, goal row and the optimal length.
pub fn load_from_scen(path: &str) -> Result<Vec<Route>> {
    let file = File::open(path).with_context(|| format!("cannot open scenario file {path}"))?;
    let mut lines = BufReader::new(file).lines();

    // First line is "version x.x" which we can skip
    lines
        .next()
        .transpose()?
        .with_context(|| format!("scenario file {path} is empty"))?;

    let mut routes = Vec::new();
    for (number, line) in lines.enumerate() {
        let line = line?;
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }
        if parts.len() != 9 {
            bail!("{path}:{}: expected 9 fields, found {}", number + 2, parts.len());
        }

        let field = |index: usize| -> Result<usize> {
            parts[index]
                .parse()
                .with_context(|| format!("{path}:{}: bad field {:?}", number + 2, parts[index]))
        };
        // Columns and rows swap into mesh order.
        routes.push(Route {
            start: [field(5)?, field(4)?],
            end: [field(7)?, field(6)?],
            shortest: parts[8]
                .parse()
                .with_context(|| format!("{path}:{}: bad length {:?}", number + 2, parts[8]))?,
        });
    }

    debug!("loaded {} routes from {path}", routes.len());
    Ok(routes)
}

/// A moving agent whose trajectory becomes risk intervals on the mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicObstacle {
    pub id: usize,
    pub speed: f64,
    /// `[x, y, wait_time]` per waypoint, the wait spent at the previous waypoint.
    pub path: Vec<[f64; 3]>,
}

impl DynamicObstacle {
    pub fn from_path(id: usize, speed: f64, path: &[Waypoint]) -> Self {
        DynamicObstacle {
            id,
            speed,
            path: path
                .iter()
                .map(|waypoint| [waypoint.x, waypoint.y, waypoint.wait_time])
                .collect(),
        }
    }
}

/// Mark every cell a trajectory occupies, and when, as a risk interval.
///
/// The trajectory starts at time zero. A wait before a leg occupies the leg's first cell,
/// the leg itself occupies every cell it crosses for the time it spends inside.
pub fn stamp_trajectory(mesh: &mut Mesh, path: &[[f64; 3]], speed: f64) {
    let mut time = 0.0;
    for leg in path.windows(2) {
        let ([x0, y0, _], [x1, y1, wait]) = (leg[0], leg[1]);

        if wait > 0.0 {
            if let Some((x, y)) = mesh.locate([x0, y0]) {
                mesh.add_risk_interval(x, y, [time, time + wait]);
            }
            time += wait;
        }

        let length = distance([x0, y0], [x1, y1]);
        let trace = line_seg_on_grid(x0, y0, x1, y1, length);
        for grid in &trace {
            if mesh.get(grid.x, grid.y).is_none() {
                continue;
            }
            let occupied = [time + grid.dist[0] / speed, time + grid.dist[1] / speed];
            mesh.add_risk_interval(grid.x as usize, grid.y as usize, occupied);
        }
        if let Some(last) = trace.last() {
            time += last.dist[1] / speed;
        }
    }
}

/// Plan the first `count` routes one after another, each against the trajectories of the
/// ones before it, and stamp every result into the mesh.
#[instrument(skip_all, fields(count = count), level = "debug")]
pub fn synthesize(
    mesh: &mut Mesh,
    routes: &[Route],
    count: usize,
    settings: PlannerSettings,
) -> Vec<DynamicObstacle> {
    let mut obstacles = Vec::with_capacity(count);
    for (id, route) in routes.iter().take(count).enumerate() {
        let path = {
            let mut planner = ZetaStarSipp::new(mesh, settings);
            planner.search(route.start_point(), route.end_point())
        };
        let obstacle = DynamicObstacle::from_path(id, settings.speed, &path);
        stamp_trajectory(mesh, &obstacle.path, obstacle.speed);
        debug!("obstacle {id}: {} waypoints", obstacle.path.len());
        obstacles.push(obstacle);
    }
    obstacles
}

/// Stamp `count` dynamic obstacles, reading them from `cache_path` when the file exists and
/// synthesizing (then caching) them otherwise.
pub fn load_or_synthesize(
    cache_path: &Path,
    mesh: &mut Mesh,
    routes: &[Route],
    count: usize,
    settings: PlannerSettings,
) -> Result<Vec<DynamicObstacle>> {
    if cache_path.exists() {
        let file = File::open(cache_path)
            .with_context(|| format!("cannot open obstacle cache {}", cache_path.display()))?;
        let mut obstacles: Vec<DynamicObstacle> = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("bad obstacle cache {}", cache_path.display()))?;
        if obstacles.len() < count {
            bail!(
                "obstacle cache {} holds {} obstacles, {count} requested",
                cache_path.display(),
                obstacles.len()
            );
        }
        obstacles.truncate(count);
        for obstacle in &obstacles {
            stamp_trajectory(mesh, &obstacle.path, obstacle.speed);
        }
        info!("loaded {count} dynamic obstacles from {}", cache_path.display());
        return Ok(obstacles);
    }

    let obstacles = synthesize(mesh, routes, count, settings);
    if let Some(parent) = cache_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("cannot create directory {}", parent.display()))?;
    }
    let file = File::create(cache_path)
        .with_context(|| format!("cannot create obstacle cache {}", cache_path.display()))?;
    serde_json::to_writer(BufWriter::new(file), &obstacles)
        .with_context(|| format!("cannot write obstacle cache {}", cache_path.display()))?;
    info!("synthesized {count} dynamic obstacles into {}", cache_path.display());
    Ok(obstacles)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Helper function to setup tracing
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .try_init();
    }

    #[test]
    fn test_load_from_scen() {
        let routes = load_from_scen("map_file/test/test.map.scen").unwrap();
        assert_eq!(routes.len(), 4);
        assert_eq!(routes[0].start, [0, 0]);
        assert_eq!(routes[0].end, [4, 5]);
        assert_eq!(routes[1].start, [0, 1]);
        assert_eq!(routes[1].end, [0, 4]);
        assert_eq!(routes[1].shortest, 3.0);
        assert_eq!(routes[3].start, [0, 5]);
        assert_eq!(routes[3].end_point(), [4.5, 0.5]);
    }

    #[test]
    fn test_load_from_missing_scen() {
        assert!(load_from_scen("map_file/test/missing.scen").is_err());
    }

    #[test]
    fn test_route_passability() {
        let mesh = Mesh::from_file("map_file/test/test.map").unwrap();
        let open = Route {
            start: [0, 0],
            end: [4, 5],
            shortest: 0.0,
        };
        let blocked = Route {
            start: [2, 2],
            ..open.clone()
        };
        assert!(open.is_passable(&mesh));
        assert!(!blocked.is_passable(&mesh));
    }

    #[test]
    fn test_stamp_trajectory() {
        let mut mesh = Mesh::new(1, 3);
        let path = [[0.5, 0.5, 0.0], [0.5, 2.5, 1.0]];
        stamp_trajectory(&mut mesh, &path, 1.0);

        // Waiting and then leaving the first cell merge into one window.
        assert_eq!(mesh.cell(0, 0).risk_intervals, vec![0.0, 1.5]);
        assert_eq!(mesh.cell(0, 1).risk_intervals, vec![1.5, 2.5]);
        assert_eq!(mesh.cell(0, 2).risk_intervals, vec![2.5, 3.0]);
    }

    #[test]
    fn test_stamp_trajectory_respects_speed() {
        let mut mesh = Mesh::new(2, 2);
        let path = [[0.5, 0.5, 0.0], [1.5, 0.5, 0.0], [1.5, 1.5, 2.0]];
        stamp_trajectory(&mut mesh, &path, 0.5);

        assert_eq!(mesh.cell(0, 0).risk_intervals, vec![0.0, 1.0]);
        assert_eq!(mesh.cell(1, 0).risk_intervals, vec![1.0, 5.0]);
        assert_eq!(mesh.cell(1, 1).risk_intervals, vec![5.0, 6.0]);
        assert!(mesh.cell(0, 1).risk_intervals.is_empty());
    }

    #[test]
    fn test_synthesize_stamps_mesh() {
        init_tracing();
        let mut mesh = Mesh::from_file("map_file/test/test.map").unwrap();
        let routes = load_from_scen("map_file/test/test.map.scen").unwrap();

        let obstacles = synthesize(&mut mesh, &routes, 2, PlannerSettings::new(1.0));
        assert_eq!(obstacles.len(), 2);
        for (id, obstacle) in obstacles.iter().enumerate() {
            assert_eq!(obstacle.id, id);
        }
        assert!(obstacles[0].path.len() >= 2);
        assert_eq!(obstacles[0].path[0], [0.5, 0.5, 0.0]);
        assert!(!mesh.cell(0, 0).risk_intervals.is_empty());
        assert!(!mesh.cell(4, 5).risk_intervals.is_empty());

        // The first obstacle sweeps through the second one's start cell before it can leave,
        // so the second gets no trajectory and stamps nothing.
        assert!(!mesh.cell(0, 1).risk_intervals.is_empty());
        assert!(obstacles[1].path.is_empty());
        assert!(mesh.cell(0, 4).risk_intervals.is_empty());
    }

    #[test]
    fn test_load_or_synthesize_reuses_cache() {
        init_tracing();
        let cache = std::env::temp_dir().join(format!("sipp_rust_obstacles_{}.json", std::process::id()));
        let _ = fs::remove_file(&cache);

        let routes = load_from_scen("map_file/test/test.map.scen").unwrap();
        let mut mesh = Mesh::from_file("map_file/test/test.map").unwrap();
        let settings = PlannerSettings::new(1.0);

        let synthesized = load_or_synthesize(&cache, &mut mesh, &routes, 3, settings).unwrap();
        assert!(cache.exists());
        let stamped = mesh.clone();

        mesh.clear_risk_intervals();
        let loaded = load_or_synthesize(&cache, &mut mesh, &routes, 3, settings).unwrap();
        assert_eq!(loaded, synthesized);
        assert_eq!(mesh, stamped);

        // A cache with too few obstacles is an error.
        assert!(load_or_synthesize(&cache, &mut mesh, &routes, 4, settings).is_err());
        let _ = fs::remove_file(&cache);
    }
}
