mod discovery;
mod frontier;
mod graph;
mod shadowcast;
mod sipp;

pub use discovery::{BoundedFieldOfView, Discovery, FieldOfView, LineOfSight};
pub use frontier::{Bounded, Eager, Frontier, Lazy};
pub use graph::{Cell, CellId, Graph, Node, NodeId};
pub use shadowcast::Shadowcast;
pub use sipp::{Core, Planner, PlannerSettings, Sipp, DEFAULT_TIME_BUFFER};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::map::Mesh;

/// TO-AA-SIPP: pairwise line of sight over an eagerly opened graph.
pub type ToAaSipp<'a> = Sipp<'a, LineOfSight, Eager>;
/// TO-AA-FoV-SIPP: shadowcast visibility, cells opened as they are seen.
pub type FovSipp<'a> = Sipp<'a, FieldOfView, Lazy>;
/// Zeta-SIPP: bound-heap frontier linked by pairwise line of sight.
pub type ZetaSipp<'a> = Sipp<'a, LineOfSight, Bounded>;
/// Zeta*-SIPP: bound-heap frontier linked by cost-bounded shadowcasts.
pub type ZetaStarSipp<'a> = Sipp<'a, BoundedFieldOfView, Bounded>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    ToAaSipp,
    ToAaFovSipp,
    ZetaSipp,
    ZetaStarSipp,
}

impl Algorithm {
    pub const ALL: [Algorithm; 4] = [
        Algorithm::ToAaSipp,
        Algorithm::ToAaFovSipp,
        Algorithm::ZetaSipp,
        Algorithm::ZetaStarSipp,
    ];

    pub fn planner<'a>(self, mesh: &'a Mesh, settings: PlannerSettings) -> Box<dyn Planner + 'a> {
        match self {
            Algorithm::ToAaSipp => Box::new(ToAaSipp::new(mesh, settings)),
            Algorithm::ToAaFovSipp => Box::new(FovSipp::new(mesh, settings)),
            Algorithm::ZetaSipp => Box::new(ZetaSipp::new(mesh, settings)),
            Algorithm::ZetaStarSipp => Box::new(ZetaStarSipp::new(mesh, settings)),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::ToAaSipp => "TOAASIPP",
            Algorithm::ToAaFovSipp => "TOAAFoVSIPP",
            Algorithm::ZetaSipp => "ZetaSIPP",
            Algorithm::ZetaStarSipp => "ZetastarSIPP",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{distance, intersect_sets, line_seg_on_grid, path_time, Path};
    use std::f64::consts::SQRT_2;
    use tracing::debug;

    // Helper function to setup tracing
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .try_init();
    }

    fn solve(algorithm: Algorithm, mesh: &Mesh, settings: PlannerSettings, start: [f64; 2], end: [f64; 2]) -> Path {
        let mut planner = algorithm.planner(mesh, settings);
        let path = planner.search(start, end);
        debug!("{algorithm}: {path:?} {:?}", planner.stats());
        path
    }

    // Replays a path and checks that no waiting or traversal overlaps a risk interval.
    fn assert_clear(mesh: &Mesh, path: &Path, speed: f64) {
        for leg in path.windows(2) {
            let (from, to) = (leg[0], leg[1]);
            let depart = from.g + to.wait_time;

            let cell = mesh.cell(from.x.floor() as usize, from.y.floor() as usize);
            if to.wait_time > 0.0 {
                for risk in cell.risk_intervals() {
                    assert!(intersect_sets(risk, [from.g, depart]).is_none());
                }
            }

            let length = distance([from.x, from.y], [to.x, to.y]);
            assert!((to.g - depart - length / speed).abs() < 1e-9);
            for grid in line_seg_on_grid(from.x, from.y, to.x, to.y, length) {
                let occupied = [depart + grid.dist[0] / speed, depart + grid.dist[1] / speed];
                let cell = mesh.get(grid.x, grid.y).unwrap();
                for risk in cell.risk_intervals() {
                    assert!(
                        intersect_sets(risk, occupied).is_none(),
                        "cell ({}, {}) occupied {occupied:?} during {risk:?}",
                        grid.x,
                        grid.y
                    );
                }
            }
        }
    }

    #[test]
    fn test_open_grid_straight_line() {
        init_tracing();
        let mesh = Mesh::new(3, 3);
        for algorithm in Algorithm::ALL {
            let path = solve(algorithm, &mesh, PlannerSettings::new(1.0), [0.5, 0.5], [2.5, 2.5]);
            assert_eq!(path.len(), 2, "{algorithm}");
            assert_eq!((path[0].x, path[0].y), (0.5, 0.5));
            assert_eq!((path[1].x, path[1].y), (2.5, 2.5));
            assert!((path_time(&path) - 2.0 * SQRT_2).abs() < 1e-9, "{algorithm}");
        }
    }

    #[test]
    fn test_speed_scales_time() {
        init_tracing();
        let mesh = Mesh::new(1, 5);
        let path = solve(Algorithm::ToAaSipp, &mesh, PlannerSettings::new(0.5), [0.5, 0.5], [0.5, 4.5]);
        assert!((path_time(&path) - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_blocked_center_forces_detour() {
        init_tracing();
        let mesh = Mesh::from_rows(&["...", ".@.", "..."]).unwrap();
        let heuristic = 2.0 * SQRT_2;

        for algorithm in Algorithm::ALL {
            let path = solve(algorithm, &mesh, PlannerSettings::new(1.0), [0.5, 0.5], [2.5, 2.5]);
            assert!(!path.is_empty(), "{algorithm}");
            assert!(path_time(&path) > heuristic + 1e-6, "{algorithm}");
            assert!((path_time(&path) - (2.0 + SQRT_2)).abs() < 1e-9, "{algorithm}");
        }
    }

    #[test]
    fn test_start_equals_goal() {
        init_tracing();
        let mesh = Mesh::new(2, 2);
        let path = solve(Algorithm::ZetaSipp, &mesh, PlannerSettings::new(1.0), [1.5, 1.5], [1.7, 1.2]);
        assert_eq!(path.len(), 1);
        assert_eq!(path_time(&path), 0.0);
    }

    #[test]
    fn test_unreachable_goal() {
        init_tracing();
        let mesh = Mesh::from_rows(&["..@..", "..@..", "..@.."]).unwrap();
        for algorithm in Algorithm::ALL {
            let path = solve(algorithm, &mesh, PlannerSettings::new(1.0), [0.5, 0.5], [2.5, 4.5]);
            assert!(path.is_empty(), "{algorithm}");
        }
    }

    #[test]
    fn test_invalid_endpoints() {
        init_tracing();
        let mesh = Mesh::from_rows(&["..@"]).unwrap();
        assert!(solve(Algorithm::ToAaSipp, &mesh, PlannerSettings::new(1.0), [0.5, 0.5], [0.5, 2.5]).is_empty());
        assert!(solve(Algorithm::ToAaSipp, &mesh, PlannerSettings::new(1.0), [0.5, 0.5], [4.5, 0.5]).is_empty());
    }

    #[test]
    fn test_planner_is_single_use() {
        let mesh = Mesh::new(2, 2);
        let mut planner = ToAaSipp::new(&mesh, PlannerSettings::new(1.0));
        assert!(!planner.search([0.5, 0.5], [1.5, 1.5]).is_empty());
        assert!(planner.search([0.5, 0.5], [1.5, 1.5]).is_empty());
    }

    #[test]
    fn test_risk_interval_forces_wait() {
        init_tracing();
        let mut mesh = Mesh::new(1, 3);
        mesh.add_risk_interval(0, 1, [1.0, 3.0]);
        let settings = PlannerSettings::new(1.0);

        // Leaving at t = 2.5 puts the agent at the middle cell's border exactly when it frees.
        let expected = 2.0 + 2.5 + DEFAULT_TIME_BUFFER;
        for algorithm in Algorithm::ALL {
            let path = solve(algorithm, &mesh, settings, [0.5, 0.5], [0.5, 2.5]);
            assert!(!path.is_empty(), "{algorithm}");
            assert!((path_time(&path) - expected).abs() < 1e-9, "{algorithm}: {path:?}");
            assert_clear(&mesh, &path, settings.speed);
        }
    }

    #[test]
    fn test_risk_interval_without_waiting_fails() {
        init_tracing();
        let mut mesh = Mesh::new(1, 3);
        mesh.add_risk_interval(0, 1, [1.0, 3.0]);
        let settings = PlannerSettings {
            can_wait: false,
            ..PlannerSettings::new(1.0)
        };

        for algorithm in Algorithm::ALL {
            let path = solve(algorithm, &mesh, settings, [0.5, 0.5], [0.5, 2.5]);
            assert!(path.is_empty(), "{algorithm}");
        }
    }

    #[test]
    fn test_unreachable_in_time_returns_no_waypoints() {
        init_tracing();
        // The goal cell is taken for the whole horizon, so every arrival costs infinity.
        let mut mesh = Mesh::new(1, 2);
        mesh.add_risk_interval(0, 1, [0.0, 1000.0]);
        let settings = PlannerSettings {
            can_wait: false,
            ..PlannerSettings::new(1.0)
        };

        for algorithm in Algorithm::ALL {
            let mut planner = algorithm.planner(&mesh, settings);
            let path = planner.search([0.5, 0.5], [0.5, 1.5]);
            assert!(path.is_empty(), "{algorithm}: {path:?}");
            assert!(planner.stats().steps > 0, "{algorithm}");
        }
    }

    #[test]
    fn test_risk_interval_ignored_without_sipp() {
        let mut mesh = Mesh::new(1, 3);
        mesh.add_risk_interval(0, 1, [1.0, 3.0]);
        let settings = PlannerSettings {
            sipp: false,
            ..PlannerSettings::new(1.0)
        };
        let path = solve(Algorithm::ToAaSipp, &mesh, settings, [0.5, 0.5], [0.5, 2.5]);
        assert!((path_time(&path) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_risk_interval_forces_detour() {
        init_tracing();
        let mut mesh = Mesh::new(3, 3);
        mesh.add_risk_interval(1, 1, [0.0, 100.0]);

        for can_wait in [true, false] {
            let settings = PlannerSettings {
                can_wait,
                ..PlannerSettings::new(1.0)
            };
            for algorithm in Algorithm::ALL {
                let path = solve(algorithm, &mesh, settings, [1.5, 0.5], [1.5, 2.5]);
                assert!(!path.is_empty(), "{algorithm}");
                assert!((path_time(&path) - (2.0 + SQRT_2)).abs() < 1e-9, "{algorithm}: {path:?}");
                assert_clear(&mesh, &path, settings.speed);
            }
        }
    }

    #[test]
    fn test_variants_agree_on_map() {
        init_tracing();
        let mesh = Mesh::from_file("map_file/test/test.map").unwrap();
        let settings = PlannerSettings::new(1.0);
        let cases = [
            ([0.5, 0.5], [4.5, 5.5]),
            ([2.5, 0.5], [2.5, 5.5]),
            ([4.5, 0.5], [0.5, 4.5]),
            ([1.5, 1.5], [3.5, 3.5]),
        ];

        for (start, end) in cases {
            let reference = path_time(&solve(Algorithm::ToAaSipp, &mesh, settings, start, end));
            assert!(reference >= distance(start, end) - 1e-9);

            for algorithm in Algorithm::ALL {
                let time = path_time(&solve(algorithm, &mesh, settings, start, end));
                assert!((time - reference).abs() < 1e-9, "{algorithm} {start:?} -> {end:?}: {time} vs {reference}");
            }
        }
    }

    #[test]
    fn test_moving_obstacle_is_avoided() {
        init_tracing();
        let mut mesh = Mesh::from_file("map_file/test/test.map").unwrap();
        // A crossing agent sweeping down column 4.
        for x in 0..5 {
            mesh.add_risk_interval(x, 4, [x as f64 + 1.0, x as f64 + 2.0]);
        }
        let settings = PlannerSettings::new(1.0);

        let reference = solve(Algorithm::ToAaSipp, &mesh, settings, [2.5, 0.5], [2.5, 5.5]);
        assert!(!reference.is_empty());
        assert_clear(&mesh, &reference, settings.speed);
        for algorithm in Algorithm::ALL {
            let path = solve(algorithm, &mesh, settings, [2.5, 0.5], [2.5, 5.5]);
            assert!(!path.is_empty(), "{algorithm}");
            assert_clear(&mesh, &path, settings.speed);
            assert!(
                (path_time(&path) - path_time(&reference)).abs() < 1e-9,
                "{algorithm}: {} vs {}",
                path_time(&path),
                path_time(&reference)
            );
        }
    }

    #[test]
    fn test_stats_are_counted() {
        let mesh = Mesh::from_rows(&["...", ".@.", "..."]).unwrap();
        let mut planner = ZetaSipp::new(&mesh, PlannerSettings::new(1.0));
        planner.search([0.5, 0.5], [2.5, 2.5]);
        let stats = planner.stats();
        assert!(stats.steps > 0);
        assert!(stats.los_checks > 0);
        assert!(stats.scanned_cells > 0);
        assert!(stats.tree_nodes > 0);

        let mut planner = FovSipp::new(&mesh, PlannerSettings::new(1.0));
        planner.search([0.5, 0.5], [2.5, 2.5]);
        let stats = planner.stats();
        assert_eq!(stats.los_checks, 0);
        assert!(stats.scanned_cells > 0);
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!(Algorithm::ZetaStarSipp.to_string(), "ZetastarSIPP");
        let parsed: Algorithm = serde_yaml::from_str("to-aa-fov-sipp").unwrap();
        assert_eq!(parsed, Algorithm::ToAaFovSipp);
        assert_eq!(
            Algorithm::from_str("zeta-star-sipp", true).unwrap(),
            Algorithm::ZetaStarSipp
        );
    }
}
