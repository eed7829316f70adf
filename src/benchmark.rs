use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::task;
use tracing::{info, instrument, warn};

use crate::algorithm::{Algorithm, PlannerSettings};
use crate::common::path_time;
use crate::config::Config;
use crate::map::Mesh;
use crate::scenario::{load_from_scen, load_or_synthesize, Route};
use crate::stat::Record;

/// What every record of one batch of episodes shares.
#[derive(Debug, Clone)]
struct Batch {
    map: String,
    scen_index: String,
    dynamic_obstacles: usize,
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map_or_else(|| path.to_string(), |stem| stem.to_string_lossy().into_owned())
}

/// `random-64-64-10-random-3.scen` is scenario "3".
fn scen_index(path: &str) -> String {
    let stem = file_stem(path);
    stem.rsplit('-').next().unwrap_or(stem.as_str()).to_string()
}

fn cache_path(config: &Config, scen_path: &str, count: usize) -> PathBuf {
    let mut name = format!("{}_{count}", file_stem(scen_path));
    if let Some(seed) = config.seed {
        name.push_str(&format!("_seed{seed}"));
    }
    Path::new(&config.cache_dir).join(format!("{name}.json"))
}

/// Run every configured map, scenario file and obstacle count, returning one record per
/// solved episode and algorithm.
#[instrument(skip_all, level = "debug")]
pub async fn run(config: &Config) -> Result<Vec<Record>> {
    let settings = config.planner_settings();
    let mut rng = config.seed.map(StdRng::seed_from_u64);
    let mut records = Vec::new();

    for set in &config.maps {
        let mut mesh = Mesh::from_file(&set.map_path)?;
        let map = Path::new(&set.map_path)
            .file_name()
            .map_or_else(|| set.map_path.clone(), |name| name.to_string_lossy().into_owned());
        info!("map {map}: {}x{}, {} passable cells", mesh.height, mesh.width, mesh.passable_cells());

        for scen_path in &set.scen_paths {
            let mut routes = load_from_scen(scen_path)?;
            if let Some(rng) = rng.as_mut() {
                routes.shuffle(rng);
            }

            for &count in &config.obstacle_counts {
                mesh.clear_risk_intervals();
                let cache = cache_path(config, scen_path, count);
                load_or_synthesize(&cache, &mut mesh, &routes, count, settings)?;

                let episodes = &routes[routes.len().saturating_sub(config.episodes)..];
                let batch = Batch {
                    map: map.clone(),
                    scen_index: scen_index(scen_path),
                    dynamic_obstacles: count,
                };
                let snapshot = Arc::new(mesh.clone());
                records.extend(run_episodes(snapshot, &batch, episodes, &config.algorithms, settings).await?);
            }
        }
    }

    Ok(records)
}

/// Solve each episode with each algorithm concurrently on the blocking pool. The mesh is a
/// frozen snapshot shared by every planner.
async fn run_episodes(
    mesh: Arc<Mesh>,
    batch: &Batch,
    episodes: &[Route],
    algorithms: &[Algorithm],
    settings: PlannerSettings,
) -> Result<Vec<Record>> {
    let mut handles = Vec::new();
    for (id, route) in episodes.iter().enumerate() {
        if !route.is_passable(&mesh) {
            warn!("skipping episode {id}: {:?} -> {:?} is not passable", route.start, route.end);
            continue;
        }
        for &algorithm in algorithms {
            let (mesh, batch, route) = (Arc::clone(&mesh), batch.clone(), route.clone());
            handles.push(task::spawn_blocking(move || {
                solve_episode(&mesh, batch, id, &route, algorithm, settings)
            }));
        }
    }

    let mut records = Vec::with_capacity(handles.len());
    for handle in handles {
        let record = handle.await.context("episode task failed")?;
        record.print();
        records.push(record);
    }
    Ok(records)
}

fn solve_episode(
    mesh: &Mesh,
    batch: Batch,
    episode: usize,
    route: &Route,
    algorithm: Algorithm,
    settings: PlannerSettings,
) -> Record {
    let mut planner = algorithm.planner(mesh, settings);
    let started = Instant::now();
    let path = planner.search(route.start_point(), route.end_point());
    let runtime = started.elapsed();
    let stats = planner.stats();

    Record {
        map: batch.map,
        scen_index: batch.scen_index,
        dynamic_obstacles: batch.dynamic_obstacles,
        episode,
        algorithm: algorithm.to_string(),
        ref_time: route.shortest / settings.speed,
        path_time: path_time(&path),
        tree_nodes: stats.tree_nodes,
        search_steps: stats.steps,
        los_checks: stats.los_checks,
        scanned_cells: stats.scanned_cells,
        runtime_ms: runtime.as_secs_f64() * 1000.0,
    }
}

/// Write records as CSV with a header row, creating parent directories as needed.
pub fn write_records(path: &str, records: &[Record]) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("cannot create directory {}", parent.display()))?;
    }
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("cannot create result file {path}"))?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapSet;

    // Helper function to setup tracing
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("info")
            .try_init();
    }

    fn test_config(name: &str) -> Config {
        let dir = std::env::temp_dir().join(format!("sipp_rust_{name}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        Config {
            maps: vec![MapSet {
                map_path: "map_file/test/test.map".to_string(),
                scen_paths: vec!["map_file/test/test.map.scen".to_string()],
            }],
            output_path: dir.join("result.csv").to_string_lossy().into_owned(),
            cache_dir: dir.join("dynamic").to_string_lossy().into_owned(),
            obstacle_counts: vec![1],
            episodes: 2,
            speed: 1.0,
            ..Config::default()
        }
    }

    #[test]
    fn test_scen_index() {
        assert_eq!(scen_index("maps/random-64-64-10-random-3.scen"), "3");
        assert_eq!(scen_index("map_file/test/test.map.scen"), "test.map");
    }

    #[test]
    fn test_cache_path_includes_seed() {
        let mut config = test_config("cache");
        config.cache_dir = "cache".to_string();
        assert_eq!(
            cache_path(&config, "scen/a-1.scen", 32),
            Path::new("cache").join("a-1_32.json")
        );
        config.seed = Some(7);
        assert_eq!(
            cache_path(&config, "scen/a-1.scen", 32),
            Path::new("cache").join("a-1_32_seed7.json")
        );
    }

    #[tokio::test]
    async fn test_run_benchmark() {
        init_tracing();
        let config = test_config("run");
        let records = run(&config).await.unwrap();

        // The last two routes, each solved by every algorithm.
        assert_eq!(records.len(), 2 * Algorithm::ALL.len());
        for record in &records {
            assert_eq!(record.map, "test.map");
            assert_eq!(record.dynamic_obstacles, 1);
            assert!(record.path_time > 0.0, "{record:?}");
            assert!(record.search_steps > 0);
        }
        assert_eq!(records[0].episode, 0);
        assert_eq!(records[0].algorithm, "TOAASIPP");
        assert!((records[0].ref_time - 6.82842712).abs() < 1e-9);
        assert!(Path::new(&config.cache_dir).join("test.map_1.json").exists());

        write_records(&config.output_path, &records).unwrap();
        let written = fs::read_to_string(&config.output_path).unwrap();
        let mut lines = written.lines();
        assert_eq!(
            lines.next(),
            Some("map,scenIndex,dynamicObs,scenId,algorithm,refTime,pathTime,treeNodes,searchSteps,LOSchecks,scannedNodes,runtime_total")
        );
        assert_eq!(lines.count(), records.len());
    }

    #[tokio::test]
    async fn test_impassable_episodes_are_skipped() {
        // The config clears its directory, so the scenario is written after.
        let mut config = test_config("skip");
        let dir = Path::new(&config.cache_dir).to_path_buf();
        fs::create_dir_all(&dir).unwrap();
        let scen = dir.join("blocked.scen");
        fs::write(&scen, "version 1\n0\ttest.map\t6\t5\t2\t2\t0\t0\t3.0\n").unwrap();

        config.maps[0].scen_paths = vec![scen.to_string_lossy().into_owned()];
        config.obstacle_counts = vec![0];
        let records = run(&config).await.unwrap();
        assert!(records.is_empty());
        let _ = fs::remove_dir_all(&dir);
    }
}
