use anyhow::{anyhow, bail, Context};
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::algorithm::{Algorithm, PlannerSettings, DEFAULT_TIME_BUFFER};

#[derive(Parser, Debug, Default)]
#[command(
    name = "SIPP Rust",
    about = "Time-optimal any-angle safe interval path planning benchmarks in Rust.",
    version = "1.0"
)]
pub struct Cli {
    #[arg(long, help = "Path to a YAML config file")]
    pub config: Option<String>,

    #[arg(long, help = "Path to the map file, replaces the maps of the config")]
    pub map_path: Option<String>,

    #[arg(
        long,
        help = "Scenario files for --map-path (defaults to <map>.scen)",
        value_delimiter = ','
    )]
    pub scen_paths: Vec<String>,

    #[arg(long, help = "Path to the output CSV file")]
    pub output_path: Option<String>,

    #[arg(long, help = "Directory for the synthesized dynamic obstacles")]
    pub cache_dir: Option<String>,

    #[arg(long, help = "Planners to benchmark", value_enum, value_delimiter = ',')]
    pub algorithms: Vec<Algorithm>,

    #[arg(long, help = "Numbers of dynamic obstacles", value_delimiter = ',')]
    pub obstacle_counts: Vec<usize>,

    #[arg(long, help = "Number of routes solved per scenario file")]
    pub episodes: Option<usize>,

    #[arg(long, help = "Agent speed in cells per time unit")]
    pub speed: Option<f64>,

    #[arg(long, help = "Safety margin added to every wait")]
    pub time_buffer: Option<f64>,

    #[arg(long, help = "Forbid waiting", default_value_t = false)]
    pub no_wait: bool,

    #[arg(long, help = "Seed for shuffling the routes")]
    pub seed: Option<u64>,
}

/// A map and the scenario files that run on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapSet {
    pub map_path: String,
    pub scen_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub maps: Vec<MapSet>,
    pub output_path: String,
    pub cache_dir: String,
    pub algorithms: Vec<Algorithm>,
    pub obstacle_counts: Vec<usize>,
    pub episodes: usize,
    pub speed: f64,
    pub time_buffer: f64,
    pub can_wait: bool,
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            maps: vec![MapSet {
                map_path: "map_file/test/test.map".to_string(),
                scen_paths: vec!["map_file/test/test.map.scen".to_string()],
            }],
            output_path: "result/benchmarks.csv".to_string(),
            cache_dir: "result/dynamic_scen".to_string(),
            algorithms: Algorithm::ALL.to_vec(),
            obstacle_counts: vec![32, 64, 96, 128],
            episodes: 20,
            speed: 0.1,
            time_buffer: DEFAULT_TIME_BUFFER,
            can_wait: true,
            seed: None,
        }
    }
}

impl Config {
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(yaml).context("invalid YAML config")
    }

    /// Apply every flag passed on the command line, then validate the result.
    pub fn override_from_command_line(mut self, cli: &Cli) -> anyhow::Result<Self> {
        if let Some(map_path) = &cli.map_path {
            let scen_paths = if cli.scen_paths.is_empty() {
                vec![format!("{map_path}.scen")]
            } else {
                cli.scen_paths.clone()
            };
            self.maps = vec![MapSet {
                map_path: map_path.clone(),
                scen_paths,
            }];
        } else if !cli.scen_paths.is_empty() {
            bail!("--scen-paths needs --map-path");
        }

        if let Some(output_path) = &cli.output_path {
            self.output_path = output_path.clone();
        }
        if let Some(cache_dir) = &cli.cache_dir {
            self.cache_dir = cache_dir.clone();
        }
        if !cli.algorithms.is_empty() {
            self.algorithms = cli.algorithms.clone();
        }
        if !cli.obstacle_counts.is_empty() {
            self.obstacle_counts = cli.obstacle_counts.clone();
        }
        if let Some(episodes) = cli.episodes {
            self.episodes = episodes;
        }
        if let Some(speed) = cli.speed {
            self.speed = speed;
        }
        if let Some(time_buffer) = cli.time_buffer {
            self.time_buffer = time_buffer;
        }
        if cli.no_wait {
            self.can_wait = false;
        }
        if cli.seed.is_some() {
            self.seed = cli.seed;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.speed > 0.0 && self.speed.is_finite()) {
            return Err(anyhow!("Speed must be positive, got {}", self.speed));
        }
        if !(self.time_buffer >= 0.0) {
            return Err(anyhow!(
                "Time buffer must not be negative, got {}",
                self.time_buffer
            ));
        }
        if self.algorithms.is_empty() {
            return Err(anyhow!("At least one algorithm must be selected"));
        }
        if self.maps.is_empty() {
            return Err(anyhow!("At least one map must be given"));
        }
        if let Some(set) = self.maps.iter().find(|set| set.scen_paths.is_empty()) {
            return Err(anyhow!("Map {} has no scenario files", set.map_path));
        }
        if self.episodes == 0 {
            return Err(anyhow!("Episodes must be at least 1"));
        }
        Ok(())
    }

    pub fn planner_settings(&self) -> PlannerSettings {
        PlannerSettings {
            speed: self.speed,
            sipp: true,
            can_wait: self.can_wait,
            time_buffer: self.time_buffer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.algorithms.len(), 4);
        assert_eq!(config.planner_settings().time_buffer, DEFAULT_TIME_BUFFER);
    }

    #[test]
    fn test_from_yaml_str() {
        let yaml = r#"
maps:
  - map_path: maps/random-64-64-10.map
    scen_paths: [scen/random-64-64-10-random-1.scen, scen/random-64-64-10-random-2.scen]
algorithms: [zeta-sipp, zeta-star-sipp]
speed: 0.5
seed: 42
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.maps[0].scen_paths.len(), 2);
        assert_eq!(
            config.algorithms,
            vec![Algorithm::ZetaSipp, Algorithm::ZetaStarSipp]
        );
        assert_eq!(config.speed, 0.5);
        assert_eq!(config.seed, Some(42));
        // Missing keys keep their defaults.
        assert_eq!(config.episodes, 20);
        assert!(config.can_wait);
    }

    #[test]
    fn test_from_yaml_str_rejects_unknown_algorithm() {
        assert!(Config::from_yaml_str("algorithms: [dijkstra]").is_err());
    }

    #[test]
    fn test_override_from_command_line() {
        let cli = Cli::parse_from([
            "sipp_rust",
            "--map-path",
            "maps/a.map",
            "--algorithms",
            "to-aa-sipp,to-aa-fov-sipp",
            "--obstacle-counts",
            "8,16",
            "--speed",
            "2",
            "--no-wait",
        ]);
        let config = Config::default().override_from_command_line(&cli).unwrap();
        assert_eq!(
            config.maps,
            vec![MapSet {
                map_path: "maps/a.map".to_string(),
                scen_paths: vec!["maps/a.map.scen".to_string()],
            }]
        );
        assert_eq!(
            config.algorithms,
            vec![Algorithm::ToAaSipp, Algorithm::ToAaFovSipp]
        );
        assert_eq!(config.obstacle_counts, vec![8, 16]);
        assert_eq!(config.speed, 2.0);
        assert!(!config.planner_settings().can_wait);
        // Untouched fields survive.
        assert_eq!(config.episodes, 20);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = Config {
            speed: 0.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            time_buffer: -1.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            algorithms: Vec::new(),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let cli = Cli {
            scen_paths: vec!["a.scen".to_string()],
            ..Cli::default()
        };
        assert!(Config::default().override_from_command_line(&cli).is_err());
    }
}
