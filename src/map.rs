use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use tracing::debug;

use crate::common::union_all;

const PASSABLE: [char; 3] = ['.', 'G', 'S'];

/// One square of the input mesh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshCell {
    /// 0 is an obstacle, anything else is passable.
    pub weight: u8,
    /// Sorted, disjoint occupancy windows as flat boundaries `[a, b, c, d, ..]`.
    pub risk_intervals: Vec<f64>,
}

impl MeshCell {
    pub fn is_passable(&self) -> bool {
        self.weight != 0
    }

    /// Occupancy windows as `[start, end]` pairs.
    pub fn risk_intervals(&self) -> impl Iterator<Item = [f64; 2]> + '_ {
        self.risk_intervals
            .chunks_exact(2)
            .map(|pair| [pair[0], pair[1]])
    }
}

/// Weighted grid with per-cell risk intervals, indexed `(x, y)` with `x < height` (map line)
/// and `y < width` (column).
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub height: usize,
    pub width: usize,
    cells: Vec<MeshCell>,
}

impl Mesh {
    /// A fully passable mesh without risk intervals.
    pub fn new(height: usize, width: usize) -> Self {
        Mesh {
            height,
            width,
            cells: vec![
                MeshCell {
                    weight: 1,
                    risk_intervals: Vec::new(),
                };
                height * width
            ],
        }
    }

    /// Build a mesh from rows of map characters (`.`, `G`, `S` are passable).
    pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> Result<Self> {
        let height = rows.len();
        let width = rows.first().map_or(0, |row| row.as_ref().chars().count());
        let mut mesh = Mesh::new(height, width);

        for (x, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.chars().count() != width {
                bail!("row {x} has {} cells, expected {width}", row.chars().count());
            }
            for (y, ch) in row.chars().enumerate() {
                mesh.set_weight(x, y, u8::from(PASSABLE.contains(&ch)));
            }
        }
        Ok(mesh)
    }

    /// Load a MovingAI octile map: `type`, `height`, `width` and `map` header lines, then rows.
    pub fn from_file(path: &str) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("failed to open map {path}"))?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let mut header = |name: &str| -> Result<String> {
            lines
                .next()
                .ok_or_else(|| anyhow!("map {path} ends before the {name} line"))?
                .with_context(|| format!("failed to read {name} line of {path}"))
        };
        let _type = header("type")?;
        let height = parse_dimension(&header("height")?)?;
        let width = parse_dimension(&header("width")?)?;
        let _map = header("map")?;

        let rows = lines
            .map(|line| line.with_context(|| format!("failed to read row of {path}")))
            .filter(|line| !matches!(line, Ok(line) if line.trim().is_empty()))
            .take(height)
            .collect::<Result<Vec<_>>>()?;

        if rows.len() != height {
            bail!("map {path} declares {height} rows but has {}", rows.len());
        }
        let mesh = Mesh::from_rows(&rows).with_context(|| format!("malformed map {path}"))?;
        if mesh.width != width {
            bail!("map {path} declares width {width} but rows have {}", mesh.width);
        }

        debug!("loaded map {path}: {height}x{width}");
        Ok(mesh)
    }

    pub fn get(&self, x: i64, y: i64) -> Option<&MeshCell> {
        if x < 0 || y < 0 || x as usize >= self.height || y as usize >= self.width {
            return None;
        }
        self.cells.get(x as usize * self.width + y as usize)
    }

    pub fn cell(&self, x: usize, y: usize) -> &MeshCell {
        &self.cells[x * self.width + y]
    }

    /// Passability lookup; everything outside the mesh is blocked.
    pub fn is_passable(&self, x: i64, y: i64) -> bool {
        self.get(x, y).is_some_and(MeshCell::is_passable)
    }

    /// Grid cell holding a continuous point, if it lies inside the mesh.
    pub fn locate(&self, point: [f64; 2]) -> Option<(usize, usize)> {
        let (x, y) = (point[0].floor(), point[1].floor());
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        self.get(x as i64, y as i64)
            .map(|_| (x as usize, y as usize))
    }

    pub fn set_weight(&mut self, x: usize, y: usize, weight: u8) {
        self.cells[x * self.width + y].weight = weight;
    }

    /// Merge an occupancy window into the cell's risk intervals.
    pub fn add_risk_interval(&mut self, x: usize, y: usize, interval: [f64; 2]) {
        let cell = &mut self.cells[x * self.width + y];
        cell.risk_intervals = union_all(&cell.risk_intervals, interval);
    }

    pub fn clear_risk_intervals(&mut self) {
        for cell in &mut self.cells {
            cell.risk_intervals.clear();
        }
    }

    pub fn passable_cells(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_passable()).count()
    }
}

fn parse_dimension(line: &str) -> Result<usize> {
    line.split_whitespace()
        .last()
        .ok_or_else(|| anyhow!("empty dimension line"))?
        .parse::<usize>()
        .with_context(|| format!("invalid dimension line: {line}"))
}
