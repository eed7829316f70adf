use crate::common::{line_of_sight_grid, Handle};
use crate::map::Mesh;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl Handle for CellId {
    fn index(self) -> usize {
        self.0
    }
}

impl Handle for NodeId {
    fn index(self) -> usize {
        self.0
    }
}

/// A grid square of the planning graph.
#[derive(Debug, Clone)]
pub struct Cell {
    pub x: usize,
    pub y: usize,
    /// Cell center in continuous space.
    pub position: [f64; 2],
    pub weight: u8,
    pub h: f64,
    /// Lower bound of any path through this cell (bound-heap variants only).
    pub fh: f64,
    pub visited: bool,
    /// At least one of the cell's nodes is closed.
    pub closed: bool,
    pub nodes: Vec<NodeId>,
    pub visible_cells: Vec<CellId>,
}

impl Cell {
    pub fn is_passable(&self) -> bool {
        self.weight != 0
    }
}

/// A (cell, safe interval) search state.
#[derive(Debug, Clone)]
pub struct Node {
    pub cell: CellId,
    pub position: [f64; 2],
    pub f: f64,
    pub g: f64,
    pub g_low: f64,
    pub h: f64,
    pub parent: Option<NodeId>,
    pub closed: bool,
    pub best_potential_parent: Option<NodeId>,
    /// Candidate parents, index-aligned with `g_low_array`.
    pub potential_parents: Vec<NodeId>,
    pub g_low_array: Vec<f64>,
    /// Time spent waiting at the parent before departing towards this node.
    pub wait_time: f64,
    pub safe_interval: [f64; 2],
}

impl Node {
    fn new(cell: CellId, position: [f64; 2], safe_interval: [f64; 2]) -> Self {
        Node {
            cell,
            position,
            f: f64::INFINITY,
            g: f64::INFINITY,
            g_low: f64::INFINITY,
            h: 0.0,
            parent: None,
            closed: false,
            best_potential_parent: None,
            potential_parents: Vec::new(),
            g_low_array: Vec::new(),
            wait_time: 0.0,
            safe_interval,
        }
    }
}

/// Arena of cells and nodes materialized from a mesh. Parent links are plain ids.
#[derive(Debug)]
pub struct Graph<'a> {
    mesh: &'a Mesh,
    cells: Vec<Cell>,
    nodes: Vec<Node>,
    /// Pairwise line-of-sight checks performed.
    pub checks: usize,
    /// Cells examined by line-of-sight walks and shadowcast scans.
    pub scanned_grids: usize,
}

impl<'a> Graph<'a> {
    /// Materialize every mesh cell. With waiting allowed each cell gets one node per safe
    /// interval, otherwise a single node covering all time.
    pub fn new(mesh: &'a Mesh, can_wait: bool) -> Self {
        let mut cells = Vec::with_capacity(mesh.height * mesh.width);
        let mut nodes = Vec::with_capacity(mesh.height * mesh.width);

        for x in 0..mesh.height {
            for y in 0..mesh.width {
                let id = CellId(cells.len());
                let position = [x as f64 + 0.5, y as f64 + 0.5];
                let source = mesh.cell(x, y);

                let mut cell_nodes = Vec::new();
                if can_wait {
                    let mut bounds = Vec::with_capacity(source.risk_intervals.len() + 2);
                    bounds.push(0.0);
                    bounds.extend_from_slice(&source.risk_intervals);
                    bounds.push(f64::INFINITY);
                    for interval in bounds.chunks_exact(2) {
                        cell_nodes.push(NodeId(nodes.len()));
                        nodes.push(Node::new(id, position, [interval[0], interval[1]]));
                    }
                } else {
                    cell_nodes.push(NodeId(nodes.len()));
                    nodes.push(Node::new(id, position, [0.0, f64::INFINITY]));
                }

                cells.push(Cell {
                    x,
                    y,
                    position,
                    weight: source.weight,
                    h: 0.0,
                    fh: f64::INFINITY,
                    visited: false,
                    closed: false,
                    nodes: cell_nodes,
                    visible_cells: Vec::new(),
                });
            }
        }

        Graph {
            mesh,
            cells,
            nodes,
            checks: 0,
            scanned_grids: 0,
        }
    }

    pub fn mesh(&self) -> &'a Mesh {
        self.mesh
    }

    pub fn cell_at(&self, x: i64, y: i64) -> Option<CellId> {
        self.mesh
            .get(x, y)
            .map(|_| CellId(x as usize * self.mesh.width + y as usize))
    }

    /// Cell holding a continuous point.
    pub fn locate(&self, point: [f64; 2]) -> Option<CellId> {
        self.mesh
            .locate(point)
            .map(|(x, y)| CellId(x * self.mesh.width + y))
    }

    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id.0]
    }

    pub fn cell_mut(&mut self, id: CellId) -> &mut Cell {
        &mut self.cells[id.0]
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn cell_ids(&self) -> impl Iterator<Item = CellId> {
        (0..self.cells.len()).map(CellId)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Clear line of sight between two cell centers, counted for instrumentation.
    pub fn line_of_sight(&mut self, from: CellId, to: CellId) -> bool {
        self.checks += 1;
        let [x0, y0] = self.cells[from.0].position;
        let [x1, y1] = self.cells[to.0].position;
        let mesh = self.mesh;
        let (visible, examined) = line_of_sight_grid(x0, y0, x1, y1, |x, y| mesh.is_passable(x, y));
        self.scanned_grids += examined;
        visible
    }
}
