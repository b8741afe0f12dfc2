//! Fixed grid topology used by the graph-attention stack.

use burn::prelude::Backend;
use burn::tensor::{Bool, Int, Tensor, TensorData};
use serde::{Deserialize, Serialize};

/// Neighbour offsets for 8-connectivity, row-major order.
const NEIGHBOUR_OFFSETS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Directed 8-connected grid graph over `height × width` cells.
///
/// Node ids are row-major (`row * width + col`). Every cell emits one edge
/// `[node, neighbour]` per in-bounds neighbour, so both directions of each
/// undirected adjacency are present and no self-loops are produced.
///
/// The graph is built once alongside the model and never changes.
///
/// # Example
///
/// ```
/// use retina_models::GridGraph;
///
/// let graph = GridGraph::new(7, 7);
/// assert_eq!(graph.num_nodes(), 49);
/// assert_eq!(graph.edge_count(), 312);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridGraph {
    height: usize,
    width: usize,
    edges: Vec<[usize; 2]>,
}

impl GridGraph {
    /// Builds the edge list for a `height × width` grid.
    #[must_use]
    pub fn new(height: usize, width: usize) -> Self {
        let mut edges = Vec::with_capacity(height * width * NEIGHBOUR_OFFSETS.len());

        for row in 0..height {
            for col in 0..width {
                let node = row * width + col;
                for (dr, dc) in NEIGHBOUR_OFFSETS {
                    let (Some(nr), Some(nc)) =
                        (row.checked_add_signed(dr), col.checked_add_signed(dc))
                    else {
                        continue;
                    };
                    if nr < height && nc < width {
                        edges.push([node, nr * width + nc]);
                    }
                }
            }
        }

        Self {
            height,
            width,
            edges,
        }
    }

    /// Grid height in cells.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Grid width in cells.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Number of nodes.
    #[must_use]
    pub const fn num_nodes(&self) -> usize {
        self.height * self.width
    }

    /// Directed edges as `[source, target]` pairs.
    #[must_use]
    pub fn edges(&self) -> &[[usize; 2]] {
        &self.edges
    }

    /// Number of directed edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Neighbours of `node` in emission order.
    pub fn neighbours(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.edges
            .iter()
            .filter(move |[src, _]| *src == node)
            .map(|[_, dst]| *dst)
    }

    /// Returns `true` if the directed edge `src -> dst` exists.
    #[must_use]
    pub fn has_edge(&self, src: usize, dst: usize) -> bool {
        self.edges.contains(&[src, dst])
    }

    /// Edge list as a `[2, E]` integer tensor (row 0 sources, row 1 targets).
    #[must_use]
    pub fn edge_index<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2, Int> {
        let count = self.edges.len();
        let values: Vec<i64> = self
            .edges
            .iter()
            .map(|[src, _]| *src)
            .chain(self.edges.iter().map(|[_, dst]| *dst))
            .map(|v| i64::try_from(v).unwrap_or(i64::MAX))
            .collect();

        Tensor::from_data(TensorData::new(values, [2, count]), device)
    }

    /// Dense `[N, N]` mask where `mask[target, source]` is `true` for each edge.
    ///
    /// With `self_loops` the diagonal is also set.
    #[must_use]
    pub fn adjacency_mask<B: Backend>(
        &self,
        self_loops: bool,
        device: &B::Device,
    ) -> Tensor<B, 2, Bool> {
        let n = self.num_nodes();
        let mut mask = vec![false; n * n];

        for [src, dst] in &self.edges {
            mask[dst * n + src] = true;
        }
        if self_loops {
            for i in 0..n {
                mask[i * n + i] = true;
            }
        }

        Tensor::from_data(TensorData::new(mask, [n, n]), device)
    }
}
