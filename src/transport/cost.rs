use rayon::prelude::*;

use crate::foundation::core::Point;
use crate::foundation::error::{MorphError, MorphResult};

/// Read-only pairwise cost between source row `i` and target column `j`.
///
/// Solvers query costs from many threads at once, hence the `Sync` bound.
pub trait CostMatrix: Sync {
    /// Number of source points.
    fn rows(&self) -> usize;
    /// Number of target points.
    fn cols(&self) -> usize;
    /// Cost of moving unit mass from source `i` to target `j`.
    fn cost(&self, i: usize, j: usize) -> f64;
}

/// Squared Euclidean distance between two points.
#[inline]
pub fn squared_distance(a: Point, b: Point) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Fully materialized row-major cost matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct DenseCost {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl DenseCost {
    /// Wrap a row-major `rows x cols` buffer.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> MorphResult<Self> {
        if data.len() != rows * cols {
            return Err(MorphError::validation(format!(
                "cost matrix {rows}x{cols} needs {} entries, got {}",
                rows * cols,
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Pairwise squared Euclidean costs, filled in parallel one row per task.
    pub fn squared_euclidean(source: &[Point], target: &[Point]) -> Self {
        let cols = target.len();
        let mut data = vec![0.0; source.len() * cols];
        if cols > 0 {
            data.par_chunks_mut(cols)
                .zip(source.par_iter())
                .for_each(|(row, &s)| {
                    for (c, &t) in row.iter_mut().zip(target) {
                        *c = squared_distance(s, t);
                    }
                });
        }
        Self {
            rows: source.len(),
            cols,
            data,
        }
    }
}

impl CostMatrix for DenseCost {
    fn rows(&self) -> usize {
        self.rows
    }

    fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    fn cost(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.cols + j]
    }
}

/// Squared Euclidean costs computed on demand, for clouds too large to materialize `N^2` costs.
#[derive(Clone, Copy, Debug)]
pub struct SquaredEuclidean<'a> {
    source: &'a [Point],
    target: &'a [Point],
}

impl<'a> SquaredEuclidean<'a> {
    /// Costs between `source` rows and `target` columns.
    pub fn new(source: &'a [Point], target: &'a [Point]) -> Self {
        Self { source, target }
    }
}

impl CostMatrix for SquaredEuclidean<'_> {
    fn rows(&self) -> usize {
        self.source.len()
    }

    fn cols(&self) -> usize {
        self.target.len()
    }

    #[inline]
    fn cost(&self, i: usize, j: usize) -> f64 {
        squared_distance(self.source[i], self.target[j])
    }
}
