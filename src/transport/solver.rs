use rayon::prelude::*;

use crate::foundation::config::SolverConfig;
use crate::foundation::error::{MorphError, MorphResult};
use crate::sampling::cloud::PointCloud;
use crate::transport::cost::{CostMatrix, DenseCost, SquaredEuclidean};
use crate::transport::plan::TransportPlan;

/// Solution of a square assignment problem.
#[derive(Clone, Debug, PartialEq)]
pub struct Assignment {
    /// Column matched to every row.
    pub row_to_col: Vec<usize>,
    /// Solver iterations spent.
    pub iterations: u64,
    /// Sum of the matched costs.
    pub cost: f64,
}

/// Strategy solving a square minimum-cost assignment.
///
/// With uniform `1/N` marginals on both sides the balanced optimal-transport problem reduces to
/// this assignment, so any exact assignment algorithm can back a [`TransportSolver`].
pub trait AssignmentSolver: Send + Sync {
    /// Short human-readable name, used in logs.
    fn name(&self) -> &'static str;

    /// Find the minimum-cost perfect matching of `cost`.
    fn assign(&self, cost: &dyn CostMatrix) -> MorphResult<Assignment>;
}

/// Shortest augmenting path solver (Jonker-Volgenant family, dual potentials).
///
/// A column reduction and two augmenting row reduction passes first match most rows while
/// keeping the duals feasible. The rows still free are then inserted one at a time; each
/// insertion runs a Dijkstra-like search over reduced costs until it reaches a free column, then
/// flips the matching along the path. Every row reduction step and every search step counts as
/// one iteration against `max_iterations`. Scans run on the current rayon pool once the problem
/// has at least `parallel_threshold` columns.
#[derive(Clone, Debug)]
pub struct ShortestAugmentingPath {
    /// Hard iteration cap.
    pub max_iterations: u64,
    /// Column count from which scans are parallelized.
    pub parallel_threshold: usize,
}

impl ShortestAugmentingPath {
    /// Solver bounded by `max_iterations` search steps.
    pub fn new(max_iterations: u64) -> Self {
        Self {
            max_iterations,
            parallel_threshold: 2048,
        }
    }
}

impl AssignmentSolver for ShortestAugmentingPath {
    fn name(&self) -> &'static str {
        "shortest-augmenting-path"
    }

    fn assign(&self, cost: &dyn CostMatrix) -> MorphResult<Assignment> {
        let n = cost.rows();
        if n != cost.cols() {
            return Err(MorphError::DimensionMismatch {
                left: n,
                right: cost.cols(),
                transition: None,
            });
        }
        if n == 0 {
            return Ok(Assignment {
                row_to_col: Vec::new(),
                iterations: 0,
                cost: 0.0,
            });
        }

        let parallel = n >= self.parallel_threshold;
        let mut iterations: u64 = 0;
        let warm = self.warm_start(cost, parallel, &mut iterations)?;

        // Index 0 of every column array is the virtual root column; rows are stored 1-based in
        // `owner` so that 0 means "free".
        let mut u = vec![0.0f64; n + 1];
        let mut v = vec![0.0f64; n + 1];
        let mut owner = vec![0usize; n + 1];
        let mut way = vec![0usize; n + 1];
        let mut minv = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];
        let mut tree: Vec<usize> = Vec::new();

        v[1..].copy_from_slice(&warm.v);
        let mut free = Vec::new();
        for (i, col) in warm.row_col.iter().enumerate() {
            match *col {
                Some(j) => {
                    owner[j + 1] = i + 1;
                    u[i + 1] = cost.cost(i, j) - warm.v[j];
                }
                None => free.push(i + 1),
            }
        }
        tracing::debug!(
            rows = n,
            free = free.len(),
            iterations,
            "assignment warm start done"
        );

        for i in free {
            owner[0] = i;
            let mut j0 = 0usize;
            minv.fill(f64::INFINITY);
            used.fill(false);
            tree.clear();

            loop {
                self.tick(&mut iterations)?;

                used[j0] = true;
                tree.push(j0);
                let i0 = owner[j0];
                let scan = Scan {
                    cost,
                    row: i0 - 1,
                    u_row: u[i0],
                    from: j0,
                };
                let (delta, j1) = if parallel {
                    scan.relax_par(&v, &used, &mut minv, &mut way)
                } else {
                    scan.relax_seq(&v, &used, &mut minv, &mut way)
                };
                if j1 == 0 || !delta.is_finite() {
                    return Err(MorphError::validation(format!(
                        "cost matrix row {} has no finite reduced cost",
                        i0 - 1
                    )));
                }

                for &j in &tree {
                    u[owner[j]] += delta;
                    v[j] -= delta;
                }
                if parallel {
                    minv[1..]
                        .par_iter_mut()
                        .zip(used[1..].par_iter())
                        .for_each(|(m, &seen)| {
                            if !seen {
                                *m -= delta;
                            }
                        });
                } else {
                    for (m, &seen) in minv[1..].iter_mut().zip(&used[1..]) {
                        if !seen {
                            *m -= delta;
                        }
                    }
                }

                j0 = j1;
                if owner[j0] == 0 {
                    break;
                }
            }

            // Flip the matching along the augmenting path back to the root.
            loop {
                let j1 = way[j0];
                owner[j0] = owner[j1];
                j0 = j1;
                if j0 == 0 {
                    break;
                }
            }
        }

        let mut row_to_col = vec![0usize; n];
        for j in 1..=n {
            row_to_col[owner[j] - 1] = j - 1;
        }
        let total = row_to_col
            .iter()
            .enumerate()
            .map(|(i, &j)| cost.cost(i, j))
            .sum();
        Ok(Assignment {
            row_to_col,
            iterations,
            cost: total,
        })
    }
}

impl ShortestAugmentingPath {
    fn tick(&self, iterations: &mut u64) -> MorphResult<()> {
        if *iterations == self.max_iterations {
            return Err(MorphError::SolverDivergence {
                iterations: *iterations,
                cap: self.max_iterations,
                transition: None,
            });
        }
        *iterations += 1;
        Ok(())
    }

    /// Column reduction then two augmenting row reduction passes.
    ///
    /// On return `v[j] <= cost(i, j)` for every row, and every matched row's column minimizes
    /// `cost(i, j) - v[j]` over its row, so `u[i] = cost(i, col) - v[col]` is a feasible dual.
    fn warm_start(
        &self,
        cost: &dyn CostMatrix,
        parallel: bool,
        iterations: &mut u64,
    ) -> MorphResult<WarmStart> {
        let n = cost.rows();
        let column_min = |j: usize| {
            (0..n).fold((f64::INFINITY, usize::MAX), |best, i| {
                let c = cost.cost(i, j);
                if c < best.0 { (c, i) } else { best }
            })
        };
        let mins: Vec<(f64, usize)> = if parallel {
            (0..n).into_par_iter().map(column_min).collect()
        } else {
            (0..n).map(column_min).collect()
        };

        let mut warm = WarmStart {
            v: vec![0.0; n],
            row_col: vec![None; n],
            col_row: vec![None; n],
        };
        for j in (0..n).rev() {
            let (m, i) = mins[j];
            if !m.is_finite() {
                return Err(MorphError::validation(format!(
                    "cost matrix column {j} has no finite cost"
                )));
            }
            warm.v[j] = m;
            if warm.row_col[i].is_none() {
                warm.row_col[i] = Some(j);
                warm.col_row[j] = Some(i);
            }
        }

        let mut free: Vec<usize> = (0..n).filter(|&i| warm.row_col[i].is_none()).collect();
        for _ in 0..2 {
            if free.is_empty() {
                break;
            }
            free = self.reduce_rows(cost, parallel, free, &mut warm, iterations)?;
        }
        Ok(warm)
    }

    /// One augmenting row reduction pass over `free`. Returns the rows left free.
    fn reduce_rows(
        &self,
        cost: &dyn CostMatrix,
        parallel: bool,
        mut queue: Vec<usize>,
        warm: &mut WarmStart,
        iterations: &mut u64,
    ) -> MorphResult<Vec<usize>> {
        let n = warm.v.len();
        let mut current = 0usize;
        let mut steps = 0usize;
        let mut left = Vec::new();

        while current < queue.len() {
            self.tick(iterations)?;
            steps += 1;
            let row = queue[current];
            current += 1;

            let two = TwoSmallest::of_row(cost, row, &warm.v, parallel);
            let (v1, mut j1) = two.first;
            let (v2, j2) = two.second;
            if !v1.is_finite() {
                return Err(MorphError::validation(format!(
                    "cost matrix row {row} has no finite reduced cost"
                )));
            }
            let has_second = j2 != NO_COLUMN;
            let lowered = warm.v[j1] - (v2 - v1);
            let lowers = has_second && lowered < warm.v[j1];
            let mut displaced = warm.col_row[j1];

            if steps < current.saturating_mul(n) {
                if lowers {
                    warm.v[j1] = lowered;
                } else if displaced.is_some() && has_second {
                    j1 = j2;
                    displaced = warm.col_row[j2];
                }
                if let Some(prev) = displaced {
                    warm.row_col[prev] = None;
                    if lowers {
                        current -= 1;
                        queue[current] = prev;
                    } else {
                        left.push(prev);
                    }
                }
            } else if let Some(prev) = displaced {
                warm.row_col[prev] = None;
                left.push(prev);
            }
            warm.row_col[row] = Some(j1);
            warm.col_row[j1] = Some(row);
        }
        Ok(left)
    }
}

/// Partial matching and column duals produced before the shortest path phase.
struct WarmStart {
    v: Vec<f64>,
    row_col: Vec<Option<usize>>,
    col_row: Vec<Option<usize>>,
}

const NO_COLUMN: usize = usize::MAX;

/// Two smallest `(reduced cost, column)` pairs of a row, ordered by cost then column.
#[derive(Clone, Copy, Debug, PartialEq)]
struct TwoSmallest {
    first: (f64, usize),
    second: (f64, usize),
}

impl TwoSmallest {
    const EMPTY: Self = Self {
        first: (f64::INFINITY, NO_COLUMN),
        second: (f64::INFINITY, NO_COLUMN),
    };

    fn of_row(cost: &dyn CostMatrix, row: usize, v: &[f64], parallel: bool) -> Self {
        let reduced = |j: usize| (cost.cost(row, j) - v[j], j);
        if parallel {
            (0..v.len())
                .into_par_iter()
                .fold(|| Self::EMPTY, |acc, j| acc.push(reduced(j)))
                .reduce(|| Self::EMPTY, Self::merge)
        } else {
            (0..v.len()).fold(Self::EMPTY, |acc, j| acc.push(reduced(j)))
        }
    }

    fn push(self, c: (f64, usize)) -> Self {
        if precedes(c, self.first) {
            Self {
                first: c,
                second: self.first,
            }
        } else if precedes(c, self.second) {
            Self {
                first: self.first,
                second: c,
            }
        } else {
            self
        }
    }

    fn merge(self, other: Self) -> Self {
        self.push(other.first).push(other.second)
    }
}

fn precedes(a: (f64, usize), b: (f64, usize)) -> bool {
    a.1 != NO_COLUMN && (b.1 == NO_COLUMN || a.0 < b.0 || (a.0 == b.0 && a.1 < b.1))
}

/// One Dijkstra step: relax every unused column from the row owning column `from`.
struct Scan<'a> {
    cost: &'a dyn CostMatrix,
    row: usize,
    u_row: f64,
    from: usize,
}

impl Scan<'_> {
    fn relax_seq(
        &self,
        v: &[f64],
        used: &[bool],
        minv: &mut [f64],
        way: &mut [usize],
    ) -> (f64, usize) {
        let mut best = (f64::INFINITY, 0usize);
        for j in 1..minv.len() {
            if used[j] {
                continue;
            }
            let cur = self.cost.cost(self.row, j - 1) - self.u_row - v[j];
            if cur < minv[j] {
                minv[j] = cur;
                way[j] = self.from;
            }
            best = pick_min(best, (minv[j], j));
        }
        best
    }

    fn relax_par(
        &self,
        v: &[f64],
        used: &[bool],
        minv: &mut [f64],
        way: &mut [usize],
    ) -> (f64, usize) {
        minv[1..]
            .par_iter_mut()
            .zip(way[1..].par_iter_mut())
            .zip(used[1..].par_iter().zip(v[1..].par_iter()))
            .enumerate()
            .filter(|(_, (_, (seen, _)))| !**seen)
            .map(|(k, ((m, w), (_, &vj)))| {
                let cur = self.cost.cost(self.row, k) - self.u_row - vj;
                if cur < *m {
                    *m = cur;
                    *w = self.from;
                }
                (*m, k + 1)
            })
            .reduce(|| (f64::INFINITY, 0), pick_min)
    }
}

/// Smaller reduced cost wins; ties go to the lower column so results do not depend on threads.
fn pick_min(a: (f64, usize), b: (f64, usize)) -> (f64, usize) {
    if b.1 == 0 {
        return a;
    }
    if a.1 == 0 || b.0 < a.0 || (b.0 == a.0 && b.1 < a.1) {
        b
    } else {
        a
    }
}

/// Balanced optimal-transport solver between two equally sized point clouds.
pub struct TransportSolver {
    strategy: Box<dyn AssignmentSolver>,
    dense_cost_limit: usize,
    pool: rayon::ThreadPool,
}

impl std::fmt::Debug for TransportSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSolver")
            .field("strategy", &self.strategy.name())
            .field("dense_cost_limit", &self.dense_cost_limit)
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

impl TransportSolver {
    /// Solver using [`ShortestAugmentingPath`] with the configured cap and thread count.
    pub fn new(cfg: &SolverConfig) -> MorphResult<Self> {
        if cfg.max_iterations == 0 {
            return Err(MorphError::validation("solver.max_iterations must be >= 1"));
        }
        Self::with_strategy(
            Box::new(ShortestAugmentingPath::new(cfg.max_iterations)),
            cfg,
        )
    }

    /// Solver backed by an arbitrary assignment strategy.
    pub fn with_strategy(
        strategy: Box<dyn AssignmentSolver>,
        cfg: &SolverConfig,
    ) -> MorphResult<Self> {
        Ok(Self {
            strategy,
            dense_cost_limit: cfg.dense_cost_limit,
            pool: build_thread_pool(cfg.threads)?,
        })
    }

    /// Compute the plan moving `source` onto `target` at minimum total squared displacement.
    ///
    /// The result holds exactly `N` entries of mass `1/N`.
    #[tracing::instrument(skip_all, fields(points = source.len(), strategy = self.strategy.name()))]
    pub fn solve(&self, source: &PointCloud, target: &PointCloud) -> MorphResult<TransportPlan> {
        let n = source.len();
        if n != target.len() {
            return Err(MorphError::DimensionMismatch {
                left: n,
                right: target.len(),
                transition: None,
            });
        }
        if n == 0 {
            return Err(MorphError::validation("cannot transport empty point clouds"));
        }

        let assignment = self.pool.install(|| {
            if n <= self.dense_cost_limit {
                let cost = DenseCost::squared_euclidean(source.points(), target.points());
                self.strategy.assign(&cost)
            } else {
                let cost = SquaredEuclidean::new(source.points(), target.points());
                self.strategy.assign(&cost)
            }
        })?;

        tracing::info!(
            iterations = assignment.iterations,
            mean_cost = assignment.cost / n as f64,
            "transport plan solved"
        );
        TransportPlan::from_assignment(&assignment.row_to_col)
    }
}

pub(crate) fn build_thread_pool(threads: Option<usize>) -> MorphResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(MorphError::validation(
            "solver 'threads' must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| MorphError::validation(format!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/transport/solver.rs"]
mod tests;
