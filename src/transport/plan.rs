use crate::foundation::error::{MorphError, MorphResult};

/// Mass-transport matrix in compressed sparse row form.
///
/// Entry `(i, j)` is the fraction of the total mass moved from source point `i` to target point
/// `j`. Plans produced by the solver are permutation matrices scaled by `1/N`: every row and
/// every column holds exactly one entry. Column indices are strictly increasing within a row.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "CsrParts", into = "CsrParts")]
pub struct TransportPlan {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
    indices: Vec<u32>,
    indptr: Vec<usize>,
}

/// Raw CSR buffers, validated on the way into a [`TransportPlan`].
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct CsrParts {
    /// Row count.
    pub rows: usize,
    /// Column count.
    pub cols: usize,
    /// Non-zero values, row by row.
    pub data: Vec<f64>,
    /// Column index of every value.
    pub indices: Vec<u32>,
    /// `indptr[i]..indptr[i + 1]` spans row `i`; `rows + 1` entries.
    pub indptr: Vec<usize>,
}

impl TryFrom<CsrParts> for TransportPlan {
    type Error = MorphError;

    fn try_from(p: CsrParts) -> MorphResult<Self> {
        TransportPlan::from_parts(p.rows, p.cols, p.data, p.indices, p.indptr)
    }
}

impl From<TransportPlan> for CsrParts {
    fn from(p: TransportPlan) -> Self {
        CsrParts {
            rows: p.rows,
            cols: p.cols,
            data: p.data,
            indices: p.indices,
            indptr: p.indptr,
        }
    }
}

impl TransportPlan {
    /// Build a plan from CSR buffers, checking the structure.
    pub fn from_parts(
        rows: usize,
        cols: usize,
        data: Vec<f64>,
        indices: Vec<u32>,
        indptr: Vec<usize>,
    ) -> MorphResult<Self> {
        if indptr.len() != rows + 1 {
            return Err(MorphError::malformed_archive(format!(
                "plan indptr has {} entries, expected {}",
                indptr.len(),
                rows + 1
            )));
        }
        if indptr[0] != 0 || indptr[rows] != data.len() || indices.len() != data.len() {
            return Err(MorphError::malformed_archive(format!(
                "plan buffers disagree: indptr spans {}..{}, {} values, {} indices",
                indptr[0],
                indptr[rows],
                data.len(),
                indices.len()
            )));
        }
        for i in 0..rows {
            let (start, end) = (indptr[i], indptr[i + 1]);
            if start > end {
                return Err(MorphError::malformed_archive(format!(
                    "plan indptr decreases at row {i}"
                )));
            }
            let row_cols = &indices[start..end];
            if row_cols.iter().any(|&j| j as usize >= cols) {
                return Err(MorphError::malformed_archive(format!(
                    "plan row {i} references a column >= {cols}"
                )));
            }
            if row_cols.windows(2).any(|w| w[0] >= w[1]) {
                return Err(MorphError::malformed_archive(format!(
                    "plan row {i} column indices are not strictly increasing"
                )));
            }
        }
        if data.iter().any(|v| !(v.is_finite() && *v >= 0.0)) {
            return Err(MorphError::malformed_archive(
                "plan holds a negative or non-finite mass",
            ));
        }
        Ok(Self {
            rows,
            cols,
            data,
            indices,
            indptr,
        })
    }

    /// Permutation plan: source point `i` sends all of its `1/N` mass to `row_to_col[i]`.
    pub fn from_assignment(row_to_col: &[usize]) -> MorphResult<Self> {
        let n = row_to_col.len();
        let mut seen = vec![false; n];
        for (i, &j) in row_to_col.iter().enumerate() {
            if j >= n || std::mem::replace(&mut seen[j], true) {
                return Err(MorphError::validation(format!(
                    "assignment is not a permutation (row {i} -> column {j})"
                )));
            }
        }
        let mass = 1.0 / n as f64;
        let indices = row_to_col
            .iter()
            .map(|&j| {
                u32::try_from(j).map_err(|_| MorphError::validation("plan exceeds u32 columns"))
            })
            .collect::<MorphResult<Vec<_>>>()?;
        Ok(Self {
            rows: n,
            cols: n,
            data: vec![mass; n],
            indices,
            indptr: (0..=n).collect(),
        })
    }

    /// Number of source points.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of target points.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of stored (non-zero) entries.
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Non-zero values, row by row.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Column index of every stored value.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Row pointer offsets.
    pub fn indptr(&self) -> &[usize] {
        &self.indptr
    }

    /// Iterate `(column, mass)` over the stored entries of row `i`.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let span = self.indptr[i]..self.indptr[i + 1];
        self.indices[span.clone()]
            .iter()
            .zip(&self.data[span])
            .map(|(&j, &v)| (j as usize, v))
    }

    /// Entry `(i, j)`, zero when not stored.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        let span = self.indptr[i]..self.indptr[i + 1];
        let row_cols = &self.indices[span.clone()];
        match row_cols.binary_search(&(j as u32)) {
            Ok(k) => self.data[span.start + k],
            Err(_) => 0.0,
        }
    }

    /// Mass leaving every source point.
    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.rows).map(|i| self.row(i).map(|(_, v)| v).sum()).collect()
    }

    /// Mass arriving at every target point.
    pub fn col_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.cols];
        for (&j, &v) in self.indices.iter().zip(&self.data) {
            sums[j as usize] += v;
        }
        sums
    }

    /// Return `true` when every row and every column holds exactly one entry.
    pub fn is_permutation(&self) -> bool {
        if self.rows != self.cols || self.nnz() != self.rows {
            return false;
        }
        if self.indptr.windows(2).any(|w| w[1] - w[0] != 1) {
            return false;
        }
        let mut seen = vec![false; self.cols];
        self.indices
            .iter()
            .all(|&j| !std::mem::replace(&mut seen[j as usize], true))
    }

    /// Return `true` when rows sum to `1/rows` and columns to `1/cols` within `eps`.
    pub fn is_mass_conserving(&self, eps: f64) -> bool {
        if self.rows == 0 || self.cols == 0 {
            return false;
        }
        let row_mass = 1.0 / self.rows as f64;
        let col_mass = 1.0 / self.cols as f64;
        self.row_sums().iter().all(|s| (s - row_mass).abs() <= eps)
            && self.col_sums().iter().all(|s| (s - col_mass).abs() <= eps)
    }

    /// Reverse plan: mass flows from the target cloud back to the source cloud.
    pub fn transpose(&self) -> Self {
        let mut counts = vec![0usize; self.cols + 1];
        for &j in &self.indices {
            counts[j as usize + 1] += 1;
        }
        for j in 0..self.cols {
            counts[j + 1] += counts[j];
        }
        let indptr = counts.clone();
        let mut next = counts;
        let mut data = vec![0.0; self.nnz()];
        let mut indices = vec![0u32; self.nnz()];
        // Rows are visited in increasing order, so every transposed row stays sorted.
        for i in 0..self.rows {
            for (j, v) in self.row(i) {
                let slot = next[j];
                data[slot] = v;
                indices[slot] = i as u32;
                next[j] += 1;
            }
        }
        Self {
            rows: self.cols,
            cols: self.rows,
            data,
            indices,
            indptr,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/transport/plan.rs"]
mod tests;
