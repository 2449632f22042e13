//! Coordinate storage with row-aligned work-group boundaries.

use crate::error::{SparseError, SparseResult};
use crate::format::csr::CsrMatrix;
use crate::scalar::Scalar;
use ndarray::Array2;

/// Work groups the nonzeros are split into by default.
pub const COO_DEFAULT_GROUPS: usize = 64;

/// Triples sorted by row. `group_boundaries` holds nonzero offsets such that
/// group `g` owns `[b[g], b[g + 1])` and no row straddles two groups.
#[derive(Debug, Clone, PartialEq)]
pub struct CooMatrix<T> {
    rows: usize,
    cols: usize,
    row_idx: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<T>,
    group_boundaries: Vec<usize>,
}

impl<T: Scalar> CooMatrix<T> {
    pub fn new(
        rows: usize,
        cols: usize,
        row_idx: Vec<usize>,
        col_idx: Vec<usize>,
        values: Vec<T>,
    ) -> SparseResult<Self> {
        if row_idx.len() != values.len() || col_idx.len() != values.len() {
            return Err(SparseError::structure(
                "coo",
                format!(
                    "{} row indices, {} column indices and {} values",
                    row_idx.len(),
                    col_idx.len(),
                    values.len()
                ),
            ));
        }
        if row_idx.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(SparseError::structure("coo", "entries must be sorted by row"));
        }
        if row_idx.last().is_some_and(|&row| row >= rows) {
            return Err(SparseError::structure("coo", "row index out of range"));
        }
        if col_idx.iter().any(|&col| col >= cols) {
            return Err(SparseError::structure("coo", "column index out of range"));
        }
        let group_boundaries = build_group_boundaries(&row_idx, COO_DEFAULT_GROUPS);
        Ok(Self {
            rows,
            cols,
            row_idx,
            col_idx,
            values,
            group_boundaries,
        })
    }

    pub fn from_csr(csr: &CsrMatrix<T>) -> Self {
        let mut row_idx = Vec::with_capacity(csr.nnz());
        for row in 0..csr.rows() {
            row_idx.extend(std::iter::repeat(row).take(csr.row_len(row)));
        }
        let group_boundaries = build_group_boundaries(&row_idx, COO_DEFAULT_GROUPS);
        Self {
            rows: csr.rows(),
            cols: csr.cols(),
            row_idx,
            col_idx: csr.col_idx().to_vec(),
            values: csr.values().to_vec(),
            group_boundaries,
        }
    }

    /// Re-splits the nonzeros into roughly `groups` row-aligned groups.
    pub fn with_groups(mut self, groups: usize) -> Self {
        self.group_boundaries = build_group_boundaries(&self.row_idx, groups.max(1));
        self
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn row_idx(&self) -> &[usize] {
        &self.row_idx
    }

    pub fn col_idx(&self) -> &[usize] {
        &self.col_idx
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn group_boundaries(&self) -> &[usize] {
        &self.group_boundaries
    }

    pub fn to_dense(&self) -> Array2<T> {
        let mut dense = Array2::zeros((self.rows, self.cols));
        for ((&row, &col), &value) in self.row_idx.iter().zip(&self.col_idx).zip(&self.values) {
            dense[(row, col)] += value;
        }
        dense
    }
}

fn build_group_boundaries(row_idx: &[usize], groups: usize) -> Vec<usize> {
    let nnz = row_idx.len();
    let target = nnz.div_ceil(groups).max(1);
    let mut boundaries = vec![0usize];
    let mut start = 0usize;
    while start < nnz {
        let mut end = (start + target).min(nnz);
        while end < nnz && row_idx[end] == row_idx[end - 1] {
            end += 1;
        }
        boundaries.push(end);
        start = end;
    }
    boundaries
}
