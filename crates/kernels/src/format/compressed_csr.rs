//! CSR over an explicit list of nonzero rows.

use crate::format::csr::CsrMatrix;
use crate::scalar::Scalar;
use ndarray::Array2;

/// Only rows holding entries are stored; `row_indices[i]` names the matrix
/// row described by `row_ptr[i]..row_ptr[i + 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedCsrMatrix<T> {
    rows: usize,
    cols: usize,
    row_indices: Vec<usize>,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<T>,
}

impl<T: Scalar> CompressedCsrMatrix<T> {
    pub fn from_csr(csr: &CsrMatrix<T>) -> Self {
        let mut row_indices = Vec::new();
        let mut row_ptr = vec![0usize];
        for row in 0..csr.rows() {
            if csr.row_len(row) > 0 {
                row_indices.push(row);
                row_ptr.push(csr.row_ptr()[row + 1]);
            }
        }
        Self {
            rows: csr.rows(),
            cols: csr.cols(),
            row_indices,
            row_ptr,
            col_idx: csr.col_idx().to_vec(),
            values: csr.values().to_vec(),
        }
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

    pub fn nonzero_rows(&self) -> usize {
        self.row_indices.len()
    }

    pub fn row_indices(&self) -> &[usize] {
        &self.row_indices
    }

    /// Column indices and values of the `i`-th stored row.
    pub fn stored_row(&self, i: usize) -> (&[usize], &[T]) {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        (&self.col_idx[range.clone()], &self.values[range])
    }

    pub fn to_dense(&self) -> Array2<T> {
        let mut dense = Array2::zeros((self.rows, self.cols));
        for (i, &row) in self.row_indices.iter().enumerate() {
            let (cols, values) = self.stored_row(i);
            for (&col, &value) in cols.iter().zip(values) {
                dense[(row, col)] += value;
            }
        }
        dense
    }
}
