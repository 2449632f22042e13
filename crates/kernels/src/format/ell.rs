//! ELLPACK storage: a fixed number of padded entries per row.

use crate::error::{SparseError, SparseResult};
use crate::format::csr::CsrMatrix;
use crate::scalar::Scalar;
use ndarray::Array2;

/// Padded row count is rounded up to this multiple so item columns stay aligned.
pub const ELL_ROW_ALIGNMENT: usize = 16;

/// Entry `item` of `row` sits at `item * internal_rows + row`. Padding
/// entries carry column 0 and value zero.
#[derive(Debug, Clone, PartialEq)]
pub struct EllMatrix<T> {
    rows: usize,
    cols: usize,
    internal_rows: usize,
    items_per_row: usize,
    col_idx: Vec<usize>,
    values: Vec<T>,
    stored: usize,
}

impl<T: Scalar> EllMatrix<T> {
    pub fn new(
        rows: usize,
        cols: usize,
        internal_rows: usize,
        items_per_row: usize,
        col_idx: Vec<usize>,
        values: Vec<T>,
    ) -> SparseResult<Self> {
        if internal_rows < rows {
            return Err(SparseError::structure(
                "ell",
                format!("internal rows {internal_rows} below logical rows {rows}"),
            ));
        }
        let expected = internal_rows * items_per_row;
        if col_idx.len() != expected || values.len() != expected {
            return Err(SparseError::structure(
                "ell",
                format!(
                    "expected {expected} slots, found {} column indices and {} values",
                    col_idx.len(),
                    values.len()
                ),
            ));
        }
        if col_idx.iter().any(|&col| col >= cols.max(1)) {
            return Err(SparseError::structure("ell", "column index out of range"));
        }
        // raw slots carry no padding marker
        let stored = (0..items_per_row)
            .flat_map(|item| (0..rows).map(move |row| item * internal_rows + row))
            .filter(|&slot| values[slot] != T::zero())
            .count();
        Ok(Self {
            rows,
            cols,
            internal_rows,
            items_per_row,
            col_idx,
            values,
            stored,
        })
    }

    pub fn from_csr(csr: &CsrMatrix<T>) -> Self {
        let rows = csr.rows();
        let items_per_row = csr.max_row_len();
        let internal_rows = rows.next_multiple_of(ELL_ROW_ALIGNMENT);
        let mut col_idx = vec![0usize; internal_rows * items_per_row];
        let mut values = vec![T::zero(); internal_rows * items_per_row];
        for row in 0..rows {
            let (cols, vals) = csr.row(row);
            for (item, (&col, &value)) in cols.iter().zip(vals).enumerate() {
                let slot = item * internal_rows + row;
                col_idx[slot] = col;
                values[slot] = value;
            }
        }
        Self {
            rows,
            cols: csr.cols(),
            internal_rows,
            items_per_row,
            col_idx,
            values,
            stored: csr.nnz(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn internal_rows(&self) -> usize {
        self.internal_rows
    }

    pub fn items_per_row(&self) -> usize {
        self.items_per_row
    }

    pub fn col_idx(&self) -> &[usize] {
        &self.col_idx
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Stored entries, explicit zeros included and padding excluded. A matrix
    /// assembled with [`EllMatrix::new`] counts its nonzero slots.
    pub fn nnz(&self) -> usize {
        self.stored
    }

    pub fn to_dense(&self) -> Array2<T> {
        let mut dense = Array2::zeros((self.rows, self.cols));
        for item in 0..self.items_per_row {
            for row in 0..self.rows {
                let slot = item * self.internal_rows + row;
                dense[(row, self.col_idx[slot])] += self.values[slot];
            }
        }
        dense
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn stores_items_column_major() {
        let dense = array![[1.0f32, 0.0, 2.0], [0.0, 3.0, 0.0], [4.0, 0.0, 5.0]];
        let ell = EllMatrix::from_csr(&CsrMatrix::from_dense(&dense));
        assert_eq!(ell.items_per_row(), 2);
        assert_eq!(ell.internal_rows(), ELL_ROW_ALIGNMENT);
        assert_eq!(ell.values()[0], 1.0);
        assert_eq!(ell.values()[1], 3.0);
        assert_eq!(ell.values()[ELL_ROW_ALIGNMENT], 2.0);
        assert_eq!(ell.values()[ELL_ROW_ALIGNMENT + 1], 0.0);
        assert_eq!(ell.to_dense(), dense);
        assert_eq!(ell.nnz(), 5);
    }
}
