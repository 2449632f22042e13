//! Sliced ELLPACK (SELL-C-σ).

use crate::error::{SparseError, SparseResult};
use crate::format::csr::CsrMatrix;
use crate::scalar::Scalar;
use ndarray::Array2;

/// Rows are laid out in slots of `slice_size` per slice. Slot `p` holds the
/// original row `row_order[p]`; within a window of `sigma` slots rows are
/// sorted by decreasing length so each slice's width stays tight.
///
/// Entry `item` of local slot `l` in slice `s` sits at
/// `slice_start[s] + item * slice_size + l`.
#[derive(Debug, Clone, PartialEq)]
pub struct SlicedEllMatrix<T> {
    rows: usize,
    cols: usize,
    slice_size: usize,
    columns_per_slice: Vec<usize>,
    slice_start: Vec<usize>,
    row_order: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<T>,
    stored: usize,
}

impl<T: Scalar> SlicedEllMatrix<T> {
    pub fn from_csr(csr: &CsrMatrix<T>, slice_size: usize, sigma: usize) -> SparseResult<Self> {
        if slice_size == 0 {
            return Err(SparseError::structure("sliced ell", "slice size must be positive"));
        }
        let rows = csr.rows();
        let mut row_order: Vec<usize> = (0..rows).collect();
        if sigma > 1 {
            for window in row_order.chunks_mut(sigma) {
                window.sort_by_key(|&row| std::cmp::Reverse(csr.row_len(row)));
            }
        }

        let slices = rows.div_ceil(slice_size);
        let mut columns_per_slice = Vec::with_capacity(slices);
        let mut slice_start = Vec::with_capacity(slices + 1);
        slice_start.push(0);
        for slice in 0..slices {
            let slots = slice * slice_size..((slice + 1) * slice_size).min(rows);
            let width = row_order[slots]
                .iter()
                .map(|&row| csr.row_len(row))
                .max()
                .unwrap_or(0);
            columns_per_slice.push(width);
            let offset = slice_start[slice] + width * slice_size;
            slice_start.push(offset);
        }

        let total = slice_start.last().copied().unwrap_or(0);
        let mut col_idx = vec![0usize; total];
        let mut values = vec![T::zero(); total];
        for (slot, &row) in row_order.iter().enumerate() {
            let slice = slot / slice_size;
            let local = slot % slice_size;
            let (cols, vals) = csr.row(row);
            for (item, (&col, &value)) in cols.iter().zip(vals).enumerate() {
                let index = slice_start[slice] + item * slice_size + local;
                col_idx[index] = col;
                values[index] = value;
            }
        }

        Ok(Self {
            rows,
            cols: csr.cols(),
            slice_size,
            columns_per_slice,
            slice_start,
            row_order,
            col_idx,
            values,
            stored: csr.nnz(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn slice_size(&self) -> usize {
        self.slice_size
    }

    pub fn columns_per_slice(&self) -> &[usize] {
        &self.columns_per_slice
    }

    pub fn slice_start(&self) -> &[usize] {
        &self.slice_start
    }

    pub fn row_order(&self) -> &[usize] {
        &self.row_order
    }

    pub fn col_idx(&self) -> &[usize] {
        &self.col_idx
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Storage slots of the row held in `slot`, in item order.
    pub fn slot_entries(&self, slot: usize) -> impl Iterator<Item = usize> + '_ {
        let slice = slot / self.slice_size;
        let local = slot % self.slice_size;
        let base = self.slice_start[slice] + local;
        (0..self.columns_per_slice[slice]).map(move |item| base + item * self.slice_size)
    }

    /// Stored entries, explicit zeros included and padding excluded.
    pub fn nnz(&self) -> usize {
        self.stored
    }

    pub fn to_dense(&self) -> Array2<T> {
        let mut dense = Array2::zeros((self.rows, self.cols));
        for (slot, &row) in self.row_order.iter().enumerate() {
            for index in self.slot_entries(slot) {
                dense[(row, self.col_idx[index])] += self.values[index];
            }
        }
        dense
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample() -> CsrMatrix<f64> {
        CsrMatrix::from_dense(&array![
            [1.0, 0.0, 0.0, 0.0],
            [1.0, 1.0, 1.0, 1.0],
            [0.0, 2.0, 0.0, 0.0],
            [0.0, 0.0, 3.0, 4.0],
            [5.0, 0.0, 0.0, 0.0],
        ])
    }

    #[test]
    fn slices_carry_their_own_width() {
        let sell = SlicedEllMatrix::from_csr(&sample(), 2, 1).expect("sell");
        assert_eq!(sell.columns_per_slice(), &[4, 2, 1]);
        assert_eq!(sell.slice_start(), &[0, 8, 12, 14]);
        assert_eq!(sell.to_dense(), sample().to_dense());
    }

    #[test]
    fn sigma_window_sorts_rows_by_length() {
        let sell = SlicedEllMatrix::from_csr(&sample(), 2, 4).expect("sell");
        assert_eq!(&sell.row_order()[..4], &[1, 3, 0, 2]);
        assert_eq!(sell.columns_per_slice(), &[4, 1, 1]);
        assert_eq!(sell.to_dense(), sample().to_dense());
    }
}
