//! Hybrid storage: an ELL part for the regular prefix of each row and a CSR
//! overflow for the tail.

use crate::format::csr::CsrMatrix;
use crate::format::ell::ELL_ROW_ALIGNMENT;
use crate::scalar::Scalar;
use ndarray::Array2;

/// Fraction of rows that must fill every ELL column.
pub const HYB_DEFAULT_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, PartialEq)]
pub struct HybMatrix<T> {
    rows: usize,
    cols: usize,
    internal_rows: usize,
    ell_width: usize,
    ell_col_idx: Vec<usize>,
    ell_values: Vec<T>,
    csr_row_ptr: Vec<usize>,
    csr_col_idx: Vec<usize>,
    csr_values: Vec<T>,
    stored: usize,
}

impl<T: Scalar> HybMatrix<T> {
    pub fn from_csr(csr: &CsrMatrix<T>) -> Self {
        Self::with_threshold(csr, HYB_DEFAULT_THRESHOLD)
    }

    /// The ELL width is the largest `w` such that at least `threshold` of the
    /// rows hold `w` or more entries.
    pub fn with_threshold(csr: &CsrMatrix<T>, threshold: f64) -> Self {
        let rows = csr.rows();
        let max_len = csr.max_row_len();
        let mut histogram = vec![0usize; max_len + 1];
        for row in 0..rows {
            histogram[csr.row_len(row)] += 1;
        }
        let required = (threshold.clamp(0.0, 1.0) * rows as f64).ceil() as usize;
        let mut at_least = rows;
        let mut ell_width = 0;
        for width in 1..=max_len {
            at_least -= histogram[width - 1];
            if at_least >= required.max(1) {
                ell_width = width;
            } else {
                break;
            }
        }

        let internal_rows = rows.next_multiple_of(ELL_ROW_ALIGNMENT);
        let mut ell_col_idx = vec![0usize; internal_rows * ell_width];
        let mut ell_values = vec![T::zero(); internal_rows * ell_width];
        let mut csr_row_ptr = Vec::with_capacity(rows + 1);
        let mut csr_col_idx = Vec::new();
        let mut csr_values = Vec::new();
        csr_row_ptr.push(0);

        for row in 0..rows {
            let (cols, vals) = csr.row(row);
            for (item, (&col, &value)) in cols.iter().zip(vals).enumerate() {
                if item < ell_width {
                    let slot = item * internal_rows + row;
                    ell_col_idx[slot] = col;
                    ell_values[slot] = value;
                } else {
                    csr_col_idx.push(col);
                    csr_values.push(value);
                }
            }
            csr_row_ptr.push(csr_col_idx.len());
        }

        Self {
            rows,
            cols: csr.cols(),
            internal_rows,
            ell_width,
            ell_col_idx,
            ell_values,
            csr_row_ptr,
            csr_col_idx,
            csr_values,
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

    pub fn ell_width(&self) -> usize {
        self.ell_width
    }

    pub fn ell_col_idx(&self) -> &[usize] {
        &self.ell_col_idx
    }

    pub fn ell_values(&self) -> &[T] {
        &self.ell_values
    }

    pub fn csr_row_ptr(&self) -> &[usize] {
        &self.csr_row_ptr
    }

    pub fn csr_col_idx(&self) -> &[usize] {
        &self.csr_col_idx
    }

    pub fn csr_values(&self) -> &[T] {
        &self.csr_values
    }

    pub fn overflow_nnz(&self) -> usize {
        self.csr_values.len()
    }

    /// Stored entries of both parts, explicit zeros included.
    pub fn nnz(&self) -> usize {
        self.stored
    }

    pub fn to_dense(&self) -> Array2<T> {
        let mut dense = Array2::zeros((self.rows, self.cols));
        for row in 0..self.rows {
            for item in 0..self.ell_width {
                let slot = item * self.internal_rows + row;
                dense[(row, self.ell_col_idx[slot])] += self.ell_values[slot];
            }
            for index in self.csr_row_ptr[row]..self.csr_row_ptr[row + 1] {
                dense[(row, self.csr_col_idx[index])] += self.csr_values[index];
            }
        }
        dense
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_rows_overflow_into_csr() {
        // nine rows of length 1, one row of length 5
        let mut triplets: Vec<(usize, usize, f64)> = (0..9).map(|row| (row, row, 1.0)).collect();
        triplets.extend((0..5).map(|col| (9, col, 2.0)));
        let csr = CsrMatrix::from_triplets(10, 10, &triplets).expect("csr");
        let hyb = HybMatrix::from_csr(&csr);
        assert_eq!(hyb.ell_width(), 1);
        assert_eq!(hyb.overflow_nnz(), 4);
        assert_eq!(hyb.to_dense(), csr.to_dense());
    }
}
