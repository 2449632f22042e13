//! Sliced ELL kernels: one worker per slot, bounded by its slice's width.

use super::{check_spmm, check_spmv, map_row_blocks, map_rows, reduce_entries, Rhs};
use crate::config::{LaunchConfig, RhsOp, RowInfo};
use crate::dense::{DenseMatrix, DenseVector};
use crate::error::{ensure_dim, SparseResult};
use crate::format::SlicedEllMatrix;
use crate::scalar::Scalar;

/// Slot-ordered values are written back to the rows they were sorted from.
fn scatter_slots<T: Scalar>(matrix: &SlicedEllMatrix<T>, slot_values: &[T], width: usize) -> Vec<T> {
    let mut out = vec![T::zero(); slot_values.len()];
    for (slot, &row) in matrix.row_order().iter().enumerate() {
        out[row * width..(row + 1) * width]
            .copy_from_slice(&slot_values[slot * width..(slot + 1) * width]);
    }
    out
}

pub fn sliced_ell_spmv<T: Scalar>(
    matrix: &SlicedEllMatrix<T>,
    x: &DenseVector<T>,
    result: &mut DenseVector<T>,
    launch: &LaunchConfig,
) -> SparseResult<()> {
    launch.validate()?;
    check_spmv("sliced ell spmv", matrix.rows(), matrix.cols(), x, result)?;
    let (cols, vals) = (matrix.col_idx(), matrix.values());
    let slot_values = map_rows(matrix.rows(), launch, |slot| {
        let mut sum = T::zero();
        for index in matrix.slot_entries(slot) {
            let value = vals[index];
            if value != T::zero() {
                sum += value * x.get(cols[index]);
            }
        }
        sum
    });
    result.assign(&scatter_slots(matrix, &slot_values, 1))
}

pub fn sliced_ell_spmm<T: Scalar>(
    matrix: &SlicedEllMatrix<T>,
    rhs: &DenseMatrix<T>,
    op: RhsOp,
    result: &mut DenseMatrix<T>,
    launch: &LaunchConfig,
) -> SparseResult<()> {
    launch.validate()?;
    let rhs = Rhs::new(rhs, op);
    check_spmm("sliced ell spmm", matrix.rows(), matrix.cols(), &rhs, result)?;
    let width = rhs.width();
    let (cols, vals) = (matrix.col_idx(), matrix.values());
    let slot_values = map_row_blocks(matrix.rows(), width, launch, |slot, out_row| {
        for (col, out) in out_row.iter_mut().enumerate() {
            *out = matrix
                .slot_entries(slot)
                .fold(T::zero(), |acc, index| acc + vals[index] * rhs.at(cols[index], col));
        }
    });
    result.assign_row_major(&scatter_slots(matrix, &slot_values, width))
}

pub fn sliced_ell_row_info<T: Scalar>(
    matrix: &SlicedEllMatrix<T>,
    selector: RowInfo,
    result: &mut DenseVector<T>,
    launch: &LaunchConfig,
) -> SparseResult<()> {
    launch.validate()?;
    ensure_dim("sliced ell row info", matrix.rows(), result.len())?;
    let (cols, vals) = (matrix.col_idx(), matrix.values());
    let order = matrix.row_order();
    let slot_values = map_rows(matrix.rows(), launch, |slot| {
        let entries = matrix.slot_entries(slot).map(|index| (cols[index], vals[index]));
        reduce_entries(selector, order[slot], entries)
    });
    result.assign(&scatter_slots(matrix, &slot_values, 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::CsrMatrix;
    use ndarray::array;

    #[test]
    fn sorted_slices_scatter_back_to_original_rows() {
        let csr = CsrMatrix::from_dense(&array![
            [1.0f64, 0.0, 0.0],
            [1.0, 1.0, 1.0],
            [0.0, 2.0, 0.0],
            [0.0, 3.0, 4.0],
        ]);
        let sell = SlicedEllMatrix::from_csr(&csr, 2, 4).expect("sell");
        let x = DenseVector::from_vec(vec![1.0, 2.0, 3.0]);
        let mut y = DenseVector::zeros(4);
        sliced_ell_spmv(&sell, &x, &mut y, &LaunchConfig::new(2, 2)).expect("spmv");
        assert_eq!(y.to_vec(), vec![1.0, 6.0, 4.0, 18.0]);

        let mut diag = DenseVector::zeros(4);
        sliced_ell_row_info(&sell, RowInfo::Diagonal, &mut diag, &LaunchConfig::default())
            .expect("row info");
        assert_eq!(diag.to_vec(), vec![1.0, 1.0, 0.0, 0.0]);
    }
}
