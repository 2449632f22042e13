//! ELL kernels: one worker per row striding over the padded item columns.

use super::{check_spmm, check_spmv, map_row_blocks, map_rows, reduce_entries, Rhs};
use crate::config::{LaunchConfig, RhsOp, RowInfo};
use crate::dense::{DenseMatrix, DenseVector};
use crate::error::{ensure_dim, SparseResult};
use crate::format::EllMatrix;
use crate::scalar::Scalar;

/// Storage slots of `row`, padding included.
fn row_slots<T: Scalar>(matrix: &EllMatrix<T>, row: usize) -> impl Iterator<Item = usize> + '_ {
    (0..matrix.items_per_row()).map(move |item| item * matrix.internal_rows() + row)
}

pub fn ell_spmv<T: Scalar>(
    matrix: &EllMatrix<T>,
    x: &DenseVector<T>,
    result: &mut DenseVector<T>,
    launch: &LaunchConfig,
) -> SparseResult<()> {
    launch.validate()?;
    check_spmv("ell spmv", matrix.rows(), matrix.cols(), x, result)?;
    let (cols, vals) = (matrix.col_idx(), matrix.values());
    let values = map_rows(matrix.rows(), launch, |row| {
        let mut sum = T::zero();
        for slot in row_slots(matrix, row) {
            let value = vals[slot];
            if value != T::zero() {
                sum += value * x.get(cols[slot]);
            }
        }
        sum
    });
    result.assign(&values)
}

pub fn ell_spmm<T: Scalar>(
    matrix: &EllMatrix<T>,
    rhs: &DenseMatrix<T>,
    op: RhsOp,
    result: &mut DenseMatrix<T>,
    launch: &LaunchConfig,
) -> SparseResult<()> {
    launch.validate()?;
    let rhs = Rhs::new(rhs, op);
    check_spmm("ell spmm", matrix.rows(), matrix.cols(), &rhs, result)?;
    let (cols, vals) = (matrix.col_idx(), matrix.values());
    let out = map_row_blocks(matrix.rows(), rhs.width(), launch, |row, out_row| {
        for (col, slot) in out_row.iter_mut().enumerate() {
            let mut sum = T::zero();
            for index in row_slots(matrix, row) {
                let value = vals[index];
                if value != T::zero() {
                    sum += value * rhs.at(cols[index], col);
                }
            }
            *slot = sum;
        }
    });
    result.assign_row_major(&out)
}

pub fn ell_row_info<T: Scalar>(
    matrix: &EllMatrix<T>,
    selector: RowInfo,
    result: &mut DenseVector<T>,
    launch: &LaunchConfig,
) -> SparseResult<()> {
    launch.validate()?;
    ensure_dim("ell row info", matrix.rows(), result.len())?;
    let (cols, vals) = (matrix.col_idx(), matrix.values());
    let values = map_rows(matrix.rows(), launch, |row| {
        reduce_entries(selector, row, row_slots(matrix, row).map(|slot| (cols[slot], vals[slot])))
    });
    result.assign(&values)
}
