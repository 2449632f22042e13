//! Kernels for CSR with an explicit nonzero-row list.

use super::{check_spmm, check_spmv, map_row_blocks, map_rows, reduce_entries, Rhs};
use crate::config::{LaunchConfig, RhsOp, RowInfo};
use crate::dense::{DenseMatrix, DenseVector};
use crate::error::{ensure_dim, SparseResult};
use crate::format::CompressedCsrMatrix;
use crate::scalar::Scalar;

/// Rows missing from the list are zero in the result.
pub fn compressed_csr_spmv<T: Scalar>(
    matrix: &CompressedCsrMatrix<T>,
    x: &DenseVector<T>,
    result: &mut DenseVector<T>,
    launch: &LaunchConfig,
) -> SparseResult<()> {
    launch.validate()?;
    check_spmv("compressed csr spmv", matrix.rows(), matrix.cols(), x, result)?;
    let stored = map_rows(matrix.nonzero_rows(), launch, |i| {
        let (cols, vals) = matrix.stored_row(i);
        cols.iter()
            .zip(vals)
            .fold(T::zero(), |acc, (&col, &value)| acc + value * x.get(col))
    });
    result.fill(T::zero());
    for (&row, value) in matrix.row_indices().iter().zip(stored) {
        result.set(row, value);
    }
    Ok(())
}

pub fn compressed_csr_spmm<T: Scalar>(
    matrix: &CompressedCsrMatrix<T>,
    rhs: &DenseMatrix<T>,
    op: RhsOp,
    result: &mut DenseMatrix<T>,
    launch: &LaunchConfig,
) -> SparseResult<()> {
    launch.validate()?;
    let rhs = Rhs::new(rhs, op);
    check_spmm("compressed csr spmm", matrix.rows(), matrix.cols(), &rhs, result)?;
    let width = rhs.width();
    let stored = map_row_blocks(matrix.nonzero_rows(), width, launch, |i, out_row| {
        let (cols, vals) = matrix.stored_row(i);
        for (col, slot) in out_row.iter_mut().enumerate() {
            *slot = cols
                .iter()
                .zip(vals)
                .fold(T::zero(), |acc, (&k, &value)| acc + value * rhs.at(k, col));
        }
    });
    let mut out = vec![T::zero(); matrix.rows() * width];
    for (i, &row) in matrix.row_indices().iter().enumerate() {
        out[row * width..(row + 1) * width].copy_from_slice(&stored[i * width..(i + 1) * width]);
    }
    result.assign_row_major(&out)
}

pub fn compressed_csr_row_info<T: Scalar>(
    matrix: &CompressedCsrMatrix<T>,
    selector: RowInfo,
    result: &mut DenseVector<T>,
    launch: &LaunchConfig,
) -> SparseResult<()> {
    launch.validate()?;
    ensure_dim("compressed csr row info", matrix.rows(), result.len())?;
    let rows = matrix.row_indices();
    let stored = map_rows(matrix.nonzero_rows(), launch, |i| {
        let (cols, vals) = matrix.stored_row(i);
        reduce_entries(selector, rows[i], cols.iter().copied().zip(vals.iter().copied()))
    });
    result.fill(T::zero());
    for (&row, value) in rows.iter().zip(stored) {
        result.set(row, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::CsrMatrix;
    use ndarray::array;

    #[test]
    fn unlisted_rows_are_cleared() {
        let dense = array![[0.0f32, 0.0], [1.0, 2.0], [0.0, 0.0]];
        let matrix = CompressedCsrMatrix::from_csr(&CsrMatrix::from_dense(&dense));
        let x = DenseVector::from_vec(vec![1.0, 1.0]);
        let mut y = DenseVector::from_vec(vec![7.0, 7.0, 7.0]);
        compressed_csr_spmv(&matrix, &x, &mut y, &LaunchConfig::default()).expect("spmv");
        assert_eq!(y.to_vec(), vec![0.0, 3.0, 0.0]);
    }
}
