//! Hybrid kernels: each row sums its ELL part and its CSR overflow.

use super::{check_spmm, check_spmv, map_row_blocks, map_rows, reduce_entries, Rhs};
use crate::config::{LaunchConfig, RhsOp, RowInfo};
use crate::dense::{DenseMatrix, DenseVector};
use crate::error::{ensure_dim, SparseResult};
use crate::format::HybMatrix;
use crate::scalar::Scalar;

/// `(col, value)` pairs of one row: ELL slots first, then the overflow.
fn row_entries<T: Scalar>(matrix: &HybMatrix<T>, row: usize) -> impl Iterator<Item = (usize, T)> + '_ {
    let internal_rows = matrix.internal_rows();
    let ell = (0..matrix.ell_width()).map(move |item| {
        let slot = item * internal_rows + row;
        (matrix.ell_col_idx()[slot], matrix.ell_values()[slot])
    });
    let overflow = matrix.csr_row_ptr()[row]..matrix.csr_row_ptr()[row + 1];
    let tail = overflow.map(move |index| (matrix.csr_col_idx()[index], matrix.csr_values()[index]));
    ell.chain(tail)
}

pub fn hyb_spmv<T: Scalar>(
    matrix: &HybMatrix<T>,
    x: &DenseVector<T>,
    result: &mut DenseVector<T>,
    launch: &LaunchConfig,
) -> SparseResult<()> {
    launch.validate()?;
    check_spmv("hyb spmv", matrix.rows(), matrix.cols(), x, result)?;
    let values = map_rows(matrix.rows(), launch, |row| {
        row_entries(matrix, row)
            .filter(|&(_, value)| value != T::zero())
            .fold(T::zero(), |acc, (col, value)| acc + value * x.get(col))
    });
    result.assign(&values)
}

pub fn hyb_spmm<T: Scalar>(
    matrix: &HybMatrix<T>,
    rhs: &DenseMatrix<T>,
    op: RhsOp,
    result: &mut DenseMatrix<T>,
    launch: &LaunchConfig,
) -> SparseResult<()> {
    launch.validate()?;
    let rhs = Rhs::new(rhs, op);
    check_spmm("hyb spmm", matrix.rows(), matrix.cols(), &rhs, result)?;
    let out = map_row_blocks(matrix.rows(), rhs.width(), launch, |row, out_row| {
        for (col, slot) in out_row.iter_mut().enumerate() {
            *slot = row_entries(matrix, row)
                .filter(|&(_, value)| value != T::zero())
                .fold(T::zero(), |acc, (k, value)| acc + value * rhs.at(k, col));
        }
    });
    result.assign_row_major(&out)
}

pub fn hyb_row_info<T: Scalar>(
    matrix: &HybMatrix<T>,
    selector: RowInfo,
    result: &mut DenseVector<T>,
    launch: &LaunchConfig,
) -> SparseResult<()> {
    launch.validate()?;
    ensure_dim("hyb row info", matrix.rows(), result.len())?;
    let values = map_rows(matrix.rows(), launch, |row| {
        reduce_entries(selector, row, row_entries(matrix, row))
    });
    result.assign(&values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::CsrMatrix;

    #[test]
    fn overflow_entries_are_included() {
        let mut triplets: Vec<(usize, usize, f64)> = (0..9).map(|row| (row, row, 1.0)).collect();
        triplets.extend((0..6).map(|col| (9, col, 1.0)));
        let csr = CsrMatrix::from_triplets(10, 10, &triplets).expect("csr");
        let hyb = HybMatrix::from_csr(&csr);
        assert!(hyb.overflow_nnz() > 0);

        let x = DenseVector::from_vec((1..=10).map(f64::from).collect());
        let mut y = DenseVector::zeros(10);
        hyb_spmv(&hyb, &x, &mut y, &LaunchConfig::default()).expect("spmv");
        assert_eq!(y.get(9), 21.0);
        assert_eq!(y.get(4), 5.0);
    }
}
