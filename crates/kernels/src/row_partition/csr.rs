//! CSR kernels: scalar one-worker-per-row and adaptive row blocks.

use super::{check_spmm, check_spmv, map_row_blocks, map_rows, reduce_entries, split_spans, Rhs};
use crate::config::{LaunchConfig, RhsOp, RowInfo};
use crate::dense::{DenseMatrix, DenseVector};
use crate::error::SparseResult;
use crate::format::CsrMatrix;
use crate::scalar::Scalar;
use rayon::prelude::*;

pub fn csr_spmv_scalar<T: Scalar>(
    matrix: &CsrMatrix<T>,
    x: &DenseVector<T>,
    result: &mut DenseVector<T>,
    launch: &LaunchConfig,
) -> SparseResult<()> {
    launch.validate()?;
    check_spmv("csr spmv", matrix.rows(), matrix.cols(), x, result)?;
    let values = map_rows(matrix.rows(), launch, |row| {
        let (cols, vals) = matrix.row(row);
        cols.iter()
            .zip(vals)
            .fold(T::zero(), |acc, (&col, &value)| acc + value * x.get(col))
    });
    result.assign(&values)
}

/// Adaptive CSR product over the matrix's precomputed row blocks.
///
/// Blocks with several rows run in stream mode, blocks holding a single row
/// run in vector mode with a tree reduction across the work group.
pub fn csr_spmv_adaptive<T: Scalar>(
    matrix: &CsrMatrix<T>,
    x: &DenseVector<T>,
    result: &mut DenseVector<T>,
    launch: &LaunchConfig,
) -> SparseResult<()> {
    launch.validate()?;
    check_spmv("csr adaptive spmv", matrix.rows(), matrix.cols(), x, result)?;

    let spans: Vec<(usize, usize)> = matrix
        .row_blocks()
        .windows(2)
        .map(|pair| (pair[0], pair[1]))
        .collect();
    let mut out = vec![T::zero(); matrix.rows()];
    let parts = split_spans(&mut out, 1, &spans);
    let group_size = launch.work_group_size;

    parts
        .into_par_iter()
        .zip(spans.par_iter())
        .for_each(|(block_out, &(first, stop))| {
            if stop - first > 1 {
                stream_block(matrix, x, first, stop, group_size, block_out);
            } else {
                block_out[0] = vector_row(matrix, x, first, group_size);
            }
        });

    result.assign(&out)
}

fn stream_block<T: Scalar>(
    matrix: &CsrMatrix<T>,
    x: &DenseVector<T>,
    first: usize,
    stop: usize,
    group_size: usize,
    out: &mut [T],
) {
    let row_ptr = matrix.row_ptr();
    let cols = matrix.col_idx();
    let vals = matrix.values();
    let base = row_ptr[first];
    let len = row_ptr[stop] - base;

    let mut shared = vec![T::zero(); len];
    for worker in 0..group_size {
        for local in (worker..len).step_by(group_size) {
            let index = base + local;
            shared[local] = vals[index] * x.get(cols[index]);
        }
    }

    // barrier: every worker sums the staged products of the row it owns
    for (offset, slot) in out.iter_mut().enumerate() {
        let row = first + offset;
        let range = row_ptr[row] - base..row_ptr[row + 1] - base;
        *slot = shared[range].iter().copied().sum();
    }
}

fn vector_row<T: Scalar>(matrix: &CsrMatrix<T>, x: &DenseVector<T>, row: usize, group_size: usize) -> T {
    let (cols, vals) = matrix.row(row);
    let mut partial = vec![T::zero(); group_size];
    for (worker, slot) in partial.iter_mut().enumerate() {
        for index in (worker..cols.len()).step_by(group_size) {
            *slot += vals[index] * x.get(cols[index]);
        }
    }

    let mut stride = group_size / 2;
    while stride > 0 {
        // barrier before each step; lanes below `stride` only read lanes above it
        for lane in 0..stride {
            partial[lane] = partial[lane] + partial[lane + stride];
        }
        stride /= 2;
    }
    partial[0]
}

pub fn csr_spmm<T: Scalar>(
    matrix: &CsrMatrix<T>,
    rhs: &DenseMatrix<T>,
    op: RhsOp,
    result: &mut DenseMatrix<T>,
    launch: &LaunchConfig,
) -> SparseResult<()> {
    launch.validate()?;
    let rhs = Rhs::new(rhs, op);
    check_spmm("csr spmm", matrix.rows(), matrix.cols(), &rhs, result)?;
    let out = map_row_blocks(matrix.rows(), rhs.width(), launch, |row, out_row| {
        let (cols, vals) = matrix.row(row);
        for (col, slot) in out_row.iter_mut().enumerate() {
            *slot = cols
                .iter()
                .zip(vals)
                .fold(T::zero(), |acc, (&k, &value)| acc + value * rhs.at(k, col));
        }
    });
    result.assign_row_major(&out)
}

pub fn csr_row_info<T: Scalar>(
    matrix: &CsrMatrix<T>,
    selector: RowInfo,
    result: &mut DenseVector<T>,
    launch: &LaunchConfig,
) -> SparseResult<()> {
    launch.validate()?;
    crate::error::ensure_dim("csr row info", matrix.rows(), result.len())?;
    let values = map_rows(matrix.rows(), launch, |row| {
        let (cols, vals) = matrix.row(row);
        reduce_entries(selector, row, cols.iter().copied().zip(vals.iter().copied()))
    });
    result.assign(&values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Layout;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn sample() -> CsrMatrix<f64> {
        CsrMatrix::from_dense(&array![[1.0, 0.0, 2.0], [0.0, 3.0, 0.0], [4.0, 0.0, 5.0]])
    }

    #[test]
    fn scalar_product_of_small_matrix() {
        let x = DenseVector::from_vec(vec![1.0, 1.0, 1.0]);
        let mut y = DenseVector::zeros(3);
        csr_spmv_scalar(&sample(), &x, &mut y, &LaunchConfig::default()).expect("spmv");
        assert_eq!(y.to_vec(), vec![3.0, 3.0, 9.0]);
    }

    #[test]
    fn adaptive_matches_scalar_with_mixed_blocks() {
        // short rows share blocks, row 5 is long enough for vector mode
        let mut triplets = Vec::new();
        for row in 0..12usize {
            let len = if row == 5 { 300 } else { row % 4 + 1 };
            for k in 0..len {
                triplets.push((row, (row * 7 + k * 3) % 400, 1.0 + (row + k) as f64 * 0.01));
            }
        }
        let matrix = CsrMatrix::from_triplets(12, 400, &triplets)
            .expect("csr")
            .with_block_capacity(16);
        assert!(matrix.row_blocks().windows(2).any(|pair| pair[1] - pair[0] > 1));

        let x = DenseVector::from_vec((0..400).map(|i| (i as f64).sin()).collect());
        let launch = LaunchConfig::new(4, 32);
        let mut scalar = DenseVector::zeros(12);
        let mut adaptive = DenseVector::zeros(12);
        csr_spmv_scalar(&matrix, &x, &mut scalar, &launch).expect("scalar");
        csr_spmv_adaptive(&matrix, &x, &mut adaptive, &launch).expect("adaptive");
        for (a, b) in scalar.iter().zip(adaptive.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        let x = DenseVector::from_vec(vec![1.0, 1.0]);
        let mut y = DenseVector::zeros(3);
        let err = csr_spmv_scalar(&sample(), &x, &mut y, &LaunchConfig::default()).unwrap_err();
        assert!(matches!(err, crate::error::SparseError::DimensionMismatch { .. }));
    }

    #[test]
    fn transposed_rhs_product() {
        let matrix = sample();
        let rhs = DenseMatrix::from_array(&array![[1.0, 0.0, 1.0], [0.0, 2.0, 0.0]], Layout::ColumnMajor);
        let mut result = DenseMatrix::zeros(3, 2, Layout::RowMajor);
        csr_spmm(&matrix, &rhs, RhsOp::Transposed, &mut result, &LaunchConfig::default())
            .expect("spmm");
        assert_eq!(result.to_array(), array![[3.0, 0.0], [0.0, 6.0], [9.0, 0.0]]);
    }

    #[test]
    fn diagonal_row_info() {
        let mut diag = DenseVector::zeros(3);
        csr_row_info(&sample(), RowInfo::Diagonal, &mut diag, &LaunchConfig::default())
            .expect("row info");
        assert_eq!(diag.to_vec(), vec![1.0, 3.0, 5.0]);
    }
}
