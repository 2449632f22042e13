//! COO kernels built on a segmented scan with carry across chunk iterations.

use super::{check_spmm, check_spmv, combine, finish, measure, split_spans, Rhs};
use crate::config::{LaunchConfig, RhsOp, RowInfo};
use crate::dense::{DenseMatrix, DenseVector};
use crate::error::{ensure_dim, SparseResult};
use crate::format::CooMatrix;
use crate::scalar::Scalar;
use rayon::prelude::*;
use std::ops::Range;

/// Row key of worker lanes past the end of a group's entries.
const PAD_KEY: usize = usize::MAX;

/// Runs one work group over `keys.len()` entries in chunks of `group_size`.
///
/// Each chunk is loaded into the lanes, the last lane of the previous chunk
/// hands its open partial sum to lane 0 (or commits it if the row changed),
/// then an inclusive Hillis-Steele scan combines values of neighbouring lanes
/// that share a key. A lane commits when the next entry belongs to another
/// row; the last lane of the final chunk commits after the loop.
pub fn segmented_reduce<T, C, F, W>(
    keys: &[usize],
    group_size: usize,
    identity: T,
    contribution: C,
    combine: F,
    mut commit: W,
) where
    T: Scalar,
    C: Fn(usize) -> T,
    F: Fn(T, T) -> T,
    W: FnMut(usize, T),
{
    let len = keys.len();
    if len == 0 || group_size == 0 {
        return;
    }
    let mut lane_keys = vec![PAD_KEY; group_size];
    let mut lane_values = vec![identity; group_size];
    let mut left = vec![identity; group_size];

    for chunk in 0..len.div_ceil(group_size) {
        let base = chunk * group_size;
        let carry = (chunk > 0).then(|| (lane_keys[group_size - 1], lane_values[group_size - 1]));

        for lane in 0..group_size {
            let index = base + lane;
            if index < len {
                lane_keys[lane] = keys[index];
                lane_values[lane] = contribution(index);
            } else {
                lane_keys[lane] = PAD_KEY;
                lane_values[lane] = identity;
            }
        }

        if let Some((key, value)) = carry {
            if lane_keys[0] == key {
                lane_values[0] = combine(lane_values[0], value);
            } else {
                commit(key, value);
            }
        }

        let mut stride = 1;
        while stride < group_size {
            for lane in 0..group_size {
                left[lane] = if lane >= stride && lane_keys[lane] == lane_keys[lane - stride] {
                    lane_values[lane - stride]
                } else {
                    identity
                };
            }
            // barrier
            for lane in 0..group_size {
                lane_values[lane] = combine(lane_values[lane], left[lane]);
            }
            stride *= 2;
        }

        for lane in 0..group_size - 1 {
            if base + lane + 1 < len && lane_keys[lane] != lane_keys[lane + 1] {
                commit(lane_keys[lane], lane_values[lane]);
            }
        }
    }

    let last = (len - 1) % group_size;
    commit(lane_keys[last], lane_values[last]);
}

struct GroupSpan {
    entries: Range<usize>,
    rows: (usize, usize),
}

fn group_spans<T: Scalar>(matrix: &CooMatrix<T>) -> Vec<GroupSpan> {
    let row_idx = matrix.row_idx();
    matrix
        .group_boundaries()
        .windows(2)
        .filter(|pair| pair[1] > pair[0])
        .map(|pair| GroupSpan {
            entries: pair[0]..pair[1],
            rows: (row_idx[pair[0]], row_idx[pair[1] - 1] + 1),
        })
        .collect()
}

pub fn coo_spmv<T: Scalar>(
    matrix: &CooMatrix<T>,
    x: &DenseVector<T>,
    result: &mut DenseVector<T>,
    launch: &LaunchConfig,
) -> SparseResult<()> {
    launch.validate()?;
    check_spmv("coo spmv", matrix.rows(), matrix.cols(), x, result)?;

    let spans = group_spans(matrix);
    let row_spans: Vec<(usize, usize)> = spans.iter().map(|span| span.rows).collect();
    let mut out = vec![T::zero(); matrix.rows()];
    let parts = split_spans(&mut out, 1, &row_spans);
    let (row_idx, col_idx, values) = (matrix.row_idx(), matrix.col_idx(), matrix.values());

    parts
        .into_par_iter()
        .zip(spans.par_iter())
        .for_each(|(group_out, span)| {
            let start = span.entries.start;
            let first_row = span.rows.0;
            segmented_reduce(
                &row_idx[span.entries.clone()],
                launch.work_group_size,
                T::zero(),
                |local| values[start + local] * x.get(col_idx[start + local]),
                |a, b| a + b,
                |row, value| group_out[row - first_row] = value,
            );
        });

    result.assign(&out)
}

pub fn coo_spmm<T: Scalar>(
    matrix: &CooMatrix<T>,
    rhs: &DenseMatrix<T>,
    op: RhsOp,
    result: &mut DenseMatrix<T>,
    launch: &LaunchConfig,
) -> SparseResult<()> {
    launch.validate()?;
    let rhs = Rhs::new(rhs, op);
    check_spmm("coo spmm", matrix.rows(), matrix.cols(), &rhs, result)?;

    let width = rhs.width();
    let spans = group_spans(matrix);
    let row_spans: Vec<(usize, usize)> = spans.iter().map(|span| span.rows).collect();
    let mut out = vec![T::zero(); matrix.rows() * width];
    let parts = split_spans(&mut out, width, &row_spans);
    let (row_idx, col_idx, values) = (matrix.row_idx(), matrix.col_idx(), matrix.values());

    parts
        .into_par_iter()
        .zip(spans.par_iter())
        .for_each(|(group_out, span)| {
            let start = span.entries.start;
            let first_row = span.rows.0;
            for col in 0..width {
                segmented_reduce(
                    &row_idx[span.entries.clone()],
                    launch.work_group_size,
                    T::zero(),
                    |local| values[start + local] * rhs.at(col_idx[start + local], col),
                    |a, b| a + b,
                    |row, value| group_out[(row - first_row) * width + col] = value,
                );
            }
        });

    result.assign_row_major(&out)
}

pub fn coo_row_info<T: Scalar>(
    matrix: &CooMatrix<T>,
    selector: RowInfo,
    result: &mut DenseVector<T>,
    launch: &LaunchConfig,
) -> SparseResult<()> {
    launch.validate()?;
    ensure_dim("coo row info", matrix.rows(), result.len())?;

    let spans = group_spans(matrix);
    let row_spans: Vec<(usize, usize)> = spans.iter().map(|span| span.rows).collect();
    let mut out = vec![T::zero(); matrix.rows()];
    let parts = split_spans(&mut out, 1, &row_spans);
    let (row_idx, col_idx, values) = (matrix.row_idx(), matrix.col_idx(), matrix.values());

    parts
        .into_par_iter()
        .zip(spans.par_iter())
        .for_each(|(group_out, span)| {
            let start = span.entries.start;
            let first_row = span.rows.0;
            segmented_reduce(
                &row_idx[span.entries.clone()],
                launch.work_group_size,
                T::zero(),
                |local| {
                    let index = start + local;
                    measure(selector, row_idx[index], col_idx[index], values[index])
                },
                |a, b| combine(selector, a, b),
                |row, value| group_out[row - first_row] = finish(selector, value),
            );
        });

    result.assign(&out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::CsrMatrix;
    use approx::assert_abs_diff_eq;

    fn collect(keys: &[usize], values: &[f64], group_size: usize) -> Vec<(usize, f64)> {
        let mut committed = Vec::new();
        segmented_reduce(
            keys,
            group_size,
            0.0,
            |i| values[i],
            |a, b| a + b,
            |row, value| committed.push((row, value)),
        );
        committed
    }

    #[test]
    fn row_spanning_two_chunks_carries_its_partial_sum() {
        // row 1 occupies entries 2..6 and straddles the chunk boundary at 4
        let keys = [0, 0, 1, 1, 1, 1, 2, 3];
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let chunked = collect(&keys, &values, 4);
        let single = collect(&keys, &values, 8);
        assert_eq!(chunked, vec![(0, 3.0), (1, 18.0), (2, 7.0), (3, 8.0)]);
        assert_eq!(chunked, single);
    }

    #[test]
    fn row_spanning_several_chunks() {
        let keys = [5usize; 11];
        let values: Vec<f64> = (1..=11).map(f64::from).collect();
        assert_eq!(collect(&keys, &values, 4), vec![(5, 66.0)]);
    }

    #[test]
    fn segment_closing_exactly_at_chunk_end_is_committed_once() {
        let keys = [0, 0, 0, 0, 1, 1];
        let values = [1.0; 6];
        assert_eq!(collect(&keys, &values, 4), vec![(0, 4.0), (1, 2.0)]);
    }

    #[test]
    fn chunked_spmv_matches_single_chunk() {
        let mut triplets = Vec::new();
        for row in 0..9usize {
            for k in 0..(row % 5) * 3 {
                triplets.push((row, (row + k * 2) % 13, 0.5 + k as f64));
            }
        }
        let csr = CsrMatrix::from_triplets(9, 13, &triplets).expect("csr");
        let coo = CooMatrix::from_csr(&csr).with_groups(3);
        let x = DenseVector::from_vec((0..13).map(|i| 1.0 + i as f64 * 0.25).collect());

        let mut chunked = DenseVector::zeros(9);
        let mut single = DenseVector::zeros(9);
        coo_spmv(&coo, &x, &mut chunked, &LaunchConfig::new(3, 4)).expect("chunked");
        coo_spmv(&coo, &x, &mut single, &LaunchConfig::new(3, 1024)).expect("single");
        for (a, b) in chunked.iter().zip(single.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn inf_norm_uses_max_across_chunks() {
        let csr = CsrMatrix::from_triplets(
            2,
            8,
            &[
                (0, 0, 1.0f64),
                (0, 1, -9.0),
                (0, 2, 2.0),
                (0, 3, 3.0),
                (0, 4, 4.0),
                (0, 5, 5.0),
                (1, 1, 7.0),
            ],
        )
        .expect("csr");
        let coo = CooMatrix::from_csr(&csr);
        let mut norms = DenseVector::zeros(2);
        coo_row_info(&coo, RowInfo::InfNorm, &mut norms, &LaunchConfig::new(1, 4)).expect("row info");
        assert_eq!(norms.to_vec(), vec![9.0, 7.0]);
    }
}
