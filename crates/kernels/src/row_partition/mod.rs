//! Row-partitioned execution of sparse products and row reductions.
//!
//! Each format maps rows onto work groups the way a device launch would. On
//! the host, groups run as independent rayon tasks over disjoint output
//! spans; inside a group, workers advance in lockstep phases and every phase
//! finishes for all workers before the next one starts, which is where a
//! device kernel places its barriers.

pub mod compressed_csr;
pub mod coo;
pub mod csr;
pub mod ell;
pub mod hyb;
pub mod sliced_ell;

pub use compressed_csr::*;
pub use coo::*;
pub use csr::*;
pub use ell::*;
pub use hyb::*;
pub use sliced_ell::*;

use crate::config::{LaunchConfig, RhsOp, RowInfo};
use crate::dense::{DenseMatrix, DenseVector};
use crate::error::{ensure_dim, SparseResult};
use crate::scalar::Scalar;
use rayon::prelude::*;

/// One value per row, computed by group tasks of `rows_per_group` rows each.
pub(crate) fn map_rows<T, F>(rows: usize, launch: &LaunchConfig, kernel: F) -> Vec<T>
where
    T: Scalar,
    F: Fn(usize) -> T + Sync,
{
    let mut out = vec![T::zero(); rows];
    let span = launch.rows_per_group(rows);
    out.par_chunks_mut(span)
        .enumerate()
        .for_each(|(group, chunk)| {
            let first = group * span;
            for (offset, slot) in chunk.iter_mut().enumerate() {
                *slot = kernel(first + offset);
            }
        });
    out
}

/// Row-major `rows × width` output where the kernel fills one row at a time.
pub(crate) fn map_row_blocks<T, F>(rows: usize, width: usize, launch: &LaunchConfig, kernel: F) -> Vec<T>
where
    T: Scalar,
    F: Fn(usize, &mut [T]) + Sync,
{
    let mut out = vec![T::zero(); rows * width];
    if width == 0 {
        return out;
    }
    let span = launch.rows_per_group(rows);
    out.par_chunks_mut(span * width)
        .enumerate()
        .for_each(|(group, chunk)| {
            let first = group * span;
            for (offset, row_out) in chunk.chunks_mut(width).enumerate() {
                kernel(first + offset, row_out);
            }
        });
    out
}

/// Splits a row-major output into the disjoint row ranges `[lo, hi)` of
/// `spans`, which must be ascending and non-overlapping.
pub(crate) fn split_spans<'a, T>(
    mut out: &'a mut [T],
    width: usize,
    spans: &[(usize, usize)],
) -> Vec<&'a mut [T]> {
    let mut parts = Vec::with_capacity(spans.len());
    let mut cursor = 0;
    for &(lo, hi) in spans {
        let rest = std::mem::take(&mut out);
        let (_, rest) = rest.split_at_mut((lo - cursor) * width);
        let (part, rest) = rest.split_at_mut((hi - lo) * width);
        parts.push(part);
        out = rest;
        cursor = hi;
    }
    parts
}

/// Dense right-hand side read either as stored or transposed.
pub(crate) struct Rhs<'a, T> {
    matrix: &'a DenseMatrix<T>,
    op: RhsOp,
}

impl<'a, T: Scalar> Rhs<'a, T> {
    pub(crate) fn new(matrix: &'a DenseMatrix<T>, op: RhsOp) -> Self {
        Self { matrix, op }
    }

    /// Length of the contracted dimension.
    pub(crate) fn inner(&self) -> usize {
        match self.op {
            RhsOp::Plain => self.matrix.rows(),
            RhsOp::Transposed => self.matrix.cols(),
        }
    }

    pub(crate) fn width(&self) -> usize {
        match self.op {
            RhsOp::Plain => self.matrix.cols(),
            RhsOp::Transposed => self.matrix.rows(),
        }
    }

    #[inline]
    pub(crate) fn at(&self, k: usize, col: usize) -> T {
        match self.op {
            RhsOp::Plain => self.matrix.get(k, col),
            RhsOp::Transposed => self.matrix.get(col, k),
        }
    }
}

pub(crate) fn check_spmv<T: Scalar>(
    operation: &'static str,
    rows: usize,
    cols: usize,
    x: &DenseVector<T>,
    result: &DenseVector<T>,
) -> SparseResult<()> {
    ensure_dim(operation, cols, x.len())?;
    ensure_dim(operation, rows, result.len())
}

pub(crate) fn check_spmm<T: Scalar>(
    operation: &'static str,
    rows: usize,
    cols: usize,
    rhs: &Rhs<'_, T>,
    result: &DenseMatrix<T>,
) -> SparseResult<()> {
    ensure_dim(operation, cols, rhs.inner())?;
    ensure_dim(operation, rows, result.rows())?;
    ensure_dim(operation, rhs.width(), result.cols())
}

/// Contribution of one stored entry to the selected row quantity.
#[inline]
pub(crate) fn measure<T: Scalar>(selector: RowInfo, row: usize, col: usize, value: T) -> T {
    match selector {
        RowInfo::InfNorm | RowInfo::OneNorm => value.abs(),
        RowInfo::TwoNorm => value * value,
        RowInfo::Diagonal if row == col => value,
        RowInfo::Diagonal => T::zero(),
    }
}

#[inline]
pub(crate) fn combine<T: Scalar>(selector: RowInfo, lhs: T, rhs: T) -> T {
    match selector {
        RowInfo::InfNorm => lhs.max(rhs),
        _ => lhs + rhs,
    }
}

#[inline]
pub(crate) fn finish<T: Scalar>(selector: RowInfo, acc: T) -> T {
    match selector {
        RowInfo::TwoNorm => acc.sqrt(),
        _ => acc,
    }
}

/// Reduces one row's `(col, value)` entries. An empty row yields zero.
pub(crate) fn reduce_entries<T, I>(selector: RowInfo, row: usize, entries: I) -> T
where
    T: Scalar,
    I: IntoIterator<Item = (usize, T)>,
{
    let acc = entries.into_iter().fold(T::zero(), |acc, (col, value)| {
        combine(selector, acc, measure(selector, row, col, value))
    });
    finish(selector, acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_spans_skips_gaps() {
        let mut out: Vec<u32> = (0..10).collect();
        let parts = split_spans(&mut out, 1, &[(1, 3), (5, 6), (8, 10)]);
        assert_eq!(parts.len(), 3);
        assert_eq!(&*parts[0], &[1, 2]);
        assert_eq!(&*parts[1], &[5]);
        assert_eq!(&*parts[2], &[8, 9]);
    }

    #[test]
    fn map_rows_visits_every_row_once() {
        let launch = LaunchConfig::new(3, 4);
        let out: Vec<f64> = map_rows(37, &launch, |row| row as f64);
        assert_eq!(out, (0..37).map(|row| row as f64).collect::<Vec<_>>());
    }

    #[test]
    fn row_reductions_of_simple_entries() {
        let entries = [(0usize, -3.0f64), (2, 4.0)];
        assert_eq!(reduce_entries(RowInfo::InfNorm, 0, entries), 4.0);
        assert_eq!(reduce_entries(RowInfo::OneNorm, 0, entries), 7.0);
        assert_eq!(reduce_entries(RowInfo::TwoNorm, 0, entries), 5.0);
        assert_eq!(reduce_entries(RowInfo::Diagonal, 0, entries), -3.0);
        assert_eq!(reduce_entries(RowInfo::Diagonal, 1, entries), 0.0);
        assert_eq!(reduce_entries::<f64, _>(RowInfo::OneNorm, 0, []), 0.0);
    }
}
