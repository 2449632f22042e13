//! Random operands for tuning runs, benchmarks and tests.

use crate::dense::DenseVector;
use crate::error::{SparseError, SparseResult};
use crate::format::CsrMatrix;
use crate::scalar::Scalar;
use ndarray::Array2;

fn check_density(density: f64) -> SparseResult<()> {
    if (0.0..=1.0).contains(&density) {
        Ok(())
    } else {
        Err(SparseError::structure(
            "random pattern",
            format!("density {density} outside [0, 1]"),
        ))
    }
}

/// Nonzero sample with magnitude in `[0.1, 1)` and a random sign.
fn nonzero<T: Scalar>(rng: &mut fastrand::Rng) -> T {
    let magnitude = T::from_f64(0.1 + 0.9 * rng.f64()).unwrap_or_else(T::one);
    if rng.bool() {
        magnitude
    } else {
        -magnitude
    }
}

fn assemble<T: Scalar>(
    rows: usize,
    cols: usize,
    mut row_entries: impl FnMut(usize, &mut Vec<(usize, T)>),
) -> SparseResult<CsrMatrix<T>> {
    let mut row_ptr = Vec::with_capacity(rows + 1);
    let mut col_idx = Vec::new();
    let mut values = Vec::new();
    let mut entries = Vec::new();
    row_ptr.push(0);
    for row in 0..rows {
        entries.clear();
        row_entries(row, &mut entries);
        entries.sort_by_key(|&(col, _)| col);
        for &(col, value) in &entries {
            col_idx.push(col);
            values.push(value);
        }
        row_ptr.push(col_idx.len());
    }
    CsrMatrix::new(rows, cols, row_ptr, col_idx, values)
}

/// Uniform random pattern where each entry is present with probability `density`.
pub fn random_csr<T: Scalar>(
    rows: usize,
    cols: usize,
    density: f64,
    rng: &mut fastrand::Rng,
) -> SparseResult<CsrMatrix<T>> {
    check_density(density)?;
    assemble(rows, cols, |_, entries| {
        for col in 0..cols {
            if rng.f64() < density {
                entries.push((col, nonzero(rng)));
            }
        }
    })
}

/// Lower triangular factor with an explicit unit diagonal and small
/// off-diagonal entries, so forward substitution stays well conditioned.
pub fn random_unit_lower<T: Scalar>(
    n: usize,
    density: f64,
    rng: &mut fastrand::Rng,
) -> SparseResult<CsrMatrix<T>> {
    check_density(density)?;
    let scale = 0.5 / (1.0 + density * n as f64);
    assemble(n, n, |row, entries| {
        for col in 0..row {
            if rng.f64() < density {
                let value: T = nonzero(rng);
                entries.push((col, value * T::from_f64(scale).unwrap_or_else(T::one)));
            }
        }
        entries.push((row, T::one()));
    })
}

/// Square matrix whose diagonal exceeds the absolute sum of the rest of its row.
pub fn random_diagonally_dominant<T: Scalar>(
    n: usize,
    density: f64,
    rng: &mut fastrand::Rng,
) -> SparseResult<CsrMatrix<T>> {
    check_density(density)?;
    assemble(n, n, |row, entries| {
        let mut off_diagonal = T::zero();
        for col in (0..n).filter(|&col| col != row) {
            if rng.f64() < density {
                let value: T = nonzero(rng);
                off_diagonal += value.abs();
                entries.push((col, value));
            }
        }
        entries.push((row, off_diagonal + T::one()));
    })
}

pub fn random_vector<T: Scalar>(len: usize, rng: &mut fastrand::Rng) -> DenseVector<T> {
    DenseVector::from_vec((0..len).map(|_| T::sample(rng)).collect())
}

pub fn random_dense<T: Scalar>(rows: usize, cols: usize, rng: &mut fastrand::Rng) -> Array2<T> {
    Array2::from_shape_simple_fn((rows, cols), || T::sample(rng))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn density_bounds_are_checked() {
        let mut rng = fastrand::Rng::with_seed(1);
        assert!(random_csr::<f64>(4, 4, 1.5, &mut rng).is_err());
        let full = random_csr::<f64>(4, 5, 1.0, &mut rng).expect("full");
        assert_eq!(full.nnz(), 20);
        let empty = random_csr::<f64>(4, 5, 0.0, &mut rng).expect("empty");
        assert_eq!(empty.nnz(), 0);
    }

    #[test]
    fn unit_lower_has_unit_diagonal_and_no_upper_entries() {
        let mut rng = fastrand::Rng::with_seed(7);
        let matrix = random_unit_lower::<f64>(30, 0.3, &mut rng).expect("lower");
        for row in 0..30 {
            assert_eq!(matrix.diagonal(row), Some(1.0));
            let (cols, _) = matrix.row(row);
            assert!(cols.iter().all(|&col| col <= row));
        }
    }

    #[test]
    fn diagonal_dominates_each_row() {
        let mut rng = fastrand::Rng::with_seed(3);
        let matrix = random_diagonally_dominant::<f64>(25, 0.2, &mut rng).expect("matrix");
        for row in 0..25 {
            let (cols, vals) = matrix.row(row);
            let off: f64 = cols
                .iter()
                .zip(vals)
                .filter(|(&col, _)| col != row)
                .map(|(_, value)| value.abs())
                .sum();
            assert!(matrix.diagonal(row).unwrap_or(0.0) > off);
        }
    }
}
