//! Threshold incomplete LU preconditioner applied through the dispatch layer.

use crate::runtime::{triangular_solve, Context};
use serde::{Deserialize, Serialize};
use sparseforge_kernels::{
    csr_row_info, CsrMatrix, DenseVector, LevelSchedule, RowInfo, Scalar, SparseError, SparseResult,
    TriangularKind, TriangularOperand,
};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IlutConfig {
    /// Largest entries kept in each row of L and of U, diagonal excluded.
    pub entries_per_row: usize,
    /// Entries not above this fraction of the row's 2-norm are dropped.
    pub drop_tolerance: f64,
    pub level_scheduling: bool,
}

impl Default for IlutConfig {
    fn default() -> Self {
        Self {
            entries_per_row: 20,
            drop_tolerance: 1e-4,
            level_scheduling: false,
        }
    }
}

/// Incomplete factors stored as one combined matrix: the strictly lower part
/// is L (unit diagonal implied), the diagonal and above are U.
#[derive(Debug, Clone)]
pub struct IlutPrecond<T> {
    factors: CsrMatrix<T>,
    lower_schedule: Option<LevelSchedule>,
    upper_schedule: Option<LevelSchedule>,
}

fn keep_largest<T: Scalar>(mut entries: Vec<(usize, T)>, limit: usize) -> Vec<(usize, T)> {
    if entries.len() > limit {
        entries.sort_by(|a, b| {
            b.1.abs()
                .partial_cmp(&a.1.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        entries.truncate(limit);
    }
    entries.sort_by_key(|&(col, _)| col);
    entries
}

impl<T: Scalar> IlutPrecond<T> {
    pub fn new(ctx: &Context, matrix: &CsrMatrix<T>, config: &IlutConfig) -> SparseResult<Self> {
        let n = matrix.rows();
        if matrix.cols() != n {
            return Err(SparseError::mismatch("ilut", n, matrix.cols()));
        }
        let mut norms = DenseVector::zeros(n);
        csr_row_info(matrix, RowInfo::TwoNorm, &mut norms, &ctx.planner().launch()?)?;
        let tolerance = T::from_f64(config.drop_tolerance).unwrap_or_else(T::zero);

        let mut row_ptr = Vec::with_capacity(n + 1);
        let mut col_idx = Vec::new();
        let mut values: Vec<T> = Vec::new();
        row_ptr.push(0);
        // start of the diagonal in each finished row
        let mut diag_at = Vec::with_capacity(n);

        for row in 0..n {
            let threshold = tolerance * norms.get(row);
            let (cols, vals) = matrix.row(row);
            let mut work: BTreeMap<usize, T> = cols.iter().copied().zip(vals.iter().copied()).collect();

            let mut cursor = 0;
            loop {
                let Some((k, value)) = work.range(cursor..row).next().map(|(&k, &v)| (k, v)) else {
                    break;
                };
                cursor = k + 1;
                let pivot = values[diag_at[k]];
                let factor = value / pivot;
                if factor.abs() <= threshold {
                    work.remove(&k);
                    continue;
                }
                work.insert(k, factor);
                let upper = diag_at[k] + 1..row_ptr[k + 1];
                for (&col, &u) in col_idx[upper.clone()].iter().zip(&values[upper]) {
                    let slot = work.entry(col).or_insert_with(T::zero);
                    *slot = *slot - factor * u;
                }
            }

            let diagonal = work.get(&row).copied().unwrap_or_else(T::zero);
            if diagonal == T::zero() {
                return Err(SparseError::SingularFactor { row });
            }
            let lower: Vec<(usize, T)> = work
                .range(..row)
                .filter(|(_, value)| value.abs() > threshold)
                .map(|(&col, &value)| (col, value))
                .collect();
            let upper: Vec<(usize, T)> = work
                .range(row + 1..)
                .filter(|(_, value)| value.abs() > threshold)
                .map(|(&col, &value)| (col, value))
                .collect();

            for (col, value) in keep_largest(lower, config.entries_per_row) {
                col_idx.push(col);
                values.push(value);
            }
            diag_at.push(col_idx.len());
            col_idx.push(row);
            values.push(diagonal);
            for (col, value) in keep_largest(upper, config.entries_per_row) {
                col_idx.push(col);
                values.push(value);
            }
            row_ptr.push(col_idx.len());
        }

        let factors = CsrMatrix::new(n, n, row_ptr, col_idx, values)?.with_location(matrix.location());
        let (lower_schedule, upper_schedule) = if config.level_scheduling {
            (
                Some(LevelSchedule::build(&factors, true)),
                Some(LevelSchedule::build(&factors, false)),
            )
        } else {
            (None, None)
        };
        info!(
            rows = n,
            nnz = matrix.nnz(),
            factor_nnz = factors.nnz(),
            levels = lower_schedule.as_ref().map_or(0, LevelSchedule::num_levels),
            "built ILUT factors"
        );
        Ok(Self {
            factors,
            lower_schedule,
            upper_schedule,
        })
    }

    pub fn factors(&self) -> &CsrMatrix<T> {
        &self.factors
    }

    /// Replaces `vector` by `U⁻¹ L⁻¹ vector`.
    pub fn apply(&self, ctx: &Context, vector: &mut DenseVector<T>) -> SparseResult<()> {
        let operand = TriangularOperand::Matrix(&self.factors);
        let lower = triangular_solve(
            ctx,
            operand,
            vector,
            TriangularKind::UnitLower,
            self.lower_schedule.as_ref(),
        )?;
        let upper = triangular_solve(
            ctx,
            operand,
            vector,
            TriangularKind::Upper,
            self.upper_schedule.as_ref(),
        )?;
        upper.restore(vector);
        lower.restore(vector);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::multiply;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use sparseforge_kernels::{MemoryLocation, SparseMatrix};

    #[test]
    fn exact_factorization_without_dropping() {
        let dense = array![[4.0, 1.0, 0.0], [2.0, 5.0, 1.0], [0.0, 3.0, 6.0]];
        let matrix = CsrMatrix::from_dense(&dense);
        let ctx = Context::host();
        let config = IlutConfig {
            drop_tolerance: 0.0,
            ..IlutConfig::default()
        };
        let precond = IlutPrecond::new(&ctx, &matrix, &config).expect("ilut");

        // tridiagonal matrices have no fill, so ILUT is the exact LU
        let b = vec![1.0, -2.0, 0.5];
        let mut x = DenseVector::from_vec(b.clone());
        precond.apply(&ctx, &mut x).expect("apply");
        let product = multiply(&ctx, &SparseMatrix::Csr(matrix), &x).expect("multiply");
        for (value, expected) in product.iter().zip(b) {
            assert_abs_diff_eq!(value, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn level_scheduled_apply_matches_sequential() {
        let mut rng = fastrand::Rng::with_seed(5);
        let matrix = sparseforge_kernels::random_diagonally_dominant::<f64>(40, 0.1, &mut rng)
            .expect("matrix")
            .with_location(MemoryLocation::Device);
        let ctx = Context::host();
        let sequential = IlutPrecond::new(&ctx, &matrix, &IlutConfig::default()).expect("ilut");
        let scheduled = IlutPrecond::new(
            &ctx,
            &matrix,
            &IlutConfig {
                level_scheduling: true,
                ..IlutConfig::default()
            },
        )
        .expect("ilut");

        let b: Vec<f64> = (0..40).map(|i| (i as f64 * 0.3).cos()).collect();
        let mut x1 = DenseVector::from_vec(b.clone());
        let mut x2 = DenseVector::from_vec(b);
        sequential.apply(&ctx, &mut x1).expect("sequential");
        scheduled.apply(&ctx, &mut x2).expect("scheduled");
        assert_eq!(x2.location(), MemoryLocation::Host);
        for (a, b) in x1.iter().zip(x2.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn drop_rule_uses_strict_two_norm_threshold() {
        // first row has 2-norm 2 and 1-norm 4
        let matrix = CsrMatrix::from_dense(&array![
            [1.0, 1.0, 1.0, 1.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0]
        ]);
        let ctx = Context::host();
        let with_tolerance = |drop_tolerance| {
            IlutPrecond::new(
                &ctx,
                &matrix,
                &IlutConfig {
                    drop_tolerance,
                    ..IlutConfig::default()
                },
            )
            .expect("ilut")
        };
        assert_eq!(with_tolerance(0.49).factors().row_len(0), 4);
        // entries equal to the threshold are dropped, the diagonal stays
        assert_eq!(with_tolerance(0.5).factors().row_len(0), 1);
    }

    #[test]
    fn zero_pivot_is_singular() {
        let matrix = CsrMatrix::from_dense(&array![[1.0, 1.0], [1.0, 1.0]]);
        let err = IlutPrecond::new(&Context::host(), &matrix, &IlutConfig::default()).unwrap_err();
        assert_eq!(err, SparseError::SingularFactor { row: 1 });
    }

    #[test]
    fn entries_per_row_limits_fill() {
        let mut rng = fastrand::Rng::with_seed(9);
        let matrix = sparseforge_kernels::random_diagonally_dominant::<f64>(30, 0.5, &mut rng)
            .expect("matrix");
        let config = IlutConfig {
            entries_per_row: 2,
            ..IlutConfig::default()
        };
        let precond = IlutPrecond::new(&Context::host(), &matrix, &config).expect("ilut");
        for row in 0..30 {
            assert!(precond.factors().row_len(row) <= 5);
            assert!(precond.factors().diagonal(row).is_some());
        }
    }
}
