//! Triangular solves on CSR factors: sequential substitution, the
//! single-worker device launch and level-scheduled substitution.

use crate::config::{LaunchConfig, TriangularKind};
use crate::dense::DenseVector;
use crate::error::{ensure_dim, SparseError, SparseResult};
use crate::format::CsrMatrix;
use crate::scalar::Scalar;
use rayon::prelude::*;

/// A CSR factor used as stored or through its transpose.
#[derive(Debug, Clone, Copy)]
pub enum TriangularOperand<'a, T> {
    Matrix(&'a CsrMatrix<T>),
    Transposed(&'a CsrMatrix<T>),
}

impl<'a, T: Scalar> TriangularOperand<'a, T> {
    pub fn matrix(&self) -> &'a CsrMatrix<T> {
        match *self {
            TriangularOperand::Matrix(matrix) | TriangularOperand::Transposed(matrix) => matrix,
        }
    }

    pub fn is_transposed(&self) -> bool {
        matches!(self, TriangularOperand::Transposed(_))
    }
}

fn check_square<T: Scalar>(matrix: &CsrMatrix<T>, rhs: &DenseVector<T>) -> SparseResult<()> {
    ensure_dim("triangular solve", matrix.rows(), matrix.cols())?;
    ensure_dim("triangular solve", matrix.rows(), rhs.len())
}

fn pivot<T: Scalar>(matrix: &CsrMatrix<T>, row: usize) -> SparseResult<T> {
    match matrix.diagonal(row) {
        Some(value) if value != T::zero() => Ok(value),
        _ => Err(SparseError::SingularFactor { row }),
    }
}

/// Solves in place by a single sweep over the rows.
///
/// Only the triangle named by `kind` is read, so a combined LU factor can be
/// passed for either half. Unit kinds never touch the diagonal.
pub fn solve_sequential<T: Scalar>(
    operand: TriangularOperand<'_, T>,
    rhs: &mut DenseVector<T>,
    kind: TriangularKind,
) -> SparseResult<()> {
    let matrix = operand.matrix();
    check_square(matrix, rhs)?;
    let mut x = rhs.to_vec();
    sweep(operand, &mut x, kind)?;
    rhs.assign(&x)
}

/// Device-path substitution: a launch of exactly one work group holding one
/// worker, which walks every row in dependency order.
pub fn solve_single_worker<T: Scalar>(
    operand: TriangularOperand<'_, T>,
    rhs: &mut DenseVector<T>,
    kind: TriangularKind,
    launch: &LaunchConfig,
) -> SparseResult<()> {
    launch.validate()?;
    if launch.global_size() != 1 {
        return Err(SparseError::InvalidLaunch(format!(
            "single-worker solve launched with {} workers",
            launch.global_size()
        )));
    }
    let matrix = operand.matrix();
    check_square(matrix, rhs)?;

    let mut x = rhs.to_vec();
    let mut status = Ok(());
    rayon::scope(|scope| {
        scope.spawn(|_| status = sweep(operand, &mut x, kind));
    });
    status?;
    rhs.assign(&x)
}

fn sweep<T: Scalar>(
    operand: TriangularOperand<'_, T>,
    x: &mut [T],
    kind: TriangularKind,
) -> SparseResult<()> {
    let matrix = operand.matrix();
    let n = matrix.rows();
    let order: Box<dyn Iterator<Item = usize>> = if kind.is_lower() {
        Box::new(0..n)
    } else {
        Box::new((0..n).rev())
    };

    if operand.is_transposed() {
        // rows of the stored matrix are columns of the operand
        for col in order {
            if !kind.is_unit() {
                x[col] = x[col] / pivot(matrix, col)?;
            }
            let solved = x[col];
            let (cols, vals) = matrix.row(col);
            for (&row, &value) in cols.iter().zip(vals) {
                let below = if kind.is_lower() { row > col } else { row < col };
                if below {
                    x[row] = x[row] - value * solved;
                }
            }
        }
    } else {
        for row in order {
            x[row] = substitute_row(matrix, row, x, kind)?;
        }
    }
    Ok(())
}

/// New value of `row` given every dependency already solved in `x`.
fn substitute_row<T: Scalar>(
    matrix: &CsrMatrix<T>,
    row: usize,
    x: &[T],
    kind: TriangularKind,
) -> SparseResult<T> {
    let (cols, vals) = matrix.row(row);
    let mut sum = x[row];
    for (&col, &value) in cols.iter().zip(vals) {
        let dependency = if kind.is_lower() { col < row } else { col > row };
        if dependency {
            sum = sum - value * x[col];
        }
    }
    if kind.is_unit() {
        Ok(sum)
    } else {
        Ok(sum / pivot(matrix, row)?)
    }
}

/// Rows grouped into dependency-free levels for one triangle of a factor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelSchedule {
    lower: bool,
    levels: Vec<Vec<usize>>,
}

impl LevelSchedule {
    /// Level of a row is one past the deepest row it depends on.
    pub fn build<T: Scalar>(matrix: &CsrMatrix<T>, lower: bool) -> Self {
        let n = matrix.rows();
        let mut depth = vec![0usize; n];
        let order: Box<dyn Iterator<Item = usize>> = if lower {
            Box::new(0..n)
        } else {
            Box::new((0..n).rev())
        };
        let mut deepest = 0;
        for row in order {
            let (cols, _) = matrix.row(row);
            let level = cols
                .iter()
                .filter(|&&col| if lower { col < row } else { col > row })
                .map(|&col| depth[col] + 1)
                .max()
                .unwrap_or(0);
            depth[row] = level;
            deepest = deepest.max(level);
        }

        let mut levels = vec![Vec::new(); if n == 0 { 0 } else { deepest + 1 }];
        for (row, &level) in depth.iter().enumerate() {
            levels[level].push(row);
        }
        Self { lower, levels }
    }

    pub fn is_lower(&self) -> bool {
        self.lower
    }

    pub fn levels(&self) -> &[Vec<usize>] {
        &self.levels
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn rows(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }
}

/// Solves level by level; rows inside a level run in parallel.
pub fn solve_level_scheduled<T: Scalar>(
    matrix: &CsrMatrix<T>,
    schedule: &LevelSchedule,
    rhs: &mut DenseVector<T>,
    kind: TriangularKind,
) -> SparseResult<()> {
    check_square(matrix, rhs)?;
    if schedule.is_lower() != kind.is_lower() {
        return Err(SparseError::structure(
            "level schedule",
            "schedule triangle does not match the solve kind",
        ));
    }
    ensure_dim("level schedule", matrix.rows(), schedule.rows())?;

    let mut x = rhs.to_vec();
    for level in schedule.levels() {
        let solved: Vec<(usize, T)> = level
            .par_iter()
            .map(|&row| substitute_row(matrix, row, &x, kind).map(|value| (row, value)))
            .collect::<SparseResult<_>>()?;
        for (row, value) in solved {
            x[row] = value;
        }
    }
    rhs.assign(&x)
}
