//! Host dispatch entrypoints for sparse products, row reductions and solves.

use crate::planner::{DispatchOptions, DispatchPlanner, KernelVariant, SolvePlan};
use serde::{Deserialize, Serialize};
use sparseforge_kernels::{
    coo_row_info, coo_spmm, coo_spmv, compressed_csr_row_info, compressed_csr_spmm,
    compressed_csr_spmv, csr_row_info, csr_spmm, csr_spmv_adaptive, csr_spmv_scalar, ell_row_info,
    ell_spmm, ell_spmv, hyb_row_info, hyb_spmm, hyb_spmv, sliced_ell_row_info, sliced_ell_spmm,
    sliced_ell_spmv, solve_level_scheduled, solve_sequential, solve_single_worker, DenseMatrix, DenseVector, DeviceInfo,
    Layout, LevelSchedule, MemoryLocation, RhsOp, RowInfo, Scalar, SparseMatrix, SparseResult,
    TriangularKind, TriangularOperand,
};
use tracing::{debug, info};

/// Explicit device handle threaded through every dispatch call.
#[derive(Debug, Clone)]
pub struct Context {
    planner: DispatchPlanner,
}

impl Context {
    pub fn new(device: DeviceInfo, options: DispatchOptions) -> Self {
        Self {
            planner: DispatchPlanner::new(device, options),
        }
    }

    pub fn host() -> Self {
        Self::new(DeviceInfo::host(), DispatchOptions::default())
    }

    pub fn with_options(self, options: DispatchOptions) -> Self {
        Self::new(self.planner.device().clone(), options)
    }

    pub fn device(&self) -> &DeviceInfo {
        self.planner.device()
    }

    pub fn options(&self) -> &DispatchOptions {
        self.planner.options()
    }

    pub fn planner(&self) -> &DispatchPlanner {
        &self.planner
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::host()
    }
}

/// How a triangular solve was executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolveReport {
    pub plan: SolvePlan,
    /// The right-hand side was moved to device residency for the solve.
    pub relocated: bool,
}

impl SolveReport {
    /// Moves a relocated right-hand side back to the host.
    pub fn restore<T: Scalar>(&self, rhs: &mut DenseVector<T>) {
        if self.relocated {
            rhs.set_location(MemoryLocation::Host);
        }
    }
}

/// `A × x` into a freshly allocated vector.
pub fn multiply<T: Scalar>(
    ctx: &Context,
    matrix: &SparseMatrix<T>,
    x: &DenseVector<T>,
) -> SparseResult<DenseVector<T>> {
    let mut result = DenseVector::zeros(matrix.rows()).with_location(x.location());
    multiply_into(ctx, matrix, x, &mut result)?;
    Ok(result)
}

/// `A × x` written into the addressed elements of `result`.
pub fn multiply_into<T: Scalar>(
    ctx: &Context,
    matrix: &SparseMatrix<T>,
    x: &DenseVector<T>,
    result: &mut DenseVector<T>,
) -> SparseResult<()> {
    let launch = ctx.planner.launch()?;
    let variant = ctx.planner.variant_for(matrix.format(), T::DTYPE);
    debug!(
        variant = variant.name(),
        rows = matrix.rows(),
        nnz = matrix.nnz(),
        work_groups = launch.work_groups,
        work_group_size = launch.work_group_size,
        "dispatching sparse matrix-vector product"
    );
    match matrix {
        SparseMatrix::Csr(m) if variant == KernelVariant::CsrAdaptive => {
            csr_spmv_adaptive(m, x, result, &launch)
        }
        SparseMatrix::Csr(m) => csr_spmv_scalar(m, x, result, &launch),
        SparseMatrix::CompressedCsr(m) => compressed_csr_spmv(m, x, result, &launch),
        SparseMatrix::Coo(m) => coo_spmv(m, x, result, &launch),
        SparseMatrix::Ell(m) => ell_spmv(m, x, result, &launch),
        SparseMatrix::SlicedEll(m) => sliced_ell_spmv(m, x, result, &launch),
        SparseMatrix::Hybrid(m) => hyb_spmv(m, x, result, &launch),
    }
}

/// `A × B` or `A × Bᵀ` into a new row-major matrix.
pub fn multiply_dense<T: Scalar>(
    ctx: &Context,
    matrix: &SparseMatrix<T>,
    rhs: &DenseMatrix<T>,
    op: RhsOp,
) -> SparseResult<DenseMatrix<T>> {
    let width = match op {
        RhsOp::Plain => rhs.cols(),
        RhsOp::Transposed => rhs.rows(),
    };
    let mut result = DenseMatrix::zeros(matrix.rows(), width, Layout::RowMajor);
    multiply_dense_into(ctx, matrix, rhs, op, &mut result)?;
    Ok(result)
}

pub fn multiply_dense_into<T: Scalar>(
    ctx: &Context,
    matrix: &SparseMatrix<T>,
    rhs: &DenseMatrix<T>,
    op: RhsOp,
    result: &mut DenseMatrix<T>,
) -> SparseResult<()> {
    let launch = ctx.planner.launch()?;
    debug!(
        format = %matrix.format(),
        rows = matrix.rows(),
        width = result.cols(),
        ?op,
        "dispatching sparse matrix-matrix product"
    );
    match matrix {
        SparseMatrix::Csr(m) => csr_spmm(m, rhs, op, result, &launch),
        SparseMatrix::CompressedCsr(m) => compressed_csr_spmm(m, rhs, op, result, &launch),
        SparseMatrix::Coo(m) => coo_spmm(m, rhs, op, result, &launch),
        SparseMatrix::Ell(m) => ell_spmm(m, rhs, op, result, &launch),
        SparseMatrix::SlicedEll(m) => sliced_ell_spmm(m, rhs, op, result, &launch),
        SparseMatrix::Hybrid(m) => hyb_spmm(m, rhs, op, result, &launch),
    }
}

/// One reduction value per row.
pub fn row_reduce<T: Scalar>(
    ctx: &Context,
    matrix: &SparseMatrix<T>,
    selector: RowInfo,
) -> SparseResult<DenseVector<T>> {
    let launch = ctx.planner.launch()?;
    let mut result = DenseVector::zeros(matrix.rows());
    match matrix {
        SparseMatrix::Csr(m) => csr_row_info(m, selector, &mut result, &launch)?,
        SparseMatrix::CompressedCsr(m) => compressed_csr_row_info(m, selector, &mut result, &launch)?,
        SparseMatrix::Coo(m) => coo_row_info(m, selector, &mut result, &launch)?,
        SparseMatrix::Ell(m) => ell_row_info(m, selector, &mut result, &launch)?,
        SparseMatrix::SlicedEll(m) => sliced_ell_row_info(m, selector, &mut result, &launch)?,
        SparseMatrix::Hybrid(m) => hyb_row_info(m, selector, &mut result, &launch)?,
    }
    Ok(result)
}

/// Solves `op(A) x = b` in place. A host-resident right-hand side on the
/// device path is relocated and reported; the caller restores residency.
pub fn triangular_solve<T: Scalar>(
    ctx: &Context,
    operand: TriangularOperand<'_, T>,
    rhs: &mut DenseVector<T>,
    kind: TriangularKind,
    schedule: Option<&LevelSchedule>,
) -> SparseResult<SolveReport> {
    let matrix = operand.matrix();
    let plan = ctx.planner.solve_plan(
        matrix.location(),
        rhs.location(),
        schedule.is_some(),
        operand.is_transposed(),
    );
    let relocated = plan != SolvePlan::HostDirect && rhs.location() == MemoryLocation::Host;
    if relocated {
        rhs.set_location(MemoryLocation::Device);
    }

    info!(
        ?plan,
        ?kind,
        rows = matrix.rows(),
        transposed = operand.is_transposed(),
        relocated,
        "triangular solve"
    );
    let solved = match (plan, schedule) {
        (SolvePlan::HostDirect, _) => solve_sequential(operand, rhs, kind),
        (SolvePlan::LevelScheduled, Some(schedule)) => {
            solve_level_scheduled(matrix, schedule, rhs, kind)
        }
        _ => ctx
            .planner
            .single_worker_launch()
            .and_then(|launch| solve_single_worker(operand, rhs, kind, &launch)),
    };
    if let Err(err) = solved {
        if relocated {
            rhs.set_location(MemoryLocation::Host);
        }
        return Err(err);
    }
    Ok(SolveReport { plan, relocated })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use sparseforge_kernels::{CsrMatrix, SparseFormat};

    fn sample() -> CsrMatrix<f64> {
        CsrMatrix::from_dense(&array![[1.0, 0.0, 2.0], [0.0, 3.0, 0.0], [4.0, 0.0, 5.0]])
    }

    #[test]
    fn every_format_dispatches_to_the_same_product() {
        let ctx = Context::host();
        let x = DenseVector::from_vec(vec![1.0, 1.0, 1.0]);
        for format in SparseFormat::ALL {
            let matrix = SparseMatrix::convert(&sample(), format).expect("convert");
            let y = multiply(&ctx, &matrix, &x).expect("multiply");
            assert_eq!(y.to_vec(), vec![3.0, 3.0, 9.0], "{format}");
        }
    }

    #[test]
    fn host_operands_solve_directly() {
        let ctx = Context::host();
        let lower = CsrMatrix::from_dense(&array![[2.0, 0.0], [1.0, 1.0]]);
        let mut b = DenseVector::from_vec(vec![2.0, 3.0]);
        let report = triangular_solve(
            &ctx,
            TriangularOperand::Matrix(&lower),
            &mut b,
            TriangularKind::Lower,
            None,
        )
        .expect("solve");
        assert_eq!(report, SolveReport { plan: SolvePlan::HostDirect, relocated: false });
        assert_eq!(b.to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn device_matrix_relocates_host_vector() {
        let ctx = Context::host();
        let lower = CsrMatrix::from_dense(&array![[2.0, 0.0], [1.0, 1.0]])
            .with_location(MemoryLocation::Device);
        let schedule = LevelSchedule::build(&lower, true);
        let mut b = DenseVector::from_vec(vec![2.0, 3.0]);
        let report = triangular_solve(
            &ctx,
            TriangularOperand::Matrix(&lower),
            &mut b,
            TriangularKind::Lower,
            Some(&schedule),
        )
        .expect("solve");
        assert_eq!(report.plan, SolvePlan::LevelScheduled);
        assert!(report.relocated);
        assert_eq!(b.location(), MemoryLocation::Device);
        report.restore(&mut b);
        assert_eq!(b.location(), MemoryLocation::Host);
        for (value, expected) in b.iter().zip([1.0, 2.0]) {
            assert_abs_diff_eq!(value, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn transposed_operand_ignores_schedule() {
        let ctx = Context::host();
        let lower = CsrMatrix::from_dense(&array![[2.0, 0.0], [1.0, 1.0]])
            .with_location(MemoryLocation::Device);
        let schedule = LevelSchedule::build(&lower, true);
        let mut b = DenseVector::from_vec(vec![4.0, 2.0]).with_location(MemoryLocation::Device);
        let report = triangular_solve(
            &ctx,
            TriangularOperand::Transposed(&lower),
            &mut b,
            TriangularKind::Upper,
            Some(&schedule),
        )
        .expect("solve");
        assert_eq!(report, SolveReport { plan: SolvePlan::DeviceSequential, relocated: false });
        // [[2, 1], [0, 1]] x = [4, 2]
        assert_eq!(b.to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn row_norms_through_dispatch() {
        let ctx = Context::host();
        let matrix = SparseMatrix::convert(&sample(), SparseFormat::Hybrid).expect("convert");
        let norms = row_reduce(&ctx, &matrix, RowInfo::OneNorm).expect("row info");
        assert_eq!(norms.to_vec(), vec![3.0, 3.0, 9.0]);
    }
}
