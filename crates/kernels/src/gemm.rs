//! Dense matrix products realized from a tuning profile.
//!
//! These exist as the target the autotuner times on the host; the work-group
//! and micro-tile structure mirrors the generated device kernels.

use crate::error::{SparseError, SparseResult};
use crate::profile::GemmProfile;
use crate::scalar::Scalar;
use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transposition pattern of `C = op(A) · op(B)`; the first letter is the
/// left operand (`A` as stored, `T` transposed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GemmLayout {
    AA,
    TA,
    AT,
    TT,
}

impl GemmLayout {
    pub const ALL: [GemmLayout; 4] = [GemmLayout::AA, GemmLayout::TA, GemmLayout::AT, GemmLayout::TT];

    pub fn lhs_transposed(&self) -> bool {
        matches!(self, GemmLayout::TA | GemmLayout::TT)
    }

    pub fn rhs_transposed(&self) -> bool {
        matches!(self, GemmLayout::AT | GemmLayout::TT)
    }

    /// Stored operand shapes for an `m × k` by `k × n` product.
    pub fn operand_shapes(&self, m: usize, n: usize, k: usize) -> ((usize, usize), (usize, usize)) {
        let lhs = if self.lhs_transposed() { (k, m) } else { (m, k) };
        let rhs = if self.rhs_transposed() { (n, k) } else { (k, n) };
        (lhs, rhs)
    }
}

impl fmt::Display for GemmLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GemmLayout::AA => "gemmAA",
            GemmLayout::TA => "gemmTA",
            GemmLayout::AT => "gemmAT",
            GemmLayout::TT => "gemmTT",
        };
        f.write_str(name)
    }
}

fn logical_operands<'a, 'b, T>(
    layout: GemmLayout,
    lhs: ArrayView2<'a, T>,
    rhs: ArrayView2<'b, T>,
) -> SparseResult<(ArrayView2<'a, T>, ArrayView2<'b, T>)> {
    let lhs = if layout.lhs_transposed() { lhs.reversed_axes() } else { lhs };
    let rhs = if layout.rhs_transposed() { rhs.reversed_axes() } else { rhs };
    if lhs.ncols() != rhs.nrows() {
        return Err(SparseError::mismatch("gemm", lhs.ncols(), rhs.nrows()));
    }
    Ok((lhs, rhs))
}

pub fn reference_gemm<T: Scalar>(
    layout: GemmLayout,
    lhs: ArrayView2<'_, T>,
    rhs: ArrayView2<'_, T>,
) -> SparseResult<Array2<T>> {
    let (lhs, rhs) = logical_operands(layout, lhs, rhs)?;
    Ok(lhs.dot(&rhs))
}

/// Host rendition of the profile-driven kernel: one rayon task per band of
/// `ml` output rows, `nl`-wide tiles inside it, contracted `kl` at a time with
/// optional staging of either operand tile.
#[derive(Debug, Clone, Copy)]
pub struct TiledGemm {
    profile: GemmProfile,
}

impl TiledGemm {
    pub fn new(profile: GemmProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &GemmProfile {
        &self.profile
    }

    pub fn run<T: Scalar>(
        &self,
        layout: GemmLayout,
        lhs: ArrayView2<'_, T>,
        rhs: ArrayView2<'_, T>,
    ) -> SparseResult<Array2<T>> {
        let p = self.profile;
        if [p.ml, p.kl, p.nl, p.ms, p.ks, p.ns, p.vector, p.unroll].contains(&0) {
            return Err(SparseError::launch("tiled-gemm", "profile has a zero dimension"));
        }
        let (lhs, rhs) = logical_operands(layout, lhs, rhs)?;
        let (m, k) = lhs.dim();
        let n = rhs.ncols();
        let mut out = Array2::<T>::zeros((m, n));
        if m == 0 || n == 0 {
            return Ok(out);
        }

        out.axis_chunks_iter_mut(Axis(0), p.ml)
            .into_par_iter()
            .enumerate()
            .for_each(|(band, mut block)| {
                let i0 = band * p.ml;
                let tile_m = block.nrows();
                let mut lhs_stage = vec![T::zero(); if p.lhs_local { p.ml * p.kl } else { 0 }];
                let mut rhs_stage = vec![T::zero(); if p.rhs_local { p.kl * p.nl } else { 0 }];

                for j0 in (0..n).step_by(p.nl) {
                    let tile_n = (n - j0).min(p.nl);
                    for k0 in (0..k).step_by(p.kl) {
                        let tile_k = (k - k0).min(p.kl);

                        if p.lhs_local {
                            for i in 0..tile_m {
                                for kk in 0..tile_k {
                                    lhs_stage[i * p.kl + kk] = lhs[(i0 + i, k0 + kk)];
                                }
                            }
                        }
                        if p.rhs_local {
                            for kk in 0..tile_k {
                                for j in 0..tile_n {
                                    rhs_stage[kk * p.nl + j] = rhs[(k0 + kk, j0 + j)];
                                }
                            }
                        }
                        let a = |i: usize, kk: usize| {
                            if p.lhs_local {
                                lhs_stage[i * p.kl + kk]
                            } else {
                                lhs[(i0 + i, k0 + kk)]
                            }
                        };
                        let b = |kk: usize, j: usize| {
                            if p.rhs_local {
                                rhs_stage[kk * p.nl + j]
                            } else {
                                rhs[(k0 + kk, j0 + j)]
                            }
                        };

                        // each worker accumulates its ms × ns micro-tile
                        for wm in (0..tile_m).step_by(p.ms) {
                            for wn in (0..tile_n).step_by(p.ns) {
                                let rows = (tile_m - wm).min(p.ms);
                                let cols = (tile_n - wn).min(p.ns);
                                for ks0 in (0..tile_k).step_by(p.ks) {
                                    let k_end = (ks0 + p.ks).min(tile_k);
                                    for ku in (ks0..k_end).step_by(p.unroll) {
                                        for kk in ku..(ku + p.unroll).min(k_end) {
                                            for mi in 0..rows {
                                                let a_val = a(wm + mi, kk);
                                                for nv in (0..cols).step_by(p.vector) {
                                                    for lane in nv..(nv + p.vector).min(cols) {
                                                        block[(wm + mi, j0 + wn + lane)] +=
                                                            a_val * b(kk, wn + lane);
                                                    }
                                                }
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            });

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn operand(rows: usize, cols: usize, seed: f64) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |(i, j)| ((i * cols + j) as f64 * seed).sin())
    }

    #[test]
    fn tiled_matches_reference_for_every_layout() {
        let (m, n, k) = (37, 29, 45);
        let profile = GemmProfile {
            ml: 16,
            kl: 8,
            nl: 16,
            ms: 4,
            ks: 2,
            ns: 4,
            lhs_local: true,
            rhs_local: true,
            vector: 2,
            unroll: 2,
        };
        for layout in GemmLayout::ALL {
            let ((lr, lc), (rr, rc)) = layout.operand_shapes(m, n, k);
            let lhs = operand(lr, lc, 0.37);
            let rhs = operand(rr, rc, 0.11);
            let expected = reference_gemm(layout, lhs.view(), rhs.view()).expect("reference");
            let actual = TiledGemm::new(profile)
                .run(layout, lhs.view(), rhs.view())
                .expect("tiled");
            assert_eq!(actual.dim(), (m, n));
            for (a, b) in actual.iter().zip(expected.iter()) {
                assert_abs_diff_eq!(a, b, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn unstaged_profile_matches_reference() {
        let lhs = operand(20, 12, 0.5);
        let rhs = operand(12, 9, 0.25);
        let profile = GemmProfile {
            lhs_local: false,
            ..GemmProfile::default()
        };
        let expected = reference_gemm(GemmLayout::AA, lhs.view(), rhs.view()).expect("reference");
        let actual = TiledGemm::new(profile)
            .run(GemmLayout::AA, lhs.view(), rhs.view())
            .expect("tiled");
        for (a, b) in actual.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-10);
        }
    }

    #[test]
    fn inner_dimension_mismatch() {
        let lhs = operand(4, 3, 1.0);
        let rhs = operand(4, 3, 1.0);
        assert!(reference_gemm(GemmLayout::AA, lhs.view(), rhs.view()).is_err());
        assert!(reference_gemm(GemmLayout::AT, lhs.view(), rhs.view()).is_ok());
    }
}
