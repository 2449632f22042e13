//! Sparse storage formats.

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

use crate::error::SparseResult;
use crate::scalar::Scalar;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rows per slice when converting to sliced ELL without explicit geometry.
pub const SELL_DEFAULT_SLICE: usize = 32;
/// Sorting window for sliced ELL conversion.
pub const SELL_DEFAULT_SIGMA: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SparseFormat {
    Csr,
    CompressedCsr,
    Coo,
    Ell,
    SlicedEll,
    Hybrid,
}

impl SparseFormat {
    pub const ALL: [SparseFormat; 6] = [
        SparseFormat::Csr,
        SparseFormat::CompressedCsr,
        SparseFormat::Coo,
        SparseFormat::Ell,
        SparseFormat::SlicedEll,
        SparseFormat::Hybrid,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SparseFormat::Csr => "csr",
            SparseFormat::CompressedCsr => "compressed-csr",
            SparseFormat::Coo => "coo",
            SparseFormat::Ell => "ell",
            SparseFormat::SlicedEll => "sliced-ell",
            SparseFormat::Hybrid => "hyb",
        }
    }
}

impl fmt::Display for SparseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A sparse matrix in one of the supported storage formats.
#[derive(Debug, Clone, PartialEq)]
pub enum SparseMatrix<T> {
    Csr(CsrMatrix<T>),
    CompressedCsr(CompressedCsrMatrix<T>),
    Coo(CooMatrix<T>),
    Ell(EllMatrix<T>),
    SlicedEll(SlicedEllMatrix<T>),
    Hybrid(HybMatrix<T>),
}

impl<T: Scalar> SparseMatrix<T> {
    /// Converts `csr` into `format` using default conversion parameters.
    pub fn convert(csr: &CsrMatrix<T>, format: SparseFormat) -> SparseResult<Self> {
        Ok(match format {
            SparseFormat::Csr => SparseMatrix::Csr(csr.clone()),
            SparseFormat::CompressedCsr => {
                SparseMatrix::CompressedCsr(CompressedCsrMatrix::from_csr(csr))
            }
            SparseFormat::Coo => SparseMatrix::Coo(CooMatrix::from_csr(csr)),
            SparseFormat::Ell => SparseMatrix::Ell(EllMatrix::from_csr(csr)),
            SparseFormat::SlicedEll => SparseMatrix::SlicedEll(SlicedEllMatrix::from_csr(
                csr,
                SELL_DEFAULT_SLICE,
                SELL_DEFAULT_SIGMA,
            )?),
            SparseFormat::Hybrid => SparseMatrix::Hybrid(HybMatrix::from_csr(csr)),
        })
    }

    pub fn format(&self) -> SparseFormat {
        match self {
            SparseMatrix::Csr(_) => SparseFormat::Csr,
            SparseMatrix::CompressedCsr(_) => SparseFormat::CompressedCsr,
            SparseMatrix::Coo(_) => SparseFormat::Coo,
            SparseMatrix::Ell(_) => SparseFormat::Ell,
            SparseMatrix::SlicedEll(_) => SparseFormat::SlicedEll,
            SparseMatrix::Hybrid(_) => SparseFormat::Hybrid,
        }
    }

    pub fn rows(&self) -> usize {
        match self {
            SparseMatrix::Csr(m) => m.rows(),
            SparseMatrix::CompressedCsr(m) => m.rows(),
            SparseMatrix::Coo(m) => m.rows(),
            SparseMatrix::Ell(m) => m.rows(),
            SparseMatrix::SlicedEll(m) => m.rows(),
            SparseMatrix::Hybrid(m) => m.rows(),
        }
    }

    pub fn cols(&self) -> usize {
        match self {
            SparseMatrix::Csr(m) => m.cols(),
            SparseMatrix::CompressedCsr(m) => m.cols(),
            SparseMatrix::Coo(m) => m.cols(),
            SparseMatrix::Ell(m) => m.cols(),
            SparseMatrix::SlicedEll(m) => m.cols(),
            SparseMatrix::Hybrid(m) => m.cols(),
        }
    }

    pub fn nnz(&self) -> usize {
        match self {
            SparseMatrix::Csr(m) => m.nnz(),
            SparseMatrix::CompressedCsr(m) => m.nnz(),
            SparseMatrix::Coo(m) => m.nnz(),
            SparseMatrix::Ell(m) => m.nnz(),
            SparseMatrix::SlicedEll(m) => m.nnz(),
            SparseMatrix::Hybrid(m) => m.nnz(),
        }
    }

    pub fn to_dense(&self) -> Array2<T> {
        match self {
            SparseMatrix::Csr(m) => m.to_dense(),
            SparseMatrix::CompressedCsr(m) => m.to_dense(),
            SparseMatrix::Coo(m) => m.to_dense(),
            SparseMatrix::Ell(m) => m.to_dense(),
            SparseMatrix::SlicedEll(m) => m.to_dense(),
            SparseMatrix::Hybrid(m) => m.to_dense(),
        }
    }
}

impl<T> From<CsrMatrix<T>> for SparseMatrix<T> {
    fn from(matrix: CsrMatrix<T>) -> Self {
        SparseMatrix::Csr(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn every_format_expands_to_the_same_dense_matrix() {
        let dense = array![
            [1.0f64, 0.0, 2.0, 0.0],
            [0.0, 0.0, 0.0, 0.0],
            [4.0, 0.0, 5.0, 6.0],
        ];
        let csr = CsrMatrix::from_dense(&dense);
        for format in SparseFormat::ALL {
            let matrix = SparseMatrix::convert(&csr, format).expect("convert");
            assert_eq!(matrix.format(), format);
            assert_eq!(matrix.rows(), 3);
            assert_eq!(matrix.cols(), 4);
            assert_eq!(matrix.nnz(), 5, "{format}");
            assert_eq!(matrix.to_dense(), dense, "{format}");
        }
    }

    #[test]
    fn explicit_zeros_count_as_stored_in_every_format() {
        let triplets = [
            (0, 0, 1.0f64),
            (0, 2, 0.0),
            (1, 1, 0.0),
            (2, 0, 4.0),
            (2, 1, 3.0),
            (2, 3, 0.0),
        ];
        let csr = CsrMatrix::from_triplets(3, 4, &triplets).expect("csr");
        assert_eq!(csr.nnz(), 6);
        for format in SparseFormat::ALL {
            let matrix = SparseMatrix::convert(&csr, format).expect("convert");
            assert_eq!(matrix.nnz(), 6, "{format}");
        }
    }
}
