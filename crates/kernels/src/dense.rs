//! Dense vector and matrix operands with offset, stride and padding.

use crate::config::{Layout, MemoryLocation};
use crate::error::{ensure_dim, SparseError, SparseResult};
use crate::scalar::Scalar;
use ndarray::{Array1, Array2};

/// Strided window of a dense vector's backing buffer.
///
/// Logical element `i` lives at `data[start + i * stride]`; the length of
/// `data` is the internal size.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseVector<T> {
    data: Vec<T>,
    start: usize,
    stride: usize,
    size: usize,
    location: MemoryLocation,
}

impl<T: Scalar> DenseVector<T> {
    pub fn from_vec(values: Vec<T>) -> Self {
        let size = values.len();
        Self {
            data: values,
            start: 0,
            stride: 1,
            size,
            location: MemoryLocation::Host,
        }
    }

    pub fn zeros(size: usize) -> Self {
        Self::from_vec(vec![T::zero(); size])
    }

    /// Wraps `data` so that only every `stride`-th element from `start` on is
    /// addressed.
    pub fn strided(data: Vec<T>, start: usize, stride: usize, size: usize) -> SparseResult<Self> {
        if stride == 0 {
            return Err(SparseError::structure("dense vector", "stride must be positive"));
        }
        if size > 0 && start + (size - 1) * stride >= data.len() {
            return Err(SparseError::structure(
                "dense vector",
                format!(
                    "{size} elements from offset {start} with stride {stride} exceed internal size {}",
                    data.len()
                ),
            ));
        }
        Ok(Self {
            data,
            start,
            stride,
            size,
            location: MemoryLocation::Host,
        })
    }

    pub fn with_location(mut self, location: MemoryLocation) -> Self {
        self.location = location;
        self
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn internal_size(&self) -> usize {
        self.data.len()
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn location(&self) -> MemoryLocation {
        self.location
    }

    pub fn set_location(&mut self, location: MemoryLocation) {
        self.location = location;
    }

    #[inline]
    pub fn get(&self, index: usize) -> T {
        self.data[self.start + index * self.stride]
    }

    #[inline]
    pub fn set(&mut self, index: usize, value: T) {
        self.data[self.start + index * self.stride] = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.size).map(move |i| self.get(i))
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    pub fn fill(&mut self, value: T) {
        for i in 0..self.size {
            self.set(i, value);
        }
    }

    /// Copies logical values into the addressed elements, leaving padding alone.
    pub fn assign(&mut self, values: &[T]) -> SparseResult<()> {
        ensure_dim("vector assign", self.size, values.len())?;
        for (i, &value) in values.iter().enumerate() {
            self.set(i, value);
        }
        Ok(())
    }

    /// The whole backing buffer including padding.
    pub fn as_raw(&self) -> &[T] {
        &self.data
    }

    pub fn to_array(&self) -> Array1<T> {
        Array1::from_vec(self.to_vec())
    }
}

impl<T: Scalar> From<Array1<T>> for DenseVector<T> {
    fn from(array: Array1<T>) -> Self {
        Self::from_vec(array.to_vec())
    }
}

/// One axis of a dense matrix window: `size` elements from `start`, `stride` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisRange {
    pub start: usize,
    pub stride: usize,
    pub size: usize,
}

impl AxisRange {
    pub fn full(size: usize) -> Self {
        Self {
            start: 0,
            stride: 1,
            size,
        }
    }

    fn last(&self) -> Option<usize> {
        (self.size > 0).then(|| self.start + (self.size - 1) * self.stride)
    }
}

/// Dense matrix window over a padded `internal_rows × internal_cols` buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix<T> {
    data: Vec<T>,
    internal_rows: usize,
    internal_cols: usize,
    rows: AxisRange,
    cols: AxisRange,
    layout: Layout,
}

impl<T: Scalar> DenseMatrix<T> {
    pub fn zeros(rows: usize, cols: usize, layout: Layout) -> Self {
        Self {
            data: vec![T::zero(); rows * cols],
            internal_rows: rows,
            internal_cols: cols,
            rows: AxisRange::full(rows),
            cols: AxisRange::full(cols),
            layout,
        }
    }

    pub fn from_array(array: &Array2<T>, layout: Layout) -> Self {
        let mut matrix = Self::zeros(array.nrows(), array.ncols(), layout);
        for ((i, j), &value) in array.indexed_iter() {
            matrix.set(i, j, value);
        }
        matrix
    }

    /// A window over an existing padded buffer.
    pub fn window(
        data: Vec<T>,
        layout: Layout,
        internal_rows: usize,
        internal_cols: usize,
        rows: AxisRange,
        cols: AxisRange,
    ) -> SparseResult<Self> {
        if rows.stride == 0 || cols.stride == 0 {
            return Err(SparseError::structure("dense matrix", "strides must be positive"));
        }
        ensure_dim("dense matrix buffer", internal_rows * internal_cols, data.len())?;
        if rows.last().is_some_and(|last| last >= internal_rows)
            || cols.last().is_some_and(|last| last >= internal_cols)
        {
            return Err(SparseError::structure(
                "dense matrix",
                format!(
                    "window {}x{} does not fit internal size {internal_rows}x{internal_cols}",
                    rows.size, cols.size
                ),
            ));
        }
        Ok(Self {
            data,
            internal_rows,
            internal_cols,
            rows,
            cols,
            layout,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows.size
    }

    pub fn cols(&self) -> usize {
        self.cols.size
    }

    pub fn internal_rows(&self) -> usize {
        self.internal_rows
    }

    pub fn internal_cols(&self) -> usize {
        self.internal_cols
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    #[inline]
    fn offset(&self, row: usize, col: usize) -> usize {
        let r = self.rows.start + row * self.rows.stride;
        let c = self.cols.start + col * self.cols.stride;
        match self.layout {
            Layout::RowMajor => r * self.internal_cols + c,
            Layout::ColumnMajor => r + c * self.internal_rows,
        }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> T {
        self.data[self.offset(row, col)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: T) {
        let offset = self.offset(row, col);
        self.data[offset] = value;
    }

    /// Writes a row-major block of logical values into the window.
    pub fn assign_row_major(&mut self, values: &[T]) -> SparseResult<()> {
        let cols = self.cols();
        ensure_dim("matrix assign", self.rows() * cols, values.len())?;
        for (index, &value) in values.iter().enumerate() {
            self.set(index / cols.max(1), index % cols.max(1), value);
        }
        Ok(())
    }

    pub fn as_raw(&self) -> &[T] {
        &self.data
    }

    pub fn to_array(&self) -> Array2<T> {
        Array2::from_shape_fn((self.rows(), self.cols()), |(i, j)| self.get(i, j))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn strided_vector_addresses_every_other_slot() {
        let vector =
            DenseVector::strided(vec![1.0f32, -1.0, 2.0, -1.0, 3.0], 0, 2, 3).expect("strided");
        assert_eq!(vector.to_vec(), vec![1.0, 2.0, 3.0]);
        assert_eq!(vector.internal_size(), 5);
    }

    #[test]
    fn strided_vector_rejects_out_of_bounds_window() {
        assert!(DenseVector::strided(vec![0.0f64; 4], 1, 2, 3).is_err());
        assert!(DenseVector::strided(vec![0.0f64; 4], 0, 0, 1).is_err());
    }

    #[test]
    fn assign_leaves_padding_untouched() {
        let mut vector =
            DenseVector::strided(vec![9.0f64; 6], 1, 2, 3).expect("strided");
        vector.assign(&[1.0, 2.0, 3.0]).expect("assign");
        assert_eq!(vector.as_raw(), &[9.0, 1.0, 9.0, 2.0, 9.0, 3.0]);
    }

    #[test]
    fn layouts_agree_on_logical_values() {
        let source = array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let row_major = DenseMatrix::from_array(&source, Layout::RowMajor);
        let col_major = DenseMatrix::from_array(&source, Layout::ColumnMajor);
        assert_eq!(row_major.to_array(), source);
        assert_eq!(col_major.to_array(), source);
        assert_eq!(col_major.as_raw(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn window_respects_offsets_in_padded_buffer() {
        let data: Vec<f64> = (0..20).map(f64::from).collect();
        let window = DenseMatrix::window(
            data,
            Layout::RowMajor,
            4,
            5,
            AxisRange {
                start: 1,
                stride: 2,
                size: 2,
            },
            AxisRange {
                start: 2,
                stride: 1,
                size: 3,
            },
        )
        .expect("window");
        assert_eq!(window.get(0, 0), 7.0);
        assert_eq!(window.get(1, 2), 19.0);
    }
}
