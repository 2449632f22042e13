//! Compressed sparse row storage.

use crate::config::{MemoryLocation, ADAPTIVE_SHARED_ELEMENTS};
use crate::error::{SparseError, SparseResult};
use crate::scalar::Scalar;
use ndarray::Array2;

#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix<T> {
    rows: usize,
    cols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<T>,
    row_blocks: Vec<usize>,
    location: MemoryLocation,
}

impl<T: Scalar> CsrMatrix<T> {
    pub fn new(
        rows: usize,
        cols: usize,
        row_ptr: Vec<usize>,
        col_idx: Vec<usize>,
        values: Vec<T>,
    ) -> SparseResult<Self> {
        validate_compressed("csr", rows, cols, &row_ptr, &col_idx, values.len())?;
        let row_blocks = build_row_blocks(&row_ptr, ADAPTIVE_SHARED_ELEMENTS);
        Ok(Self {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
            row_blocks,
            location: MemoryLocation::Host,
        })
    }

    /// Builds a matrix from `(row, col, value)` triples; duplicates are summed.
    pub fn from_triplets(rows: usize, cols: usize, triplets: &[(usize, usize, T)]) -> SparseResult<Self> {
        let mut sorted = triplets.to_vec();
        sorted.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut row_ptr = vec![0usize; rows + 1];
        let mut col_idx = Vec::with_capacity(sorted.len());
        let mut values: Vec<T> = Vec::with_capacity(sorted.len());
        let mut last: Option<(usize, usize)> = None;

        for &(row, col, value) in &sorted {
            if row >= rows || col >= cols {
                return Err(SparseError::structure(
                    "csr",
                    format!("entry ({row}, {col}) outside {rows}x{cols}"),
                ));
            }
            if last == Some((row, col)) {
                if let Some(slot) = values.last_mut() {
                    *slot += value;
                }
                continue;
            }
            col_idx.push(col);
            values.push(value);
            row_ptr[row + 1] += 1;
            last = Some((row, col));
        }
        for row in 0..rows {
            row_ptr[row + 1] += row_ptr[row];
        }
        Self::new(rows, cols, row_ptr, col_idx, values)
    }

    /// Keeps every nonzero of `dense`.
    pub fn from_dense(dense: &Array2<T>) -> Self {
        let (rows, cols) = dense.dim();
        let mut row_ptr = Vec::with_capacity(rows + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);
        for row in dense.outer_iter() {
            for (col, &value) in row.iter().enumerate() {
                if value != T::zero() {
                    col_idx.push(col);
                    values.push(value);
                }
            }
            row_ptr.push(col_idx.len());
        }
        let row_blocks = build_row_blocks(&row_ptr, ADAPTIVE_SHARED_ELEMENTS);
        Self {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
            row_blocks,
            location: MemoryLocation::Host,
        }
    }

    pub fn with_location(mut self, location: MemoryLocation) -> Self {
        self.location = location;
        self
    }

    /// Rebuilds the adaptive row blocks for a different staging capacity.
    pub fn with_block_capacity(mut self, capacity: usize) -> Self {
        self.row_blocks = build_row_blocks(&self.row_ptr, capacity.max(1));
        self
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn location(&self) -> MemoryLocation {
        self.location
    }

    pub fn row_ptr(&self) -> &[usize] {
        &self.row_ptr
    }

    pub fn col_idx(&self) -> &[usize] {
        &self.col_idx
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn row_blocks(&self) -> &[usize] {
        &self.row_blocks
    }

    pub fn row_len(&self, row: usize) -> usize {
        self.row_ptr[row + 1] - self.row_ptr[row]
    }

    pub fn max_row_len(&self) -> usize {
        (0..self.rows).map(|row| self.row_len(row)).max().unwrap_or(0)
    }

    /// Column indices and values of one row.
    pub fn row(&self, row: usize) -> (&[usize], &[T]) {
        let range = self.row_ptr[row]..self.row_ptr[row + 1];
        (&self.col_idx[range.clone()], &self.values[range])
    }

    pub fn diagonal(&self, row: usize) -> Option<T> {
        let (cols, values) = self.row(row);
        cols.iter().position(|&col| col == row).map(|pos| values[pos])
    }

    pub fn transpose(&self) -> Self {
        let mut counts = vec![0usize; self.cols + 1];
        for &col in &self.col_idx {
            counts[col + 1] += 1;
        }
        for col in 0..self.cols {
            counts[col + 1] += counts[col];
        }
        let row_ptr = counts.clone();
        let mut cursor = counts;
        let mut col_idx = vec![0usize; self.nnz()];
        let mut values = vec![T::zero(); self.nnz()];
        for row in 0..self.rows {
            let (cols, vals) = self.row(row);
            for (&col, &value) in cols.iter().zip(vals) {
                let slot = cursor[col];
                col_idx[slot] = row;
                values[slot] = value;
                cursor[col] += 1;
            }
        }
        let row_blocks = build_row_blocks(&row_ptr, ADAPTIVE_SHARED_ELEMENTS);
        Self {
            rows: self.cols,
            cols: self.rows,
            row_ptr,
            col_idx,
            values,
            row_blocks,
            location: self.location,
        }
    }

    pub fn to_dense(&self) -> Array2<T> {
        let mut dense = Array2::zeros((self.rows, self.cols));
        for row in 0..self.rows {
            let (cols, values) = self.row(row);
            for (&col, &value) in cols.iter().zip(values) {
                dense[(row, col)] += value;
            }
        }
        dense
    }
}

/// Checks the shared invariants of row-pointer based formats.
pub(crate) fn validate_compressed(
    format: &'static str,
    rows: usize,
    cols: usize,
    row_ptr: &[usize],
    col_idx: &[usize],
    value_count: usize,
) -> SparseResult<()> {
    if row_ptr.len() != rows + 1 {
        return Err(SparseError::structure(
            format,
            format!("row pointer has {} entries for {rows} rows", row_ptr.len()),
        ));
    }
    if row_ptr[0] != 0 {
        return Err(SparseError::structure(format, "row pointer must start at 0"));
    }
    if row_ptr.windows(2).any(|pair| pair[0] > pair[1]) {
        return Err(SparseError::structure(format, "row pointer is decreasing"));
    }
    let nnz = row_ptr[rows];
    if col_idx.len() != nnz || value_count != nnz {
        return Err(SparseError::structure(
            format,
            format!(
                "row pointer ends at {nnz} but there are {} column indices and {value_count} values",
                col_idx.len()
            ),
        ));
    }
    if let Some(&col) = col_idx.iter().find(|&&col| col >= cols) {
        return Err(SparseError::structure(
            format,
            format!("column index {col} out of range for {cols} columns"),
        ));
    }
    Ok(())
}

/// Groups consecutive rows into blocks whose nonzeros fit `capacity` staged
/// elements. A row longer than `capacity` gets a block of its own.
///
/// Returns block boundaries as row offsets, starting at 0 and ending at the
/// row count.
pub fn build_row_blocks(row_ptr: &[usize], capacity: usize) -> Vec<usize> {
    let rows = row_ptr.len().saturating_sub(1);
    let mut blocks = vec![0usize];
    let mut in_batch = 0usize;
    let mut row = 0usize;
    while row < rows {
        in_batch += row_ptr[row + 1] - row_ptr[row];
        if in_batch > capacity {
            let block_start = blocks.last().copied().unwrap_or(0);
            if row > block_start {
                // close before this row and reconsider it in a fresh block
                blocks.push(row);
                in_batch = 0;
                continue;
            }
            blocks.push(row + 1);
            in_batch = 0;
        }
        row += 1;
    }
    if blocks.last().copied() != Some(rows) {
        blocks.push(rows);
    }
    blocks
}
