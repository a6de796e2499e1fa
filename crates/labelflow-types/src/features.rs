//! The dense feature matrix supplied by the feature source.
//!
//! Row-major `[N, D]` storage. The core never mutates this input; components
//! share it behind an `Arc`.

use crate::error::CoreError;

/// Dense row-major `[N, D]` matrix of sample features.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
}

impl FeatureMatrix {
    /// Create a matrix from row-major data.
    pub fn new(data: Vec<f32>, rows: usize, cols: usize) -> Result<Self, CoreError> {
        if data.len() != rows * cols {
            return Err(CoreError::InvalidInput(format!(
                "feature data length {} does not match {}x{}",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(Self { data, rows, cols })
    }

    /// Create a matrix from per-sample rows. All rows must share one width.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, CoreError> {
        let n = rows.len();
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(n * cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(CoreError::InvalidInput(format!(
                    "row {} has width {}, expected {}",
                    i,
                    row.len(),
                    cols
                )));
            }
            data.extend_from_slice(row);
        }
        Self::new(data, n, cols)
    }

    /// Number of samples.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Feature dimension.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// One sample's feature row.
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// The full row-major buffer.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Iterate over sample rows in pid order.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.cols.max(1))
    }
}
