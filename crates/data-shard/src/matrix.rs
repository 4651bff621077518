//! Dense row-major f32 matrix holding decoded shard rows

use runtime_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Row-major matrix of 32-bit floats
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    /// Build a matrix from row-major data
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::ShapeMismatch {
                context: format!("{}x{} matrix data", rows, cols),
                expected: rows * cols,
                actual: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// A matrix with no rows and no columns
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Build a matrix from equally long rows
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in &rows {
            if row.len() != cols {
                return Err(Error::ShapeMismatch {
                    context: "matrix row".to_string(),
                    expected: cols,
                    actual: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        if row < self.rows && col < self.cols {
            self.data[row * self.cols + col] = value;
        }
    }

    /// Borrow one row
    pub fn row(&self, row: usize) -> &[f32] {
        let start = row * self.cols;
        &self.data[start..start + self.cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        (0..self.rows).map(move |r| self.row(r))
    }

    /// Copy `len` rows starting at `start`, clamped to the matrix
    pub fn slice_rows(&self, start: usize, len: usize) -> Matrix {
        let start = start.min(self.rows);
        let end = (start + len).min(self.rows);
        Self {
            rows: end - start,
            cols: self.cols,
            data: self.data[start * self.cols..end * self.cols].to_vec(),
        }
    }

    /// Column index of the largest value in a row
    pub fn argmax_row(&self, row: usize) -> Option<usize> {
        if row >= self.rows || self.cols == 0 {
            return None;
        }
        self.row(row)
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f32)>, (col, &value)| match best {
                Some((_, best_value)) if best_value >= value => best,
                _ => Some((col, value)),
            })
            .map(|(col, _)| col)
    }

    /// Stack matrices vertically, skipping empty ones
    pub fn vstack(parts: &[Matrix]) -> Result<Matrix> {
        let mut non_empty = parts.iter().filter(|m| !m.is_empty());
        let Some(first) = non_empty.next() else {
            return Ok(Matrix::empty());
        };

        let mut stacked = first.clone();
        for part in non_empty {
            if part.cols != stacked.cols {
                return Err(Error::ShapeMismatch {
                    context: "stacked shard columns".to_string(),
                    expected: stacked.cols,
                    actual: part.cols,
                });
            }
            stacked.data.extend_from_slice(&part.data);
            stacked.rows += part.rows;
        }
        Ok(stacked)
    }
}
