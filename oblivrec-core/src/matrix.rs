//! Row-major matrix shares and their on-disk text format.
//!
//! A matrix file is a `rows cols` header line followed by `rows` lines of
//! `cols` signed decimals. Each compute party owns one such file per
//! factor matrix; reads parse the whole file and writes go through a
//! temp-file-and-rename in `oblivrec-aio`.

use crate::errors::ConfigError;
use crate::ring::{Ring64, RingVec};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatrixShare {
    rows: usize,
    cols: usize,
    cells: Vec<Ring64>,
}

impl MatrixShare {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        MatrixShare {
            rows,
            cols,
            cells: vec![Ring64::ZERO; rows * cols],
        }
    }

    pub fn from_rows(rows_data: Vec<Vec<Ring64>>) -> Self {
        let rows = rows_data.len();
        let cols = rows_data.first().map(Vec::len).unwrap_or(0);
        let cells = rows_data.into_iter().flatten().collect();
        MatrixShare { rows, cols, cells }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    fn check_row(&self, row: usize) -> Result<(), ConfigError> {
        if row >= self.rows {
            return Err(ConfigError::RowOutOfRange {
                row,
                rows: self.rows,
            });
        }
        Ok(())
    }

    pub fn row(&self, row: usize) -> Result<RingVec, ConfigError> {
        self.check_row(row)?;
        Ok(RingVec::new(
            self.cells[row * self.cols..(row + 1) * self.cols].to_vec(),
        ))
    }

    pub fn set_row(&mut self, row: usize, values: &RingVec) -> Result<(), ConfigError> {
        self.check_row(row)?;
        if values.len() != self.cols {
            return Err(ConfigError::WrongLength {
                expected: self.cols,
                got: values.len(),
            });
        }
        self.cells[row * self.cols..(row + 1) * self.cols].copy_from_slice(values.as_slice());
        Ok(())
    }

    /// Add `delta` into the cell at `(row, col)`.
    pub fn add_to_cell(&mut self, row: usize, col: usize, delta: Ring64) {
        debug_assert!(row < self.rows && col < self.cols);
        self.cells[row * self.cols + col] += delta;
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut tokens = text.split_whitespace();
        let mut header = |what: &str| -> Result<usize, ConfigError> {
            let tok = tokens
                .next()
                .ok_or_else(|| ConfigError::Truncated(format!("matrix {what}")))?;
            tok.parse::<usize>()
                .map_err(|_| ConfigError::BadHeader(tok.to_string()))
        };
        let rows = header("row count")?;
        let cols = header("column count")?;
        let mut cells = Vec::with_capacity(rows * cols);
        for _ in 0..rows * cols {
            let tok = tokens
                .next()
                .ok_or_else(|| ConfigError::Truncated("matrix body".to_string()))?;
            cells.push(
                tok.parse::<Ring64>()
                    .map_err(|_| ConfigError::BadValue(tok.to_string()))?,
            );
        }
        Ok(MatrixShare { rows, cols, cells })
    }

    pub fn to_text(&self) -> String {
        let mut out = format!("{} {}\n", self.rows, self.cols);
        for row in 0..self.rows {
            let line = self.cells[row * self.cols..(row + 1) * self.cols]
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}
