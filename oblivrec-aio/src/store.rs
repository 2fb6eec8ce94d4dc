//! Matrix-share persistence and the per-query results log.
//!
//! Each party owns its share files outright; reads parse the whole file
//! and writes rewrite it through a temp file followed by a rename, so a
//! crash never leaves a half-written matrix behind. File I/O is
//! synchronous and brief; sockets are the only suspension points.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use oblivrec_core::{MatrixShare, RingVec};

use crate::error::ProtocolError;

/// Handle on one on-disk matrix share file.
#[derive(Clone, Debug)]
pub struct MatrixStore {
    path: PathBuf,
}

impl MatrixStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MatrixStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<MatrixShare, ProtocolError> {
        let text = fs::read_to_string(&self.path)?;
        Ok(MatrixShare::parse(&text)?)
    }

    /// Rewrite the whole file atomically.
    pub fn save(&self, matrix: &MatrixShare) -> Result<(), ProtocolError> {
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, matrix.to_text())?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Read-modify-write of a single row.
    pub fn update_row(&self, row: usize, values: &RingVec) -> Result<(), ProtocolError> {
        let mut matrix = self.load()?;
        matrix.set_row(row, values)?;
        self.save(&matrix)
    }
}

/// Append-only log of updated user rows, one record per processed query.
#[derive(Clone, Debug)]
pub struct ResultLog {
    path: PathBuf,
}

impl ResultLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ResultLog { path: path.into() }
    }

    pub fn append(
        &self,
        query_idx: usize,
        user_idx: usize,
        row: &RingVec,
    ) -> Result<(), ProtocolError> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let values = row
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(
            file,
            "query {query_idx} by user #{user_idx} | updated share: {values}"
        )?;
        Ok(())
    }
}
