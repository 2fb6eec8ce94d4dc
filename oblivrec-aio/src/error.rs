//! Protocol-layer errors.
//!
//! Every variant is terminal for the owning party's process: there is no
//! recovery and no retry on any channel. Peers are not notified; they
//! detect the resulting truncation themselves.

use thiserror::Error;

use oblivrec_core::{ConfigError, DpfError, WireError};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("dpf error: {0}")]
    Dpf(#[from] DpfError),
    #[error("barrier mismatch: sent index {sent}, peer answered {got}")]
    BarrierMismatch { sent: u32, got: u32 },
    #[error("barrier code mismatch: expected {expected}, got {got}")]
    BarrierCode { expected: u32, got: u32 },
    #[error("peer reported query {got}, expected {expected}")]
    QueryIndexMismatch { expected: u32, got: u32 },
    #[error("dpf key has {got} levels, domain of size {domain} needs {expected}")]
    KeyDomainMismatch {
        domain: usize,
        expected: usize,
        got: usize,
    },
}
