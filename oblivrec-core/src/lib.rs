//! Core primitives for the oblivious recommender update protocol.
//!
//! Two compute parties hold additive shares of a user-factor matrix and an
//! item-factor matrix in the ring Z/2^64Z; an offline dealer provisions
//! correlated randomness (Du–Atallah dot-product correlations, Beaver
//! triples and distributed point function keys). This crate contains the
//! sans-io pieces: ring arithmetic, the DPF generator and evaluators, the
//! dealer-side randomness generators, and the byte/text formats that cross
//! the wire or live on disk. All networking lives in `oblivrec-aio`.

pub mod correlation;
pub mod dpf;
pub mod errors;
pub mod matrix;
pub mod prg;
pub mod query;
pub mod ring;
pub mod triple;
pub mod wire;

pub use correlation::DotCorrelation;
pub use dpf::{DpfError, DpfKey};
pub use errors::ConfigError;
pub use matrix::MatrixShare;
pub use query::{Params, Query};
pub use ring::{Ring64, RingVec, Role};
pub use triple::BeaverTriple;
pub use wire::WireError;
