//! Async IO layer for the oblivious recommender update protocol.
//!
//! Everything here runs on a cooperative scheduler where socket reads and
//! writes are the only suspension points: the peer channel with its
//! role-ordered exchanges, the lockstep barriers, Beaver multiplication
//! and the two dot-product variants, the dealer preprocessing stream
//! decoder, matrix-share persistence, and the per-query update pipeline.

pub mod barrier;
pub mod dealer_stream;
pub mod dot;
pub mod error;
pub mod mul;
pub mod peer;
pub mod store;
pub mod update;

pub use barrier::{preprocessing_barrier, query_barrier};
pub use dealer_stream::DealerStream;
pub use dot::{BeaverDot, CorrelatedDot, DotProduct};
pub use error::ProtocolError;
pub use mul::secure_mul;
pub use peer::PeerChannel;
pub use store::{MatrixStore, ResultLog};
pub use update::{update_item_matrix, update_user_row, QueryContext, UserRowUpdate};
