//! Secret-shared dot products.
//!
//! Two interchangeable protocols produce a share of `u . v`: one burns k
//! Beaver triples (one round per coordinate, two u64 each), the other
//! burns a single Du–Atallah correlation (one round, two k-length vectors
//! each). The query pipeline uses the Beaver path; the dealer provisions
//! the one-shot correlation for the single-round variant alongside it.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use oblivrec_core::{BeaverTriple, DotCorrelation, Ring64, RingVec, WireError};

use crate::error::ProtocolError;
use crate::mul::secure_mul;
use crate::peer::PeerChannel;

#[async_trait]
pub trait DotProduct<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Compute this party's share of `u . v` over the peer channel.
    async fn dot(
        &mut self,
        chan: &mut PeerChannel<S>,
        u: &RingVec,
        v: &RingVec,
    ) -> Result<Ring64, ProtocolError>;
}

/// Dot product via k Beaver multiplications, one triple per coordinate.
pub struct BeaverDot<'a> {
    triples: &'a [BeaverTriple],
}

impl<'a> BeaverDot<'a> {
    pub fn new(triples: &'a [BeaverTriple]) -> Self {
        BeaverDot { triples }
    }
}

#[async_trait]
impl<'a, S> DotProduct<S> for BeaverDot<'a>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn dot(
        &mut self,
        chan: &mut PeerChannel<S>,
        u: &RingVec,
        v: &RingVec,
    ) -> Result<Ring64, ProtocolError> {
        if u.len() != v.len() || self.triples.len() != u.len() {
            return Err(WireError::LengthMismatch {
                expected: u.len(),
                got: self.triples.len().min(v.len()),
            }
            .into());
        }
        let mut acc = Ring64::ZERO;
        for i in 0..u.len() {
            acc += secure_mul(chan, u[i], v[i], &self.triples[i]).await?;
        }
        Ok(acc)
    }
}

/// Dot product via one Du–Atallah correlation and a single masked
/// vector-pair exchange.
pub struct CorrelatedDot<'a> {
    correlation: &'a DotCorrelation,
    query_idx: u32,
}

impl<'a> CorrelatedDot<'a> {
    pub fn new(correlation: &'a DotCorrelation, query_idx: u32) -> Self {
        CorrelatedDot {
            correlation,
            query_idx,
        }
    }
}

#[async_trait]
impl<'a, S> DotProduct<S> for CorrelatedDot<'a>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn dot(
        &mut self,
        chan: &mut PeerChannel<S>,
        u: &RingVec,
        v: &RingVec,
    ) -> Result<Ring64, ProtocolError> {
        if u.len() != v.len() || self.correlation.dimension() != u.len() {
            return Err(WireError::LengthMismatch {
                expected: u.len(),
                got: self.correlation.dimension().min(v.len()),
            }
            .into());
        }
        let (mx, my) = self.correlation.mask(u, v);
        let (peer_mx, peer_my) = chan.exchange_vec_pair(self.query_idx, &mx, &my).await?;
        Ok(self.correlation.combine(u, v, &peer_mx, &peer_my))
    }
}
