//! The duplex peer channel between the two compute parties.
//!
//! Every exchange on this channel is role-ordered: P0 writes then reads,
//! P1 reads then writes. Both parties run the same exchange at the same
//! point of the lockstep query loop, so the asymmetric schedule is enough
//! to avoid deadlock on the single stream. Values travel as big-endian
//! u64; the barrier frames (see [`crate::barrier`]) use native-order u32.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use oblivrec_core::wire::{VEC_PAIR_MAGIC, VEC_PAIR_VERSION};
use oblivrec_core::{Ring64, RingVec, Role, WireError};

use crate::error::ProtocolError;

pub struct PeerChannel<S> {
    role: Role,
    stream: S,
}

impl<S> PeerChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(role: Role, stream: S) -> Self {
        PeerChannel { role, stream }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    async fn send_values(&mut self, values: &[Ring64]) -> Result<(), ProtocolError> {
        let mut buf = Vec::with_capacity(values.len() * 8);
        for v in values {
            buf.extend_from_slice(&v.into_inner().to_be_bytes());
        }
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn recv_values(&mut self, count: usize) -> Result<Vec<Ring64>, ProtocolError> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(Ring64::new(self.stream.read_u64().await?));
        }
        Ok(out)
    }

    /// Exchange a fixed-size batch of ring values with the peer under the
    /// role-ordered schedule.
    pub async fn exchange(&mut self, mine: &[Ring64]) -> Result<Vec<Ring64>, ProtocolError> {
        match self.role {
            Role::P0 => {
                self.send_values(mine).await?;
                self.recv_values(mine.len()).await
            }
            Role::P1 => {
                let theirs = self.recv_values(mine.len()).await?;
                self.send_values(mine).await?;
                Ok(theirs)
            }
        }
    }

    /// The Beaver exchange: two u64 each way.
    pub async fn exchange_pair(
        &mut self,
        a: Ring64,
        b: Ring64,
    ) -> Result<(Ring64, Ring64), ProtocolError> {
        let theirs = self.exchange(&[a, b]).await?;
        Ok((theirs[0], theirs[1]))
    }

    /// The DPF diff exchange: one u64 each way.
    pub async fn exchange_one(&mut self, value: Ring64) -> Result<Ring64, ProtocolError> {
        let theirs = self.exchange(&[value]).await?;
        Ok(theirs[0])
    }

    async fn send_vec_pair(
        &mut self,
        query_idx: u32,
        x: &RingVec,
        y: &RingVec,
    ) -> Result<(), ProtocolError> {
        let mut buf = Vec::with_capacity(20 + (x.len() + y.len()) * 8);
        buf.extend_from_slice(&VEC_PAIR_MAGIC.to_be_bytes());
        buf.extend_from_slice(&VEC_PAIR_VERSION.to_be_bytes());
        buf.extend_from_slice(&query_idx.to_be_bytes());
        buf.extend_from_slice(&(x.len() as u32).to_be_bytes());
        buf.extend_from_slice(&(y.len() as u32).to_be_bytes());
        for v in x.iter().chain(y.iter()) {
            buf.extend_from_slice(&v.into_inner().to_be_bytes());
        }
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn recv_vec_pair(
        &mut self,
        query_idx: u32,
    ) -> Result<(RingVec, RingVec), ProtocolError> {
        let magic = self.stream.read_u32().await?;
        if magic != VEC_PAIR_MAGIC {
            return Err(WireError::BadMagic {
                expected: VEC_PAIR_MAGIC,
                got: magic,
            }
            .into());
        }
        let version = self.stream.read_u32().await?;
        if version != VEC_PAIR_VERSION {
            return Err(WireError::BadHeader(format!("vector exchange version {version}")).into());
        }
        let peer_idx = self.stream.read_u32().await?;
        if peer_idx != query_idx {
            return Err(ProtocolError::QueryIndexMismatch {
                expected: query_idx,
                got: peer_idx,
            });
        }
        let len_x = self.stream.read_u32().await? as usize;
        let len_y = self.stream.read_u32().await? as usize;
        let x = RingVec::new(self.recv_values(len_x).await?);
        let y = RingVec::new(self.recv_values(len_y).await?);
        Ok((x, y))
    }

    /// Exchange two masked vectors (the Du–Atallah round), framed with the
    /// `DXCH` header carrying the query index for cross-query sanity.
    pub async fn exchange_vec_pair(
        &mut self,
        query_idx: u32,
        x: &RingVec,
        y: &RingVec,
    ) -> Result<(RingVec, RingVec), ProtocolError> {
        let theirs = match self.role {
            Role::P0 => {
                self.send_vec_pair(query_idx, x, y).await?;
                self.recv_vec_pair(query_idx).await?
            }
            Role::P1 => {
                let theirs = self.recv_vec_pair(query_idx).await?;
                self.send_vec_pair(query_idx, x, y).await?;
                theirs
            }
        };
        if theirs.0.len() != x.len() || theirs.1.len() != y.len() {
            return Err(WireError::LengthMismatch {
                expected: x.len(),
                got: theirs.0.len(),
            }
            .into());
        }
        Ok(theirs)
    }

    pub(crate) async fn send_u32_native(&mut self, value: u32) -> Result<(), ProtocolError> {
        self.stream.write_all(&value.to_ne_bytes()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    pub(crate) async fn recv_u32_native(&mut self) -> Result<u32, ProtocolError> {
        let mut buf = [0u8; 4];
        self.stream.read_exact(&mut buf).await?;
        Ok(u32::from_ne_bytes(buf))
    }
}
