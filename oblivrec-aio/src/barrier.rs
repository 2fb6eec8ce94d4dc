//! Lockstep barriers on the peer channel.
//!
//! Two tiny frames keep the parties aligned: a preprocessing barrier after
//! both have drained the dealer stream, and a per-query barrier carrying
//! the query index so no Beaver or diff message can be confused across
//! queries on the single peer stream. Frames are u32 in native byte order;
//! both ends run the same binary.

use tokio::io::{AsyncRead, AsyncWrite};

use oblivrec_core::Role;

use crate::error::ProtocolError;
use crate::peer::PeerChannel;

const CODE_PREP: u32 = 1;
const CODE_QUERY: u32 = 2;

/// Both parties rendezvous here before the first query: P0 announces, P1
/// echoes.
pub async fn preprocessing_barrier<S>(chan: &mut PeerChannel<S>) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    match chan.role() {
        Role::P0 => {
            chan.send_u32_native(CODE_PREP).await?;
            let ack = chan.recv_u32_native().await?;
            if ack != CODE_PREP {
                return Err(ProtocolError::BarrierCode {
                    expected: CODE_PREP,
                    got: ack,
                });
            }
        }
        Role::P1 => {
            let code = chan.recv_u32_native().await?;
            chan.send_u32_native(code).await?;
            if code != CODE_PREP {
                return Err(ProtocolError::BarrierCode {
                    expected: CODE_PREP,
                    got: code,
                });
            }
        }
    }
    Ok(())
}

/// Per-query rendezvous carrying the index. A disagreeing index on either
/// side is terminal.
pub async fn query_barrier<S>(chan: &mut PeerChannel<S>, idx: u32) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    match chan.role() {
        Role::P0 => {
            chan.send_u32_native(CODE_QUERY).await?;
            chan.send_u32_native(idx).await?;
            let code = chan.recv_u32_native().await?;
            let echo = chan.recv_u32_native().await?;
            if code != CODE_QUERY {
                return Err(ProtocolError::BarrierCode {
                    expected: CODE_QUERY,
                    got: code,
                });
            }
            if echo != idx {
                return Err(ProtocolError::BarrierMismatch {
                    sent: idx,
                    got: echo,
                });
            }
        }
        Role::P1 => {
            let code = chan.recv_u32_native().await?;
            let peer_idx = chan.recv_u32_native().await?;
            // Echo before validating so P0 is never left waiting.
            chan.send_u32_native(code).await?;
            chan.send_u32_native(peer_idx).await?;
            if code != CODE_QUERY {
                return Err(ProtocolError::BarrierCode {
                    expected: CODE_QUERY,
                    got: code,
                });
            }
            if peer_idx != idx {
                return Err(ProtocolError::BarrierMismatch {
                    sent: idx,
                    got: peer_idx,
                });
            }
        }
    }
    Ok(())
}
