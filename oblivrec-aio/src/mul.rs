//! Beaver multiplication over the peer channel.

use tokio::io::{AsyncRead, AsyncWrite};

use oblivrec_core::{BeaverTriple, Ring64};

use crate::error::ProtocolError;
use crate::peer::PeerChannel;

/// Multiply two shared values with one role-ordered exchange, consuming
/// one triple. Returns this party's share of the product.
pub async fn secure_mul<S>(
    chan: &mut PeerChannel<S>,
    a: Ring64,
    b: Ring64,
    triple: &BeaverTriple,
) -> Result<Ring64, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (mx, my) = triple.mask(a, b);
    let (peer_mx, peer_my) = chan.exchange_pair(mx, my).await?;
    Ok(triple.combine(a, b, peer_mx, peer_my))
}

#[cfg(test)]
mod tests {
    use super::*;
    use oblivrec_core::Role;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha12Rng;

    #[tokio::test]
    async fn product_reconstructs() {
        let mut rng = ChaCha12Rng::seed_from_u64(41);
        for _ in 0..20 {
            let a = Ring64::new(rng.gen());
            let b = Ring64::new(rng.gen());
            let a0 = Ring64::new(rng.gen());
            let b0 = Ring64::new(rng.gen());
            let (t0, t1) = BeaverTriple::generate(&mut rng);

            let (s0, s1) = tokio::io::duplex(1024);
            let mut p0 = PeerChannel::new(Role::P0, s0);
            let mut p1 = PeerChannel::new(Role::P1, s1);
            let (c0, c1) = tokio::join!(
                secure_mul(&mut p0, a0, b0, &t0),
                secure_mul(&mut p1, a - a0, b - b0, &t1)
            );
            assert_eq!(c0.unwrap() + c1.unwrap(), a * b);
        }
    }
}
