//! Du–Atallah dot-product correlations.
//!
//! One correlation buys one secret-shared dot product with a single round
//! of vector exchange: each party masks its input vectors with `(X, Y)`,
//! the peers swap the masked vectors, and the `z` cross-term shares cancel
//! everything except `u . v`.

use rand::RngCore;

use crate::ring::{Ring64, RingVec};

/// One party's half of a dot-product correlation. Single use.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DotCorrelation {
    pub x: RingVec,
    pub y: RingVec,
    pub z: Ring64,
}

impl DotCorrelation {
    /// Dealer side: sample a fresh pair of halves for dimension `k`.
    ///
    /// `z0 + z1 = X0.Y1 + X1.Y0`, the masked-exchange cross term.
    pub fn generate(k: usize, rng: &mut dyn RngCore) -> (DotCorrelation, DotCorrelation) {
        let mut sample = |len: usize| -> RingVec {
            (0..len).map(|_| Ring64::new(rng.next_u64())).collect()
        };
        let x0 = sample(k);
        let x1 = sample(k);
        let y0 = sample(k);
        let y1 = sample(k);
        let alpha = Ring64::new(rng.next_u64());
        let z0 = x0.dot(&y1) + alpha;
        let z1 = y0.dot(&x1) - alpha;
        (
            DotCorrelation { x: x0, y: y0, z: z0 },
            DotCorrelation { x: x1, y: y1, z: z1 },
        )
    }

    pub fn dimension(&self) -> usize {
        self.x.len()
    }

    /// Masked vectors announced to the peer.
    pub fn mask(&self, u: &RingVec, v: &RingVec) -> (RingVec, RingVec) {
        (u.add(&self.x), v.add(&self.y))
    }

    /// Local combination after the exchange: this party's share of `u . v`.
    /// The `Y` mask (not the input share) multiplies the peer's masked x;
    /// that is what makes the mask cross terms cancel against `z`.
    pub fn combine(
        &self,
        u: &RingVec,
        v: &RingVec,
        peer_mx: &RingVec,
        peer_my: &RingVec,
    ) -> Ring64 {
        u.dot(&v.add(peer_my)) - self.y.dot(peer_mx) + self.z
    }
}
