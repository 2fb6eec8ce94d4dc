//! Beaver multiplication triples.
//!
//! The dealer samples one triple pair per secure multiplication; each
//! party's half carries its masks `(x, y)` and a cross-term share `z`. For
//! shared inputs `<a>`, `<b>` the parties announce `(a + x, b + y)` to each
//! other and combine locally; the announced values are uniform, so the
//! exchange reveals nothing about `a` or `b`.

use rand::RngCore;

use crate::ring::Ring64;

/// One party's half of a multiplication triple. Single use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BeaverTriple {
    pub x: Ring64,
    pub y: Ring64,
    pub z: Ring64,
}

impl BeaverTriple {
    /// Dealer side: sample a fresh pair of halves.
    ///
    /// The cross-term shares satisfy `z0 + z1 = x0*y1 + x1*y0`, which is
    /// exactly the term the combination formula leaves standing; with it
    /// the reconstructed output equals `a*b`.
    pub fn generate(rng: &mut dyn RngCore) -> (BeaverTriple, BeaverTriple) {
        let x0 = Ring64::new(rng.next_u64());
        let x1 = Ring64::new(rng.next_u64());
        let y0 = Ring64::new(rng.next_u64());
        let y1 = Ring64::new(rng.next_u64());
        let alpha = Ring64::new(rng.next_u64());
        let half0 = BeaverTriple {
            x: x0,
            y: y0,
            z: x0 * y1 + alpha,
        };
        let half1 = BeaverTriple {
            x: x1,
            y: y1,
            z: x1 * y0 - alpha,
        };
        (half0, half1)
    }

    /// Masked operands announced to the peer.
    pub fn mask(&self, a: Ring64, b: Ring64) -> (Ring64, Ring64) {
        (a + self.x, b + self.y)
    }

    /// Local combination after the exchange: this party's share of `a*b`.
    pub fn combine(&self, a: Ring64, b: Ring64, peer_mx: Ring64, peer_my: Ring64) -> Ring64 {
        a * (b + peer_my) - self.y * peer_mx + self.z
    }
}
