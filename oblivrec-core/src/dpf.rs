//! Distributed point function over Z/2^64Z.
//!
//! `gen(domain, alpha, beta, rng)` produces a key pair for the function
//! that is `beta` at `alpha` and zero elsewhere; evaluating both keys at
//! any point yields additive shares of the function value (party 0 emits
//! `+s`, party 1 emits `-s`, so reconstruction is a wrapping add).
//!
//! The tree walks `ceil(log2(domain))` levels; bit 0 of `alpha` is the most
//! significant bit of that representation. Off the path to `alpha` the two
//! parties' states are forced equal by the per-level correction words,
//! while on the path their control bits keep xoring to one.

use rand::RngCore;
use thiserror::Error;

use crate::prg::{expand, PrgOutput};
use crate::ring::Ring64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DpfError {
    #[error("domain size must be at least 1")]
    DomainEmpty,
    #[error("point {alpha} outside domain of size {domain}")]
    AlphaOutOfRange { alpha: u64, domain: u64 },
}

/// Per-level correction word, identical in both keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CorrectionWord {
    pub s_l: u64,
    pub s_r: u64,
    pub t_l: bool,
    pub t_r: bool,
}

/// One party's DPF key. The two keys of a pair share `cws` and `cw_out`
/// and differ only in the root seed and control bit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DpfKey {
    pub s0: u64,
    pub t0: bool,
    pub cws: Vec<CorrectionWord>,
    pub cw_out: u64,
}

impl DpfKey {
    /// Tree depth; equals `ceil(log2(domain))` of the generation domain.
    pub fn levels(&self) -> usize {
        self.cws.len()
    }
}

/// `ceil(log2(domain))`, with the convention that a singleton domain needs
/// zero levels.
pub fn levels_for(domain: u64) -> usize {
    if domain <= 1 {
        0
    } else {
        (64 - (domain - 1).leading_zeros()) as usize
    }
}

fn bit_at(x: u64, level: usize, levels: usize) -> bool {
    (x >> (levels - 1 - level)) & 1 == 1
}

/// Advance one party's state by one level: apply the correction word when
/// the control bit is set, then take the requested branch.
fn descend(g: &PrgOutput, t: bool, cw: &CorrectionWord, right: bool) -> (u64, bool) {
    let (mut s_l, mut s_r, mut t_l, mut t_r) = (g.s_l, g.s_r, g.t_l, g.t_r);
    if t {
        s_l ^= cw.s_l;
        t_l ^= cw.t_l;
        s_r ^= cw.s_r;
        t_r ^= cw.t_r;
    }
    if right {
        (s_r, t_r)
    } else {
        (s_l, t_l)
    }
}

/// Generate a key pair for the point function `f(alpha) = beta`, zero
/// elsewhere, over `[0, domain)`.
pub fn gen(
    domain: u64,
    alpha: u64,
    beta: Ring64,
    rng: &mut dyn RngCore,
) -> Result<(DpfKey, DpfKey), DpfError> {
    if domain == 0 {
        return Err(DpfError::DomainEmpty);
    }
    if alpha >= domain {
        return Err(DpfError::AlphaOutOfRange { alpha, domain });
    }

    let levels = levels_for(domain);
    let root_a = rng.next_u64();
    let root_b = rng.next_u64();

    // Root control bits must differ; the on-path invariant is tA ^ tB = 1.
    let (mut s_a, mut t_a) = (root_a, false);
    let (mut s_b, mut t_b) = (root_b, true);

    let mut cws = Vec::with_capacity(levels);
    for level in 0..levels {
        let on_right = bit_at(alpha, level, levels);
        let g_a = expand(s_a);
        let g_b = expand(s_b);

        let mut cw = CorrectionWord {
            s_l: g_a.s_l ^ g_b.s_l,
            s_r: g_a.s_r ^ g_b.s_r,
            t_l: g_a.t_l ^ g_b.t_l,
            t_r: g_a.t_r ^ g_b.t_r,
        };
        // Flip exactly one control delta: the on-path branch keeps the
        // t-xor at one, the off-path branch collapses it to zero.
        if on_right {
            cw.t_r = !cw.t_r;
        } else {
            cw.t_l = !cw.t_l;
        }
        cws.push(cw);

        let (next_a, next_t_a) = descend(&g_a, t_a, &cw, on_right);
        let (next_b, next_t_b) = descend(&g_b, t_b, &cw, on_right);
        s_a = next_a;
        t_a = next_t_a;
        s_b = next_b;
        t_b = next_t_b;
    }

    // Exactly one leaf control bit is set; program the final correction so
    // the reconstructed leaf value is beta.
    let cw_out = if t_a {
        let s_star = beta.into_inner().wrapping_add(s_b);
        s_a ^ s_star
    } else {
        let s_star = s_a.wrapping_sub(beta.into_inner());
        s_b ^ s_star
    };

    let key0 = DpfKey {
        s0: root_a,
        t0: false,
        cws: cws.clone(),
        cw_out,
    };
    let key1 = DpfKey {
        s0: root_b,
        t0: true,
        cws,
        cw_out,
    };
    Ok((key0, key1))
}

/// Evaluate one key at a single point `x` of the generation domain.
pub fn eval(key: &DpfKey, x: u64) -> Ring64 {
    let levels = key.cws.len();
    let (mut s, mut t) = (key.s0, key.t0);
    for level in 0..levels {
        let g = expand(s);
        let (next_s, next_t) = descend(&g, t, &key.cws[level], bit_at(x, level, levels));
        s = next_s;
        t = next_t;
    }
    if t {
        s ^= key.cw_out;
    }
    let y = Ring64::new(s);
    if key.t0 {
        -y
    } else {
        y
    }
}

/// Evaluate one key over the whole domain `[0, domain)` with a single tree
/// walk, one PRG expansion per internal node. Output agrees with [`eval`]
/// at every point.
pub fn eval_full(key: &DpfKey, domain: u64) -> Vec<Ring64> {
    let mut out = Vec::with_capacity(domain as usize);
    walk(key, 0, key.s0, key.t0, domain, &mut out);
    out
}

fn walk(key: &DpfKey, depth: usize, s: u64, t: bool, domain: u64, out: &mut Vec<Ring64>) {
    if out.len() as u64 == domain {
        return;
    }
    if depth == key.cws.len() {
        let mut s = s;
        if t {
            s ^= key.cw_out;
        }
        let y = Ring64::new(s);
        out.push(if key.t0 { -y } else { y });
        return;
    }
    let g = expand(s);
    let (s_l, t_l) = descend(&g, t, &key.cws[depth], false);
    walk(key, depth + 1, s_l, t_l, domain, out);
    let (s_r, t_r) = descend(&g, t, &key.cws[depth], true);
    walk(key, depth + 1, s_r, t_r, domain, out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    fn rng() -> ChaCha12Rng {
        ChaCha12Rng::seed_from_u64(0x0B11_7EC5)
    }

    fn reconstruct(k0: &DpfKey, k1: &DpfKey, domain: u64) -> Vec<Ring64> {
        let y0 = eval_full(k0, domain);
        let y1 = eval_full(k1, domain);
        y0.into_iter().zip(y1).map(|(a, b)| a + b).collect()
    }

    #[test]
    fn levels_for_small_domains() {
        assert_eq!(levels_for(1), 0);
        assert_eq!(levels_for(2), 1);
        assert_eq!(levels_for(3), 2);
        assert_eq!(levels_for(4), 2);
        assert_eq!(levels_for(5), 3);
        assert_eq!(levels_for(1 << 20), 20);
    }

    #[test]
    fn point_function_small_domain() {
        // domain 4, alpha 2, beta 7: sums must be (0, 0, 7, 0).
        let mut rng = rng();
        let (k0, k1) = gen(4, 2, Ring64::new(7), &mut rng).unwrap();
        assert_eq!(k0.levels(), 2);
        let sums = reconstruct(&k0, &k1, 4);
        assert_eq!(
            sums,
            vec![Ring64::ZERO, Ring64::ZERO, Ring64::new(7), Ring64::ZERO]
        );
    }

    #[test]
    fn singleton_domain() {
        let mut rng = rng();
        let (k0, k1) = gen(1, 0, Ring64::new(42), &mut rng).unwrap();
        assert!(k0.cws.is_empty());
        assert!(k1.cws.is_empty());
        assert_eq!(eval(&k0, 0) + eval(&k1, 0), Ring64::new(42));
    }

    #[test]
    fn key_shape() {
        let mut rng = rng();
        let (k0, k1) = gen(13, 5, Ring64::new(99), &mut rng).unwrap();
        assert_eq!(k0.levels(), levels_for(13));
        assert!(!k0.t0);
        assert!(k1.t0);
        assert_eq!(k0.cws, k1.cws);
        assert_eq!(k0.cw_out, k1.cw_out);
        assert_ne!(k0.s0, k1.s0);
    }

    #[test]
    fn all_points_all_alphas() {
        let mut rng = rng();
        for domain in 1..=9u64 {
            for alpha in 0..domain {
                let beta = Ring64::new(rng.next_u64());
                let (k0, k1) = gen(domain, alpha, beta, &mut rng).unwrap();
                let sums = reconstruct(&k0, &k1, domain);
                for (x, sum) in sums.iter().enumerate() {
                    let expected = if x as u64 == alpha { beta } else { Ring64::ZERO };
                    assert_eq!(*sum, expected, "domain={domain} alpha={alpha} x={x}");
                }
            }
        }
    }

    #[test]
    fn negative_beta_reconstructs() {
        let mut rng = rng();
        let beta = Ring64::from_signed(-12345);
        let (k0, k1) = gen(8, 3, beta, &mut rng).unwrap();
        let sums = reconstruct(&k0, &k1, 8);
        assert_eq!(sums[3], beta);
        assert!(sums.iter().enumerate().all(|(x, s)| x == 3 || *s == Ring64::ZERO));
    }

    #[test]
    fn full_domain_matches_pointwise() {
        let mut rng = rng();
        let (k0, _) = gen(11, 7, Ring64::new(1), &mut rng).unwrap();
        let full = eval_full(&k0, 11);
        for x in 0..11u64 {
            assert_eq!(full[x as usize], eval(&k0, x));
        }
    }

    #[test]
    fn rejects_bad_parameters() {
        let mut rng = rng();
        assert_eq!(
            gen(0, 0, Ring64::ZERO, &mut rng).unwrap_err(),
            DpfError::DomainEmpty
        );
        assert_eq!(
            gen(4, 4, Ring64::ZERO, &mut rng).unwrap_err(),
            DpfError::AlphaOutOfRange { alpha: 4, domain: 4 }
        );
    }
}
