//! The two secure operations performed for every query.
//!
//! Per query the parties hold one Du–Atallah correlation, 2k Beaver
//! triples and one DPF key, all single-use. The user-row update computes
//! `delta = <u . v>`, then `u' = u + v * (1 - delta)` coordinate-wise and
//! rewrites the user's row. The item-matrix update recomputes the per
//! coordinate magnitudes with `u` in place of `v`, opens them, and spreads
//! each one across every row of V through the DPF's shared indicator, so
//! only row `item_idx` actually changes while neither party's peer
//! transcript depends on which row that is.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, instrument};

use oblivrec_core::dpf::{self, levels_for};
use oblivrec_core::ring::const_minus;
use oblivrec_core::{BeaverTriple, DotCorrelation, DpfKey, Query, Ring64, RingVec, WireError};

use crate::dot::{BeaverDot, DotProduct};
use crate::error::ProtocolError;
use crate::mul::secure_mul;
use crate::peer::PeerChannel;
use crate::store::{MatrixStore, ResultLog};

/// Single-use correlated randomness for one query.
#[derive(Clone, Debug)]
pub struct QueryContext {
    pub correlation: DotCorrelation,
    pub triples: Vec<BeaverTriple>,
    pub dpf_key: DpfKey,
}

impl QueryContext {
    fn check_dimension(&self, k: usize) -> Result<(), ProtocolError> {
        if self.triples.len() != 2 * k {
            return Err(WireError::LengthMismatch {
                expected: 2 * k,
                got: self.triples.len(),
            }
            .into());
        }
        if self.correlation.dimension() != k {
            return Err(WireError::LengthMismatch {
                expected: k,
                got: self.correlation.dimension(),
            }
            .into());
        }
        Ok(())
    }
}

/// Outcome of the user-row update, feeding the item update: the row as it
/// was loaded and the retained `<1 - delta>` share.
pub struct UserRowUpdate {
    pub user_row: RingVec,
    pub one_minus_delta: Ring64,
}

/// Update the user's row of U in place: `u' = u + v * (1 - <u . v>)`.
///
/// Consumes the first k triples for the dot product and the second k for
/// the coordinate products.
#[instrument(skip_all, fields(query = query_idx, user = query.user_idx))]
pub async fn update_user_row<S>(
    chan: &mut PeerChannel<S>,
    query_idx: usize,
    query: &Query,
    ctx: &QueryContext,
    user_store: &MatrixStore,
    results: &ResultLog,
) -> Result<UserRowUpdate, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut user_matrix = user_store.load()?;
    let user_row = user_matrix.row(query.user_idx)?;
    let k = user_row.len();
    if query.v.len() != k {
        return Err(WireError::LengthMismatch {
            expected: k,
            got: query.v.len(),
        }
        .into());
    }
    ctx.check_dimension(k)?;

    let delta = BeaverDot::new(&ctx.triples[..k])
        .dot(chan, &user_row, &query.v)
        .await?;
    let one_minus_delta = const_minus(Ring64::ONE, delta, chan.role());

    let mut new_row = Vec::with_capacity(k);
    for i in 0..k {
        let m = secure_mul(chan, query.v[i], one_minus_delta, &ctx.triples[k + i]).await?;
        new_row.push(user_row[i] + m);
    }
    let new_row = RingVec::new(new_row);

    user_matrix.set_row(query.user_idx, &new_row)?;
    user_store.save(&user_matrix)?;
    results.append(query_idx, query.user_idx, &new_row)?;
    debug!("user row updated");

    Ok(UserRowUpdate {
        user_row,
        one_minus_delta,
    })
}

/// Obliviously add `u * (1 - delta)` into row `item_idx` of V.
///
/// The coordinate magnitudes are recomputed with `u` in place of `v` on
/// the second k triples, then opened one at a time (a single u64 each way
/// per coordinate) and spread over the whole item matrix through the DPF
/// indicator shares: the opened values carry no information about
/// item_idx, and the indicator shares of every row other than `item_idx`
/// reconstruct to zero.
#[instrument(skip_all, fields(query = query_idx))]
pub async fn update_item_matrix<S>(
    chan: &mut PeerChannel<S>,
    query_idx: usize,
    user: &UserRowUpdate,
    ctx: &QueryContext,
    item_store: &MatrixStore,
) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut item_matrix = item_store.load()?;
    let n = item_matrix.rows();
    let k = user.user_row.len();
    ctx.check_dimension(k)?;
    let expected_levels = levels_for(n as u64);
    if ctx.dpf_key.levels() != expected_levels {
        return Err(ProtocolError::KeyDomainMismatch {
            domain: n,
            expected: expected_levels,
            got: ctx.dpf_key.levels(),
        });
    }

    // This party's additive shares of the indicator vector for item_idx.
    let indicator = dpf::eval_full(&ctx.dpf_key, n as u64);

    for d in 0..k {
        let magnitude = secure_mul(
            chan,
            user.user_row[d],
            user.one_minus_delta,
            &ctx.triples[k + d],
        )
        .await?;
        let peer_magnitude = chan.exchange_one(magnitude).await?;
        let opened = magnitude + peer_magnitude;
        for (row, &share) in indicator.iter().enumerate() {
            item_matrix.add_to_cell(row, d, share * opened);
        }
    }

    item_store.save(&item_matrix)?;
    debug!(rows = n, "item matrix updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oblivrec_core::{MatrixShare, Role};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha12Rng;
    use std::fs;
    use std::path::PathBuf;

    fn temp_file(tag: &str, contents: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("oblivrec-update-{}-{tag}", std::process::id()));
        fs::write(&path, contents).unwrap();
        path
    }

    fn split_matrix(
        rng: &mut ChaCha12Rng,
        clear: &[Vec<i64>],
    ) -> (MatrixShare, MatrixShare) {
        let rows: Vec<Vec<Ring64>> = clear
            .iter()
            .map(|row| row.iter().map(|&v| Ring64::from_signed(v)).collect())
            .collect();
        let share0: Vec<Vec<Ring64>> = rows
            .iter()
            .map(|row| row.iter().map(|_| Ring64::new(rng.gen())).collect())
            .collect();
        let share1: Vec<Vec<Ring64>> = rows
            .iter()
            .zip(share0.iter())
            .map(|(row, s0)| {
                row.iter()
                    .zip(s0.iter())
                    .map(|(&v, &s)| v - s)
                    .collect()
            })
            .collect();
        (
            MatrixShare::from_rows(share0),
            MatrixShare::from_rows(share1),
        )
    }

    fn context_pair(
        rng: &mut ChaCha12Rng,
        n: u64,
        k: usize,
        item_idx: u64,
    ) -> (QueryContext, QueryContext) {
        let (c0, c1) = DotCorrelation::generate(k, rng);
        let (t0, t1): (Vec<_>, Vec<_>) =
            (0..2 * k).map(|_| BeaverTriple::generate(rng)).unzip();
        let (k0, k1) = dpf::gen(n, item_idx, Ring64::ONE, rng).unwrap();
        (
            QueryContext {
                correlation: c0,
                triples: t0,
                dpf_key: k0,
            },
            QueryContext {
                correlation: c1,
                triples: t1,
                dpf_key: k1,
            },
        )
    }

    /// Run both operations for one query and reconstruct the results.
    #[tokio::test]
    async fn query_matches_plaintext_semantics() {
        let mut rng = ChaCha12Rng::seed_from_u64(71);
        let u_clear = vec![vec![1i64, 2], vec![3, 4]];
        let v_clear = vec![vec![0i64, 1], vec![1, 0]];
        let (user_idx, item_idx) = (0usize, 1usize);
        let v_query: Vec<i64> = v_clear[item_idx].clone();

        let (u0, u1) = split_matrix(&mut rng, &u_clear);
        let (v0, v1) = split_matrix(&mut rng, &v_clear);
        let (ctx0, ctx1) = context_pair(&mut rng, 2, 2, item_idx as u64);

        // Query v is shared additively between the parties.
        let vq0: Vec<Ring64> = v_query.iter().map(|_| Ring64::new(rng.gen())).collect();
        let vq1: Vec<Ring64> = v_query
            .iter()
            .zip(vq0.iter())
            .map(|(&v, &s)| Ring64::from_signed(v) - s)
            .collect();
        let query0 = Query {
            user_idx,
            item_idx,
            v: RingVec::new(vq0),
        };
        let query1 = Query {
            user_idx,
            item_idx,
            v: RingVec::new(vq1),
        };

        let u_path0 = temp_file("u0", &u0.to_text());
        let u_path1 = temp_file("u1", &u1.to_text());
        let v_path0 = temp_file("v0", &v0.to_text());
        let v_path1 = temp_file("v1", &v1.to_text());
        let r_path0 = temp_file("r0", "");
        let r_path1 = temp_file("r1", "");

        let (s0, s1) = tokio::io::duplex(1 << 16);
        let mut p0 = PeerChannel::new(Role::P0, s0);
        let mut p1 = PeerChannel::new(Role::P1, s1);

        let side0 = async {
            let store_u = MatrixStore::new(&u_path0);
            let store_v = MatrixStore::new(&v_path0);
            let log = ResultLog::new(&r_path0);
            let user = update_user_row(&mut p0, 0, &query0, &ctx0, &store_u, &log)
                .await
                .unwrap();
            update_item_matrix(&mut p0, 0, &user, &ctx0, &store_v)
                .await
                .unwrap();
        };
        let side1 = async {
            let store_u = MatrixStore::new(&u_path1);
            let store_v = MatrixStore::new(&v_path1);
            let log = ResultLog::new(&r_path1);
            let user = update_user_row(&mut p1, 0, &query1, &ctx1, &store_u, &log)
                .await
                .unwrap();
            update_item_matrix(&mut p1, 0, &user, &ctx1, &store_v)
                .await
                .unwrap();
        };
        tokio::join!(side0, side1);

        let final_u0 = MatrixStore::new(&u_path0).load().unwrap();
        let final_u1 = MatrixStore::new(&u_path1).load().unwrap();
        let final_v0 = MatrixStore::new(&v_path0).load().unwrap();
        let final_v1 = MatrixStore::new(&v_path1).load().unwrap();

        // delta = u.v = 1, factor = 0: both matrices unchanged.
        for row in 0..2 {
            let u_rec = final_u0.row(row).unwrap().add(&final_u1.row(row).unwrap());
            let v_rec = final_v0.row(row).unwrap().add(&final_v1.row(row).unwrap());
            let u_expect: Vec<Ring64> = u_clear[row]
                .iter()
                .map(|&v| Ring64::from_signed(v))
                .collect();
            let v_expect: Vec<Ring64> = v_clear[row]
                .iter()
                .map(|&v| Ring64::from_signed(v))
                .collect();
            assert_eq!(u_rec, RingVec::new(u_expect));
            assert_eq!(v_rec, RingVec::new(v_expect));
        }

        for path in [u_path0, u_path1, v_path0, v_path1, r_path0, r_path1] {
            let _ = fs::remove_file(path);
        }
    }

    #[tokio::test]
    async fn key_domain_mismatch_is_rejected() {
        let mut rng = ChaCha12Rng::seed_from_u64(72);
        let (ctx0, _) = context_pair(&mut rng, 4, 1, 0);
        let v_path = temp_file("vbad", "2 1\n1\n2\n");
        let (s0, _keep) = tokio::io::duplex(1024);
        let mut p0 = PeerChannel::new(Role::P0, s0);
        let user = UserRowUpdate {
            user_row: RingVec::new(vec![Ring64::ONE]),
            one_minus_delta: Ring64::ZERO,
        };
        // Key was generated for domain 4 (2 levels) but V has 2 rows.
        let got = update_item_matrix(&mut p0, 0, &user, &ctx0, &MatrixStore::new(&v_path)).await;
        assert!(matches!(
            got,
            Err(ProtocolError::KeyDomainMismatch { domain: 2, .. })
        ));
        let _ = fs::remove_file(v_path);
    }
}
