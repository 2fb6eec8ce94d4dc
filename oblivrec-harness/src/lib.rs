//! Plaintext reference semantics and share-file tooling.
//!
//! The protocol's observable behavior is: for each query,
//! `u' = u + v * (1 - u.v)` on the user's row and
//! `V[item] += u * (1 - u.v)` on the item matrix, where `u` is the user
//! row before the query and `v` is the query vector. The checker replays
//! this model against reconstructed share files; the generator produces
//! matched share files for both parties.

use std::path::{Path, PathBuf};

use rand::RngCore;

use oblivrec_core::{ConfigError, MatrixShare, Query, Ring64, RingVec, Role};

/// Cleartext model of both factor matrices.
pub struct Model {
    pub users: MatrixShare,
    pub items: MatrixShare,
}

impl Model {
    /// Apply one query's update pair, in the same order the protocol does.
    pub fn apply(&mut self, query: &Query) -> Result<(), ConfigError> {
        let u = self.users.row(query.user_idx)?;
        let delta = u.dot(&query.v);
        let factor = Ring64::ONE - delta;
        self.users
            .set_row(query.user_idx, &u.add(&query.v.scale(factor)))?;
        let item = self.items.row(query.item_idx)?;
        self.items
            .set_row(query.item_idx, &item.add(&u.scale(factor)))?;
        Ok(())
    }

    pub fn replay(&mut self, queries: &[Query]) -> Result<(), ConfigError> {
        for query in queries {
            self.apply(query)?;
        }
        Ok(())
    }
}

/// Split a cleartext matrix into two additive share matrices.
pub fn split_matrix(
    clear: &MatrixShare,
    rng: &mut dyn RngCore,
) -> Result<(MatrixShare, MatrixShare), ConfigError> {
    let mut share0 = MatrixShare::zeros(clear.rows(), clear.cols());
    let mut share1 = MatrixShare::zeros(clear.rows(), clear.cols());
    for row in 0..clear.rows() {
        let clear_row = clear.row(row)?;
        let r0: RingVec = (0..clear.cols())
            .map(|_| Ring64::new(rng.next_u64()))
            .collect();
        share0.set_row(row, &r0)?;
        share1.set_row(row, &clear_row.sub(&r0))?;
    }
    Ok((share0, share1))
}

/// Split a cleartext vector into two additive shares.
pub fn split_vec(clear: &RingVec, rng: &mut dyn RngCore) -> (RingVec, RingVec) {
    let r0: RingVec = (0..clear.len())
        .map(|_| Ring64::new(rng.next_u64()))
        .collect();
    let r1 = clear.sub(&r0);
    (r0, r1)
}

/// Wrapping-add two share matrices back into the cleartext.
pub fn reconstruct_matrix(
    share0: &MatrixShare,
    share1: &MatrixShare,
) -> Result<MatrixShare, ConfigError> {
    let mut out = MatrixShare::zeros(share0.rows(), share0.cols());
    for row in 0..share0.rows() {
        out.set_row(row, &share0.row(row)?.add(&share1.row(row)?))?;
    }
    Ok(out)
}

/// Render a queries file: `q k` header, then one record per query.
pub fn format_queries(queries: &[Query], k: usize) -> String {
    let mut out = format!("{} {k}\n", queries.len());
    for query in queries {
        let values = query
            .v
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        out.push_str(&format!("{} {} {values}\n", query.user_idx, query.item_idx));
    }
    out
}

/// Conventional file names inside a data directory.
pub fn user_share_path(dir: &Path, role: Role) -> PathBuf {
    dir.join(format!("p{}_U.txt", role.index()))
}

pub fn item_share_path(dir: &Path, role: Role) -> PathBuf {
    dir.join(format!("p{}_V.txt", role.index()))
}

pub fn queries_path(dir: &Path, role: Role) -> PathBuf {
    dir.join(format!("p{}_queries.txt", role.index()))
}

pub fn results_path(dir: &Path, role: Role) -> PathBuf {
    dir.join(format!("p{}_results.txt", role.index()))
}

pub fn params_path(dir: &Path) -> PathBuf {
    dir.join("params.txt")
}
