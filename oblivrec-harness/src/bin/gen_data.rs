//! Generate a synthetic deployment: cleartext factor matrices, their
//! additive share files for both parties, matched query files with shared
//! item vectors, and the dealer's parameter file.

use std::fs;
use std::path::PathBuf;

use eyre::{ensure, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use structopt::StructOpt;

use oblivrec_core::{MatrixShare, Query, Ring64, Role};
use oblivrec_harness::{
    format_queries, item_share_path, params_path, queries_path, split_matrix, split_vec,
    user_share_path,
};

#[derive(Debug, StructOpt)]
#[structopt(name = "gen-data")]
struct Opt {
    /// Number of users
    #[structopt(long, default_value = "10")]
    m: usize,
    /// Number of items
    #[structopt(long, default_value = "20")]
    n: usize,
    /// Factor dimension
    #[structopt(long, default_value = "5")]
    k: usize,
    /// Number of queries
    #[structopt(long, default_value = "8")]
    q: usize,
    /// Output directory
    #[structopt(long, parse(from_os_str), default_value = "data")]
    out: PathBuf,
    /// Seed for reproducible data; entropy-seeded when absent
    #[structopt(long)]
    seed: Option<u64>,
}

/// Matrix entries stay small so reconstructed cleartext values are easy to
/// eyeball in the share files.
const VALUE_RANGE: std::ops::RangeInclusive<i64> = -100..=100;

fn random_matrix(rng: &mut ChaCha12Rng, rows: usize, cols: usize) -> MatrixShare {
    MatrixShare::from_rows(
        (0..rows)
            .map(|_| {
                (0..cols)
                    .map(|_| Ring64::from_signed(rng.gen_range(VALUE_RANGE)))
                    .collect()
            })
            .collect(),
    )
}

fn main() -> Result<()> {
    let opt = Opt::from_args();
    ensure!(opt.m > 0 && opt.n > 0 && opt.k > 0, "m, n and k must be positive");

    let mut rng = match opt.seed {
        Some(seed) => ChaCha12Rng::seed_from_u64(seed),
        None => ChaCha12Rng::from_entropy(),
    };

    fs::create_dir_all(&opt.out)?;

    let users = random_matrix(&mut rng, opt.m, opt.k);
    let items = random_matrix(&mut rng, opt.n, opt.k);

    let (users0, users1) = split_matrix(&users, &mut rng)?;
    let (items0, items1) = split_matrix(&items, &mut rng)?;
    fs::write(user_share_path(&opt.out, Role::P0), users0.to_text())?;
    fs::write(user_share_path(&opt.out, Role::P1), users1.to_text())?;
    fs::write(item_share_path(&opt.out, Role::P0), items0.to_text())?;
    fs::write(item_share_path(&opt.out, Role::P1), items1.to_text())?;

    // Each query targets a random user and item; the item vector is the
    // targeted row of V, split into per-party shares.
    let mut queries0 = Vec::with_capacity(opt.q);
    let mut queries1 = Vec::with_capacity(opt.q);
    for _ in 0..opt.q {
        let user_idx = rng.gen_range(0..opt.m);
        let item_idx = rng.gen_range(0..opt.n);
        let v = items.row(item_idx)?;
        let (v0, v1) = split_vec(&v, &mut rng);
        queries0.push(Query {
            user_idx,
            item_idx,
            v: v0,
        });
        queries1.push(Query {
            user_idx,
            item_idx,
            v: v1,
        });
    }
    fs::write(
        queries_path(&opt.out, Role::P0),
        format_queries(&queries0, opt.k),
    )?;
    fs::write(
        queries_path(&opt.out, Role::P1),
        format_queries(&queries1, opt.k),
    )?;

    fs::write(
        params_path(&opt.out),
        format!("{} {} {} {}\n", opt.m, opt.n, opt.k, opt.q),
    )?;

    println!(
        "generated m={} n={} k={} q={} under {}",
        opt.m,
        opt.n,
        opt.k,
        opt.q,
        opt.out.display()
    );
    Ok(())
}
