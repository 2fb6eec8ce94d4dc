//! Verify a protocol run: reconstruct both parties' share files before and
//! after, replay the plaintext update rule, and compare.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::exit;

use eyre::{ensure, Result};
use structopt::StructOpt;

use oblivrec_core::query::parse_queries;
use oblivrec_core::{MatrixShare, Query, Role};
use oblivrec_harness::{
    item_share_path, queries_path, reconstruct_matrix, user_share_path, Model,
};

#[derive(Debug, StructOpt)]
#[structopt(name = "check")]
struct Opt {
    /// Directory with the share files as they were before the run
    #[structopt(long, parse(from_os_str))]
    initial: PathBuf,
    /// Directory with the share files after the run
    #[structopt(long, parse(from_os_str))]
    final_dir: PathBuf,
}

fn load_matrix(path: &Path) -> Result<MatrixShare> {
    Ok(MatrixShare::parse(&fs::read_to_string(path)?)?)
}

fn load_reconstructed(dir: &Path, which: fn(&Path, Role) -> PathBuf) -> Result<MatrixShare> {
    let share0 = load_matrix(&which(dir, Role::P0))?;
    let share1 = load_matrix(&which(dir, Role::P1))?;
    Ok(reconstruct_matrix(&share0, &share1)?)
}

/// Reconstruct the cleartext queries from the two parties' query files.
fn load_queries(dir: &Path) -> Result<Vec<Query>> {
    let (q0, k0) = parse_queries(&fs::read_to_string(queries_path(dir, Role::P0))?)?;
    let (q1, k1) = parse_queries(&fs::read_to_string(queries_path(dir, Role::P1))?)?;
    ensure!(k0 == k1 && q0.len() == q1.len(), "query files disagree");
    q0.into_iter()
        .zip(q1)
        .map(|(a, b)| {
            ensure!(
                a.user_idx == b.user_idx && a.item_idx == b.item_idx,
                "query indices disagree between parties"
            );
            Ok(Query {
                user_idx: a.user_idx,
                item_idx: a.item_idx,
                v: a.v.add(&b.v),
            })
        })
        .collect()
}

fn report(name: &str, expected: &MatrixShare, got: &MatrixShare) -> bool {
    if expected == got {
        println!("{name}: OK");
        return true;
    }
    println!("{name}: MISMATCH");
    if expected.rows() != got.rows() || expected.cols() != got.cols() {
        println!(
            "  shape: expected {}x{}, got {}x{}",
            expected.rows(),
            expected.cols(),
            got.rows(),
            got.cols()
        );
        return false;
    }
    for row in 0..expected.rows() {
        let want = expected.row(row).unwrap();
        let have = got.row(row).unwrap();
        if want != have {
            println!("  row {row}: expected {want:?}, got {have:?}");
        }
    }
    false
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    let queries = load_queries(&opt.initial)?;
    let mut model = Model {
        users: load_reconstructed(&opt.initial, user_share_path)?,
        items: load_reconstructed(&opt.initial, item_share_path)?,
    };
    model.replay(&queries)?;

    let final_users = load_reconstructed(&opt.final_dir, user_share_path)?;
    let final_items = load_reconstructed(&opt.final_dir, item_share_path)?;

    println!("replayed {} queries", queries.len());
    let users_ok = report("user matrix", &model.users, &final_users);
    let items_ok = report("item matrix", &model.items, &final_items);

    if !(users_ok && items_ok) {
        exit(1);
    }
    Ok(())
}
