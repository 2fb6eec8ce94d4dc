//! The correlated-randomness dealer, P2.
//!
//! P2 is offline in the protocol sense: it accepts the two compute
//! parties in order, then streams everything they will ever need — one
//! Du–Atallah correlation, 2k Beaver triples and one DPF key pair per
//! query — and exits. It never touches secret state; the DPF points are
//! the item indices it reads from the queries file, which the parties'
//! own query files carry as well.

use std::fs;
use std::path::PathBuf;

use rand::{CryptoRng, RngCore, SeedableRng};
use structopt::StructOpt;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpListener;
use tracing::{debug, info};

use oblivrec_core::query::parse_queries;
use oblivrec_core::wire::{
    encode_key, format_share_record, format_triples_header, format_triple_line, SHARES_END,
    TRIPLES_END,
};
use oblivrec_core::{dpf, BeaverTriple, ConfigError, DotCorrelation, DpfError, Params, Query, Ring64};

#[derive(Debug, Error)]
pub enum DealerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("dpf error: {0}")]
    Dpf(#[from] DpfError),
    #[error("queries file disagrees with params: {0}")]
    Inconsistent(String),
}

/// Command line for the dealer.
#[derive(Clone, Debug, StructOpt)]
#[structopt(name = "oblivrec-dealer")]
pub struct DealerConfig {
    /// Address to listen on; P0 must connect first, then P1
    #[structopt(long, default_value = "0.0.0.0:9002")]
    pub listen: String,
    /// Parameter file: `m n k q`
    #[structopt(long, parse(from_os_str))]
    pub params: PathBuf,
    /// Queries file providing the per-query item indices
    #[structopt(long, parse(from_os_str))]
    pub queries: PathBuf,
}

/// Stream the full preprocessing to both parties over already-accepted
/// connections, in the fixed block order the parties consume it in.
pub async fn serve<W0, W1, R>(
    to_p0: W0,
    to_p1: W1,
    params: &Params,
    queries: &[Query],
    rng: &mut R,
) -> Result<(), DealerError>
where
    W0: AsyncWrite + Unpin + Send,
    W1: AsyncWrite + Unpin + Send,
    R: RngCore + CryptoRng,
{
    let mut w0 = BufWriter::new(to_p0);
    let mut w1 = BufWriter::new(to_p1);
    let Params { n, k, q, .. } = *params;

    // Shares block: one Du-Atallah correlation pair per query.
    info!(q, k, "streaming dot-product correlations");
    for i in 0..q {
        let (half0, half1) = DotCorrelation::generate(k, rng);
        w0.write_all(format_share_record(&half0).as_bytes()).await?;
        w1.write_all(format_share_record(&half1).as_bytes()).await?;
        if (i + 1) % 100 == 0 || i + 1 == q {
            debug!(sent = i + 1, total = q, "correlations");
        }
    }
    w0.write_all(format!("{SHARES_END}\n").as_bytes()).await?;
    w1.write_all(format!("{SHARES_END}\n").as_bytes()).await?;
    w0.flush().await?;
    w1.flush().await?;

    // Triples block: 2k per query, k for the dot product and k for the
    // coordinate products.
    let per_query = 2 * k;
    info!(q, per_query, "streaming beaver triples");
    let header = format_triples_header(q, per_query);
    w0.write_all(header.as_bytes()).await?;
    w1.write_all(header.as_bytes()).await?;
    for _ in 0..q {
        for _ in 0..per_query {
            let (half0, half1) = BeaverTriple::generate(rng);
            w0.write_all(format_triple_line(&half0).as_bytes()).await?;
            w1.write_all(format_triple_line(&half1).as_bytes()).await?;
        }
    }
    w0.write_all(format!("{TRIPLES_END}\n").as_bytes()).await?;
    w1.write_all(format!("{TRIPLES_END}\n").as_bytes()).await?;
    w0.flush().await?;
    w1.flush().await?;

    // DPF block: one key pair per query, point at the query's item index.
    // Beta is one, so full-domain evaluation gives the parties additive
    // shares of the row indicator, which they scale online.
    info!(q, "streaming dpf keys");
    for (i, query) in queries.iter().enumerate() {
        let (key0, key1) = dpf::gen(n as u64, query.item_idx as u64, Ring64::ONE, rng)?;
        w0.write_all(&encode_key(&key0)).await?;
        w1.write_all(&encode_key(&key1)).await?;
        debug!(query = i, item = query.item_idx, "dpf key pair sent");
    }
    w0.flush().await?;
    w1.flush().await?;

    info!("preprocessing complete");
    Ok(())
}

fn load_inputs(config: &DealerConfig) -> Result<(Params, Vec<Query>), DealerError> {
    let params = Params::parse(&fs::read_to_string(&config.params)?)?;
    let (queries, k) = parse_queries(&fs::read_to_string(&config.queries)?)?;
    if k != params.k {
        return Err(DealerError::Inconsistent(format!(
            "dimension {k} in queries, {} in params",
            params.k
        )));
    }
    if queries.len() != params.q {
        return Err(DealerError::Inconsistent(format!(
            "{} queries in file, {} in params",
            queries.len(),
            params.q
        )));
    }
    Ok((params, queries))
}

/// Binary entry point: bind, accept P0 then P1, stream, exit.
pub async fn run(config: DealerConfig) -> Result<(), DealerError> {
    let (params, queries) = load_inputs(&config)?;
    info!(
        m = params.m,
        n = params.n,
        k = params.k,
        q = params.q,
        "parameters loaded"
    );

    let listener = TcpListener::bind(&config.listen).await?;
    info!(listen = %config.listen, "waiting for compute parties");
    let (p0, addr0) = listener.accept().await?;
    info!(%addr0, "P0 connected");
    let (p1, addr1) = listener.accept().await?;
    info!(%addr1, "P1 connected");

    let mut rng = rand_chacha::ChaCha12Rng::from_entropy();
    serve(p0, p1, &params, &queries, &mut rng).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use oblivrec_aio::DealerStream;
    use oblivrec_core::RingVec;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    fn toy_queries(q: usize, k: usize, n: usize) -> Vec<Query> {
        (0..q)
            .map(|i| Query {
                user_idx: 0,
                item_idx: i % n,
                v: RingVec::zeros(k),
            })
            .collect()
    }

    #[tokio::test]
    async fn streams_decode_and_reconstruct() {
        let params = Params {
            m: 2,
            n: 4,
            k: 3,
            q: 2,
        };
        let queries = toy_queries(2, 3, 4);
        let (to_p0, from_p0) = tokio::io::duplex(1 << 20);
        let (to_p1, from_p1) = tokio::io::duplex(1 << 20);
        let mut rng = ChaCha12Rng::seed_from_u64(81);
        serve(to_p0, to_p1, &params, &queries, &mut rng)
            .await
            .unwrap();

        let mut s0 = DealerStream::new(from_p0);
        let mut s1 = DealerStream::new(from_p1);
        let shares0 = s0.read_shares(3).await.unwrap();
        let shares1 = s1.read_shares(3).await.unwrap();
        assert_eq!(shares0.len(), 2);
        assert_eq!(shares1.len(), 2);
        // The delivered correlation halves satisfy the dealer identity.
        for (c0, c1) in shares0.iter().zip(shares1.iter()) {
            assert_eq!(c0.x.dot(&c1.y) + c1.x.dot(&c0.y), c0.z + c1.z);
        }

        let triples0 = s0.read_triples(6).await.unwrap();
        let triples1 = s1.read_triples(6).await.unwrap();
        for (g0, g1) in triples0.iter().zip(triples1.iter()) {
            for (t0, t1) in g0.iter().zip(g1.iter()) {
                assert_eq!(t0.z + t1.z, t0.x * t1.y + t1.x * t0.y);
            }
        }

        let keys0 = s0.read_dpf_keys(2).await.unwrap();
        let keys1 = s1.read_dpf_keys(2).await.unwrap();
        for (i, (k0, k1)) in keys0.iter().zip(keys1.iter()).enumerate() {
            let y0 = dpf::eval_full(k0, 4);
            let y1 = dpf::eval_full(k1, 4);
            for x in 0..4usize {
                let expected = if x == queries[i].item_idx {
                    Ring64::ONE
                } else {
                    Ring64::ZERO
                };
                assert_eq!(y0[x] + y1[x], expected);
            }
        }
    }
}
