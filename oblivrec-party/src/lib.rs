//! Compute party for the oblivious recommender update protocol.
//!
//! Both parties run the same code parameterized by role. The lifecycle is
//! a straight line: connect to the dealer and drain its preprocessing
//! stream in order, connect to the peer, pass the preprocessing barrier,
//! then process the queries in lockstep. Any error is terminal; the
//! process exits nonzero and the peer discovers the truncation on its own.

use std::fs;
use std::path::PathBuf;

use structopt::StructOpt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use oblivrec_aio::{
    preprocessing_barrier, query_barrier, update_item_matrix, update_user_row, DealerStream,
    MatrixStore, PeerChannel, ProtocolError, QueryContext, ResultLog,
};
use oblivrec_core::query::parse_queries;
use oblivrec_core::{Query, Role, WireError};

/// Command line for one compute party.
#[derive(Clone, Debug, StructOpt)]
#[structopt(name = "oblivrec-party")]
pub struct PartyConfig {
    /// Party role: 0 or 1
    #[structopt(long, parse(try_from_str = parse_role))]
    pub role: Role,
    /// Dealer address to connect to
    #[structopt(long, default_value = "127.0.0.1:9002")]
    pub dealer: String,
    /// Peer address: P1 listens here, P0 connects to it
    #[structopt(long, default_value = "127.0.0.1:9001")]
    pub peer: String,
    /// This party's user-matrix share file
    #[structopt(long, parse(from_os_str))]
    pub user_matrix: PathBuf,
    /// This party's item-matrix share file
    #[structopt(long, parse(from_os_str))]
    pub item_matrix: PathBuf,
    /// This party's queries file
    #[structopt(long, parse(from_os_str))]
    pub queries: PathBuf,
    /// Results log appended after each query
    #[structopt(long, parse(from_os_str))]
    pub results: PathBuf,
}

fn parse_role(s: &str) -> Result<Role, String> {
    match s {
        "0" | "p0" | "P0" => Ok(Role::P0),
        "1" | "p1" | "P1" => Ok(Role::P1),
        other => Err(format!("unknown role {other:?} (expected 0 or 1)")),
    }
}

/// The party's file surface, separate from the socket endpoints so tests
/// can drive the protocol over in-process streams.
#[derive(Clone, Debug)]
pub struct PartyFiles {
    pub user_matrix: PathBuf,
    pub item_matrix: PathBuf,
    pub queries: PathBuf,
    pub results: PathBuf,
}

impl From<&PartyConfig> for PartyFiles {
    fn from(config: &PartyConfig) -> Self {
        PartyFiles {
            user_matrix: config.user_matrix.clone(),
            item_matrix: config.item_matrix.clone(),
            queries: config.queries.clone(),
            results: config.results.clone(),
        }
    }
}

/// Everything a party needs before it opens the peer channel: its own
/// queries and the per-query single-use randomness from the dealer.
#[derive(Debug)]
pub struct Preprocessed {
    pub queries: Vec<Query>,
    pub contexts: Vec<QueryContext>,
}

/// Drain the dealer stream in strict order (shares, then triples, then
/// DPF keys) and pair the result with this party's queries.
pub async fn receive_preprocessing<D>(
    dealer: D,
    files: &PartyFiles,
) -> Result<Preprocessed, ProtocolError>
where
    D: AsyncRead + Unpin + Send,
{
    let queries_text = fs::read_to_string(&files.queries)?;
    let (mut queries, k) = parse_queries(&queries_text)?;
    info!(queries = queries.len(), k, "loaded queries");

    let mut dealer = DealerStream::new(dealer);
    let correlations = dealer.read_shares(k).await?;
    let triples = dealer.read_triples(2 * k).await?;
    if triples.len() != correlations.len() {
        return Err(WireError::LengthMismatch {
            expected: correlations.len(),
            got: triples.len(),
        }
        .into());
    }
    let keys = dealer.read_dpf_keys(triples.len()).await?;
    info!(provisioned = keys.len(), "preprocessing received");

    if queries.len() > keys.len() {
        warn!(
            queries = queries.len(),
            provisioned = keys.len(),
            "more queries than provisioned preprocessing; truncating"
        );
        queries.truncate(keys.len());
    }

    let contexts = correlations
        .into_iter()
        .zip(triples)
        .zip(keys)
        .map(|((correlation, triples), dpf_key)| QueryContext {
            correlation,
            triples,
            dpf_key,
        })
        .collect();

    Ok(Preprocessed { queries, contexts })
}

/// Lockstep online phase: preprocessing barrier, then one barrier and two
/// secure operations per query.
pub async fn run_queries<P>(
    mut peer: PeerChannel<P>,
    prep: Preprocessed,
    files: &PartyFiles,
) -> Result<(), ProtocolError>
where
    P: AsyncRead + AsyncWrite + Unpin + Send,
{
    preprocessing_barrier(&mut peer).await?;
    info!("preprocessing barrier passed");

    let user_store = MatrixStore::new(&files.user_matrix);
    let item_store = MatrixStore::new(&files.item_matrix);
    let results = ResultLog::new(&files.results);

    for (idx, (query, ctx)) in prep.queries.iter().zip(prep.contexts).enumerate() {
        query_barrier(&mut peer, idx as u32).await?;
        let user = update_user_row(&mut peer, idx, query, &ctx, &user_store, &results).await?;
        update_item_matrix(&mut peer, idx, &user, &ctx, &item_store).await?;
        info!(query = idx, "query processed");
    }

    info!("all queries processed");
    Ok(())
}

/// Binary entry point: dial the dealer, drain preprocessing, establish the
/// peer channel, run the query loop. P1 must be started before P0; the
/// peer dial is a single attempt.
pub async fn run(config: PartyConfig) -> Result<(), ProtocolError> {
    let role = config.role;
    let files = PartyFiles::from(&config);

    info!(%role, dealer = %config.dealer, "connecting to dealer");
    let dealer = TcpStream::connect(&config.dealer).await?;
    let prep = receive_preprocessing(dealer, &files).await?;

    let peer_stream = match role {
        Role::P0 => {
            info!(peer = %config.peer, "connecting to peer");
            TcpStream::connect(&config.peer).await?
        }
        Role::P1 => {
            info!(peer = %config.peer, "listening for peer");
            let listener = TcpListener::bind(&config.peer).await?;
            let (stream, addr) = listener.accept().await?;
            info!(%addr, "peer connected");
            stream
        }
    };
    peer_stream.set_nodelay(true)?;

    run_queries(PeerChannel::new(role, peer_stream), prep, &files).await
}
