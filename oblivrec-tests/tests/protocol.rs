//! End-to-end scenarios: dealer and both compute parties run in-process,
//! the dealer over localhost TCP and the peer channel over a duplex pipe,
//! then the share files are reconstructed and compared against the
//! plaintext update rule.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use tokio::net::{TcpListener, TcpStream};

use oblivrec_aio::{PeerChannel, ProtocolError};
use oblivrec_core::{MatrixShare, Params, Query, Ring64, RingVec, Role, WireError};
use oblivrec_dealer::serve;
use oblivrec_harness::{
    format_queries, item_share_path, params_path, queries_path, reconstruct_matrix, results_path,
    split_matrix, split_vec, user_share_path, Model,
};
use oblivrec_party::{receive_preprocessing, run_queries, PartyFiles};

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn fresh_dir(tag: &str) -> PathBuf {
    let id = DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "oblivrec-e2e-{}-{tag}-{id}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn matrix(rows: &[&[i64]]) -> MatrixShare {
    MatrixShare::from_rows(
        rows.iter()
            .map(|row| row.iter().map(|&v| Ring64::from_signed(v)).collect())
            .collect(),
    )
}

struct Deployment {
    dir: PathBuf,
    params: Params,
    files: [PartyFiles; 2],
    /// Cleartext queries, for replaying the reference model.
    queries: Vec<Query>,
}

/// Write share files and query files for both parties under a fresh
/// directory. `queries` are (user_idx, item_idx, v) in cleartext.
fn deploy(
    tag: &str,
    users: &MatrixShare,
    items: &MatrixShare,
    queries_clear: &[(usize, usize, Vec<i64>)],
    share_seed: u64,
) -> Deployment {
    let dir = fresh_dir(tag);
    let mut rng = ChaCha12Rng::seed_from_u64(share_seed);

    let (users0, users1) = split_matrix(users, &mut rng).unwrap();
    let (items0, items1) = split_matrix(items, &mut rng).unwrap();
    fs::write(user_share_path(&dir, Role::P0), users0.to_text()).unwrap();
    fs::write(user_share_path(&dir, Role::P1), users1.to_text()).unwrap();
    fs::write(item_share_path(&dir, Role::P0), items0.to_text()).unwrap();
    fs::write(item_share_path(&dir, Role::P1), items1.to_text()).unwrap();

    let k = items.cols();
    let mut clear = Vec::new();
    let mut shares0 = Vec::new();
    let mut shares1 = Vec::new();
    for (user_idx, item_idx, v) in queries_clear {
        let v: RingVec = v.iter().map(|&x| Ring64::from_signed(x)).collect();
        let (v0, v1) = split_vec(&v, &mut rng);
        clear.push(Query {
            user_idx: *user_idx,
            item_idx: *item_idx,
            v,
        });
        shares0.push(Query {
            user_idx: *user_idx,
            item_idx: *item_idx,
            v: v0,
        });
        shares1.push(Query {
            user_idx: *user_idx,
            item_idx: *item_idx,
            v: v1,
        });
    }
    fs::write(queries_path(&dir, Role::P0), format_queries(&shares0, k)).unwrap();
    fs::write(queries_path(&dir, Role::P1), format_queries(&shares1, k)).unwrap();

    let params = Params {
        m: users.rows(),
        n: items.rows(),
        k,
        q: queries_clear.len(),
    };
    fs::write(
        params_path(&dir),
        format!("{} {} {} {}\n", params.m, params.n, params.k, params.q),
    )
    .unwrap();

    let files = [Role::P0, Role::P1].map(|role| PartyFiles {
        user_matrix: user_share_path(&dir, role),
        item_matrix: item_share_path(&dir, role),
        queries: queries_path(&dir, role),
        results: results_path(&dir, role),
    });

    Deployment {
        dir,
        params,
        files,
        queries: clear,
    }
}

/// Run dealer and both parties to completion; returns the reconstructed
/// final matrices.
async fn run_deployment(deployment: &Deployment, dealer_seed: u64) -> (MatrixShare, MatrixShare) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let params = deployment.params;
    let dealer_queries = deployment.queries.clone();
    let dealer = tokio::spawn(async move {
        let (p0, _) = listener.accept().await.unwrap();
        let (p1, _) = listener.accept().await.unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(dealer_seed);
        serve(p0, p1, &params, &dealer_queries, &mut rng)
            .await
            .unwrap();
    });

    let d0 = TcpStream::connect(addr).await.unwrap();
    let d1 = TcpStream::connect(addr).await.unwrap();
    let (prep0, prep1) = tokio::join!(
        receive_preprocessing(d0, &deployment.files[0]),
        receive_preprocessing(d1, &deployment.files[1])
    );
    dealer.await.unwrap();

    let (s0, s1) = tokio::io::duplex(1 << 20);
    let (r0, r1) = tokio::join!(
        run_queries(
            PeerChannel::new(Role::P0, s0),
            prep0.unwrap(),
            &deployment.files[0]
        ),
        run_queries(
            PeerChannel::new(Role::P1, s1),
            prep1.unwrap(),
            &deployment.files[1]
        )
    );
    r0.unwrap();
    r1.unwrap();

    reconstructed(&deployment.dir)
}

fn reconstructed(dir: &Path) -> (MatrixShare, MatrixShare) {
    let load = |path: PathBuf| MatrixShare::parse(&fs::read_to_string(path).unwrap()).unwrap();
    let users = reconstruct_matrix(
        &load(user_share_path(dir, Role::P0)),
        &load(user_share_path(dir, Role::P1)),
    )
    .unwrap();
    let items = reconstruct_matrix(
        &load(item_share_path(dir, Role::P0)),
        &load(item_share_path(dir, Role::P1)),
    )
    .unwrap();
    (users, items)
}

fn expected_after(deployment: &Deployment, users: &MatrixShare, items: &MatrixShare) -> Model {
    let mut model = Model {
        users: users.clone(),
        items: items.clone(),
    };
    model.replay(&deployment.queries).unwrap();
    model
}

#[tokio::test]
async fn factor_one_query_leaves_matrices_unchanged() {
    // u.v = 1 so the update factor is zero on both matrices.
    let users = matrix(&[&[1, 2], &[3, 4]]);
    let items = matrix(&[&[0, 1], &[1, 0]]);
    let deployment = deploy("s3", &users, &items, &[(0, 1, vec![1, 0])], 101);

    let (got_users, got_items) = run_deployment(&deployment, 201).await;
    assert_eq!(got_users, users);
    assert_eq!(got_items, items);
}

#[tokio::test]
async fn zero_dot_query_updates_only_the_user_row() {
    let users = matrix(&[&[0, 0], &[0, 0]]);
    let items = matrix(&[&[1, 0], &[0, 1]]);
    let deployment = deploy("s4", &users, &items, &[(0, 0, vec![1, 0])], 102);

    let (got_users, got_items) = run_deployment(&deployment, 202).await;
    assert_eq!(got_users, matrix(&[&[1, 0], &[0, 0]]));
    assert_eq!(got_items, items);
}

#[tokio::test]
async fn two_queries_match_sequential_plaintext_execution() {
    let users = matrix(&[&[0, 0], &[0, 0]]);
    let items = matrix(&[&[1, 0], &[0, 1]]);
    let deployment = deploy(
        "s5",
        &users,
        &items,
        &[(0, 0, vec![1, 0]), (0, 1, vec![0, 1])],
        103,
    );

    let (got_users, got_items) = run_deployment(&deployment, 203).await;
    let expected = expected_after(&deployment, &users, &items);
    assert_eq!(got_users, expected.users);
    assert_eq!(got_items, expected.items);
    // Spelled out: the second query sees the first query's user row.
    assert_eq!(got_users, matrix(&[&[1, 1], &[0, 0]]));
    assert_eq!(got_items, matrix(&[&[1, 0], &[1, 1]]));
}

#[tokio::test]
async fn random_queries_match_the_model() {
    let mut rng = ChaCha12Rng::seed_from_u64(104);
    let users = random_small_matrix(&mut rng, 4, 3);
    let items = random_small_matrix(&mut rng, 8, 3);
    let queries: Vec<(usize, usize, Vec<i64>)> = (0..5)
        .map(|i| {
            let item = (i * 3 + 1) % 8;
            let v = (0..3)
                .map(|c| items.row(item).unwrap()[c].to_signed())
                .collect();
            (i % 4, item, v)
        })
        .collect();
    let deployment = deploy("random", &users, &items, &queries, 105);

    let (got_users, got_items) = run_deployment(&deployment, 205).await;
    let expected = expected_after(&deployment, &users, &items);
    assert_eq!(got_users, expected.users);
    assert_eq!(got_items, expected.items);

    // Every processed query left a results record on both sides.
    for files in &deployment.files {
        let log = fs::read_to_string(&files.results).unwrap();
        assert_eq!(log.lines().count(), queries.len());
    }
}

fn random_small_matrix(rng: &mut ChaCha12Rng, rows: usize, cols: usize) -> MatrixShare {
    use rand::Rng;
    MatrixShare::from_rows(
        (0..rows)
            .map(|_| {
                (0..cols)
                    .map(|_| Ring64::from_signed(rng.gen_range(-10..=10)))
                    .collect()
            })
            .collect(),
    )
}

#[tokio::test]
async fn dealer_truncation_after_shares_is_a_wire_error() {
    use tokio::io::AsyncWriteExt;

    let users = matrix(&[&[1, 2]]);
    let items = matrix(&[&[3, 4]]);
    let deployment = deploy("s6", &users, &items, &[(0, 0, vec![3, 4])], 106);

    // A dealer that dies right after the shares block.
    let (mut dealer_side, party_side) = tokio::io::duplex(1 << 16);
    let mut rng = ChaCha12Rng::seed_from_u64(206);
    let (half0, _) = oblivrec_core::DotCorrelation::generate(2, &mut rng);
    dealer_side
        .write_all(oblivrec_core::wire::format_share_record(&half0).as_bytes())
        .await
        .unwrap();
    dealer_side.write_all(b"OK\n").await.unwrap();
    drop(dealer_side);

    let got = receive_preprocessing(party_side, &deployment.files[0]).await;
    match got {
        Err(ProtocolError::Wire(WireError::UnexpectedEof(what))) => {
            assert!(what.contains("TRPL"), "error should cite the TRPL header")
        }
        other => panic!("expected a wire error for the missing TRPL header, got {other:?}"),
    }
    // Nothing was processed, so no result record may exist.
    assert!(!deployment.files[0].results.exists());
}

/// Peer stream wrapper that records every byte read from the peer.
struct Recording<S> {
    inner: S,
    read_log: Arc<Mutex<Vec<u8>>>,
}

impl<S: tokio::io::AsyncRead + Unpin> tokio::io::AsyncRead for Recording<S> {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let result = std::pin::Pin::new(&mut self.inner).poll_read(cx, buf);
        if let std::task::Poll::Ready(Ok(())) = result {
            let filled = buf.filled();
            self.read_log
                .lock()
                .unwrap()
                .extend_from_slice(&filled[before..]);
        }
        result
    }
}

impl<S: tokio::io::AsyncWrite + Unpin> tokio::io::AsyncWrite for Recording<S> {
    fn poll_write(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        std::pin::Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Run one deployment recording what P0 reads on the peer channel.
async fn run_recording(deployment: &Deployment, dealer_seed: u64) -> Vec<u8> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let params = deployment.params;
    let dealer_queries = deployment.queries.clone();
    let dealer = tokio::spawn(async move {
        let (p0, _) = listener.accept().await.unwrap();
        let (p1, _) = listener.accept().await.unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(dealer_seed);
        serve(p0, p1, &params, &dealer_queries, &mut rng)
            .await
            .unwrap();
    });

    let d0 = TcpStream::connect(addr).await.unwrap();
    let d1 = TcpStream::connect(addr).await.unwrap();
    let (prep0, prep1) = tokio::join!(
        receive_preprocessing(d0, &deployment.files[0]),
        receive_preprocessing(d1, &deployment.files[1])
    );
    dealer.await.unwrap();

    let read_log = Arc::new(Mutex::new(Vec::new()));
    let (s0, s1) = tokio::io::duplex(1 << 20);
    let recording = Recording {
        inner: s0,
        read_log: read_log.clone(),
    };
    let (r0, r1) = tokio::join!(
        run_queries(
            PeerChannel::new(Role::P0, recording),
            prep0.unwrap(),
            &deployment.files[0]
        ),
        run_queries(
            PeerChannel::new(Role::P1, s1),
            prep1.unwrap(),
            &deployment.files[1]
        )
    );
    r0.unwrap();
    r1.unwrap();

    let log = read_log.lock().unwrap().clone();
    log
}

#[tokio::test]
async fn peer_transcript_is_independent_of_item_idx() {
    // Two queries differing only in item_idx, everything else (matrices,
    // share randomness, dealer randomness) fixed: P0 must read exactly the
    // same bytes from the peer channel in both runs.
    let users = matrix(&[&[1, 2], &[3, 4]]);
    let items = matrix(&[&[5, 6], &[7, 8]]);
    let v = vec![2, -3];

    let run_a = deploy("obliv-a", &users, &items, &[(1, 0, v.clone())], 107);
    let run_b = deploy("obliv-b", &users, &items, &[(1, 1, v)], 107);

    let transcript_a = run_recording(&run_a, 207).await;
    let transcript_b = run_recording(&run_b, 207).await;
    assert!(!transcript_a.is_empty());
    assert_eq!(transcript_a, transcript_b);
}
