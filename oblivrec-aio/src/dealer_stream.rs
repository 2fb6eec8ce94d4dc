//! Decoding of the dealer preprocessing stream.
//!
//! The stream is consumed in strict order: the textual shares block until
//! its `OK` terminator, the `TRPL`-headed triples block until `TOK`, then
//! one binary DPF key record per query. Any malformed header, missing
//! terminator or truncated read is fatal.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::debug;

use oblivrec_core::dpf::CorrectionWord;
use oblivrec_core::wire::{
    parse_ring_line, parse_triples_header, parse_triple_line, MAX_KEY_LEVELS, SHARES_END,
    TRIPLES_END,
};
use oblivrec_core::{DotCorrelation, DpfKey, Ring64, RingVec, WireError};

use crate::error::ProtocolError;

pub struct DealerStream<R> {
    inner: BufReader<R>,
}

impl<R> DealerStream<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(stream: R) -> Self {
        DealerStream {
            inner: BufReader::new(stream),
        }
    }

    async fn read_line(&mut self, what: &'static str) -> Result<String, ProtocolError> {
        let mut line = String::new();
        let n = self.inner.read_line(&mut line).await?;
        if n == 0 {
            return Err(WireError::UnexpectedEof(what).into());
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    async fn read_nonempty_line(&mut self, what: &'static str) -> Result<String, ProtocolError> {
        loop {
            let line = self.read_line(what).await?;
            if !line.is_empty() {
                return Ok(line);
            }
        }
    }

    /// Shares block: one `X \n Y \n z \n blank` record per query until the
    /// `OK` sentinel. Every vector must have dimension `k`.
    pub async fn read_shares(&mut self, k: usize) -> Result<Vec<DotCorrelation>, ProtocolError> {
        let mut shares = Vec::new();
        loop {
            let line = self.read_nonempty_line("share record").await?;
            if line == SHARES_END {
                break;
            }
            let x = RingVec::new(check_dim(parse_ring_line(&line)?, k)?);
            let y_line = self.read_line("share Y line").await?;
            let y = RingVec::new(check_dim(parse_ring_line(&y_line)?, k)?);
            let z_line = self.read_line("share z line").await?;
            let z = parse_single(&z_line)?;
            // Blank separator line closing the record.
            let _ = self.read_line("share separator").await?;
            shares.push(DotCorrelation { x, y, z });
        }
        debug!(count = shares.len(), "shares block complete");
        Ok(shares)
    }

    /// Triples block: `TRPL q n` header, `q * n` lines, `TOK` terminator.
    /// Returns one group of `n` triples per query; `n` must equal
    /// `expected_per_query`.
    pub async fn read_triples(
        &mut self,
        expected_per_query: usize,
    ) -> Result<Vec<Vec<oblivrec_core::BeaverTriple>>, ProtocolError> {
        let header = self.read_nonempty_line("triples header (TRPL)").await?;
        let (q, per_query) = parse_triples_header(&header)?;
        if per_query != expected_per_query {
            return Err(WireError::LengthMismatch {
                expected: expected_per_query,
                got: per_query,
            }
            .into());
        }
        let mut groups = Vec::with_capacity(q);
        for _ in 0..q {
            let mut group = Vec::with_capacity(per_query);
            for _ in 0..per_query {
                let line = self.read_line("triple line").await?;
                group.push(parse_triple_line(&line)?);
            }
            groups.push(group);
        }
        let terminator = self.read_nonempty_line("triples terminator (TOK)").await?;
        if terminator != TRIPLES_END {
            return Err(WireError::BadTerminator {
                expected: TRIPLES_END,
                got: terminator,
            }
            .into());
        }
        debug!(queries = groups.len(), per_query, "triples block complete");
        Ok(groups)
    }

    /// DPF key block: `count` binary key records.
    pub async fn read_dpf_keys(&mut self, count: usize) -> Result<Vec<DpfKey>, ProtocolError> {
        let mut keys = Vec::with_capacity(count);
        for _ in 0..count {
            keys.push(self.read_dpf_key().await?);
        }
        debug!(count = keys.len(), "dpf key block complete");
        Ok(keys)
    }

    async fn read_dpf_key(&mut self) -> Result<DpfKey, ProtocolError> {
        let s0 = self.inner.read_u64().await?;
        let t0 = self.inner.read_u8().await? != 0;
        let num_cws = self.inner.read_u32().await?;
        if num_cws > MAX_KEY_LEVELS {
            return Err(WireError::BadRecord(format!(
                "correction word count {num_cws} exceeds {MAX_KEY_LEVELS}"
            ))
            .into());
        }
        let mut cws = Vec::with_capacity(num_cws as usize);
        for _ in 0..num_cws {
            cws.push(CorrectionWord {
                s_l: self.inner.read_u64().await?,
                s_r: self.inner.read_u64().await?,
                t_l: self.inner.read_u8().await? != 0,
                t_r: self.inner.read_u8().await? != 0,
            });
        }
        let cw_out = self.inner.read_u64().await?;
        Ok(DpfKey { s0, t0, cws, cw_out })
    }
}

fn check_dim(values: Vec<Ring64>, k: usize) -> Result<Vec<Ring64>, ProtocolError> {
    if values.len() != k {
        return Err(WireError::LengthMismatch {
            expected: k,
            got: values.len(),
        }
        .into());
    }
    Ok(values)
}

fn parse_single(line: &str) -> Result<Ring64, ProtocolError> {
    let values = parse_ring_line(line)?;
    if values.len() != 1 {
        return Err(WireError::BadRecord(format!("expected one value: {line:?}")).into());
    }
    Ok(values[0])
}
