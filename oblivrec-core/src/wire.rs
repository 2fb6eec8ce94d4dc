//! Wire formats for the dealer preprocessing stream.
//!
//! The stream is consumed in a fixed frame: a line-oriented shares block
//! terminated by `OK`, a line-oriented triples block bracketed by a `TRPL`
//! header and a `TOK` terminator, then one binary big-endian DPF key record
//! per query. This module holds the sans-io encoding and parsing; the
//! async framing lives in `oblivrec-aio`.

use thiserror::Error;

use crate::correlation::DotCorrelation;
use crate::dpf::{CorrectionWord, DpfKey};
use crate::ring::Ring64;
use crate::triple::BeaverTriple;

/// Terminates the shares block.
pub const SHARES_END: &str = "OK";
/// Tags the triples block header: `TRPL <q> <triples_per_query>`.
pub const TRIPLES_TAG: &str = "TRPL";
/// Terminates the triples block.
pub const TRIPLES_END: &str = "TOK";

/// Magic for the peer vector-pair exchange frame ("DXCH").
pub const VEC_PAIR_MAGIC: u32 = 0x4458_4348;
/// Version of the vector-pair exchange frame.
pub const VEC_PAIR_VERSION: u32 = 1;

/// Keys never legitimately exceed a 64-level tree; larger counts mean a
/// corrupt or hostile stream.
pub const MAX_KEY_LEVELS: u32 = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("unexpected end of stream while reading {0}")]
    UnexpectedEof(&'static str),
    #[error("malformed header: {0:?}")]
    BadHeader(String),
    #[error("bad terminator: expected {expected:?}, got {got:?}")]
    BadTerminator { expected: &'static str, got: String },
    #[error("bad magic: expected {expected:#010x}, got {got:#010x}")]
    BadMagic { expected: u32, got: u32 },
    #[error("length mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },
    #[error("malformed record: {0}")]
    BadRecord(String),
}

// ---- shares block (textual) ----

fn format_ring_line(values: &[Ring64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// One share record as it appears on the wire: X line, Y line, z line,
/// blank separator.
pub fn format_share_record(share: &DotCorrelation) -> String {
    format!(
        "{}\n{}\n{}\n\n",
        format_ring_line(share.x.as_slice()),
        format_ring_line(share.y.as_slice()),
        share.z
    )
}

/// Parse a whitespace-separated line of ring values.
pub fn parse_ring_line(line: &str) -> Result<Vec<Ring64>, WireError> {
    line.split_whitespace()
        .map(|tok| {
            tok.parse::<Ring64>()
                .map_err(|_| WireError::BadRecord(format!("bad ring value {tok:?}")))
        })
        .collect()
}

// ---- triples block (textual) ----

pub fn format_triples_header(queries: usize, per_query: usize) -> String {
    format!("{TRIPLES_TAG} {queries} {per_query}\n")
}

/// Parse `TRPL <q> <n>`; both counts must be positive.
pub fn parse_triples_header(line: &str) -> Result<(usize, usize), WireError> {
    let mut tokens = line.split_whitespace();
    let tag = tokens.next().unwrap_or("");
    if tag != TRIPLES_TAG {
        return Err(WireError::BadHeader(line.to_string()));
    }
    let mut count = || -> Result<usize, WireError> {
        tokens
            .next()
            .and_then(|tok| tok.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .ok_or_else(|| WireError::BadHeader(line.to_string()))
    };
    let q = count()?;
    let n = count()?;
    Ok((q, n))
}

pub fn format_triple_line(triple: &BeaverTriple) -> String {
    format!("{} {} {}\n", triple.x, triple.y, triple.z)
}

pub fn parse_triple_line(line: &str) -> Result<BeaverTriple, WireError> {
    let values = parse_ring_line(line)?;
    if values.len() != 3 {
        return Err(WireError::BadRecord(format!(
            "triple line has {} values: {line:?}",
            values.len()
        )));
    }
    Ok(BeaverTriple {
        x: values[0],
        y: values[1],
        z: values[2],
    })
}

// ---- DPF key record (binary, big-endian) ----

/// Encode one key: `s0:u64 | t0:u8 | num_cws:u32 | cws[] | cw_out:u64`,
/// each correction word as `s_l:u64 | s_r:u64 | t_l:u8 | t_r:u8`.
pub fn encode_key(key: &DpfKey) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + 1 + 4 + key.cws.len() * 18 + 8);
    out.extend_from_slice(&key.s0.to_be_bytes());
    out.push(key.t0 as u8);
    out.extend_from_slice(&(key.cws.len() as u32).to_be_bytes());
    for cw in &key.cws {
        out.extend_from_slice(&cw.s_l.to_be_bytes());
        out.extend_from_slice(&cw.s_r.to_be_bytes());
        out.push(cw.t_l as u8);
        out.push(cw.t_r as u8);
    }
    out.extend_from_slice(&key.cw_out.to_be_bytes());
    out
}

struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], WireError> {
        if self.buf.len() - self.pos < n {
            return Err(WireError::UnexpectedEof(what));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u64(&mut self, what: &'static str) -> Result<u64, WireError> {
        Ok(u64::from_be_bytes(self.take(8, what)?.try_into().unwrap()))
    }

    fn u32(&mut self, what: &'static str) -> Result<u32, WireError> {
        Ok(u32::from_be_bytes(self.take(4, what)?.try_into().unwrap()))
    }

    fn u8(&mut self, what: &'static str) -> Result<u8, WireError> {
        Ok(self.take(1, what)?[0])
    }
}

/// Decode one key from the front of `buf`, returning the key and the
/// number of bytes consumed.
pub fn decode_key(buf: &[u8]) -> Result<(DpfKey, usize), WireError> {
    let mut cur = ByteCursor { buf, pos: 0 };
    let s0 = cur.u64("key seed")?;
    let t0 = cur.u8("key control bit")? != 0;
    let num_cws = cur.u32("correction word count")?;
    if num_cws > MAX_KEY_LEVELS {
        return Err(WireError::BadRecord(format!(
            "correction word count {num_cws} exceeds {MAX_KEY_LEVELS}"
        )));
    }
    let mut cws = Vec::with_capacity(num_cws as usize);
    for _ in 0..num_cws {
        cws.push(CorrectionWord {
            s_l: cur.u64("correction word")?,
            s_r: cur.u64("correction word")?,
            t_l: cur.u8("correction word")? != 0,
            t_r: cur.u8("correction word")? != 0,
        });
    }
    let cw_out = cur.u64("output correction")?;
    Ok((DpfKey { s0, t0, cws, cw_out }, cur.pos))
}
