//! Parameter and query file formats.

use crate::errors::ConfigError;
use crate::ring::{Ring64, RingVec};

/// Global protocol parameters: `m` users, `n` items, dimension `k`, and
/// `q` queries. Read by the dealer from `params.txt` as four
/// whitespace-separated decimals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Params {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub q: usize,
}

impl Params {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut tokens = text.split_whitespace();
        let mut field = |name: &str| -> Result<usize, ConfigError> {
            let tok = tokens
                .next()
                .ok_or_else(|| ConfigError::Truncated(format!("parameter {name}")))?;
            tok.parse::<usize>()
                .map_err(|_| ConfigError::BadValue(tok.to_string()))
        };
        Ok(Params {
            m: field("m")?,
            n: field("n")?,
            k: field("k")?,
            q: field("q")?,
        })
    }
}

/// One query as read from a party's queries file: the targeted user row,
/// the targeted item row, and this party's additive share of the item
/// vector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    pub user_idx: usize,
    pub item_idx: usize,
    pub v: RingVec,
}

/// Parse a queries file: a `q k` header line, then `q` records of
/// `user_idx item_idx v_0 .. v_{k-1}`. Returns the queries and `k`.
pub fn parse_queries(text: &str) -> Result<(Vec<Query>, usize), ConfigError> {
    let mut tokens = text.split_whitespace();
    fn index<'a>(
        tokens: &mut impl Iterator<Item = &'a str>,
        what: &str,
    ) -> Result<usize, ConfigError> {
        let tok = tokens
            .next()
            .ok_or_else(|| ConfigError::Truncated(what.to_string()))?;
        tok.parse::<usize>()
            .map_err(|_| ConfigError::BadValue(tok.to_string()))
    }
    let q = index(&mut tokens, "query count")?;
    let k = index(&mut tokens, "query dimension")?;

    let mut queries = Vec::with_capacity(q);
    for record in 0..q {
        let user_idx = index(&mut tokens, &format!("query {record} user index"))?;
        let item_idx = index(&mut tokens, &format!("query {record} item index"))?;
        let mut v = Vec::with_capacity(k);
        for coord in 0..k {
            let tok = tokens
                .next()
                .ok_or_else(|| ConfigError::Truncated(format!("query {record} value {coord}")))?;
            v.push(
                tok.parse::<Ring64>()
                    .map_err(|_| ConfigError::BadValue(tok.to_string()))?,
            );
        }
        queries.push(Query {
            user_idx,
            item_idx,
            v: RingVec::new(v),
        });
    }
    Ok((queries, k))
}
