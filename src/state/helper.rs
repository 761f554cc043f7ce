//! Codec and client for the on-chain helper contract.
//!
//! The helper exposes:
//!
//! ```text
//! getOrderbook(address base, address quote)
//!     returns (PairOrderbook book, uint256 blockNumber, uint256 blockTimestamp)
//! getAllOrderbooks()
//!     returns (PairOrderbook[] books, uint256 blockNumber, uint256 blockTimestamp)
//!
//! PairOrderbook = (address base, address quote,
//!                  CumulativeLevel[] askCumulativeLevels,
//!                  CumulativeLevel[] bidCumulativeLevels,
//!                  uint256 balanceBase, uint256 balanceQuote)
//! CumulativeLevel = (uint256 amountIn, uint256 amountOut)
//! ```

use crate::errors::{Result, SdkError};
use crate::feed::{ChainFeed, Selector};
use crate::models::ProbePoint;
use alloy_primitives::{Address, Bytes, U256};
use ethers::abi::{self, ParamType, Token};
use std::sync::Arc;

pub const GET_ORDERBOOK_SIG: &str = "getOrderbook(address,address)";
pub const GET_ALL_ORDERBOOKS_SIG: &str = "getAllOrderbooks()";

/// Raw reserves and probe levels for one pair, as returned by the helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPairData {
    pub base: Address,
    pub quote: Address,
    /// quote -> base
    pub ask_probes: Vec<ProbePoint>,
    /// base -> quote
    pub bid_probes: Vec<ProbePoint>,
    pub balance_base: U256,
    pub balance_quote: U256,
}

/// Helper response together with the block it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub pairs: Vec<RawPairData>,
    pub block_number: u64,
    pub block_timestamp: u64,
}

/// Typed access to the helper contract through a [`ChainFeed`].
#[derive(Clone)]
pub struct HelperClient {
    feed: Arc<dyn ChainFeed>,
    address: Address,
}

impl HelperClient {
    pub fn new(feed: Arc<dyn ChainFeed>, address: Address) -> Self {
        Self { feed, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Call `getOrderbook(base, quote)` for a single pair.
    pub async fn fetch_orderbook(
        &self,
        base: Address,
        quote: Address,
        at_block: Option<u64>,
    ) -> Result<FetchResult> {
        let raw = self
            .feed
            .call_contract(
                self.address,
                selector(GET_ORDERBOOK_SIG),
                encode_get_orderbook_args(base, quote),
                at_block,
            )
            .await?;
        decode_orderbook_response(&raw)
    }

    /// Call `getAllOrderbooks()`.
    pub async fn fetch_all_orderbooks(&self, at_block: Option<u64>) -> Result<FetchResult> {
        let raw = self
            .feed
            .call_contract(
                self.address,
                selector(GET_ALL_ORDERBOOKS_SIG),
                Bytes::new(),
                at_block,
            )
            .await?;
        decode_all_orderbooks_response(&raw)
    }
}

pub fn selector(signature: &str) -> Selector {
    ethers::utils::id(signature)
}

pub fn encode_get_orderbook_args(base: Address, quote: Address) -> Bytes {
    abi::encode(&[
        Token::Address(to_h160(base)),
        Token::Address(to_h160(quote)),
    ])
    .into()
}

pub fn decode_orderbook_response(data: &[u8]) -> Result<FetchResult> {
    let mut tokens = abi::decode(
        &[orderbook_type(), ParamType::Uint(256), ParamType::Uint(256)],
        data,
    )?
    .into_iter();
    let book = decode_pair(next(&mut tokens)?)?;
    let (block_number, block_timestamp) = decode_block_meta(&mut tokens)?;
    Ok(FetchResult {
        pairs: vec![book],
        block_number,
        block_timestamp,
    })
}

pub fn decode_all_orderbooks_response(data: &[u8]) -> Result<FetchResult> {
    let mut tokens = abi::decode(
        &[
            ParamType::Array(Box::new(orderbook_type())),
            ParamType::Uint(256),
            ParamType::Uint(256),
        ],
        data,
    )?
    .into_iter();
    let pairs = match next(&mut tokens)? {
        Token::Array(books) => books
            .into_iter()
            .map(decode_pair)
            .collect::<Result<Vec<_>>>()?,
        other => return Err(unexpected("PairOrderbook[]", &other)),
    };
    let (block_number, block_timestamp) = decode_block_meta(&mut tokens)?;
    Ok(FetchResult {
        pairs,
        block_number,
        block_timestamp,
    })
}

fn level_type() -> ParamType {
    ParamType::Tuple(vec![ParamType::Uint(256), ParamType::Uint(256)])
}

fn orderbook_type() -> ParamType {
    ParamType::Tuple(vec![
        ParamType::Address,
        ParamType::Address,
        ParamType::Array(Box::new(level_type())),
        ParamType::Array(Box::new(level_type())),
        ParamType::Uint(256),
        ParamType::Uint(256),
    ])
}

fn decode_pair(token: Token) -> Result<RawPairData> {
    let fields = match token {
        Token::Tuple(fields) if fields.len() == 6 => fields,
        other => return Err(unexpected("PairOrderbook", &other)),
    };
    let mut fields = fields.into_iter();
    let base = as_address(next(&mut fields)?)?;
    let quote = as_address(next(&mut fields)?)?;
    let ask_probes = decode_levels(next(&mut fields)?)?;
    let bid_probes = decode_levels(next(&mut fields)?)?;
    let balance_base = as_u256(next(&mut fields)?)?;
    let balance_quote = as_u256(next(&mut fields)?)?;
    Ok(RawPairData {
        base,
        quote,
        ask_probes,
        bid_probes,
        balance_base,
        balance_quote,
    })
}

/// Failed or empty probes come back as zero-input levels and are dropped.
fn decode_levels(token: Token) -> Result<Vec<ProbePoint>> {
    let levels = match token {
        Token::Array(levels) => levels,
        other => return Err(unexpected("CumulativeLevel[]", &other)),
    };
    let mut probes = Vec::with_capacity(levels.len());
    for level in levels {
        let mut parts = match level {
            Token::Tuple(parts) if parts.len() == 2 => parts.into_iter(),
            other => return Err(unexpected("CumulativeLevel", &other)),
        };
        let amount_in = as_u256(next(&mut parts)?)?;
        let amount_out = as_u256(next(&mut parts)?)?;
        if !amount_in.is_zero() {
            probes.push(ProbePoint::new(amount_in, amount_out));
        }
    }
    Ok(probes)
}

fn decode_block_meta(tokens: &mut impl Iterator<Item = Token>) -> Result<(u64, u64)> {
    let block_number = as_u64(next(tokens)?, "blockNumber")?;
    let block_timestamp = as_u64(next(tokens)?, "blockTimestamp")?;
    Ok((block_number, block_timestamp))
}

fn next(tokens: &mut impl Iterator<Item = Token>) -> Result<Token> {
    tokens
        .next()
        .ok_or_else(|| SdkError::Other("helper response is missing a field".into()))
}

fn unexpected(expected: &str, got: &Token) -> SdkError {
    SdkError::Other(format!("helper response: expected {expected}, got {got:?}"))
}

fn as_address(token: Token) -> Result<Address> {
    match token {
        Token::Address(a) => Ok(Address::from(a.0)),
        other => Err(unexpected("address", &other)),
    }
}

fn as_u256(token: Token) -> Result<U256> {
    match token {
        Token::Uint(v) => Ok(U256::from_limbs(v.0)),
        other => Err(unexpected("uint256", &other)),
    }
}

fn as_u64(token: Token, field: &str) -> Result<u64> {
    let value = as_u256(token)?;
    u64::try_from(value)
        .map_err(|_| SdkError::InvalidState(format!("{field} {value} does not fit in u64")))
}

pub(crate) fn to_h160(address: Address) -> ethers::types::H160 {
    ethers::types::H160::from_slice(address.as_slice())
}
