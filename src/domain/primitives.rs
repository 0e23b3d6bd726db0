//! Domain primitives: Timestamp, IndexId, AssetId, Exchange, Pair.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Unix time in whole seconds (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn new(secs: i64) -> Self {
        Timestamp(secs)
    }

    pub fn now() -> Self {
        Timestamp(Utc::now().timestamp())
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an index portfolio (e.g. "top100").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexId(pub String);

impl IndexId {
    pub fn new(id: impl Into<String>) -> Self {
        IndexId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Market-data provider identifier of an asset (e.g. "bitcoin").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        AssetId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical form of a ticker symbol used for de-duplication and pair lookup.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Exchanges an index can source pairs from.
///
/// Binance is the primary exchange (tradability confirmed by a whitelist),
/// Bitget is the secondary one (date-gated only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    Binance,
    Bitget,
}

impl Exchange {
    /// Short prefix used in qualified pair strings.
    pub fn prefix(&self) -> &'static str {
        match self {
            Exchange::Binance => "bi",
            Exchange::Bitget => "bg",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "bi" => Some(Exchange::Binance),
            "bg" => Some(Exchange::Bitget),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::Binance => "binance",
            Exchange::Bitget => "bitget",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Exchange {
    type Err = PairParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binance" | "bi" => Ok(Exchange::Binance),
            "bitget" | "bg" => Ok(Exchange::Bitget),
            other => Err(PairParseError::UnknownExchange(other.to_string())),
        }
    }
}

/// Quote currencies a pair may be priced in, in resolution priority order.
pub const QUOTE_CURRENCIES: [&str; 2] = ["USDC", "USDT"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairParseError {
    #[error("missing exchange prefix in pair {0:?}")]
    MissingPrefix(String),
    #[error("unknown exchange {0:?}")]
    UnknownExchange(String),
    #[error("unsupported quote currency in pair {0:?}")]
    UnknownQuote(String),
}

/// An exchange-qualified trading pair, rendered as `bi.BTCUSDC`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Pair {
    pub exchange: Exchange,
    pub base: String,
    pub quote: String,
}

impl Pair {
    pub fn new(exchange: Exchange, base: &str, quote: &str) -> Self {
        Self {
            exchange,
            base: normalize_symbol(base),
            quote: normalize_symbol(quote),
        }
    }

    /// Unqualified ticker as used by the Listing Directory (e.g. `BTCUSDC`).
    pub fn ticker(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.exchange.prefix(), self.base, self.quote)
    }
}

impl FromStr for Pair {
    type Err = PairParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, ticker) = s
            .split_once('.')
            .ok_or_else(|| PairParseError::MissingPrefix(s.to_string()))?;
        let exchange = Exchange::from_prefix(prefix)
            .ok_or_else(|| PairParseError::UnknownExchange(prefix.to_string()))?;
        let ticker = normalize_symbol(ticker);
        let quote = QUOTE_CURRENCIES
            .iter()
            .find(|q| ticker.len() > q.len() && ticker.ends_with(*q))
            .ok_or_else(|| PairParseError::UnknownQuote(s.to_string()))?;
        let base = &ticker[..ticker.len() - quote.len()];
        Ok(Pair::new(exchange, base, quote))
    }
}

impl From<Pair> for String {
    fn from(pair: Pair) -> Self {
        pair.to_string()
    }
}

impl TryFrom<String> for Pair {
    type Error = PairParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
