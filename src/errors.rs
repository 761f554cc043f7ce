use crate::models::PairKey;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SdkError>;

#[derive(Debug, Error)]
pub enum SdkError {
    /// The block subscription could not be established or was lost.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Refreshing state from the helper failed. Isolated to `target`.
    #[error("State fetch failed for {target}: {source}")]
    StateFetch {
        target: String,
        #[source]
        source: Box<SdkError>,
    },

    /// Cached or fetched reserves violate the cache invariants.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Client is not running")]
    NotRunning,

    #[error("Unsupported chain id {0}")]
    UnsupportedChain(u64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Arithmetic overflow: {0}")]
    Overflow(&'static str),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Provider error: {0}")]
    Provider(#[from] ethers::providers::ProviderError),

    #[error("ABI error: {0}")]
    Abi(#[from] ethers::abi::Error),

    #[error("Serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Other: {0}")]
    Other(String),
}

impl SdkError {
    /// Wrap `self` as a fetch failure for `pair`, unless it already is one.
    pub fn for_pair(self, pair: PairKey) -> Self {
        self.fetching(format!("pair {pair}"))
    }

    /// Wrap `self` as a fetch failure for `target`, unless it already is one.
    pub fn fetching(self, target: impl Into<String>) -> Self {
        match self {
            e @ SdkError::StateFetch { .. } => e,
            other => SdkError::StateFetch {
                target: target.into(),
                source: Box::new(other),
            },
        }
    }

    /// True when the underlying cause is bad data rather than a transport failure.
    pub fn is_invalid_state(&self) -> bool {
        match self {
            SdkError::InvalidState(_) => true,
            SdkError::StateFetch { source, .. } => source.is_invalid_state(),
            _ => false,
        }
    }
}
