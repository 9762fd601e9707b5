use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for the barfeed workspace.
///
/// Covers configuration mistakes, collaborator (storage, download, transport)
/// failures, delivery failures raised by the engine callback and the control
/// channel protocol used by the replay scheduler.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FeedError {
    /// The feed cannot start with the current configuration (e.g. no instruments).
    #[error("bad config: {0}")]
    BadConfig(String),

    /// A caller passed something the operation cannot work with.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// The requested capability is not implemented by the collaborator.
    #[error("unsupported capability: {capability}")]
    Unsupported {
        /// A capability string describing what was requested (e.g. "fetch-bars").
        capability: String,
    },

    /// An instrument or other lookup target does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// Description of missing resource, e.g. "instrument BTC/USDT".
        what: String,
    },

    /// Storage or download I/O failed in a named data source.
    #[error("{source_name} failed: {msg}")]
    Source {
        /// Data source name that failed.
        source_name: String,
        /// What the source reported.
        msg: String,
    },

    /// The engine callback rejected a bar.
    #[error("delivery failed for {symbol}: {msg}")]
    Delivery {
        /// Instrument whose bar could not be delivered.
        symbol: String,
        /// Reason given by the sink.
        msg: String,
    },

    /// An inbound live frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The live transport failed to connect, send or receive.
    #[error("transport error: {0}")]
    Transport(String),

    /// The scheduler control channel is full or closed.
    #[error("control channel: {0}")]
    ControlChannel(String),

    /// Bars that do not fit the feeder, such as a timeframe it cannot aggregate.
    #[error("data issue: {0}")]
    Data(String),

    /// Anything else, e.g. a panicked task.
    #[error("unknown error: {0}")]
    Other(String),
}

impl FeedError {
    /// `Unsupported` for the named capability.
    #[must_use]
    pub fn unsupported(capability: impl Into<String>) -> Self {
        Self::Unsupported {
            capability: capability.into(),
        }
    }

    /// `Source` failure of the data source `source_name`.
    pub fn source(source_name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Source {
            source_name: source_name.into(),
            msg: msg.into(),
        }
    }

    /// `NotFound` describing what was looked up.
    pub fn not_found(target: impl Into<String>) -> Self {
        Self::NotFound {
            what: target.into(),
        }
    }

    /// `Delivery` failure for `symbol`.
    pub fn delivery(symbol: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Delivery {
            symbol: symbol.into(),
            msg: msg.into(),
        }
    }

    /// Returns true if the live path may drop the offending message and keep running.
    ///
    /// Decode and transport failures are isolated per message; every other kind
    /// stops the run that produced it.
    #[must_use]
    pub const fn is_live_recoverable(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::Transport(_))
    }

    /// Returns true for errors caused by configuration rather than runtime conditions.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::BadConfig(_) | Self::InvalidArg(_))
    }
}
