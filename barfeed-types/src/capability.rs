use core::fmt;
use serde::{Deserialize, Serialize};

/// Optional features a data collaborator may or may not provide.
///
/// Used in `Unsupported` errors and log fields so messages stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Capability {
    /// Range and look-back queries against stored bars.
    FetchBars,
    /// Filling storage gaps from the exchange.
    DownloadBars,
    /// Resolving a symbol string to instrument metadata.
    ResolveSymbol,
    /// Live bar push stream.
    LiveBars,
}

impl Capability {
    /// Stable, kebab-case identifier for logs/errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FetchBars => "fetch-bars",
            Self::DownloadBars => "download-bars",
            Self::ResolveSymbol => "resolve-symbol",
            Self::LiveBars => "live-bars",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
