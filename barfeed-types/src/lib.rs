//! Shared error, configuration and capability types for barfeed.
#![warn(missing_docs)]

mod capability;
mod config;
mod error;
mod range;

pub use capability::Capability;
pub use config::{BackoffConfig, CompletionConfig, FeedConfig};
pub use error::FeedError;
pub use range::TimeRange;
