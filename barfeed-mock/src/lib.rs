//! In-memory collaborators for barfeed tests and demos.
#![warn(missing_docs)]

mod dynamic;
mod feeder;
pub mod fixtures;
mod progress;
mod resolver;
mod sink;
mod store;

pub use dynamic::{DynamicTransport, TransportController, WatchCall};
pub use feeder::VecFeeder;
pub use progress::CountingProgress;
pub use resolver::StaticResolver;
pub use sink::{BarHook, RecordingSink};
pub use store::MemoryStore;
