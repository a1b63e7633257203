/// ChatFlow - live chat stream threading
///
/// Classifies incoming chat messages into direct, reply and spam threads,
/// keeps a bounded message log, and serves the resulting state to
/// renderers over a small query API.

pub mod error;
pub mod config;
pub mod message;
pub mod classifier;
pub mod aggregator;
pub mod view;
pub mod bridge;
pub mod demo;
pub mod service;
pub mod api;
pub mod cli_app;

pub use error::{FlowError, Result};
pub use config::Config;
pub use message::{Message, MessageType, RawMessage};
pub use classifier::{classify, SPAM_BIN};
pub use aggregator::{Aggregator, Thread};
pub use service::{FlowHandle, FlowService, Snapshot, StreamStatus};
