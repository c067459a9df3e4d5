//! Log streaming for logsink
//!
//! This crate turns the raw byte streams a workload writes to stdout and
//! stderr into discrete, size-bounded log messages and hands them to an
//! ingress transport.

mod buffer;
mod chunker;
mod error;
mod ingress;
mod scanner;
mod streamer;
pub mod testing;

pub use buffer::StreamBuffer;
pub use chunker::split;
pub use error::StreamError;
pub use ingress::IngressClient;
pub use scanner::{Scan, scan};
pub use streamer::{LogSink, LogStreamer};

// Re-export types used in our public API
pub use logsink_types::{Channel, DEFAULT_LOG_SOURCE, MAX_MESSAGE_SIZE, Tags};
