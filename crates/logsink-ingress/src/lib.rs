//! Ingress transports for logsink
//!
//! This crate provides [`IngressClient`] implementations that hand tagged
//! messages off to an async consumer, and a writer that drains them as
//! newline-delimited JSON.

mod channel;
mod writer;

pub use channel::ChannelIngress;
pub use writer::EnvelopeWriter;

// Re-export types that are used in our public API
pub use logsink_stream::IngressClient;
pub use logsink_types::LogEnvelope;
