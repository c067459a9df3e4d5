//! Test double for [`IngressClient`].
//!
//! [`RecordingIngress`] records every call so tests can assert on exactly
//! what a [`LogStreamer`](crate::LogStreamer) handed to its transport.
//!
//! ```
//! use std::io::Write;
//! use std::sync::Arc;
//!
//! use logsink_stream::testing::RecordingIngress;
//! use logsink_stream::{LogStreamer, Tags};
//! use tokio_util::sync::CancellationToken;
//!
//! let ingress = Arc::new(RecordingIngress::new());
//! let streamer = LogStreamer::new(
//!     CancellationToken::new(),
//!     "the-guid",
//!     "APP",
//!     0,
//!     Tags::new(),
//!     ingress.clone(),
//! );
//!
//! writeln!(streamer.stdout(), "hello").unwrap();
//! assert_eq!(ingress.app_log_count(), 1);
//! assert_eq!(ingress.app_log(0).message, b"hello");
//! ```

use parking_lot::Mutex;

use logsink_types::{Channel, Tags};

use crate::IngressClient;

/// One recorded transport call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentLog {
    pub channel: Channel,
    pub message: Vec<u8>,
    pub source_name: String,
    pub tags: Tags,
}

impl SentLog {
    /// Message text, with invalid bytes replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.message).into_owned()
    }
}

/// Ingress client that keeps every call in memory
#[derive(Default)]
pub struct RecordingIngress {
    sent: Mutex<Vec<SentLog>>,
}

impl RecordingIngress {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, channel: Channel, message: &[u8], source_name: &str, tags: &Tags) {
        self.sent.lock().push(SentLog {
            channel,
            message: message.to_vec(),
            source_name: source_name.to_string(),
            tags: tags.clone(),
        });
    }

    /// All calls in the order they were made
    pub fn all(&self) -> Vec<SentLog> {
        self.sent.lock().clone()
    }

    fn on(&self, channel: Channel) -> Vec<SentLog> {
        self.sent
            .lock()
            .iter()
            .filter(|s| s.channel == channel)
            .cloned()
            .collect()
    }

    /// Calls to `send_app_log`
    pub fn app_logs(&self) -> Vec<SentLog> {
        self.on(Channel::Stdout)
    }

    /// Calls to `send_app_error_log`
    pub fn error_logs(&self) -> Vec<SentLog> {
        self.on(Channel::Stderr)
    }

    pub fn app_log_count(&self) -> usize {
        self.app_logs().len()
    }

    pub fn error_log_count(&self) -> usize {
        self.error_logs().len()
    }

    /// The `index`th `send_app_log` call; panics when out of range
    pub fn app_log(&self, index: usize) -> SentLog {
        self.app_logs()[index].clone()
    }

    /// The `index`th `send_app_error_log` call; panics when out of range
    pub fn error_log(&self, index: usize) -> SentLog {
        self.error_logs()[index].clone()
    }
}

impl IngressClient for RecordingIngress {
    fn send_app_log(&self, message: &[u8], source_name: &str, tags: &Tags) {
        self.record(Channel::Stdout, message, source_name, tags);
    }

    fn send_app_error_log(&self, message: &[u8], source_name: &str, tags: &Tags) {
        self.record(Channel::Stderr, message, source_name, tags);
    }
}
