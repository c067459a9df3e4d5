use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use logsink_stream::IngressClient;
use logsink_types::{Channel, LogEnvelope, Tags};

/// Fire-and-forget transport onto an unbounded tokio channel.
///
/// Sending never blocks, so it is safe to call under a stream buffer lock.
/// Once the receiver is gone messages are dropped and a single warning is
/// logged.
pub struct ChannelIngress {
    tx: mpsc::UnboundedSender<LogEnvelope>,

    /// Set after the first failed send
    closed: AtomicBool,
}

impl ChannelIngress {
    /// Create a transport and the receiver that drains it
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LogEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::from_sender(tx), rx)
    }

    pub fn from_sender(tx: mpsc::UnboundedSender<LogEnvelope>) -> Self {
        Self {
            tx,
            closed: AtomicBool::new(false),
        }
    }

    fn send(&self, channel: Channel, message: &[u8], source_name: &str, tags: &Tags) {
        let envelope = LogEnvelope::new(channel, message, source_name, tags);
        if self.tx.send(envelope).is_err() && !self.closed.swap(true, Ordering::Relaxed) {
            tracing::warn!("log receiver closed, dropping messages");
        }
    }
}

impl IngressClient for ChannelIngress {
    fn send_app_log(&self, message: &[u8], source_name: &str, tags: &Tags) {
        self.send(Channel::Stdout, message, source_name, tags);
    }

    fn send_app_error_log(&self, message: &[u8], source_name: &str, tags: &Tags) {
        self.send(Channel::Stderr, message, source_name, tags);
    }
}
