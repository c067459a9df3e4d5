use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use logsink_types::LogEnvelope;

/// Drains envelopes into newline-delimited JSON
pub struct EnvelopeWriter<W> {
    rx: mpsc::UnboundedReceiver<LogEnvelope>,
    out: W,
}

impl<W> EnvelopeWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(rx: mpsc::UnboundedReceiver<LogEnvelope>, out: W) -> Self {
        Self { rx, out }
    }

    /// Write every envelope until all senders are dropped.
    ///
    /// Returns the number of envelopes written.
    pub async fn run(mut self) -> std::io::Result<u64> {
        let mut written = 0;

        while let Some(envelope) = self.rx.recv().await {
            let mut line = serde_json::to_vec(&envelope)?;
            line.push(b'\n');
            self.out.write_all(&line).await?;
            written += 1;
        }

        self.out.flush().await?;
        tracing::debug!(written, "envelope writer finished");
        Ok(written)
    }
}
