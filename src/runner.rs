//! Run a workload command and capture its output

use std::io::Write;
use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use logsink_stream::{LogSink, LogStreamer, StreamError};

/// Read size for the child's pipes
const READ_CHUNK_SIZE: usize = 8192;

/// Copy raw bytes from `reader` into `sink` until EOF or cancellation
pub async fn pump<R>(mut reader: R, mut sink: LogSink, cancel: CancellationToken) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => break,
            n = reader.read(&mut buf) => n.context("failed to read workload output")?,
        };
        if n == 0 {
            break;
        }

        match sink.write_all(&buf[..n]) {
            Ok(()) => total += n as u64,
            Err(e) if StreamError::is_cancellation(&e) => break,
            Err(e) => return Err(e).context("failed to stream workload output"),
        }
    }

    tracing::debug!(channel = %sink.channel(), bytes = total, "pump finished");
    Ok(total)
}

/// Spawn `program` with `args`, streaming its stdout and stderr through `streamer`.
///
/// Cancelling `cancel` kills the child. Buffered partial lines are flushed
/// once both pipes close.
pub async fn run(
    program: &str,
    args: &[String],
    streamer: &LogStreamer,
    cancel: CancellationToken,
) -> Result<ExitStatus> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn '{program}'"))?;

    tracing::info!(program, pid = child.id(), "workload started");

    let stdout = child.stdout.take().context("child stdout not captured")?;
    let stderr = child.stderr.take().context("child stderr not captured")?;

    let out_task = tokio::spawn(pump(stdout, streamer.stdout(), cancel.clone()));
    let err_task = tokio::spawn(pump(stderr, streamer.stderr(), cancel.clone()));

    let status = tokio::select! {
        status = child.wait() => status.context("failed to wait for workload")?,
        _ = cancel.cancelled() => {
            tracing::warn!(program, "cancelled, killing workload");
            child.kill().await.context("failed to kill workload")?;
            child.wait().await.context("failed to wait for workload")?
        }
    };

    let (out, err) = tokio::try_join!(out_task, err_task).context("output pump panicked")?;
    out?;
    err?;

    if let Err(e) = streamer.flush() {
        tracing::debug!(error = %e, "final flush skipped");
    }

    tracing::info!(program, ?status, "workload exited");
    Ok(status)
}
