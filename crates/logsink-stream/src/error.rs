use std::io;

use thiserror::Error;

/// Errors returned by log streamer writes and flushes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The liveness signal was cancelled; further output is pointless
    #[error("log streamer cancelled")]
    Cancelled,
}

impl StreamError {
    /// Whether an I/O error returned by a [`LogSink`](crate::LogSink) wraps this error
    pub fn is_cancellation(err: &io::Error) -> bool {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<StreamError>())
            .is_some_and(|e| *e == StreamError::Cancelled)
    }
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Cancelled => io::Error::new(io::ErrorKind::BrokenPipe, err),
        }
    }
}
