use parking_lot::Mutex;

use crate::chunker;
use crate::scanner;

/// Bytes accumulated since the last emission
#[derive(Default)]
struct Pending {
    bytes: Vec<u8>,

    /// Length of the prefix carried over from earlier writes
    confirmed: usize,
}

/// Per-channel line accumulator.
///
/// Combines terminator scanning and rune-safe chunking across successive
/// writes. Emission happens through a callback invoked while the buffer lock
/// is held, so messages from one buffer reach the callback in the order their
/// terminators were observed.
pub struct StreamBuffer {
    /// Internal storage
    pending: Mutex<Pending>,

    /// Maximum emitted message size
    max_size: usize,
}

impl StreamBuffer {
    /// Create an empty buffer emitting messages of at most `max_size` bytes
    pub fn new(max_size: usize) -> Self {
        Self {
            pending: Mutex::new(Pending::default()),
            max_size,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of bytes waiting for a terminator
    pub fn pending_len(&self) -> usize {
        self.pending.lock().bytes.len()
    }

    /// Append `data` and emit every message it completes.
    ///
    /// Complete lines are emitted in order, split into several messages when
    /// longer than the maximum size. An unterminated tail that fills the
    /// window is force-chunked, so fewer than `max_size` bytes stay pending.
    pub fn write<F>(&self, data: &[u8], mut emit: F)
    where
        F: FnMut(&[u8]),
    {
        let mut pending = self.pending.lock();
        pending.bytes.extend_from_slice(data);

        let mut confirmed = pending.confirmed;
        let scan = scanner::scan(&pending.bytes);

        for segment in scan.segments {
            let mut line = &pending.bytes[segment];
            while line.len() > self.max_size {
                let (head, tail) = chunker::split(line, self.max_size, confirmed);
                tracing::trace!(len = head.len(), "forced chunk");
                emit(head);
                line = tail;
                confirmed = 0;
            }
            if !line.is_empty() {
                emit(line);
            }
            confirmed = 0;
        }

        let mut rest = &pending.bytes[scan.remainder];
        while rest.len() >= self.max_size {
            let (head, tail) = chunker::split(rest, self.max_size, confirmed);
            tracing::trace!(len = head.len(), "forced chunk");
            emit(head);
            rest = tail;
            confirmed = 0;
        }

        let consumed = pending.bytes.len() - rest.len();
        pending.bytes.drain(..consumed);
        pending.confirmed = pending.bytes.len();
    }

    /// Emit whatever is pending, complete or not
    pub fn flush<F>(&self, mut emit: F)
    where
        F: FnMut(&[u8]),
    {
        let mut pending = self.pending.lock();
        if !pending.bytes.is_empty() {
            emit(&pending.bytes);
            pending.bytes.clear();
        }
        pending.confirmed = 0;
    }
}
