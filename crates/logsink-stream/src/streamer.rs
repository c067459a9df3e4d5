use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use logsink_types::{
    Channel, DEFAULT_LOG_SOURCE, MAX_MESSAGE_SIZE, Tags, WorkloadIdentity, source_or,
};

use crate::{IngressClient, StreamBuffer, StreamError};

/// Identity shared by every streamer derived from the same workload
struct Shared {
    identity: WorkloadIdentity,

    /// Custom tags plus `source_id` and `instance_id`
    tags: Tags,

    /// Liveness signal; once cancelled, writes and flushes fail
    liveness: CancellationToken,

    ingress: Arc<dyn IngressClient>,
}

struct Inner {
    shared: Arc<Shared>,
    source_name: String,
    stdout: StreamBuffer,
    stderr: StreamBuffer,
}

impl Inner {
    fn new(shared: Arc<Shared>, source_name: String) -> Self {
        Self {
            shared,
            source_name,
            stdout: StreamBuffer::new(MAX_MESSAGE_SIZE),
            stderr: StreamBuffer::new(MAX_MESSAGE_SIZE),
        }
    }

    fn buffer(&self, channel: Channel) -> &StreamBuffer {
        match channel {
            Channel::Stdout => &self.stdout,
            Channel::Stderr => &self.stderr,
        }
    }

    fn emit(&self, channel: Channel, message: &[u8]) {
        let ingress = &self.shared.ingress;
        match channel {
            Channel::Stdout => ingress.send_app_log(message, &self.source_name, &self.shared.tags),
            Channel::Stderr => {
                ingress.send_app_error_log(message, &self.source_name, &self.shared.tags)
            }
        }
    }

    fn check_live(&self) -> Result<(), StreamError> {
        if self.shared.liveness.is_cancelled() {
            tracing::warn!(
                guid = %self.shared.identity.guid,
                source = %self.source_name,
                "log streamer cancelled, refusing output"
            );
            return Err(StreamError::Cancelled);
        }
        Ok(())
    }

    fn write(&self, channel: Channel, data: &[u8]) -> Result<(), StreamError> {
        self.check_live()?;
        if !self.shared.identity.is_enabled() {
            return Ok(());
        }
        self.buffer(channel)
            .write(data, |message| self.emit(channel, message));
        Ok(())
    }

    fn flush(&self) -> Result<(), StreamError> {
        self.check_live()?;
        if !self.shared.identity.is_enabled() {
            return Ok(());
        }
        for channel in [Channel::Stdout, Channel::Stderr] {
            self.buffer(channel)
                .flush(|message| self.emit(channel, message));
        }
        Ok(())
    }
}

/// Captures a workload's stdout and stderr as tagged log messages.
///
/// Bytes written to [`stdout`](Self::stdout) and [`stderr`](Self::stderr) are
/// split into messages at line terminators, or at [`MAX_MESSAGE_SIZE`] bytes
/// without splitting a character, and handed to the ingress client along with
/// the current source name and the workload tags.
///
/// A streamer with an empty guid is disabled: writes and flushes succeed
/// without reaching the transport.
#[derive(Clone)]
pub struct LogStreamer {
    inner: Arc<Inner>,
}

impl LogStreamer {
    /// Create a streamer for the workload `guid`.
    ///
    /// An empty `source_name` falls back to [`DEFAULT_LOG_SOURCE`]. The
    /// instance index is reported verbatim, negative values included.
    pub fn new(
        liveness: CancellationToken,
        guid: impl Into<String>,
        source_name: impl Into<String>,
        index: i32,
        tags: Tags,
        ingress: Arc<dyn IngressClient>,
    ) -> Self {
        let identity = WorkloadIdentity::new(guid, index, tags);
        let source_name: String = source_name.into();
        let source_name = source_or(&source_name, DEFAULT_LOG_SOURCE).to_string();

        tracing::debug!(
            guid = %identity.guid,
            source = %source_name,
            index,
            enabled = identity.is_enabled(),
            "created log streamer"
        );

        let shared = Arc::new(Shared {
            tags: identity.message_tags(),
            identity,
            liveness,
            ingress,
        });

        Self {
            inner: Arc::new(Inner::new(shared, source_name)),
        }
    }

    /// A new streamer with fresh buffers reporting under `source_name`.
    ///
    /// An empty name keeps the current source. The receiver is untouched.
    pub fn with_source(&self, source_name: &str) -> Self {
        let source_name = source_or(source_name, &self.inner.source_name).to_string();
        tracing::debug!(source = %source_name, "derived log streamer");

        Self {
            inner: Arc::new(Inner::new(Arc::clone(&self.inner.shared), source_name)),
        }
    }

    /// Current source name
    pub fn source_name(&self) -> &str {
        &self.inner.source_name
    }

    /// Workload guid
    pub fn guid(&self) -> &str {
        &self.inner.shared.identity.guid
    }

    /// Whether messages reach the transport at all
    pub fn is_enabled(&self) -> bool {
        self.inner.shared.identity.is_enabled()
    }

    /// Byte sink for the workload's stdout
    pub fn stdout(&self) -> LogSink {
        LogSink {
            inner: Arc::clone(&self.inner),
            channel: Channel::Stdout,
        }
    }

    /// Byte sink for the workload's stderr
    pub fn stderr(&self) -> LogSink {
        LogSink {
            inner: Arc::clone(&self.inner),
            channel: Channel::Stderr,
        }
    }

    /// Emit whatever both channels hold, terminated or not
    pub fn flush(&self) -> Result<(), StreamError> {
        self.inner.flush()
    }
}

impl fmt::Debug for LogStreamer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogStreamer")
            .field("guid", &self.guid())
            .field("source_name", &self.source_name())
            .field("instance_index", &self.inner.shared.identity.instance_index)
            .finish_non_exhaustive()
    }
}

/// Write handle for one channel of a [`LogStreamer`]
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<Inner>,
    channel: Channel,
}

impl LogSink {
    pub fn channel(&self) -> Channel {
        self.channel
    }
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(self.channel, buf)?;
        Ok(buf.len())
    }

    /// Buffered bytes stay pending until a terminator or [`LogStreamer::flush`]
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    // Format up front so one `writeln!` is one write, as with a formatted print
    fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        let formatted = fmt::format(args);
        self.write_all(formatted.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::thread;

    use logsink_types::{INSTANCE_ID_TAG, SOURCE_ID_TAG};

    use super::*;
    use crate::testing::RecordingIngress;

    const GUID: &str = "the-guid";
    const SOURCE_NAME: &str = "the-source-name";
    const INDEX: i32 = 11;
    const KOALA: &str = "\u{1F428}";

    fn tags() -> Tags {
        let mut tags = Tags::new();
        tags.insert("foo".to_string(), "bar".to_string());
        tags.insert("biz".to_string(), "baz".to_string());
        tags
    }

    struct Fixture {
        streamer: LogStreamer,
        ingress: Arc<RecordingIngress>,
        liveness: CancellationToken,
    }

    fn fixture_with(guid: &str, source_name: &str, index: i32) -> Fixture {
        let ingress = Arc::new(RecordingIngress::new());
        let liveness = CancellationToken::new();
        let streamer = LogStreamer::new(
            liveness.clone(),
            guid,
            source_name,
            index,
            tags(),
            ingress.clone(),
        );
        Fixture {
            streamer,
            ingress,
            liveness,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(GUID, SOURCE_NAME, INDEX)
    }

    fn write(sink: &mut LogSink, data: &[u8]) {
        sink.write_all(data).unwrap();
    }

    #[test]
    fn test_emits_one_message_per_line() {
        let f = fixture();
        writeln!(f.streamer.stdout(), "this is a log").unwrap();
        writeln!(f.streamer.stdout(), "this is another log").unwrap();

        assert_eq!(f.ingress.app_log_count(), 2);
        for (i, expected) in ["this is a log", "this is another log"].iter().enumerate() {
            let sent = f.ingress.app_log(i);
            assert_eq!(sent.text(), *expected);
            assert_eq!(sent.source_name, SOURCE_NAME);
            assert_eq!(sent.tags[SOURCE_ID_TAG], GUID);
            assert_eq!(sent.tags[INSTANCE_ID_TAG], "11");
            assert_eq!(sent.tags["foo"], "bar");
            assert_eq!(sent.tags["biz"], "baz");
        }
    }

    #[test]
    fn test_with_source_uses_new_source() {
        let f = fixture();
        let streamer = f.streamer.with_source("new-source-name");
        writeln!(streamer.stdout(), "this is a log").unwrap();

        assert_eq!(f.ingress.app_log_count(), 1);
        assert_eq!(f.ingress.app_log(0).source_name, "new-source-name");
        assert_eq!(f.streamer.source_name(), SOURCE_NAME);
    }

    #[test]
    fn test_with_empty_source_keeps_existing_source() {
        let f = fixture();
        let streamer = f.streamer.with_source("");
        writeln!(streamer.stdout(), "this is a log").unwrap();

        assert_eq!(f.ingress.app_log_count(), 1);
        assert_eq!(f.ingress.app_log(0).source_name, SOURCE_NAME);
    }

    #[test]
    fn test_with_source_has_independent_buffers() {
        let f = fixture();
        let derived = f.streamer.with_source("other");

        write(&mut f.streamer.stdout(), b"from parent ");
        write(&mut derived.stdout(), b"from derived\n");

        assert_eq!(f.ingress.app_log_count(), 1);
        assert_eq!(f.ingress.app_log(0).text(), "from derived");
        assert_eq!(f.ingress.app_log(0).source_name, "other");

        f.streamer.flush().unwrap();
        assert_eq!(f.ingress.app_log(1).text(), "from parent ");
        assert_eq!(f.ingress.app_log(1).source_name, SOURCE_NAME);
    }

    #[test]
    fn test_source_name() {
        let f = fixture();
        assert_eq!(f.streamer.source_name(), SOURCE_NAME);
    }

    #[test]
    fn test_mixed_newlines() {
        let f = fixture();
        write(
            &mut f.streamer.stdout(),
            b"A\nB\rC\n\rD\r\nE\n\n\nF\r\r\rG\n\r\r\n\n\n\r",
        );

        let messages: Vec<String> = f.ingress.app_logs().iter().map(|s| s.text()).collect();
        assert_eq!(messages, vec!["A", "B", "C", "D", "E", "F", "G"]);
    }

    #[test]
    fn test_short_writes_concatenate() {
        let f = fixture();
        let mut stdout = f.streamer.stdout();
        write(&mut stdout, b"this is a log");
        write(&mut stdout, b" it is made of wood");
        write(&mut stdout, b" - and it is longer");
        write(&mut stdout, b"than it seems\n");

        assert_eq!(f.ingress.app_log_count(), 1);
        assert_eq!(
            f.ingress.app_log(0).text(),
            "this is a log it is made of wood - and it is longerthan it seems"
        );
    }

    #[test]
    fn test_multiple_lines_in_one_write() {
        let f = fixture();
        write(
            &mut f.streamer.stdout(),
            b"this is a log\nand this is another\nand this one isn't done yet...",
        );

        assert_eq!(f.ingress.app_log_count(), 2);
        assert_eq!(f.ingress.app_log(0).text(), "this is a log");
        assert_eq!(f.ingress.app_log(1).text(), "and this is another");
    }

    #[test]
    fn test_message_at_max_size_is_not_split() {
        let f = fixture();
        let message = "7".repeat(MAX_MESSAGE_SIZE);
        writeln!(f.streamer.stdout(), "{message}").unwrap();

        assert_eq!(f.ingress.app_log_count(), 1);
        assert_eq!(f.ingress.app_log(0).text(), message);
    }

    #[test]
    fn test_message_over_max_size_is_split() {
        let f = fixture();
        let mut message = "7".repeat(MAX_MESSAGE_SIZE);
        message += &"8".repeat(MAX_MESSAGE_SIZE);
        message += &"9".repeat(MAX_MESSAGE_SIZE);
        message += "hello\n";
        write(&mut f.streamer.stdout(), message.as_bytes());

        assert_eq!(f.ingress.app_log_count(), 4);
        assert_eq!(f.ingress.app_log(0).text(), "7".repeat(MAX_MESSAGE_SIZE));
        assert_eq!(f.ingress.app_log(1).text(), "8".repeat(MAX_MESSAGE_SIZE));
        assert_eq!(f.ingress.app_log(2).text(), "9".repeat(MAX_MESSAGE_SIZE));
        assert_eq!(f.ingress.app_log(3).text(), "hello");
    }

    #[test]
    fn test_long_character_is_not_split() {
        let f = fixture();
        let message = format!("{}{KOALA}\n", "a".repeat(MAX_MESSAGE_SIZE - 3));
        write(&mut f.streamer.stdout(), message.as_bytes());

        assert_eq!(f.ingress.app_log_count(), 2);
        assert_eq!(f.ingress.app_log(0).text(), "a".repeat(MAX_MESSAGE_SIZE - 3));
        assert_eq!(f.ingress.app_log(1).text(), KOALA);
    }

    #[test]
    fn test_partial_character_carried_between_writes() {
        let f = fixture();
        let koala = KOALA.as_bytes();
        let mut first = "9".repeat(MAX_MESSAGE_SIZE - 4).into_bytes();
        first.extend_from_slice(&koala[..2]);

        let mut stdout = f.streamer.stdout();
        write(&mut stdout, &first);
        write(&mut stdout, format!("{KOALA}\n").as_bytes());

        assert_eq!(f.ingress.app_log_count(), 2);
        assert_eq!(f.ingress.app_log(0).message, first);
        assert_eq!(f.ingress.app_log(1).text(), KOALA);
    }

    #[test]
    fn test_window_of_incomplete_characters_drops_last_three_bytes() {
        let f = fixture();
        let message = KOALA.as_bytes()[..2].repeat(MAX_MESSAGE_SIZE / 2);
        assert_eq!(message.len(), MAX_MESSAGE_SIZE);

        write(&mut f.streamer.stdout(), &message);

        assert_eq!(f.ingress.app_log_count(), 1);
        assert_eq!(
            f.ingress.app_log(0).message,
            &message[..MAX_MESSAGE_SIZE - 3]
        );
    }

    #[test]
    fn test_overflow_while_concatenating() {
        let f = fixture();
        let mut stdout = f.streamer.stdout();
        write(&mut stdout, "7".repeat(MAX_MESSAGE_SIZE - 2).as_bytes());
        write(&mut stdout, b"778888\n");

        assert_eq!(f.ingress.app_log_count(), 2);
        assert_eq!(f.ingress.app_log(0).text(), "7".repeat(MAX_MESSAGE_SIZE));
        assert_eq!(f.ingress.app_log(1).text(), "8888");
    }

    #[test]
    fn test_stderr_short_messages() {
        let f = fixture();
        write(
            &mut f.streamer.stderr(),
            b"this is a log\nand this is another\nand this one isn't done yet...",
        );

        assert_eq!(f.ingress.error_log_count(), 2);
        assert_eq!(f.ingress.app_log_count(), 0);

        let first = f.ingress.error_log(0);
        assert_eq!(first.text(), "this is a log");
        assert_eq!(first.source_name, SOURCE_NAME);

        let second = f.ingress.error_log(1);
        assert_eq!(second.text(), "and this is another");
        assert_eq!(second.source_name, SOURCE_NAME);
    }

    #[test]
    fn test_stderr_long_messages() {
        let f = fixture();
        writeln!(f.streamer.stderr(), "{}", "e".repeat(MAX_MESSAGE_SIZE + 1)).unwrap();

        assert_eq!(f.ingress.error_log_count(), 2);
        assert_eq!(f.ingress.error_log(0).text(), "e".repeat(MAX_MESSAGE_SIZE));
        assert_eq!(f.ingress.error_log(1).text(), "e");
    }

    #[test]
    fn test_flush_sends_remainders() {
        let f = fixture();
        write(&mut f.streamer.stdout(), b"this is a stdout");
        write(&mut f.streamer.stderr(), b"this is a stderr");

        assert_eq!(f.ingress.app_log_count(), 0);
        assert_eq!(f.ingress.error_log_count(), 0);

        f.streamer.flush().unwrap();

        assert_eq!(f.ingress.app_log_count(), 1);
        assert_eq!(f.ingress.error_log_count(), 1);
        assert_eq!(f.ingress.app_log(0).text(), "this is a stdout");
        assert_eq!(f.ingress.error_log(0).text(), "this is a stderr");

        f.streamer.flush().unwrap();
        assert_eq!(f.ingress.all().len(), 2);
    }

    #[test]
    fn test_no_guid_does_nothing() {
        let f = fixture_with("", SOURCE_NAME, INDEX);
        assert!(!f.streamer.is_enabled());

        write(&mut f.streamer.stdout(), b"hi");
        write(&mut f.streamer.stderr(), b"hi\n");
        f.streamer.flush().unwrap();

        assert!(f.ingress.all().is_empty());
    }

    #[test]
    fn test_no_source_defaults_to_log() {
        let f = fixture_with(GUID, "", -1);
        write(&mut f.streamer.stdout(), b"hi");
        f.streamer.flush().unwrap();

        assert_eq!(f.ingress.app_log_count(), 1);
        assert_eq!(f.ingress.app_log(0).source_name, DEFAULT_LOG_SOURCE);
    }

    #[test]
    fn test_negative_index_is_verbatim() {
        let f = fixture_with(GUID, SOURCE_NAME, -1);
        write(&mut f.streamer.stdout(), b"hi");
        f.streamer.flush().unwrap();

        assert_eq!(f.ingress.app_log_count(), 1);
        assert_eq!(f.ingress.app_log(0).tags[INSTANCE_ID_TAG], "-1");
    }

    #[test]
    fn test_concurrent_writers() {
        let f = fixture();
        let lines: Vec<String> = (0..8).map(|i| format!("line {i} from a writer")).collect();

        thread::scope(|scope| {
            for line in &lines {
                let mut stdout = f.streamer.stdout();
                scope.spawn(move || {
                    for _ in 0..50 {
                        writeln!(stdout, "{line}").unwrap();
                    }
                });
            }
        });

        let sent = f.ingress.app_logs();
        assert_eq!(sent.len(), lines.len() * 50);
        for line in &lines {
            assert_eq!(sent.iter().filter(|s| s.text() == *line).count(), 50);
        }
    }

    #[test]
    fn test_cancelled_writes_fail() {
        let f = fixture();
        f.liveness.cancel();

        let err = writeln!(f.streamer.stdout(), "this is a log").unwrap_err();
        assert!(StreamError::is_cancellation(&err));
        let err = writeln!(f.streamer.stderr(), "this is another log").unwrap_err();
        assert!(StreamError::is_cancellation(&err));

        assert_eq!(f.streamer.flush(), Err(StreamError::Cancelled));
        assert!(f.ingress.all().is_empty());
    }

    #[test]
    fn test_cancellation_leaves_pending_untouched() {
        let f = fixture();
        write(&mut f.streamer.stdout(), b"partial");
        f.liveness.cancel();

        assert!(f.streamer.stdout().write_all(b" more\n").is_err());
        assert_eq!(f.streamer.inner.stdout.pending_len(), "partial".len());
        assert!(f.ingress.all().is_empty());
    }

    #[test]
    fn test_cancellation_reaches_derived_streamers() {
        let f = fixture();
        let derived = f.streamer.with_source("other");
        f.liveness.cancel();

        assert!(derived.stdout().write_all(b"x\n").is_err());
        assert_eq!(derived.flush(), Err(StreamError::Cancelled));
    }
}
