use logsink_types::Tags;

/// Transport that delivers tagged messages to a remote log collector.
///
/// Calls are fire-and-forget: failures stay inside the transport. Both
/// methods are invoked while a stream buffer lock is held and must not block.
pub trait IngressClient: Send + Sync {
    /// Deliver a message captured from the workload's stdout
    fn send_app_log(&self, message: &[u8], source_name: &str, tags: &Tags);

    /// Deliver a message captured from the workload's stderr
    fn send_app_error_log(&self, message: &[u8], source_name: &str, tags: &Tags);
}
