//! Configuration for the notification core.

use objsync_protocol::NodeRole;

/// Multiplier applied to the resend interval for per-chunk deadlines: a
/// requested chunk is re-requested only after six resend periods without
/// arriving.
const CHUNK_RESEND_FACTOR: u64 = 6;

/// Configuration for the notification core.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Role of this node in the topology.
    pub node_role: NodeRole,
    /// Maximum number of simultaneously requested data chunks per object.
    /// Only broker-based transports keep more than one request in flight.
    pub max_inflight_chunks: usize,
    /// Maximum payload size of one data message, in bytes.
    pub max_data_chunk_size: usize,
    /// Base resend interval in seconds. The external resend driver runs on
    /// this period; chunk deadlines are a multiple of it.
    pub resend_interval_secs: u64,
    /// Whether this node's store survives restarts. Nodes without
    /// persistent storage re-announce in-flight transfers when a
    /// destination reconnects.
    pub persistent_storage: bool,
}

impl NotifierConfig {
    /// Creates a configuration with defaults for the given role.
    pub fn new(node_role: NodeRole) -> Self {
        Self {
            node_role,
            max_inflight_chunks: 1,
            max_data_chunk_size: 120 * 1024,
            resend_interval_secs: 5,
            persistent_storage: true,
        }
    }

    /// Sets the in-flight chunk window.
    pub fn with_max_inflight_chunks(mut self, chunks: usize) -> Self {
        self.max_inflight_chunks = chunks;
        self
    }

    /// Sets the maximum data message payload size.
    pub fn with_max_data_chunk_size(mut self, bytes: usize) -> Self {
        self.max_data_chunk_size = bytes;
        self
    }

    /// Sets the base resend interval in seconds.
    pub fn with_resend_interval_secs(mut self, secs: u64) -> Self {
        self.resend_interval_secs = secs;
        self
    }

    /// Marks the node's store as non-persistent.
    pub fn with_persistent_storage(mut self, persistent: bool) -> Self {
        self.persistent_storage = persistent;
        self
    }

    /// Seconds a requested chunk may stay in flight before it becomes due
    /// for re-request.
    pub fn chunk_resend_delay_secs(&self) -> i64 {
        (CHUNK_RESEND_FACTOR * self.resend_interval_secs) as i64
    }
}
