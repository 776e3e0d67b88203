//! External collaborators consumed by the notification core.
//!
//! Leader election, data-URI streaming, and webhook dispatch live outside
//! this crate; the core consumes them through the traits below. The bundled
//! implementations cover single-node deployments and tests.

use std::collections::HashMap;
use std::io::Read;

use parking_lot::{Mutex, RwLock};

use objsync_protocol::MetaData;

use crate::error::{NotifierError, NotifierResult};

/// Leader election of the central sync service cluster.
///
/// Only the elected leader may process mid-stream data chunks; see
/// `NotificationHandler::handle_data`.
pub trait LeaderElection: Send + Sync {
    /// Whether this node currently holds leadership.
    fn check_if_leader(&self) -> bool;
}

/// A leader answer fixed at construction.
///
/// Single-node deployments are always the leader; tests use the non-leader
/// form to exercise the chunked-data restriction.
#[derive(Debug, Clone, Copy)]
pub struct FixedLeader {
    leader: bool,
}

impl FixedLeader {
    /// Creates a fixed leadership answer.
    pub fn new(leader: bool) -> Self {
        Self { leader }
    }
}

impl LeaderElection for FixedLeader {
    fn check_if_leader(&self) -> bool {
        self.leader
    }
}

/// Streaming sink for objects whose data lives behind a data URI instead of
/// the store.
pub trait DataUriSink: Send + Sync {
    /// Writes `data_length` bytes from `reader` at `offset` within the
    /// resource behind `uri`.
    #[allow(clippy::too_many_arguments)]
    fn append_data(
        &self,
        uri: &str,
        reader: &mut dyn Read,
        data_length: usize,
        offset: i64,
        total_size: i64,
        is_first_chunk: bool,
        is_last_chunk: bool,
    ) -> NotifierResult<()>;

    /// Reads up to `max_length` bytes at `offset` from the resource behind
    /// `uri`. Returns the bytes and whether the end was reached.
    fn get_data_chunk(
        &self,
        uri: &str,
        max_length: usize,
        offset: i64,
    ) -> NotifierResult<(Vec<u8>, bool)>;
}

/// Rejects every data-URI operation.
///
/// The default sink for deployments whose objects keep their data in the
/// store.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDataUri;

impl DataUriSink for NoDataUri {
    fn append_data(
        &self,
        uri: &str,
        _reader: &mut dyn Read,
        _data_length: usize,
        _offset: i64,
        _total_size: i64,
        _is_first_chunk: bool,
        _is_last_chunk: bool,
    ) -> NotifierResult<()> {
        Err(NotifierError::DataUri(format!(
            "no data URI sink configured (uri {uri})"
        )))
    }

    fn get_data_chunk(
        &self,
        uri: &str,
        _max_length: usize,
        _offset: i64,
    ) -> NotifierResult<(Vec<u8>, bool)> {
        Err(NotifierError::DataUri(format!(
            "no data URI sink configured (uri {uri})"
        )))
    }
}

/// An in-memory data-URI sink. Test support.
#[derive(Debug, Default)]
pub struct MemoryDataUri {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryDataUri {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the resource behind `uri` with `data`.
    pub fn insert(&self, uri: impl Into<String>, data: Vec<u8>) {
        self.blobs.write().insert(uri.into(), data);
    }

    /// Returns a copy of the resource behind `uri`, if any.
    pub fn data(&self, uri: &str) -> Option<Vec<u8>> {
        self.blobs.read().get(uri).cloned()
    }
}

impl DataUriSink for MemoryDataUri {
    fn append_data(
        &self,
        uri: &str,
        reader: &mut dyn Read,
        data_length: usize,
        offset: i64,
        _total_size: i64,
        _is_first_chunk: bool,
        _is_last_chunk: bool,
    ) -> NotifierResult<()> {
        let mut chunk = vec![0u8; data_length];
        reader
            .read_exact(&mut chunk)
            .map_err(|error| NotifierError::DataUri(error.to_string()))?;

        let offset = usize::try_from(offset)
            .map_err(|_| NotifierError::DataUri("negative offset".into()))?;
        let mut blobs = self.blobs.write();
        let data = blobs.entry(uri.to_string()).or_default();
        if data.len() < offset + data_length {
            data.resize(offset + data_length, 0);
        }
        data[offset..offset + data_length].copy_from_slice(&chunk);
        Ok(())
    }

    fn get_data_chunk(
        &self,
        uri: &str,
        max_length: usize,
        offset: i64,
    ) -> NotifierResult<(Vec<u8>, bool)> {
        let blobs = self.blobs.read();
        let data = blobs
            .get(uri)
            .ok_or_else(|| NotifierError::DataUri(format!("unknown data URI {uri}")))?;

        let offset = usize::try_from(offset)
            .map_err(|_| NotifierError::DataUri("negative offset".into()))?;
        let start = usize::min(offset, data.len());
        let end = usize::min(start + max_length, data.len());
        Ok((data[start..end].to_vec(), end >= data.len()))
    }
}

/// Webhook dispatch fired after an object is completely received.
pub trait WebhookSink: Send + Sync {
    /// Notifies registered webhooks about `meta`. Fire-and-forget; failures
    /// are the sink's concern.
    fn call_webhooks(&self, meta: &MetaData);
}

/// Discards webhook calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWebhooks;

impl WebhookSink for NoWebhooks {
    fn call_webhooks(&self, _meta: &MetaData) {}
}

/// Records webhook calls. Test support.
#[derive(Debug, Default)]
pub struct RecordingWebhooks {
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingWebhooks {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the `(object_type, object_id)` pairs of every call.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

impl WebhookSink for RecordingWebhooks {
    fn call_webhooks(&self, meta: &MetaData) {
        self.calls
            .lock()
            .push((meta.object_type.clone(), meta.object_id.clone()));
    }
}
