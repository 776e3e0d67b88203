//! Error types for the notification core.

use objsync_codec::CodecError;
use objsync_store::StoreError;
use thiserror::Error;

/// Result type for notification handling.
pub type NotifierResult<T> = Result<T, NotifierError>;

/// Errors produced by the notification core.
///
/// Stale events — instance-id or status mismatches against the stored
/// notification record — are mostly absorbed inside the handlers: the event
/// is logged and dropped. `handle_data` is the exception; it surfaces
/// [`NotifierError::StaleEvent`] so the transport knows the chunk was not
/// consumed.
#[derive(Debug, Error)]
pub enum NotifierError {
    /// A data message violated the wire format or lacked required fields.
    #[error("malformed data message: {0}")]
    Codec(#[from] CodecError),

    /// The event does not match the stored notification record or the
    /// in-flight transfer state.
    #[error("stale event for {object_type} {object_id}: {reason}")]
    StaleEvent {
        /// Object type of the event.
        object_type: String,
        /// Object id of the event.
        object_id: String,
        /// What did not match.
        reason: String,
    },

    /// No notification record exists for an event that requires one.
    #[error("no notification record for {object_type} {object_id}")]
    MissingRecord {
        /// Object type of the event.
        object_type: String,
        /// Object id of the event.
        object_id: String,
    },

    /// The store does not hold the object the event refers to.
    #[error("object {object_type} {object_id} is not in the store")]
    MissingObject {
        /// Object type of the event.
        object_type: String,
        /// Object id of the event.
        object_id: String,
    },

    /// A store operation failed.
    #[error("store error: {0}")]
    Storage(#[from] StoreError),

    /// A non-leader CSS node received a mid-stream data chunk.
    #[error("only the leader node may handle chunked data")]
    NotLeader,

    /// An outbound send failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Reading from or writing to a data URI failed.
    #[error("data URI error: {0}")]
    DataUri(String),

    /// The registration request was rejected.
    #[error("registration rejected: {0}")]
    Registration(String),
}

impl NotifierError {
    /// Creates a stale-event error.
    pub fn stale(object_type: &str, object_id: &str, reason: impl Into<String>) -> Self {
        Self::StaleEvent {
            object_type: object_type.to_string(),
            object_id: object_id.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a missing-record error.
    pub fn missing_record(object_type: &str, object_id: &str) -> Self {
        Self::MissingRecord {
            object_type: object_type.to_string(),
            object_id: object_id.to_string(),
        }
    }

    /// Creates a missing-object error.
    pub fn missing_object(object_type: &str, object_id: &str) -> Self {
        Self::MissingObject {
            object_type: object_type.to_string(),
            object_id: object_id.to_string(),
        }
    }

    /// True if this error marks a duplicate or out-of-order event rather
    /// than a failure.
    pub fn is_stale(&self) -> bool {
        matches!(self, NotifierError::StaleEvent { .. })
    }
}
