//! Notification records and message kinds.

use serde::{Deserialize, Serialize};

use crate::MetaData;

/// Status of a notification record.
///
/// A record tracks the progress of one logical transfer between this node
/// and one peer. The `*Pending` variants mark messages that could not be
/// sent yet (peer offline) and are flushed by the resend driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationStatus {
    /// An update notification was sent to the peer.
    Update,
    /// An update notification is queued for the peer.
    UpdatePending,
    /// The peer acknowledged the update notification.
    Updated,
    /// Data is being sent to the peer.
    Data,
    /// Data is being requested from the peer.
    Getdata,
    /// A received notification was sent to the peer.
    Received,
    /// A received notification is queued for the peer.
    ReceivedPending,
    /// The peer reported that it received the object.
    ReceivedByDestination,
    /// The received notification was acknowledged.
    AckReceived,
    /// A consumed notification was sent to the peer.
    Consumed,
    /// A consumed notification is queued for the peer.
    ConsumedPending,
    /// The consumed notification was acknowledged.
    AckConsumed,
    /// A delete notification was sent to the peer.
    Delete,
    /// A delete notification is queued for the peer.
    DeletePending,
    /// The delete notification was acknowledged.
    AckDelete,
    /// A deleted notification was sent to the peer.
    Deleted,
    /// A deleted notification is queued for the peer.
    DeletedPending,
    /// The deleted notification was acknowledged.
    AckDeleted,
}

/// Kinds of notification messages exchanged between nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// A new object version is available.
    Update,
    /// Acknowledges an update.
    Updated,
    /// The object was consumed.
    Consumed,
    /// Acknowledges a consumed message.
    AckConsumed,
    /// The object was completely received.
    Received,
    /// Acknowledges a received message.
    AckReceived,
    /// Requests a chunk of the object's data.
    Getdata,
    /// Carries a chunk of the object's data.
    Data,
    /// The object was deleted.
    Delete,
    /// Acknowledges a delete message.
    AckDelete,
    /// The deletion was carried out by the destination.
    Deleted,
    /// Acknowledges a deleted message.
    AckDeleted,
}

/// A notification record: per-(object, peer) transfer state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Organization the object belongs to.
    pub org_id: String,
    /// Object type.
    pub object_type: String,
    /// Object id.
    pub object_id: String,
    /// Type of the peer this record tracks.
    pub peer_type: String,
    /// Id of the peer this record tracks.
    pub peer_id: String,
    /// Status of the transfer.
    pub status: NotificationStatus,
    /// Object version this record refers to.
    pub instance_id: i64,
}

impl Notification {
    /// Creates a record for the given object and peer.
    pub fn new(meta: &MetaData, peer_type: &str, peer_id: &str, status: NotificationStatus) -> Self {
        Self {
            org_id: meta.org_id.clone(),
            object_type: meta.object_type.clone(),
            object_id: meta.object_id.clone(),
            peer_type: peer_type.to_string(),
            peer_id: peer_id.to_string(),
            status,
            instance_id: meta.instance_id,
        }
    }

    /// The composite id of this record.
    pub fn id(&self) -> String {
        notification_id(
            &self.org_id,
            &self.object_type,
            &self.object_id,
            &self.peer_type,
            &self.peer_id,
        )
    }
}

/// Builds the composite id identifying a notification record.
pub fn notification_id(
    org_id: &str,
    object_type: &str,
    object_id: &str,
    peer_type: &str,
    peer_id: &str,
) -> String {
    format!("{org_id}:{object_type}:{object_id}:{peer_type}:{peer_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_id_format() {
        let id = notification_id("org", "model", "m1", "gateway", "gw-7");
        assert_eq!(id, "org:model:m1:gateway:gw-7");
    }

    #[test]
    fn notification_from_meta() {
        let meta = MetaData {
            org_id: "org".into(),
            object_type: "model".into(),
            object_id: "m1".into(),
            instance_id: 42,
            ..Default::default()
        };
        let n = Notification::new(&meta, "gateway", "gw-7", NotificationStatus::Update);
        assert_eq!(n.instance_id, 42);
        assert_eq!(n.status, NotificationStatus::Update);
        assert_eq!(n.id(), "org:model:m1:gateway:gw-7");
    }
}
