//! Transport abstraction for outbound messages.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use objsync_protocol::{Destination, MessageKind, MetaData};

use crate::error::{NotifierError, NotifierResult};

/// Outbound message boundary of the notification core.
///
/// Implementations carry serialized messages over MQTT, HTTP, or an
/// in-process channel; the core never sees the wire. Sends may block;
/// handlers run on worker threads. A failed send surfaces as
/// [`NotifierError::Transport`] and the external resend driver retries the
/// transfer later.
pub trait Communicator: Send + Sync {
    /// Acknowledges a destination's registration.
    fn register_ack(&self, dest: &Destination) -> NotifierResult<()>;

    /// Sends a notification message about an object to a peer.
    fn send_notification_message(
        &self,
        kind: MessageKind,
        peer_type: &str,
        peer_id: &str,
        instance_id: i64,
        meta: &MetaData,
    ) -> NotifierResult<()>;

    /// Sends an encoded data message to a peer. `chunked` marks messages
    /// that carry less than the whole object.
    fn send_data(
        &self,
        org_id: &str,
        peer_type: &str,
        peer_id: &str,
        message: &[u8],
        chunked: bool,
    ) -> NotifierResult<()>;

    /// Requests the chunk of an object's data at `offset` from its origin.
    fn get_data(&self, meta: &MetaData, offset: i64) -> NotifierResult<()>;

    /// Acknowledges a resend-objects request.
    fn send_ack_resend_objects(&self, dest: &Destination) -> NotifierResult<()>;
}

/// A message recorded by [`MockCommunicator`].
#[derive(Debug, Clone, PartialEq)]
pub enum SentMessage {
    /// A registration acknowledgement.
    RegisterAck {
        /// The acknowledged destination.
        dest: Destination,
    },
    /// A notification message.
    Notification {
        /// Message kind.
        kind: MessageKind,
        /// Peer type the message was sent to.
        peer_type: String,
        /// Peer id the message was sent to.
        peer_id: String,
        /// Instance id carried by the message.
        instance_id: i64,
        /// Object metadata carried by the message.
        meta: MetaData,
    },
    /// An encoded data message.
    Data {
        /// Organization of the object.
        org_id: String,
        /// Peer type the message was sent to.
        peer_type: String,
        /// Peer id the message was sent to.
        peer_id: String,
        /// The encoded message bytes.
        message: Vec<u8>,
        /// Whether the message carries less than the whole object.
        chunked: bool,
    },
    /// A data request.
    GetData {
        /// Object metadata of the request.
        meta: MetaData,
        /// Requested offset.
        offset: i64,
    },
    /// A resend-objects acknowledgement.
    AckResendObjects {
        /// The acknowledged destination.
        dest: Destination,
    },
}

/// A communicator that records every send. Test support.
#[derive(Debug, Default)]
pub struct MockCommunicator {
    sent: Mutex<Vec<SentMessage>>,
    fail_sends: AtomicBool,
}

impl MockCommunicator {
    /// Creates a new mock communicator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent send fail with a transport error.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Returns a copy of every recorded message, in send order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// Clears the recorded messages.
    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    /// Returns the recorded notification messages of one kind.
    pub fn notifications_of_kind(&self, kind: MessageKind) -> Vec<SentMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|message| matches!(message, SentMessage::Notification { kind: k, .. } if *k == kind))
            .cloned()
            .collect()
    }

    /// Returns the offsets of the recorded data requests, in send order.
    pub fn get_data_offsets(&self) -> Vec<i64> {
        self.sent
            .lock()
            .iter()
            .filter_map(|message| match message {
                SentMessage::GetData { offset, .. } => Some(*offset),
                _ => None,
            })
            .collect()
    }

    fn record(&self, message: SentMessage) -> NotifierResult<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(NotifierError::Transport("mock send failure".into()));
        }
        self.sent.lock().push(message);
        Ok(())
    }
}

impl Communicator for MockCommunicator {
    fn register_ack(&self, dest: &Destination) -> NotifierResult<()> {
        self.record(SentMessage::RegisterAck { dest: dest.clone() })
    }

    fn send_notification_message(
        &self,
        kind: MessageKind,
        peer_type: &str,
        peer_id: &str,
        instance_id: i64,
        meta: &MetaData,
    ) -> NotifierResult<()> {
        self.record(SentMessage::Notification {
            kind,
            peer_type: peer_type.to_string(),
            peer_id: peer_id.to_string(),
            instance_id,
            meta: meta.clone(),
        })
    }

    fn send_data(
        &self,
        org_id: &str,
        peer_type: &str,
        peer_id: &str,
        message: &[u8],
        chunked: bool,
    ) -> NotifierResult<()> {
        self.record(SentMessage::Data {
            org_id: org_id.to_string(),
            peer_type: peer_type.to_string(),
            peer_id: peer_id.to_string(),
            message: message.to_vec(),
            chunked,
        })
    }

    fn get_data(&self, meta: &MetaData, offset: i64) -> NotifierResult<()> {
        self.record(SentMessage::GetData {
            meta: meta.clone(),
            offset,
        })
    }

    fn send_ack_resend_objects(&self, dest: &Destination) -> NotifierResult<()> {
        self.record(SentMessage::AckResendObjects { dest: dest.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objsync_protocol::TransportProtocol;

    #[test]
    fn mock_records_in_order() {
        let comm = MockCommunicator::new();
        let dest = Destination::new("org", "gateway", "gw-7", TransportProtocol::Mqtt);
        let meta = MetaData {
            org_id: "org".into(),
            object_type: "model".into(),
            object_id: "m1".into(),
            ..Default::default()
        };

        comm.register_ack(&dest).unwrap();
        comm.get_data(&meta, 0).unwrap();
        comm.get_data(&meta, 4).unwrap();

        assert_eq!(comm.sent().len(), 3);
        assert_eq!(comm.get_data_offsets(), vec![0, 4]);

        comm.clear();
        assert!(comm.sent().is_empty());
    }

    #[test]
    fn mock_failure_mode() {
        let comm = MockCommunicator::new();
        comm.set_fail_sends(true);

        let dest = Destination::new("org", "gateway", "gw-7", TransportProtocol::Http);
        let result = comm.register_ack(&dest);
        assert!(matches!(result, Err(NotifierError::Transport(_))));
        assert!(comm.sent().is_empty());

        comm.set_fail_sends(false);
        comm.register_ack(&dest).unwrap();
        assert_eq!(comm.sent().len(), 1);
    }
}
