//! Event handlers driving the per-object notification state machine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, trace, warn};

use objsync_codec::{encode_data_message, DataMessage};
use objsync_protocol::{
    notification_id, DeliveryStatus, Destination, MessageKind, MetaData, NodeRole, Notification,
    NotificationStatus, ObjectStatus,
};
use objsync_store::SyncStore;

use crate::chunks::{unix_now, ChunkInfo, ChunkTable};
use crate::config::NotifierConfig;
use crate::error::{NotifierError, NotifierResult};
use crate::locks::ObjectLocks;
use crate::services::{DataUriSink, FixedLeader, LeaderElection, NoDataUri, NoWebhooks, WebhookSink};
use crate::transport::Communicator;

/// The notification core.
///
/// One handler instance serves the whole process. The transport layer
/// dispatches each inbound event to the matching `handle_*` method on a
/// worker thread; handlers may block on store and transport calls.
/// Mutations for a given object are serialized by an internal per-object
/// lock array, and duplicate or out-of-order events are dropped by
/// instance-id and status checks, so the at-least-once transports the
/// service runs over need no further coordination.
pub struct NotificationHandler {
    pub(crate) config: NotifierConfig,
    pub(crate) store: Arc<dyn SyncStore>,
    comm: Arc<dyn Communicator>,
    leader: Arc<dyn LeaderElection>,
    data_uri: Arc<dyn DataUriSink>,
    webhooks: Arc<dyn WebhookSink>,
    pub(crate) chunks: ChunkTable,
    locks: ObjectLocks,
    registered: AtomicBool,
    resend_acked: AtomicBool,
}

impl NotificationHandler {
    /// Creates a handler over the given store and transport.
    ///
    /// The node is its own leader and has no data-URI sink and no webhooks
    /// until the corresponding `with_*` builders replace them.
    pub fn new(
        config: NotifierConfig,
        store: Arc<dyn SyncStore>,
        comm: Arc<dyn Communicator>,
    ) -> Self {
        Self {
            config,
            store,
            comm,
            leader: Arc::new(FixedLeader::new(true)),
            data_uri: Arc::new(NoDataUri),
            webhooks: Arc::new(NoWebhooks),
            chunks: ChunkTable::new(),
            locks: ObjectLocks::new(),
            registered: AtomicBool::new(false),
            resend_acked: AtomicBool::new(false),
        }
    }

    /// Replaces the leader elector.
    pub fn with_leader(mut self, leader: Arc<dyn LeaderElection>) -> Self {
        self.leader = leader;
        self
    }

    /// Replaces the data-URI sink.
    pub fn with_data_uri(mut self, data_uri: Arc<dyn DataUriSink>) -> Self {
        self.data_uri = data_uri;
        self
    }

    /// Replaces the webhook sink.
    pub fn with_webhooks(mut self, webhooks: Arc<dyn WebhookSink>) -> Self {
        self.webhooks = webhooks;
        self
    }

    /// Whether this node's registration has been acknowledged.
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    /// Whether a resend-objects request has been acknowledged.
    pub fn is_resend_acked(&self) -> bool {
        self.resend_acked.load(Ordering::SeqCst)
    }

    /// Handles the registration of an edge sync service. CSS only.
    ///
    /// A new destination gets an `Update` notification for every object
    /// routed to it; a reconnecting destination gets its unacknowledged
    /// notifications replayed instead.
    pub fn handle_registration(&self, dest: &Destination) -> NotifierResult<()> {
        if self.config.node_role == NodeRole::Ess {
            return Err(NotifierError::Registration(
                "an edge sync service cannot register other services".into(),
            ));
        }
        trace!(
            dest_type = %dest.dest_type,
            dest_id = %dest.dest_id,
            "handling registration"
        );

        let reconnection =
            self.store
                .destination_exists(&dest.org_id, &dest.dest_type, &dest.dest_id)?;
        self.store.store_destination(dest)?;
        self.comm.register_ack(dest)?;

        if reconnection {
            info!(
                org_id = %dest.org_id,
                dest_type = %dest.dest_type,
                dest_id = %dest.dest_id,
                "reconnection of destination"
            );
            self.resend_notifications_for_destination(dest, !self.config.persistent_storage)
        } else {
            info!(
                org_id = %dest.org_id,
                dest_type = %dest.dest_type,
                dest_id = %dest.dest_id,
                "new destination"
            );
            for meta in self
                .store
                .retrieve_objects(&dest.org_id, &dest.dest_type, &dest.dest_id)?
            {
                self.send_object_update(&meta, dest)?;
            }
            Ok(())
        }
    }

    /// Handles the acknowledgement of this node's own registration.
    pub fn handle_register_ack(&self) {
        self.registered.store(true, Ordering::SeqCst);
    }

    /// Handles an update notification announcing a new object version.
    ///
    /// Duplicates (instance id not above the stored record's) are dropped.
    /// A newer instance purges the previous transfer state, stores the
    /// metadata, confirms with `Updated`, and opens the data transfer with
    /// up to `max_inflight_chunks` requests — unless the object carries no
    /// transferable data, in which case it is complete immediately.
    pub fn handle_update(&self, meta: &MetaData) -> NotifierResult<()> {
        trace!(
            object_type = %meta.object_type,
            object_id = %meta.object_id,
            instance_id = meta.instance_id,
            "handling update"
        );

        let existing = self
            .store
            .retrieve_notification_record(
                &meta.org_id,
                &meta.object_type,
                &meta.object_id,
                &meta.origin_type,
                &meta.origin_id,
            )
            .ok()
            .flatten();
        if let Some(existing) = existing {
            if existing.instance_id >= meta.instance_id {
                trace!(
                    object_type = %meta.object_type,
                    object_id = %meta.object_id,
                    "ignoring update for an already-known instance"
                );
                return Ok(());
            }
            if let Err(err) = self.store.delete_notification_records(
                &meta.org_id,
                &meta.object_type,
                &meta.object_id,
                &meta.origin_type,
                &meta.origin_id,
            ) {
                warn!(error = %err, "failed to drop superseded notification records");
            }
            self.remove_chunk_info(meta, &meta.origin_type, &meta.origin_id);
        }

        let status = if meta.skips_data_transfer() {
            ObjectStatus::CompletelyReceived
        } else {
            ObjectStatus::PartiallyReceived
        };
        self.store.store_object(meta, None, status)?;

        self.comm.send_notification_message(
            MessageKind::Updated,
            &meta.origin_type,
            &meta.origin_id,
            meta.instance_id,
            meta,
        )?;

        if status == ObjectStatus::CompletelyReceived {
            return Ok(());
        }

        let _guard = self
            .locks
            .lock(&meta.org_id, &meta.object_type, &meta.object_id);

        if meta.chunk_size <= 0 || meta.object_size <= 0 {
            self.send_get_data(meta, 0)?;
        } else {
            let mut offset = 0i64;
            let mut requested = 0usize;
            while requested < self.config.max_inflight_chunks && offset < meta.object_size {
                self.send_get_data(meta, offset)?;
                offset += meta.chunk_size;
                requested += 1;
            }
        }
        Ok(())
    }

    /// Handles a peer's acknowledgement of an update notification.
    pub fn handle_object_updated(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
        peer_type: &str,
        peer_id: &str,
        instance_id: i64,
    ) -> NotifierResult<()> {
        trace!(object_type, object_id, "handling object updated");

        let Some(record) = self.matching_record(
            org_id,
            object_type,
            object_id,
            peer_type,
            peer_id,
            instance_id,
            &[NotificationStatus::Update, NotificationStatus::UpdatePending],
            "object updated",
        )?
        else {
            return Ok(());
        };

        self.store.update_notification_record(Notification {
            status: NotificationStatus::Updated,
            ..record
        })?;
        Ok(())
    }

    /// Handles a peer's report that it completely received an object.
    pub fn handle_object_received(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
        peer_type: &str,
        peer_id: &str,
        instance_id: i64,
    ) -> NotifierResult<()> {
        trace!(object_type, object_id, "handling object received");

        let Some(record) = self.matching_record(
            org_id,
            object_type,
            object_id,
            peer_type,
            peer_id,
            instance_id,
            &[NotificationStatus::Data, NotificationStatus::Updated],
            "object received",
        )?
        else {
            return Ok(());
        };

        let meta = self
            .store
            .retrieve_object(org_id, object_type, object_id)?
            .ok_or_else(|| NotifierError::missing_object(object_type, object_id))?;

        if let Err(err) = self.store.update_object_delivery_status(
            DeliveryStatus::Delivered,
            org_id,
            object_type,
            object_id,
            peer_type,
            peer_id,
        ) {
            error!(error = %err, "failed to mark object as delivered to the destination");
        }
        self.store.update_notification_record(Notification {
            status: NotificationStatus::ReceivedByDestination,
            ..record
        })?;

        self.comm.send_notification_message(
            MessageKind::AckReceived,
            peer_type,
            peer_id,
            instance_id,
            &meta,
        )?;
        Ok(())
    }

    /// Handles a peer's acknowledgement of a received notification.
    pub fn handle_ack_object_received(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
        peer_type: &str,
        peer_id: &str,
        instance_id: i64,
    ) -> NotifierResult<()> {
        trace!(object_type, object_id, "handling ack received");

        let Some(record) = self.matching_record(
            org_id,
            object_type,
            object_id,
            peer_type,
            peer_id,
            instance_id,
            &[
                NotificationStatus::Received,
                NotificationStatus::ReceivedPending,
            ],
            "ack received",
        )?
        else {
            return Ok(());
        };

        self.store.update_notification_record(Notification {
            status: NotificationStatus::AckReceived,
            ..record
        })?;
        Ok(())
    }

    /// Handles a peer's report that it consumed an object.
    ///
    /// An ESS deletes the object outright; the CSS records the consumption
    /// for that destination. Both acknowledge with `AckConsumed`.
    pub fn handle_object_consumed(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
        peer_type: &str,
        peer_id: &str,
        instance_id: i64,
    ) -> NotifierResult<()> {
        trace!(object_type, object_id, "handling object consumed");

        let Some(record) = self.matching_record(
            org_id,
            object_type,
            object_id,
            peer_type,
            peer_id,
            instance_id,
            &[
                NotificationStatus::Data,
                NotificationStatus::Updated,
                NotificationStatus::ReceivedByDestination,
            ],
            "object consumed",
        )?
        else {
            return Ok(());
        };

        let meta = self
            .store
            .retrieve_object(org_id, object_type, object_id)?
            .ok_or_else(|| NotifierError::missing_object(object_type, object_id))?;

        if self.config.node_role == NodeRole::Ess {
            if let Err(err) = self.store.delete_stored_object(org_id, object_type, object_id) {
                error!(error = %err, "failed to delete consumed object");
            }
            if let Err(err) =
                self.store
                    .delete_notification_records(org_id, object_type, object_id, "", "")
            {
                error!(error = %err, "failed to delete notification records of consumed object");
            }
            self.remove_chunk_info(&meta, &meta.origin_type, &meta.origin_id);
        } else {
            if let Err(err) = self.store.update_object_delivery_status(
                DeliveryStatus::Consumed,
                org_id,
                object_type,
                object_id,
                peer_type,
                peer_id,
            ) {
                error!(error = %err, "failed to mark object as consumed by the destination");
            }
            self.store.update_notification_record(Notification {
                status: NotificationStatus::AckConsumed,
                ..record
            })?;
        }

        self.comm.send_notification_message(
            MessageKind::AckConsumed,
            peer_type,
            peer_id,
            instance_id,
            &meta,
        )?;
        Ok(())
    }

    /// Handles a peer's acknowledgement of a consumed notification.
    pub fn handle_ack_consumed(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
        peer_type: &str,
        peer_id: &str,
        instance_id: i64,
    ) -> NotifierResult<()> {
        trace!(object_type, object_id, "handling ack consumed");

        let Some(record) = self.matching_record(
            org_id,
            object_type,
            object_id,
            peer_type,
            peer_id,
            instance_id,
            &[
                NotificationStatus::Consumed,
                NotificationStatus::ConsumedPending,
            ],
            "ack consumed",
        )?
        else {
            return Ok(());
        };

        self.store.update_notification_record(Notification {
            status: NotificationStatus::AckConsumed,
            ..record
        })?;

        if self.config.node_role == NodeRole::Ess {
            if let Err(err) = self.store.delete_stored_object(org_id, object_type, object_id) {
                error!(error = %err, "failed to delete consumed object");
            }
            if let Err(err) =
                self.store
                    .delete_notification_records(org_id, object_type, object_id, "", "")
            {
                error!(error = %err, "failed to delete notification records of consumed object");
            }
            self.chunks.remove(&notification_id(
                org_id,
                object_type,
                object_id,
                peer_type,
                peer_id,
            ));
        }
        Ok(())
    }

    /// Handles a delete notification for an object.
    ///
    /// Unknown objects are recreated as tombstones on an ESS; the CSS
    /// forwards `Deleted` to the origin instead. Known objects lose their
    /// data and their remaining-consumers counter is reset. Either way the
    /// object's notification records and transfer state are dropped and the
    /// delete is acknowledged.
    pub fn handle_delete(&self, meta: &MetaData) -> NotifierResult<()> {
        trace!(
            object_type = %meta.object_type,
            object_id = %meta.object_id,
            "handling delete"
        );

        match self
            .store
            .mark_object_deleted(&meta.org_id, &meta.object_type, &meta.object_id)
        {
            Err(err) if self.config.node_role == NodeRole::Ess && err.is_not_found() => {
                let mut tombstone = meta.clone();
                tombstone.deleted = true;
                self.store
                    .store_object(&tombstone, None, ObjectStatus::ObjDeleted)?;
            }
            Err(err) => {
                trace!(
                    error = %err,
                    object_type = %meta.object_type,
                    object_id = %meta.object_id,
                    "failed to mark object deleted"
                );
                if self.config.node_role == NodeRole::Css {
                    self.comm.send_notification_message(
                        MessageKind::Deleted,
                        &meta.origin_type,
                        &meta.origin_id,
                        meta.instance_id,
                        meta,
                    )?;
                }
            }
            Ok(()) => {
                if let Err(err) = self.store.delete_stored_data(
                    &meta.org_id,
                    &meta.object_type,
                    &meta.object_id,
                ) {
                    trace!(error = %err, "failed to delete stored data");
                }
                if let Err(err) = self.store.reset_object_remaining_consumers(
                    &meta.org_id,
                    &meta.object_type,
                    &meta.object_id,
                ) {
                    trace!(error = %err, "failed to reset remaining consumers");
                }
            }
        }

        if let Err(err) = self.store.delete_notification_records(
            &meta.org_id,
            &meta.object_type,
            &meta.object_id,
            "",
            "",
        ) {
            warn!(error = %err, "failed to delete notification records");
        }
        self.remove_chunk_info(meta, &meta.origin_type, &meta.origin_id);

        self.comm.send_notification_message(
            MessageKind::AckDelete,
            &meta.origin_type,
            &meta.origin_id,
            meta.instance_id,
            meta,
        )?;
        Ok(())
    }

    /// Handles a peer's acknowledgement of a delete notification.
    pub fn handle_ack_delete(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
        peer_type: &str,
        peer_id: &str,
        instance_id: i64,
    ) -> NotifierResult<()> {
        trace!(object_type, object_id, "handling ack delete");

        let Some(record) = self.matching_record(
            org_id,
            object_type,
            object_id,
            peer_type,
            peer_id,
            instance_id,
            &[NotificationStatus::Delete, NotificationStatus::DeletePending],
            "ack delete",
        )?
        else {
            return Ok(());
        };

        self.store.update_notification_record(Notification {
            status: NotificationStatus::AckDelete,
            ..record
        })?;

        self.store
            .delete_stored_object(org_id, object_type, object_id)?;
        Ok(())
    }

    /// Handles a peer's report that it carried out a deletion.
    pub fn handle_object_deleted(&self, meta: &MetaData) -> NotifierResult<()> {
        trace!(
            object_type = %meta.object_type,
            object_id = %meta.object_id,
            "handling object deleted"
        );

        let Some(_record) = self.matching_record(
            &meta.org_id,
            &meta.object_type,
            &meta.object_id,
            &meta.dest_type,
            &meta.dest_id,
            meta.instance_id,
            &[
                NotificationStatus::Delete,
                NotificationStatus::DeletePending,
                NotificationStatus::AckDelete,
            ],
            "object deleted",
        )?
        else {
            return Ok(());
        };

        if let Err(err) = self.store.delete_notification_records(
            &meta.org_id,
            &meta.object_type,
            &meta.object_id,
            "",
            "",
        ) {
            error!(error = %err, "failed to delete notification records");
        }
        self.remove_chunk_info(meta, &meta.origin_type, &meta.origin_id);

        self.comm.send_notification_message(
            MessageKind::AckDeleted,
            &meta.dest_type,
            &meta.dest_id,
            meta.instance_id,
            meta,
        )?;
        Ok(())
    }

    /// Handles a peer's acknowledgement of a deleted notification.
    pub fn handle_ack_object_deleted(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
        peer_type: &str,
        peer_id: &str,
        instance_id: i64,
    ) -> NotifierResult<()> {
        trace!(object_type, object_id, "handling ack object deleted");

        let Some(_record) = self.matching_record(
            org_id,
            object_type,
            object_id,
            peer_type,
            peer_id,
            instance_id,
            &[
                NotificationStatus::Deleted,
                NotificationStatus::DeletedPending,
            ],
            "ack object deleted",
        )?
        else {
            return Ok(());
        };

        if let Err(err) =
            self.store
                .delete_notification_records(org_id, object_type, object_id, "", "")
        {
            error!(error = %err, "failed to delete notification records");
        }
        if let Err(err) = self.store.delete_stored_object(org_id, object_type, object_id) {
            error!(error = %err, "failed to delete stored object");
        }
        Ok(())
    }

    /// Handles a peer's request to resend everything routed to it.
    ///
    /// The acknowledgement goes out before the replayed updates, so the
    /// peer may see updates that overlap with the ack; the instance-id
    /// filter on its side absorbs the overlap.
    pub fn handle_resend_request(&self, dest: &Destination) -> NotifierResult<()> {
        trace!(
            org_id = %dest.org_id,
            dest_type = %dest.dest_type,
            dest_id = %dest.dest_id,
            "handling resend objects request"
        );

        self.comm.send_ack_resend_objects(dest)?;

        for meta in self
            .store
            .retrieve_objects(&dest.org_id, &dest.dest_type, &dest.dest_id)?
        {
            self.send_object_update(&meta, dest)?;
        }
        Ok(())
    }

    /// Handles the acknowledgement of this node's resend-objects request.
    pub fn handle_ack_resend(&self) {
        trace!("handling ack resend objects");
        self.resend_acked.store(true, Ordering::SeqCst);
    }

    /// Handles an inbound data message carrying one chunk.
    ///
    /// The chunk must match an in-flight request of the current instance:
    /// otherwise the message is logged, dropped, and reported as an error
    /// so the transport knows it was not consumed. The final chunk
    /// completes the object, notifies the origin with `Received`, and fires
    /// webhooks; an intermediate chunk advances the request window instead.
    pub fn handle_data(&self, message: &[u8]) -> NotifierResult<()> {
        let parsed = DataMessage::decode(message)?;
        trace!(
            object_type = parsed.object_type,
            object_id = parsed.object_id,
            offset = parsed.offset,
            "handling data chunk"
        );

        let meta = self
            .store
            .retrieve_object(parsed.org_id, parsed.object_type, parsed.object_id)
            .ok()
            .flatten()
            .ok_or_else(|| {
                NotifierError::missing_object(parsed.object_type, parsed.object_id)
            })?;

        let _guard = self
            .locks
            .lock(&meta.org_id, &meta.object_type, &meta.object_id);

        let total = match self.check_notification_record(
            &meta,
            &meta.origin_type,
            &meta.origin_id,
            parsed.instance_id,
            NotificationStatus::Getdata,
            parsed.offset,
        ) {
            Ok(total) => total,
            Err(err) => {
                info!(
                    error = %err,
                    object_type = %meta.object_type,
                    object_id = %meta.object_id,
                    "ignoring data chunk"
                );
                return Err(err);
            }
        };

        let data_length = parsed.data_len();
        let is_first_chunk = total == 0;
        let is_last_chunk = total + data_length as i64 >= meta.object_size;

        // A chunk that is anything but a whole object in one message must be
        // handled by the node that owns the transfer state cluster-wide.
        if (parsed.offset != 0 || !is_first_chunk || !is_last_chunk)
            && self.config.node_role == NodeRole::Css
            && !self.leader.check_if_leader()
        {
            return Err(NotifierError::NotLeader);
        }

        if data_length > 0 {
            let mut reader = parsed.data_reader();
            if let Some(uri) = &meta.destination_data_uri {
                self.data_uri.append_data(
                    uri,
                    &mut reader,
                    data_length,
                    parsed.offset,
                    meta.object_size,
                    is_first_chunk,
                    is_last_chunk,
                )?;
            } else if let Err(err) = self.store.append_object_data(
                &meta.org_id,
                &meta.object_type,
                &meta.object_id,
                &mut reader,
                data_length,
                parsed.offset,
                meta.object_size,
                is_first_chunk,
                is_last_chunk,
            ) {
                if err.is_discarded() {
                    return Ok(());
                }
                return Err(err.into());
            }
        }

        let max_requested_offset = self.chunk_received(&meta, parsed.offset, data_length as i64)?;

        if is_last_chunk {
            self.remove_chunk_info(&meta, &meta.origin_type, &meta.origin_id);
            self.store.update_object_status(
                &meta.org_id,
                &meta.object_type,
                &meta.object_id,
                ObjectStatus::CompletelyReceived,
            )?;
            self.send_object_status(&meta, MessageKind::Received, NotificationStatus::Received)?;
            self.webhooks.call_webhooks(&meta);
            return Ok(());
        }

        let next_offset = max_requested_offset + meta.chunk_size;
        if next_offset < meta.object_size {
            self.send_get_data(&meta, next_offset)?;
        }
        Ok(())
    }

    /// Handles the arrival of an object's data outside the chunked
    /// protocol.
    ///
    /// Transports deliver whole-object data messages directly to storage;
    /// this drops the in-flight request state those transfers leave behind.
    pub fn handle_data_received(&self, meta: &MetaData) {
        self.remove_chunk_info(meta, &meta.origin_type, &meta.origin_id);
    }

    /// Handles a peer's request for a chunk of an object's data.
    ///
    /// The request must match an active outbound transfer; reads up to
    /// `max_data_chunk_size` bytes at `offset`, sends them as a data
    /// message, and moves the notification record to `Data`.
    pub fn handle_get_data(&self, meta: &MetaData, offset: i64) -> NotifierResult<()> {
        trace!(
            object_type = %meta.object_type,
            object_id = %meta.object_id,
            offset,
            "handling data request"
        );

        let record = self
            .store
            .retrieve_notification_record(
                &meta.org_id,
                &meta.object_type,
                &meta.object_id,
                &meta.dest_type,
                &meta.dest_id,
            )
            .ok()
            .flatten()
            .ok_or_else(|| {
                NotifierError::missing_record(&meta.object_type, &meta.object_id)
            })?;
        if record.instance_id != meta.instance_id
            || !matches!(
                record.status,
                NotificationStatus::Update
                    | NotificationStatus::Updated
                    | NotificationStatus::Data
            )
        {
            trace!(
                object_type = %meta.object_type,
                object_id = %meta.object_id,
                "ignoring data request for mismatched notification record"
            );
            return Ok(());
        }

        let (data, eof) = if let Some(uri) = &meta.source_data_uri {
            self.data_uri
                .get_data_chunk(uri, self.config.max_data_chunk_size, offset)?
        } else {
            self.store.read_object_data(
                &meta.org_id,
                &meta.object_type,
                &meta.object_id,
                self.config.max_data_chunk_size,
                offset,
            )?
        };

        let message = encode_data_message(meta, &data, offset)?;
        let chunked = offset != 0 || !eof;
        self.comm
            .send_data(&meta.org_id, &meta.dest_type, &meta.dest_id, &message, chunked)?;

        self.store.update_notification_record(Notification::new(
            meta,
            &meta.dest_type,
            &meta.dest_id,
            NotificationStatus::Data,
        ))?;
        Ok(())
    }

    // ---- internal helpers ----

    /// Retrieves the notification record for an ack-progression event.
    ///
    /// A missing record (or a store failure standing in for one) is an
    /// error; a record whose instance id or status does not match the event
    /// is a stale delivery and yields `None`, which the caller ignores.
    #[allow(clippy::too_many_arguments)]
    fn matching_record(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
        peer_type: &str,
        peer_id: &str,
        instance_id: i64,
        allowed: &[NotificationStatus],
        event: &str,
    ) -> NotifierResult<Option<Notification>> {
        let record = self
            .store
            .retrieve_notification_record(org_id, object_type, object_id, peer_type, peer_id)
            .ok()
            .flatten();
        let Some(record) = record else {
            return Err(NotifierError::missing_record(object_type, object_id));
        };

        if record.instance_id != instance_id || !allowed.contains(&record.status) {
            trace!(
                object_type,
                object_id,
                event,
                "ignoring event for mismatched notification record"
            );
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// Verifies that a data chunk matches the stored record and the
    /// in-flight transfer state. Returns the bytes received so far.
    fn check_notification_record(
        &self,
        meta: &MetaData,
        peer_type: &str,
        peer_id: &str,
        instance_id: i64,
        status: NotificationStatus,
        offset: i64,
    ) -> NotifierResult<i64> {
        let record = self.store.retrieve_notification_record(
            &meta.org_id,
            &meta.object_type,
            &meta.object_id,
            peer_type,
            peer_id,
        )?;
        let Some(record) = record else {
            return Err(NotifierError::missing_record(
                &meta.object_type,
                &meta.object_id,
            ));
        };

        if record.instance_id != instance_id {
            return Err(NotifierError::stale(
                &meta.object_type,
                &meta.object_id,
                format!(
                    "instance id mismatch: record has {}, event carries {}",
                    record.instance_id, instance_id
                ),
            ));
        }
        if record.status != status {
            return Err(NotifierError::stale(
                &meta.object_type,
                &meta.object_id,
                format!(
                    "record status is {:?}, event requires {:?}",
                    record.status, status
                ),
            ));
        }

        let id = notification_id(
            &meta.org_id,
            &meta.object_type,
            &meta.object_id,
            peer_type,
            peer_id,
        );
        let Some(info) = self.chunks.get(&id) else {
            return Err(NotifierError::stale(
                &meta.object_type,
                &meta.object_id,
                "no chunk transfer state",
            ));
        };
        if !info.chunk_resend_times.contains_key(&offset) {
            return Err(NotifierError::stale(
                &meta.object_type,
                &meta.object_id,
                format!("offset {offset} is not in flight"),
            ));
        }
        if info.chunks_received.is_empty() {
            return Err(NotifierError::stale(
                &meta.object_type,
                &meta.object_id,
                "chunk bitmap is empty",
            ));
        }
        Ok(info.received_data_size)
    }

    /// Registers a data request in the transfer state and sends it.
    fn send_get_data(&self, meta: &MetaData, offset: i64) -> NotifierResult<()> {
        self.update_notification_chunk_info(
            true,
            meta,
            &meta.origin_type,
            &meta.origin_id,
            offset,
        )?;
        self.comm.get_data(meta, offset)
    }

    /// Records a requested offset in the in-flight transfer state, creating
    /// the entry on first use.
    ///
    /// On entry creation with `create_record` set, the store notification
    /// record is also moved to `Getdata`. Must be called under the
    /// per-object lock.
    pub(crate) fn update_notification_chunk_info(
        &self,
        create_record: bool,
        meta: &MetaData,
        peer_type: &str,
        peer_id: &str,
        offset: i64,
    ) -> NotifierResult<()> {
        let id = notification_id(
            &meta.org_id,
            &meta.object_type,
            &meta.object_id,
            peer_type,
            peer_id,
        );
        let mut info = match self.chunks.get(&id) {
            Some(info) => info,
            None => {
                if create_record {
                    self.store.update_notification_record(Notification::new(
                        meta,
                        peer_type,
                        peer_id,
                        NotificationStatus::Getdata,
                    ))?;
                }
                ChunkInfo::new(meta.chunk_size, meta.object_size)
            }
        };

        let resend_time = unix_now() + self.config.chunk_resend_delay_secs();
        info.chunk_resend_times.insert(offset, resend_time);
        if info.max_requested_offset < offset {
            info.max_requested_offset = offset;
        }
        info.resend_time = resend_time;
        self.chunks.insert(id, info);
        Ok(())
    }

    /// Retires the in-flight request for `offset` and marks the chunk as
    /// received. Returns the largest offset requested so far, from which
    /// the caller derives the next request.
    fn chunk_received(&self, meta: &MetaData, offset: i64, size: i64) -> NotifierResult<i64> {
        let id = notification_id(
            &meta.org_id,
            &meta.object_type,
            &meta.object_id,
            &meta.origin_type,
            &meta.origin_id,
        );
        let Some(mut info) = self.chunks.get(&id) else {
            return Err(NotifierError::stale(
                &meta.object_type,
                &meta.object_id,
                "chunk transfer state not found",
            ));
        };
        if info.chunk_resend_times.remove(&offset).is_none() {
            return Err(NotifierError::stale(
                &meta.object_type,
                &meta.object_id,
                format!("no resend deadline for offset {offset}"),
            ));
        }

        if !info.mark_received(offset, size) {
            info!(
                offset,
                object_type = %meta.object_type,
                object_id = %meta.object_id,
                "chunk already received"
            );
        }
        if info.max_received_offset < offset {
            info.max_received_offset = offset;
        }
        info.resend_time = unix_now() + self.config.chunk_resend_delay_secs();

        let max_requested_offset = info.max_requested_offset;
        self.chunks.insert(id, info);
        Ok(max_requested_offset)
    }

    /// Drops the in-flight transfer state for an object/peer pair.
    pub(crate) fn remove_chunk_info(&self, meta: &MetaData, peer_type: &str, peer_id: &str) {
        let id = notification_id(
            &meta.org_id,
            &meta.object_type,
            &meta.object_id,
            peer_type,
            peer_id,
        );
        self.chunks.remove(&id);
    }

    /// Announces an object to a destination and tracks the announcement.
    fn send_object_update(&self, meta: &MetaData, dest: &Destination) -> NotifierResult<()> {
        self.store.update_notification_record(Notification::new(
            meta,
            &dest.dest_type,
            &dest.dest_id,
            NotificationStatus::Update,
        ))?;
        self.comm.send_notification_message(
            MessageKind::Update,
            &dest.dest_type,
            &dest.dest_id,
            meta.instance_id,
            meta,
        )
    }

    /// Moves the origin-peer record to `status` and emits the matching
    /// message to the origin.
    fn send_object_status(
        &self,
        meta: &MetaData,
        kind: MessageKind,
        status: NotificationStatus,
    ) -> NotifierResult<()> {
        self.store.update_notification_record(Notification::new(
            meta,
            &meta.origin_type,
            &meta.origin_id,
            status,
        ))?;
        self.comm.send_notification_message(
            kind,
            &meta.origin_type,
            &meta.origin_id,
            meta.instance_id,
            meta,
        )
    }

    /// Replays unacknowledged notifications to a reconnecting destination.
    ///
    /// Records in a non-terminal status get their message re-emitted.
    /// `Getdata` records re-request their due offsets through the resend
    /// planner. With `resend_in_flight` set (nodes without persistent
    /// storage), records stuck in `Data` are re-announced as updates, since
    /// partially transferred state on either side may be gone.
    fn resend_notifications_for_destination(
        &self,
        dest: &Destination,
        resend_in_flight: bool,
    ) -> NotifierResult<()> {
        let records =
            self.store
                .retrieve_notifications(&dest.org_id, &dest.dest_type, &dest.dest_id)?;

        for record in records {
            let Some(meta) = self.store.retrieve_object(
                &record.org_id,
                &record.object_type,
                &record.object_id,
            )?
            else {
                warn!(
                    object_type = %record.object_type,
                    object_id = %record.object_id,
                    "skipping resend of a notification without a stored object"
                );
                continue;
            };

            match record.status {
                NotificationStatus::Getdata => {
                    let _guard =
                        self.locks
                            .lock(&meta.org_id, &meta.object_type, &meta.object_id);
                    for offset in self.offsets_to_resend(&record, &meta) {
                        self.update_notification_chunk_info(
                            true,
                            &meta,
                            &record.peer_type,
                            &record.peer_id,
                            offset,
                        )?;
                        self.comm.get_data(&meta, offset)?;
                    }
                }
                NotificationStatus::Data if resend_in_flight => {
                    self.send_object_update(&meta, dest)?;
                }
                status => {
                    let Some((kind, sent_status)) = replay_message(status) else {
                        continue;
                    };
                    self.store.update_notification_record(Notification {
                        status: sent_status,
                        ..record.clone()
                    })?;
                    self.comm.send_notification_message(
                        kind,
                        &record.peer_type,
                        &record.peer_id,
                        record.instance_id,
                        &meta,
                    )?;
                }
            }
        }
        Ok(())
    }
}

/// Message kind to replay for a notification status, and the status the
/// record takes once the message is out. Terminal and receive-side statuses
/// replay nothing.
fn replay_message(status: NotificationStatus) -> Option<(MessageKind, NotificationStatus)> {
    match status {
        NotificationStatus::Update | NotificationStatus::UpdatePending => {
            Some((MessageKind::Update, NotificationStatus::Update))
        }
        NotificationStatus::Received | NotificationStatus::ReceivedPending => {
            Some((MessageKind::Received, NotificationStatus::Received))
        }
        NotificationStatus::Consumed | NotificationStatus::ConsumedPending => {
            Some((MessageKind::Consumed, NotificationStatus::Consumed))
        }
        NotificationStatus::Delete | NotificationStatus::DeletePending => {
            Some((MessageKind::Delete, NotificationStatus::Delete))
        }
        NotificationStatus::Deleted | NotificationStatus::DeletedPending => {
            Some((MessageKind::Deleted, NotificationStatus::Deleted))
        }
        _ => None,
    }
}
