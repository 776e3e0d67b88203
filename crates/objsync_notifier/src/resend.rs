//! Resend planner for in-flight data requests.
//!
//! An external periodic driver walks the pending `Getdata` notifications
//! and asks the planner which offsets must be re-requested now. The planner
//! has no timers of its own; the per-chunk deadlines written when requests
//! go out are the only clock it consults.

use tracing::error;

use objsync_protocol::{MetaData, Notification, TransportProtocol};
use objsync_store::SyncStore;

use crate::chunks::unix_now;
use crate::handler::NotificationHandler;
use crate::NotifierResult;

impl NotificationHandler {
    /// Offsets of in-flight requests that should be re-issued now.
    ///
    /// With no transfer state for the notification (typically after a node
    /// restart) the initial request batch is rebuilt from scratch instead.
    ///
    /// Scanning the deadline map on every tick would be wasted work, so the
    /// scan is gated: when chunks arrive in request order,
    /// `(max_requested - max_received) / chunk_size` equals the number of
    /// in-flight requests; the count in the deadline map exceeding that
    /// ratio means a chunk was lost or arrived out of order. The scan runs
    /// only then, or once the entry's overall deadline has passed.
    pub fn offsets_to_resend(&self, notification: &Notification, meta: &MetaData) -> Vec<i64> {
        let Some(info) = self.chunks.get(&notification.id()) else {
            return self.offsets_from_scratch(notification, meta);
        };

        let now = unix_now();
        let gap = info.chunk_size > 0
            && (info.max_requested_offset - info.max_received_offset) / info.chunk_size
                < info.chunk_resend_times.len() as i64;

        let mut offsets = Vec::new();
        if info.resend_time <= now || gap {
            for (&offset, &resend_time) in &info.chunk_resend_times {
                if resend_time <= now {
                    offsets.push(offset);
                }
            }
        }
        offsets.sort_unstable();
        offsets
    }

    /// Rebuilds the initial request batch for a notification without
    /// transfer state.
    ///
    /// Creates the transfer-state entry without touching the store record
    /// and returns the offsets of the opening window: as many chunks as the
    /// peer's transport keeps in flight, or a single request at offset zero
    /// for objects without a chunk size. Store failures are absorbed; the
    /// driver retries on its next pass.
    pub fn offsets_from_scratch(&self, notification: &Notification, meta: &MetaData) -> Vec<i64> {
        let protocol = match self.store.retrieve_destination_protocol(
            &notification.org_id,
            &notification.peer_type,
            &notification.peer_id,
        ) {
            Ok(protocol) => protocol,
            Err(err) => {
                error!(error = %err, "failed to plan data re-requests");
                return Vec::new();
            }
        };
        let max_inflight = if protocol == TransportProtocol::Mqtt {
            self.config.max_inflight_chunks
        } else {
            1
        };

        if let Err(err) = self.update_notification_chunk_info(
            false,
            meta,
            &notification.peer_type,
            &notification.peer_id,
            0,
        ) {
            error!(error = %err, "failed to plan data re-requests");
            return Vec::new();
        }

        if meta.chunk_size <= 0 || meta.object_size <= 0 {
            return vec![0];
        }

        let mut offsets = Vec::new();
        let mut offset = 0i64;
        while offsets.len() < max_inflight && offset < meta.object_size {
            offsets.push(offset);
            offset += meta.chunk_size;
        }
        offsets
    }

    /// Registers a data request for `(meta, peer, offset)`: creates the
    /// transfer-state entry if needed, upserting the store record to
    /// `Getdata`, and stamps the offset's resend deadline.
    ///
    /// Exposed for resend drivers that emit their own `get_data` calls.
    pub fn update_get_data_notification(
        &self,
        meta: &MetaData,
        peer_type: &str,
        peer_id: &str,
        offset: i64,
    ) -> NotifierResult<()> {
        self.update_notification_chunk_info(true, meta, peer_type, peer_id, offset)
    }
}
