//! The store trait consumed by the notification core.

use std::io::Read;

use objsync_protocol::{
    DeliveryStatus, Destination, MetaData, Notification, ObjectStatus, TransportProtocol,
};

use crate::error::StoreResult;

/// Durable state consumed by the notification core.
///
/// Objects are keyed by `(org_id, object_type, object_id)`; notification
/// records additionally by the peer `(peer_type, peer_id)`.
///
/// # Invariants
///
/// - Each operation is individually atomic; the core provides any
///   cross-operation ordering it needs through its per-object locks.
/// - `append_object_data` may reject writes with the `Discarded` sentinel
///   when the stored object state is stale; callers treat that as success.
/// - Implementations must be `Send + Sync`; handlers run on parallel
///   transport worker threads.
pub trait SyncStore: Send + Sync {
    /// Checks whether a destination is already registered.
    fn destination_exists(&self, org_id: &str, dest_type: &str, dest_id: &str)
        -> StoreResult<bool>;

    /// Registers or refreshes a destination.
    fn store_destination(&self, dest: &Destination) -> StoreResult<()>;

    /// Enumerates the live objects routed to a destination.
    fn retrieve_objects(
        &self,
        org_id: &str,
        dest_type: &str,
        dest_id: &str,
    ) -> StoreResult<Vec<MetaData>>;

    /// Retrieves an object's metadata. Returns `None` if unknown.
    fn retrieve_object(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
    ) -> StoreResult<Option<MetaData>>;

    /// Stores (or overwrites) an object with optional inline data.
    fn store_object(
        &self,
        meta: &MetaData,
        data: Option<&[u8]>,
        status: ObjectStatus,
    ) -> StoreResult<()>;

    /// Updates an object's storage status.
    fn update_object_status(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
        status: ObjectStatus,
    ) -> StoreResult<()>;

    /// Records delivery progress of an object for one destination.
    fn update_object_delivery_status(
        &self,
        status: DeliveryStatus,
        org_id: &str,
        object_type: &str,
        object_id: &str,
        dest_type: &str,
        dest_id: &str,
    ) -> StoreResult<()>;

    /// Marks an object as deleted, keeping its tombstone.
    fn mark_object_deleted(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
    ) -> StoreResult<()>;

    /// Removes an object entirely.
    fn delete_stored_object(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
    ) -> StoreResult<()>;

    /// Removes an object's data, keeping the metadata.
    fn delete_stored_data(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
    ) -> StoreResult<()>;

    /// Resets the remaining-consumers counter to the object's configured
    /// initial value.
    fn reset_object_remaining_consumers(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
    ) -> StoreResult<()>;

    /// Appends `data_length` bytes read from `reader` at `offset` within the
    /// object's data.
    ///
    /// `total_size` and the first/last flags let durable implementations
    /// pre-allocate and commit; they carry no meaning for the write itself.
    ///
    /// # Errors
    ///
    /// May return the `Discarded` sentinel; callers treat it as a no-op
    /// success. Returns `NotFound` for an unknown object.
    #[allow(clippy::too_many_arguments)]
    fn append_object_data(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
        reader: &mut dyn Read,
        data_length: usize,
        offset: i64,
        total_size: i64,
        is_first_chunk: bool,
        is_last_chunk: bool,
    ) -> StoreResult<()>;

    /// Reads up to `max_length` bytes of the object's data at `offset`.
    ///
    /// Returns the bytes and whether the end of the data was reached.
    fn read_object_data(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
        max_length: usize,
        offset: i64,
    ) -> StoreResult<(Vec<u8>, bool)>;

    /// Retrieves the notification record for an object/peer pair.
    fn retrieve_notification_record(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
        peer_type: &str,
        peer_id: &str,
    ) -> StoreResult<Option<Notification>>;

    /// Creates or replaces a notification record.
    fn update_notification_record(&self, notification: Notification) -> StoreResult<()>;

    /// Enumerates the notification records tracking one peer.
    fn retrieve_notifications(
        &self,
        org_id: &str,
        peer_type: &str,
        peer_id: &str,
    ) -> StoreResult<Vec<Notification>>;

    /// Deletes notification records for an object. Empty `peer_type` /
    /// `peer_id` match every peer.
    fn delete_notification_records(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
        peer_type: &str,
        peer_id: &str,
    ) -> StoreResult<()>;

    /// Looks up the transport protocol a destination is reached over.
    fn retrieve_destination_protocol(
        &self,
        org_id: &str,
        dest_type: &str,
        dest_id: &str,
    ) -> StoreResult<TransportProtocol>;
}
