//! In-memory store implementation.

use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use objsync_protocol::{
    DeliveryStatus, Destination, MetaData, Notification, ObjectStatus, TransportProtocol,
};

use crate::error::{StoreError, StoreResult};
use crate::store::SyncStore;

#[derive(Debug, Clone)]
struct StoredObject {
    meta: MetaData,
    data: Option<Vec<u8>>,
    status: ObjectStatus,
    remaining_consumers: u32,
    delivery: HashMap<(String, String), DeliveryStatus>,
}

fn object_key(org_id: &str, object_type: &str, object_id: &str) -> String {
    format!("{org_id}:{object_type}:{object_id}")
}

/// An in-memory [`SyncStore`].
///
/// Backs tests and nodes running without persistent storage. All state is
/// guarded by `RwLock`s; individual operations are atomic, matching the
/// contract the notification core relies on.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    objects: RwLock<HashMap<String, StoredObject>>,
    destinations: RwLock<HashMap<String, Destination>>,
    notifications: RwLock<HashMap<String, Notification>>,
    discard_appends: AtomicBool,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `append_object_data` calls return the `Discarded`
    /// sentinel. Test support.
    pub fn set_discard_appends(&self, discard: bool) {
        self.discard_appends.store(discard, Ordering::SeqCst);
    }

    /// Returns a copy of an object's data, if any. Test support.
    pub fn object_data(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
    ) -> Option<Vec<u8>> {
        self.objects
            .read()
            .get(&object_key(org_id, object_type, object_id))
            .and_then(|object| object.data.clone())
    }

    /// Returns an object's storage status, if the object exists. Test
    /// support.
    pub fn object_status(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
    ) -> Option<ObjectStatus> {
        self.objects
            .read()
            .get(&object_key(org_id, object_type, object_id))
            .map(|object| object.status)
    }

    /// Returns the delivery status recorded for a destination, if any. Test
    /// support.
    pub fn delivery_status(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
        dest_type: &str,
        dest_id: &str,
    ) -> Option<DeliveryStatus> {
        self.objects
            .read()
            .get(&object_key(org_id, object_type, object_id))
            .and_then(|object| {
                object
                    .delivery
                    .get(&(dest_type.to_string(), dest_id.to_string()))
                    .copied()
            })
    }

    /// Number of notification records currently stored. Test support.
    pub fn notification_count(&self) -> usize {
        self.notifications.read().len()
    }
}

impl SyncStore for InMemoryStore {
    fn destination_exists(
        &self,
        org_id: &str,
        dest_type: &str,
        dest_id: &str,
    ) -> StoreResult<bool> {
        Ok(self
            .destinations
            .read()
            .contains_key(&object_key(org_id, dest_type, dest_id)))
    }

    fn store_destination(&self, dest: &Destination) -> StoreResult<()> {
        self.destinations.write().insert(
            object_key(&dest.org_id, &dest.dest_type, &dest.dest_id),
            dest.clone(),
        );
        Ok(())
    }

    fn retrieve_objects(
        &self,
        org_id: &str,
        dest_type: &str,
        dest_id: &str,
    ) -> StoreResult<Vec<MetaData>> {
        Ok(self
            .objects
            .read()
            .values()
            .filter(|object| {
                object.meta.org_id == org_id
                    && object.meta.dest_type == dest_type
                    && object.meta.dest_id == dest_id
                    && !object.meta.deleted
            })
            .map(|object| object.meta.clone())
            .collect())
    }

    fn retrieve_object(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
    ) -> StoreResult<Option<MetaData>> {
        Ok(self
            .objects
            .read()
            .get(&object_key(org_id, object_type, object_id))
            .map(|object| object.meta.clone()))
    }

    fn store_object(
        &self,
        meta: &MetaData,
        data: Option<&[u8]>,
        status: ObjectStatus,
    ) -> StoreResult<()> {
        let object = StoredObject {
            meta: meta.clone(),
            data: data.map(<[u8]>::to_vec),
            status,
            remaining_consumers: meta.expected_consumers,
            delivery: HashMap::new(),
        };
        self.objects.write().insert(
            object_key(&meta.org_id, &meta.object_type, &meta.object_id),
            object,
        );
        Ok(())
    }

    fn update_object_status(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
        status: ObjectStatus,
    ) -> StoreResult<()> {
        let mut objects = self.objects.write();
        let object = objects
            .get_mut(&object_key(org_id, object_type, object_id))
            .ok_or(StoreError::NotFound)?;
        object.status = status;
        Ok(())
    }

    fn update_object_delivery_status(
        &self,
        status: DeliveryStatus,
        org_id: &str,
        object_type: &str,
        object_id: &str,
        dest_type: &str,
        dest_id: &str,
    ) -> StoreResult<()> {
        let mut objects = self.objects.write();
        let object = objects
            .get_mut(&object_key(org_id, object_type, object_id))
            .ok_or(StoreError::NotFound)?;
        object
            .delivery
            .insert((dest_type.to_string(), dest_id.to_string()), status);
        Ok(())
    }

    fn mark_object_deleted(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
    ) -> StoreResult<()> {
        let mut objects = self.objects.write();
        let object = objects
            .get_mut(&object_key(org_id, object_type, object_id))
            .ok_or(StoreError::NotFound)?;
        object.meta.deleted = true;
        object.status = ObjectStatus::ObjDeleted;
        Ok(())
    }

    fn delete_stored_object(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
    ) -> StoreResult<()> {
        self.objects
            .write()
            .remove(&object_key(org_id, object_type, object_id));
        Ok(())
    }

    fn delete_stored_data(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
    ) -> StoreResult<()> {
        let mut objects = self.objects.write();
        let object = objects
            .get_mut(&object_key(org_id, object_type, object_id))
            .ok_or(StoreError::NotFound)?;
        object.data = None;
        Ok(())
    }

    fn reset_object_remaining_consumers(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
    ) -> StoreResult<()> {
        let mut objects = self.objects.write();
        let object = objects
            .get_mut(&object_key(org_id, object_type, object_id))
            .ok_or(StoreError::NotFound)?;
        object.remaining_consumers = object.meta.expected_consumers;
        Ok(())
    }

    fn append_object_data(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
        reader: &mut dyn Read,
        data_length: usize,
        offset: i64,
        _total_size: i64,
        _is_first_chunk: bool,
        _is_last_chunk: bool,
    ) -> StoreResult<()> {
        if self.discard_appends.load(Ordering::SeqCst) {
            return Err(StoreError::Discarded);
        }

        let mut chunk = vec![0u8; data_length];
        reader.read_exact(&mut chunk)?;

        let mut objects = self.objects.write();
        let object = objects
            .get_mut(&object_key(org_id, object_type, object_id))
            .ok_or(StoreError::NotFound)?;

        let offset = usize::try_from(offset)
            .map_err(|_| StoreError::internal("negative append offset"))?;
        let data = object.data.get_or_insert_with(Vec::new);
        if data.len() < offset + data_length {
            data.resize(offset + data_length, 0);
        }
        data[offset..offset + data_length].copy_from_slice(&chunk);
        Ok(())
    }

    fn read_object_data(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
        max_length: usize,
        offset: i64,
    ) -> StoreResult<(Vec<u8>, bool)> {
        let objects = self.objects.read();
        let object = objects
            .get(&object_key(org_id, object_type, object_id))
            .ok_or(StoreError::NotFound)?;
        let data = object.data.as_deref().ok_or(StoreError::NotFound)?;

        let offset =
            usize::try_from(offset).map_err(|_| StoreError::internal("negative read offset"))?;
        let start = usize::min(offset, data.len());
        let end = usize::min(start + max_length, data.len());
        Ok((data[start..end].to_vec(), end >= data.len()))
    }

    fn retrieve_notification_record(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
        peer_type: &str,
        peer_id: &str,
    ) -> StoreResult<Option<Notification>> {
        let id = objsync_protocol::notification_id(org_id, object_type, object_id, peer_type, peer_id);
        Ok(self.notifications.read().get(&id).cloned())
    }

    fn update_notification_record(&self, notification: Notification) -> StoreResult<()> {
        self.notifications
            .write()
            .insert(notification.id(), notification);
        Ok(())
    }

    fn retrieve_notifications(
        &self,
        org_id: &str,
        peer_type: &str,
        peer_id: &str,
    ) -> StoreResult<Vec<Notification>> {
        Ok(self
            .notifications
            .read()
            .values()
            .filter(|n| n.org_id == org_id && n.peer_type == peer_type && n.peer_id == peer_id)
            .cloned()
            .collect())
    }

    fn delete_notification_records(
        &self,
        org_id: &str,
        object_type: &str,
        object_id: &str,
        peer_type: &str,
        peer_id: &str,
    ) -> StoreResult<()> {
        self.notifications.write().retain(|_, n| {
            !(n.org_id == org_id
                && n.object_type == object_type
                && n.object_id == object_id
                && (peer_type.is_empty() || n.peer_type == peer_type)
                && (peer_id.is_empty() || n.peer_id == peer_id))
        });
        Ok(())
    }

    fn retrieve_destination_protocol(
        &self,
        org_id: &str,
        dest_type: &str,
        dest_id: &str,
    ) -> StoreResult<TransportProtocol> {
        self.destinations
            .read()
            .get(&object_key(org_id, dest_type, dest_id))
            .map(|dest| dest.communication)
            .ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn meta(object_id: &str) -> MetaData {
        MetaData {
            org_id: "org".into(),
            object_type: "model".into(),
            object_id: object_id.into(),
            dest_type: "gateway".into(),
            dest_id: "gw-7".into(),
            instance_id: 1,
            object_size: 10,
            chunk_size: 4,
            expected_consumers: 2,
            ..Default::default()
        }
    }

    #[test]
    fn store_and_retrieve_object() {
        let store = InMemoryStore::new();
        store
            .store_object(&meta("m1"), Some(b"payload"), ObjectStatus::CompletelyReceived)
            .unwrap();

        let found = store.retrieve_object("org", "model", "m1").unwrap().unwrap();
        assert_eq!(found.object_id, "m1");
        assert_eq!(store.object_data("org", "model", "m1").unwrap(), b"payload");
        assert!(store.retrieve_object("org", "model", "nope").unwrap().is_none());
    }

    #[test]
    fn retrieve_objects_filters_destination_and_deleted() {
        let store = InMemoryStore::new();
        store
            .store_object(&meta("m1"), None, ObjectStatus::CompletelyReceived)
            .unwrap();

        let mut other_dest = meta("m2");
        other_dest.dest_id = "gw-8".into();
        store
            .store_object(&other_dest, None, ObjectStatus::CompletelyReceived)
            .unwrap();

        let mut deleted = meta("m3");
        deleted.deleted = true;
        store
            .store_object(&deleted, None, ObjectStatus::ObjDeleted)
            .unwrap();

        let objects = store.retrieve_objects("org", "gateway", "gw-7").unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].object_id, "m1");
    }

    #[test]
    fn append_grows_and_writes_at_offset() {
        let store = InMemoryStore::new();
        store
            .store_object(&meta("m1"), None, ObjectStatus::PartiallyReceived)
            .unwrap();

        // Write the second chunk before the first.
        store
            .append_object_data("org", "model", "m1", &mut Cursor::new(b"5678"), 4, 4, 10, false, false)
            .unwrap();
        store
            .append_object_data("org", "model", "m1", &mut Cursor::new(b"1234"), 4, 0, 10, true, false)
            .unwrap();
        store
            .append_object_data("org", "model", "m1", &mut Cursor::new(b"90"), 2, 8, 10, false, true)
            .unwrap();

        assert_eq!(store.object_data("org", "model", "m1").unwrap(), b"1234567890");
    }

    #[test]
    fn append_discarded_sentinel() {
        let store = InMemoryStore::new();
        store
            .store_object(&meta("m1"), None, ObjectStatus::PartiallyReceived)
            .unwrap();
        store.set_discard_appends(true);

        let err = store
            .append_object_data("org", "model", "m1", &mut Cursor::new(b"xx"), 2, 0, 10, true, false)
            .unwrap_err();
        assert!(err.is_discarded());
    }

    #[test]
    fn read_object_data_reports_eof() {
        let store = InMemoryStore::new();
        store
            .store_object(&meta("m1"), Some(b"1234567890"), ObjectStatus::CompletelyReceived)
            .unwrap();

        let (bytes, eof) = store.read_object_data("org", "model", "m1", 4, 0).unwrap();
        assert_eq!(bytes, b"1234");
        assert!(!eof);

        let (bytes, eof) = store.read_object_data("org", "model", "m1", 4, 8).unwrap();
        assert_eq!(bytes, b"90");
        assert!(eof);

        let (bytes, eof) = store.read_object_data("org", "model", "m1", 4, 100).unwrap();
        assert!(bytes.is_empty());
        assert!(eof);
    }

    #[test]
    fn mark_deleted_keeps_tombstone() {
        let store = InMemoryStore::new();
        store
            .store_object(&meta("m1"), Some(b"x"), ObjectStatus::CompletelyReceived)
            .unwrap();

        store.mark_object_deleted("org", "model", "m1").unwrap();
        let found = store.retrieve_object("org", "model", "m1").unwrap().unwrap();
        assert!(found.deleted);
        assert_eq!(
            store.object_status("org", "model", "m1"),
            Some(ObjectStatus::ObjDeleted)
        );

        let err = store.mark_object_deleted("org", "model", "nope").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn notification_records_by_peer() {
        let store = InMemoryStore::new();
        let m = meta("m1");
        store
            .update_notification_record(Notification::new(
                &m,
                "gateway",
                "gw-7",
                objsync_protocol::NotificationStatus::Update,
            ))
            .unwrap();
        store
            .update_notification_record(Notification::new(
                &m,
                "gateway",
                "gw-8",
                objsync_protocol::NotificationStatus::Update,
            ))
            .unwrap();

        let found = store
            .retrieve_notification_record("org", "model", "m1", "gateway", "gw-7")
            .unwrap();
        assert!(found.is_some());

        let for_peer = store.retrieve_notifications("org", "gateway", "gw-8").unwrap();
        assert_eq!(for_peer.len(), 1);

        // Empty peer strings delete every record of the object.
        store
            .delete_notification_records("org", "model", "m1", "", "")
            .unwrap();
        assert_eq!(store.notification_count(), 0);
    }

    #[test]
    fn delete_notification_records_single_peer() {
        let store = InMemoryStore::new();
        let m = meta("m1");
        for peer in ["gw-7", "gw-8"] {
            store
                .update_notification_record(Notification::new(
                    &m,
                    "gateway",
                    peer,
                    objsync_protocol::NotificationStatus::Update,
                ))
                .unwrap();
        }

        store
            .delete_notification_records("org", "model", "m1", "gateway", "gw-7")
            .unwrap();
        assert_eq!(store.notification_count(), 1);
        assert!(store
            .retrieve_notification_record("org", "model", "m1", "gateway", "gw-8")
            .unwrap()
            .is_some());
    }

    #[test]
    fn destination_protocol_lookup() {
        let store = InMemoryStore::new();
        let dest = Destination::new("org", "gateway", "gw-7", TransportProtocol::Mqtt);

        assert!(!store.destination_exists("org", "gateway", "gw-7").unwrap());
        store.store_destination(&dest).unwrap();
        assert!(store.destination_exists("org", "gateway", "gw-7").unwrap());
        assert_eq!(
            store.retrieve_destination_protocol("org", "gateway", "gw-7").unwrap(),
            TransportProtocol::Mqtt
        );

        let err = store
            .retrieve_destination_protocol("org", "gateway", "nope")
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn reset_remaining_consumers() {
        let store = InMemoryStore::new();
        store
            .store_object(&meta("m1"), None, ObjectStatus::CompletelyReceived)
            .unwrap();
        // The counter is opaque to callers; resetting an existing object
        // succeeds, resetting an unknown one reports NotFound.
        store.reset_object_remaining_consumers("org", "model", "m1").unwrap();
        let err = store
            .reset_object_remaining_consumers("org", "model", "nope")
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
