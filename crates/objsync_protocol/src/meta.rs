//! Object metadata and destination types.

use serde::{Deserialize, Serialize};

/// The role a sync node plays in the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    /// Central sync service. Holds authoritative copies and routes objects
    /// to destinations; may be part of a leader-elected cluster.
    Css,
    /// Edge sync service. A local agent that consumes objects and deletes
    /// them on consumption.
    Ess,
}

/// The transport protocol a destination is reached over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportProtocol {
    /// Broker-based messaging; supports multiple in-flight data requests.
    Mqtt,
    /// Request/response polling; one in-flight data request at a time.
    Http,
}

/// Storage-level status of a synchronized object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectStatus {
    /// Some chunks of the object's data have been received.
    PartiallyReceived,
    /// All of the object's data has been received.
    CompletelyReceived,
    /// The object was deleted by its source; only the tombstone remains.
    ObjDeleted,
}

/// Delivery progress of an object with respect to one destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    /// The destination acknowledged receiving the object.
    Delivered,
    /// The destination acknowledged consuming the object.
    Consumed,
}

/// A registered destination of synchronized objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// Organization the destination belongs to.
    pub org_id: String,
    /// Destination type (a class of edge nodes).
    pub dest_type: String,
    /// Destination id (a specific edge node).
    pub dest_id: String,
    /// Transport protocol the destination communicates over.
    pub communication: TransportProtocol,
}

impl Destination {
    /// Creates a new destination reached over the given protocol.
    pub fn new(
        org_id: impl Into<String>,
        dest_type: impl Into<String>,
        dest_id: impl Into<String>,
        communication: TransportProtocol,
    ) -> Self {
        Self {
            org_id: org_id.into(),
            dest_type: dest_type.into(),
            dest_id: dest_id.into(),
            communication,
        }
    }
}

/// Metadata describing one synchronized object.
///
/// An object is identified by `(org_id, object_type, object_id)`. Each new
/// version of the object carries a larger `instance_id`; stale notifications
/// are filtered by comparing instance ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaData {
    /// Organization the object belongs to.
    pub org_id: String,
    /// Object type (application-defined grouping).
    pub object_type: String,
    /// Object id, unique within its type.
    pub object_id: String,
    /// Type of the node the object originates from.
    pub origin_type: String,
    /// Id of the node the object originates from.
    pub origin_id: String,
    /// Type of the destination the object is routed to.
    pub dest_type: String,
    /// Id of the destination the object is routed to.
    pub dest_id: String,
    /// Monotonically increasing version of the object.
    pub instance_id: i64,
    /// Total size of the object's data in bytes.
    pub object_size: i64,
    /// Size of one transfer chunk in bytes. Zero means the object is
    /// transferred with a single data request.
    pub chunk_size: i64,
    /// Link to externally hosted data instead of inline data.
    pub link: Option<String>,
    /// The object deliberately carries no data.
    pub no_data: bool,
    /// Only the metadata changed; the data is unchanged.
    pub meta_only: bool,
    /// The object has been deleted.
    pub deleted: bool,
    /// Number of consumers that must consume the object before it can be
    /// removed.
    pub expected_consumers: u32,
    /// Data URI to read the object's data from on the sending side.
    pub source_data_uri: Option<String>,
    /// Data URI to write the object's data to on the receiving side.
    pub destination_data_uri: Option<String>,
}

impl MetaData {
    /// True when the object's data is not transferred through the chunked
    /// data protocol (external link, no data, or metadata-only update).
    pub fn skips_data_transfer(&self) -> bool {
        self.link.is_some() || self.no_data || self.meta_only
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_data_transfer_flags() {
        let mut meta = MetaData::default();
        assert!(!meta.skips_data_transfer());

        meta.no_data = true;
        assert!(meta.skips_data_transfer());

        meta.no_data = false;
        meta.meta_only = true;
        assert!(meta.skips_data_transfer());

        meta.meta_only = false;
        meta.link = Some("https://example.com/blob".into());
        assert!(meta.skips_data_transfer());
    }

    #[test]
    fn destination_new() {
        let dest = Destination::new("org", "gateway", "gw-7", TransportProtocol::Mqtt);
        assert_eq!(dest.org_id, "org");
        assert_eq!(dest.dest_type, "gateway");
        assert_eq!(dest.dest_id, "gw-7");
        assert_eq!(dest.communication, TransportProtocol::Mqtt);
    }
}
