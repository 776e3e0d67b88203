//! # objsync Codec
//!
//! The binary wire format carrying object data chunks between sync nodes.
//!
//! A data message is a fixed header followed by length-prefixed fields
//! (all integers big-endian):
//!
//! ```text
//! magic       : u32
//! version     : u32
//! field count : u32
//! fields      : (type: u32, length: u32, value: length bytes) * count
//! ```
//!
//! Unknown field types are skipped by their declared length, so newer
//! senders can add fields without breaking older receivers.
//!
//! ## Usage
//!
//! ```
//! use objsync_codec::{encode_data_message, DataMessage};
//! use objsync_protocol::MetaData;
//!
//! let meta = MetaData {
//!     org_id: "org".into(),
//!     object_type: "model".into(),
//!     object_id: "m1".into(),
//!     instance_id: 3,
//!     ..Default::default()
//! };
//! let bytes = encode_data_message(&meta, b"chunk", 0).unwrap();
//! let message = DataMessage::decode(&bytes).unwrap();
//! assert_eq!(message.data, b"chunk");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;

pub use decoder::DataMessage;
pub use encoder::encode_data_message;
pub use error::{CodecError, CodecResult};

/// Magic number identifying a data message.
pub const MAGIC: u32 = 0x6F62_6A73;

/// Version of the wire format.
pub const VERSION: u32 = 1;

/// Number of fields written by the encoder.
pub(crate) const FIELD_COUNT: u32 = 6;

pub(crate) const FIELD_ORG_ID: u32 = 0;
pub(crate) const FIELD_OBJECT_TYPE: u32 = 1;
pub(crate) const FIELD_OBJECT_ID: u32 = 2;
pub(crate) const FIELD_OFFSET: u32 = 3;
pub(crate) const FIELD_DATA: u32 = 4;
pub(crate) const FIELD_INSTANCE_ID: u32 = 5;

#[cfg(test)]
mod tests {
    use super::*;
    use objsync_protocol::MetaData;

    fn meta() -> MetaData {
        MetaData {
            org_id: "acme".into(),
            object_type: "model".into(),
            object_id: "m1".into(),
            instance_id: 17,
            ..Default::default()
        }
    }

    #[test]
    fn roundtrip_chunk() {
        let bytes = encode_data_message(&meta(), b"payload", 4096).unwrap();
        let message = DataMessage::decode(&bytes).unwrap();

        assert_eq!(message.org_id, "acme");
        assert_eq!(message.object_type, "model");
        assert_eq!(message.object_id, "m1");
        assert_eq!(message.offset, 4096);
        assert_eq!(message.instance_id, 17);
        assert_eq!(message.data, b"payload");
    }

    #[test]
    fn roundtrip_empty_data() {
        let bytes = encode_data_message(&meta(), b"", 0).unwrap();
        let message = DataMessage::decode(&bytes).unwrap();
        assert_eq!(message.data_len(), 0);
        assert!(message.data.is_empty());
    }

    #[test]
    fn roundtrip_negative_offset_rejected_by_semantics_not_codec() {
        // The codec itself carries any i64; range checks belong to the
        // transfer layer.
        let bytes = encode_data_message(&meta(), b"x", -8).unwrap();
        let message = DataMessage::decode(&bytes).unwrap();
        assert_eq!(message.offset, -8);
    }
}
