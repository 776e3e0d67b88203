//! Data message encoder.

use objsync_protocol::MetaData;

use crate::error::{CodecError, CodecResult};
use crate::{
    FIELD_COUNT, FIELD_DATA, FIELD_INSTANCE_ID, FIELD_OBJECT_ID, FIELD_OBJECT_TYPE, FIELD_OFFSET,
    FIELD_ORG_ID, MAGIC, VERSION,
};

/// Encode a data message carrying one chunk of an object.
///
/// The fields are written in the order `org id, object type, object id,
/// offset, instance id, data`. Decoders accept any order, but peers may
/// rely on the data section coming last, so keep it there.
///
/// An empty `data` slice produces a header-only message, used to answer a
/// data request for a zero-length object.
///
/// # Errors
///
/// Returns an error if an identifier is too long for its 32-bit length
/// prefix.
pub fn encode_data_message(meta: &MetaData, data: &[u8], offset: i64) -> CodecResult<Vec<u8>> {
    let mut message = MessageWriter::with_capacity(64 + data.len());

    message.write_u32(MAGIC);
    message.write_u32(VERSION);
    message.write_u32(FIELD_COUNT);

    message.write_string_field(FIELD_ORG_ID, "org id", &meta.org_id)?;
    message.write_string_field(FIELD_OBJECT_TYPE, "object type", &meta.object_type)?;
    message.write_string_field(FIELD_OBJECT_ID, "object id", &meta.object_id)?;
    message.write_i64_field(FIELD_OFFSET, offset);
    message.write_i64_field(FIELD_INSTANCE_ID, meta.instance_id);
    message.write_bytes_field(FIELD_DATA, "data", data)?;

    Ok(message.into_bytes())
}

/// Big-endian message writer.
struct MessageWriter {
    buffer: Vec<u8>,
}

impl MessageWriter {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    fn write_string_field(
        &mut self,
        field_type: u32,
        name: &'static str,
        value: &str,
    ) -> CodecResult<()> {
        self.write_bytes_field(field_type, name, value.as_bytes())
    }

    fn write_bytes_field(
        &mut self,
        field_type: u32,
        name: &'static str,
        value: &[u8],
    ) -> CodecResult<()> {
        let length =
            u32::try_from(value.len()).map_err(|_| CodecError::FieldTooLong { field: name })?;
        self.write_u32(field_type);
        self.write_u32(length);
        self.buffer.extend_from_slice(value);
        Ok(())
    }

    fn write_i64_field(&mut self, field_type: u32, value: i64) {
        self.write_u32(field_type);
        self.write_u32(8);
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> MetaData {
        MetaData {
            org_id: "o".into(),
            object_type: "t".into(),
            object_id: "i".into(),
            instance_id: 1,
            ..Default::default()
        }
    }

    #[test]
    fn header_layout() {
        let bytes = encode_data_message(&meta(), b"", 0).unwrap();

        assert_eq!(&bytes[0..4], &MAGIC.to_be_bytes());
        assert_eq!(&bytes[4..8], &VERSION.to_be_bytes());
        assert_eq!(&bytes[8..12], &FIELD_COUNT.to_be_bytes());
    }

    #[test]
    fn fields_written_in_canonical_order() {
        let bytes = encode_data_message(&meta(), b"d", 0).unwrap();

        let mut pos = 12;
        let mut order = Vec::new();
        while pos + 8 <= bytes.len() {
            let field_type = u32::from_be_bytes(bytes[pos..pos + 4].try_into().unwrap());
            let length =
                u32::from_be_bytes(bytes[pos + 4..pos + 8].try_into().unwrap()) as usize;
            order.push(field_type);
            pos += 8 + length;
        }

        assert_eq!(
            order,
            vec![
                FIELD_ORG_ID,
                FIELD_OBJECT_TYPE,
                FIELD_OBJECT_ID,
                FIELD_OFFSET,
                FIELD_INSTANCE_ID,
                FIELD_DATA
            ]
        );
        assert_eq!(pos, bytes.len());
    }

    #[test]
    fn fixed_width_fields_declare_eight_bytes() {
        let bytes = encode_data_message(&meta(), b"", i64::MAX).unwrap();

        // org id "o" (9) + object type "t" (9) + object id "i" (9)
        let offset_field = 12 + 9 * 3;
        let declared =
            u32::from_be_bytes(bytes[offset_field + 4..offset_field + 8].try_into().unwrap());
        assert_eq!(declared, 8);
        let value = i64::from_be_bytes(
            bytes[offset_field + 8..offset_field + 16].try_into().unwrap(),
        );
        assert_eq!(value, i64::MAX);
    }
}
