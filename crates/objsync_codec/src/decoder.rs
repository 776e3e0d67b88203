//! Data message decoder.

use std::io::Cursor;

use crate::error::{CodecError, CodecResult};
use crate::{
    FIELD_DATA, FIELD_INSTANCE_ID, FIELD_OBJECT_ID, FIELD_OBJECT_TYPE, FIELD_OFFSET, FIELD_ORG_ID,
    MAGIC, VERSION,
};

/// A decoded data message, borrowing from the raw message bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMessage<'a> {
    /// Organization the object belongs to. Empty if the field was absent.
    pub org_id: &'a str,
    /// Object type.
    pub object_type: &'a str,
    /// Object id.
    pub object_id: &'a str,
    /// Byte offset of this chunk within the object.
    pub offset: i64,
    /// Object version the chunk belongs to.
    pub instance_id: i64,
    /// The chunk payload. May be empty.
    pub data: &'a [u8],
}

impl<'a> DataMessage<'a> {
    /// Decode a data message.
    ///
    /// Unknown field types are skipped by their declared length. The object
    /// type, object id, and data section are required; the org id defaults
    /// to the empty string when absent.
    ///
    /// # Errors
    ///
    /// Fails on a bad magic number, a version mismatch, a fixed-width field
    /// whose declared length is not 8, a field declaring more bytes than the
    /// message holds, or missing required fields.
    pub fn decode(message: &'a [u8]) -> CodecResult<Self> {
        let mut reader = MessageReader::new(message);

        if reader.read_u32()? != MAGIC {
            return Err(CodecError::InvalidMagic);
        }
        let version = reader.read_u32()?;
        if version != VERSION {
            return Err(CodecError::WrongVersion { found: version });
        }
        let field_count = reader.read_u32()?;

        let mut org_id = "";
        let mut object_type: Option<&str> = None;
        let mut object_id: Option<&str> = None;
        let mut offset = 0i64;
        let mut instance_id = 0i64;
        let mut data: Option<&[u8]> = None;

        for _ in 0..field_count {
            let field_type = reader.read_u32()?;
            let field_length = reader.read_u32()?;

            match field_type {
                FIELD_ORG_ID => org_id = reader.read_str(field_length, "org id")?,
                FIELD_OBJECT_TYPE => {
                    object_type = Some(reader.read_str(field_length, "object type")?);
                }
                FIELD_OBJECT_ID => {
                    object_id = Some(reader.read_str(field_length, "object id")?);
                }
                FIELD_OFFSET => offset = reader.read_i64(field_length, "offset")?,
                FIELD_INSTANCE_ID => {
                    instance_id = reader.read_i64(field_length, "instance id")?;
                }
                FIELD_DATA => data = Some(reader.read_bytes(field_length, "data")?),
                _ => reader.skip(field_length),
            }
        }

        // The object type and id must be present and non-empty, and the data
        // section must exist (possibly zero-length).
        let object_type = object_type.filter(|s| !s.is_empty());
        let object_id = object_id.filter(|s| !s.is_empty());
        match (object_type, object_id, data) {
            (Some(object_type), Some(object_id), Some(data)) => Ok(Self {
                org_id,
                object_type,
                object_id,
                offset,
                instance_id,
                data,
            }),
            _ => Err(CodecError::MissingFields),
        }
    }

    /// Length of the chunk payload in bytes.
    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    /// A reader over exactly the chunk payload.
    pub fn data_reader(&self) -> Cursor<&'a [u8]> {
        Cursor::new(self.data)
    }
}

/// Big-endian message reader tracking its position.
struct MessageReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> MessageReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_u32(&mut self) -> CodecResult<u32> {
        if self.remaining() < 4 {
            return Err(CodecError::UnexpectedEof);
        }
        let value = u32::from_be_bytes(self.data[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(value)
    }

    fn read_i64(&mut self, declared: u32, field: &'static str) -> CodecResult<i64> {
        if declared != 8 {
            return Err(CodecError::InvalidFieldLength {
                field,
                declared,
                expected: 8,
            });
        }
        let bytes = self.read_bytes(8, field)?;
        Ok(i64::from_be_bytes(bytes.try_into().unwrap()))
    }

    fn read_bytes(&mut self, declared: u32, field: &'static str) -> CodecResult<&'a [u8]> {
        let length = declared as usize;
        if self.remaining() < length {
            return Err(CodecError::ShortRead {
                field,
                declared,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + length];
        self.pos += length;
        Ok(bytes)
    }

    fn read_str(&mut self, declared: u32, field: &'static str) -> CodecResult<&'a str> {
        let bytes = self.read_bytes(declared, field)?;
        std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8 { field })
    }

    /// Skip a field by its declared length, clamped to the end of the
    /// message. Over-long unknown trailers are tolerated.
    fn skip(&mut self, declared: u32) {
        self.pos = usize::min(self.pos + declared as usize, self.data.len());
    }
}
