//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding a data message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The message does not start with the data-message magic number.
    #[error("not a data message: bad magic number")]
    InvalidMagic,

    /// The message was produced by an incompatible format version.
    #[error("wrong data message version: {found}")]
    WrongVersion {
        /// Version found in the message header.
        found: u32,
    },

    /// A fixed-width field declared the wrong length.
    #[error("field {field} declared {declared} bytes, expected {expected}")]
    InvalidFieldLength {
        /// Name of the offending field.
        field: &'static str,
        /// Length declared in the message.
        declared: u32,
        /// Length the format requires.
        expected: u32,
    },

    /// A field declared more bytes than the message contains.
    #[error("short read for field {field}: {remaining} of {declared} bytes available")]
    ShortRead {
        /// Name of the offending field.
        field: &'static str,
        /// Length declared in the message.
        declared: u32,
        /// Bytes actually available.
        remaining: usize,
    },

    /// A required field (object type, object id, or the data section) is
    /// absent or empty.
    #[error("data message is missing required fields")]
    MissingFields,

    /// The message ended in the middle of the header or a field prefix.
    #[error("unexpected end of message")]
    UnexpectedEof,

    /// A string field holds invalid UTF-8.
    #[error("field {field} is not valid UTF-8")]
    InvalidUtf8 {
        /// Name of the offending field.
        field: &'static str,
    },

    /// A field value is too long for its length prefix.
    #[error("field {field} exceeds the wire format's length limit")]
    FieldTooLong {
        /// Name of the offending field.
        field: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CodecError::WrongVersion { found: 9 };
        assert_eq!(err.to_string(), "wrong data message version: 9");

        let err = CodecError::ShortRead {
            field: "object id",
            declared: 12,
            remaining: 3,
        };
        assert!(err.to_string().contains("object id"));
        assert!(err.to_string().contains("12"));
    }
}
