//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A number's integer part does not fit the fixed digit budget.
    #[error("value too large: {value} exceeds {max_digits} digits")]
    ValueTooLarge {
        /// Display form of the rejected number.
        value: String,
        /// Digit budget of the number column encoding.
        max_digits: usize,
    },

    /// NaN and infinities have no ordered text form.
    #[error("non-finite number cannot be stored: {value}")]
    NonFiniteNumber {
        /// Display form of the rejected number.
        value: String,
    },

    /// Stored text cannot be decoded under its recorded type tag.
    #[error("failed to deserialize {value:?} as {tag}")]
    Deserialization {
        /// The offending stored text (possibly shortened).
        value: String,
        /// Name of the type tag the text was decoded under.
        tag: String,
    },

    /// Unknown numeric type tag read from storage.
    #[error("unknown type tag: {0}")]
    UnknownTag(i64),

    /// Failed to encode value to CBOR.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// NaN values are forbidden in the pack format.
    #[error("NaN values are forbidden")]
    NaNForbidden,

    /// Indefinite-length items are forbidden.
    #[error("indefinite-length items are forbidden")]
    IndefiniteLengthForbidden,

    /// Invalid UTF-8 string.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Invalid CBOR structure.
    #[error("invalid CBOR structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },

    /// Unsupported CBOR type.
    #[error("unsupported CBOR type: {type_name}")]
    UnsupportedType {
        /// Name of the unsupported type.
        type_name: String,
    },

    /// A length prefix claims more data than the decoder accepts.
    #[error("size limit exceeded: claimed {claimed}, max {max_allowed}")]
    SizeLimitExceeded {
        /// Length claimed by the input.
        claimed: u64,
        /// Maximum accepted length.
        max_allowed: u64,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Create an unsupported type error.
    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
        }
    }

    /// Create a deserialization error for `value` read under `tag`.
    ///
    /// Long values are shortened so the error stays loggable.
    pub fn deserialization(value: &str, tag: impl Into<String>) -> Self {
        const SHOWN: usize = 64;
        let value = match value.char_indices().nth(SHOWN) {
            Some((end, _)) => format!("{}...", &value[..end]),
            None => value.to_string(),
        };
        Self::Deserialization {
            value,
            tag: tag.into(),
        }
    }
}
