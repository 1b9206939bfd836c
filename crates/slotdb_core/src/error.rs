//! Error types for SlotDB core.

use slotdb_codec::CodecError;
use slotdb_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in SlotDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A number does not fit the fixed digit budget of a column.
    #[error("value too large: {value} exceeds {max_digits} integer digits")]
    ValueTooLarge {
        /// Text form of the rejected value.
        value: String,
        /// Digit budget.
        max_digits: usize,
    },

    /// A kind uses more distinct attribute names than it has columns.
    #[error("too many columns for {kind}: limit is {limit}")]
    TooManyColumns {
        /// Resource kind name.
        kind: String,
        /// Column budget.
        limit: u32,
    },

    /// Stored text cannot be decoded under its type tag.
    #[error("cannot deserialize {value:?} as {tag}")]
    Deserialization {
        /// Offending stored text (shortened).
        value: String,
        /// Recorded type tag.
        tag: String,
    },

    /// Update of an id that does not exist.
    #[error("entity not found: {id} in {kind}")]
    EntityNotFound {
        /// Resource kind name.
        kind: String,
        /// External id.
        id: String,
    },

    /// Create with an id that is already taken.
    #[error("entity already exists: {id} in {kind}")]
    EntityExists {
        /// Resource kind name.
        kind: String,
        /// External id.
        id: String,
    },

    /// A named lock could not be acquired within the retry budget.
    #[error("lock timeout: {name}")]
    LockTimeout {
        /// Lock name.
        name: String,
    },

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Codec error other than the ones mapped above.
    #[error("codec error: {0}")]
    Codec(CodecError),

    /// Caller supplied arguments the operation cannot accept.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },
}

impl From<CodecError> for CoreError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::ValueTooLarge { value, max_digits } => {
                Self::ValueTooLarge { value, max_digits }
            }
            CodecError::Deserialization { value, tag } => Self::Deserialization { value, tag },
            other => Self::Codec(other),
        }
    }
}

impl CoreError {
    /// Creates a too-many-columns error.
    pub fn too_many_columns(kind: impl Into<String>, limit: u32) -> Self {
        Self::TooManyColumns {
            kind: kind.into(),
            limit,
        }
    }

    /// Creates an entity not found error.
    pub fn entity_not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::EntityNotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Creates an entity exists error.
    pub fn entity_exists(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::EntityExists {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Creates a lock timeout error.
    pub fn lock_timeout(name: impl Into<String>) -> Self {
        Self::LockTimeout { name: name.into() }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Whether the failed operation may succeed if retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(err) => err.is_retryable(),
            Self::LockTimeout { .. } => true,
            _ => false,
        }
    }
}
