//! # SlotDB Codec
//!
//! Value model and encodings for SlotDB.
//!
//! This crate provides:
//! - [`Value`], the dynamic attribute value stored by the entity engine
//! - column serialization: a type tag plus an order-preserving text form
//!   for each attribute column ([`serialize`] / [`deserialize`])
//! - canonical CBOR packing for object columns and overflow records
//! - flattening of nested maps into column names ([`path`])
//! - JSON interop ([`Value::from_json`] / [`Value::to_json`])
//!
//! ## Canonical CBOR Rules
//!
//! - Maps are sorted by key (length-first, then bytewise)
//! - Map keys are text
//! - Integers use shortest encoding
//! - Floats are written as 64-bit and never NaN
//! - No indefinite-length items
//!
//! ## Usage
//!
//! ```
//! use slotdb_codec::{deserialize, serialize, TypeTag, Value};
//!
//! let encoded = serialize(&Value::Integer(42)).unwrap();
//! assert_eq!(encoded.tag, TypeTag::Number);
//! assert_eq!(encoded.text.as_deref(), Some("000000000000000000000042"));
//!
//! let decoded = deserialize(encoded.text.as_deref(), encoded.tag).unwrap();
//! assert_eq!(decoded, Value::Integer(42));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod column;
mod decoder;
mod encoder;
mod error;
mod json;
pub mod path;
mod value;

pub use column::{
    deserialize, pack, serialize, truncate, unpack, Encoded, TypeTag, NUMBER_DIGITS,
};
pub use decoder::{from_cbor, CanonicalDecoder};
pub use encoder::{to_canonical_cbor, CanonicalEncoder, TAG_DATE, TAG_ENTITY, TAG_ID, TAG_REF};
pub use error::{CodecError, CodecResult};
pub use value::{Map, Value};
