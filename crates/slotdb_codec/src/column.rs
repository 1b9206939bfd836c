//! Column serialization.
//!
//! Every stored attribute occupies one `(t_i, v_i)` column pair: a small
//! integer [`TypeTag`] and a text value. Numbers and dates are written in an
//! order-preserving form so the store can compare and sort the text column
//! directly:
//!
//! - non-negative: 24 zero-padded integer digits, then `.` and the fraction
//!   digits for floats (`42` becomes `000000000000000000000042`);
//! - negative: `-`, the nines-complement of the same digits, then `~`.
//!
//! `-` sorts before every digit and `~` after, so lexicographic order of the
//! encoded text equals numeric order across signs and fraction lengths.
//! Integers never contain `.` and floats always do, which lets the decoder
//! restore the original variant.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::decoder::from_cbor;
use crate::encoder::to_canonical_cbor;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Integer digits available to the number encoding.
pub const NUMBER_DIGITS: usize = 24;

const NEGATIVE_PREFIX: char = '-';
const NEGATIVE_TERMINATOR: char = '~';

/// Persisted type tag of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TypeTag {
    /// Explicit null.
    Null = 0,
    /// `true` / `false`.
    Bool = 1,
    /// Verbatim UTF-8 text.
    String = 2,
    /// Order-preserving number text.
    Number = 3,
    /// Order-preserving epoch millis.
    Date = 4,
    /// Base64 canonical CBOR.
    Object = 5,
    /// `Kind#id` reference.
    Ref = 6,
    /// `kind#id` live entity reference.
    Entity = 7,
    /// Identifier text.
    Id = 8,
}

impl TypeTag {
    /// The small integer persisted for this tag.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Name used in error messages.
    pub const fn name(self) -> &'static str {
        match self {
            TypeTag::Null => "null",
            TypeTag::Bool => "bool",
            TypeTag::String => "string",
            TypeTag::Number => "number",
            TypeTag::Date => "date",
            TypeTag::Object => "object",
            TypeTag::Ref => "ref",
            TypeTag::Entity => "entity",
            TypeTag::Id => "id",
        }
    }

    /// The tag a value is stored under.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => TypeTag::Null,
            Value::Bool(_) => TypeTag::Bool,
            Value::Integer(_) | Value::Float(_) => TypeTag::Number,
            Value::Text(_) => TypeTag::String,
            Value::Date(_) => TypeTag::Date,
            Value::Ref(_) => TypeTag::Ref,
            Value::Entity { .. } => TypeTag::Entity,
            Value::Id(_) => TypeTag::Id,
            Value::Bytes(_) | Value::Array(_) | Value::Map(_) => TypeTag::Object,
        }
    }
}

impl TryFrom<u8> for TypeTag {
    type Error = CodecError;

    fn try_from(tag: u8) -> CodecResult<Self> {
        Ok(match tag {
            0 => TypeTag::Null,
            1 => TypeTag::Bool,
            2 => TypeTag::String,
            3 => TypeTag::Number,
            4 => TypeTag::Date,
            5 => TypeTag::Object,
            6 => TypeTag::Ref,
            7 => TypeTag::Entity,
            8 => TypeTag::Id,
            other => return Err(CodecError::UnknownTag(i64::from(other))),
        })
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A value serialized for one column pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    /// Type tag for `t_i`.
    pub tag: TypeTag,
    /// Text for `v_i`; `None` for null.
    pub text: Option<String>,
}

/// Serialize a value into its tag and column text.
///
/// # Errors
///
/// Returns [`CodecError::ValueTooLarge`] for numbers wider than
/// [`NUMBER_DIGITS`] and [`CodecError::NonFiniteNumber`] for NaN or
/// infinities.
pub fn serialize(value: &Value) -> CodecResult<Encoded> {
    let tag = TypeTag::of(value);
    let text = match value {
        Value::Null => None,
        Value::Bool(b) => Some(if *b { "true" } else { "false" }.to_string()),
        Value::Integer(n) => Some(encode_integer(*n)),
        Value::Float(f) => Some(match integral(*f) {
            Some(n) => encode_integer(n),
            None => encode_float(*f)?,
        }),
        Value::Text(s) | Value::Ref(s) | Value::Id(s) => Some(s.clone()),
        Value::Date(millis) => Some(encode_integer(*millis)),
        Value::Entity { kind, id } => Some(format!("{kind}#{id}")),
        Value::Bytes(_) | Value::Array(_) | Value::Map(_) => {
            Some(STANDARD.encode(to_canonical_cbor(value)?))
        }
    };
    Ok(Encoded { tag, text })
}

/// Deserialize column text stored under `tag`.
///
/// # Errors
///
/// Returns [`CodecError::Deserialization`] naming the text and tag when the
/// text is not a valid encoding for the tag.
pub fn deserialize(text: Option<&str>, tag: TypeTag) -> CodecResult<Value> {
    if tag == TypeTag::Null {
        return Ok(Value::Null);
    }
    let Some(text) = text else {
        return Err(CodecError::deserialization("<null>", tag.name()));
    };
    let fail = || CodecError::deserialization(text, tag.name());

    match tag {
        TypeTag::Null => Ok(Value::Null),
        TypeTag::Bool => match text {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(fail()),
        },
        TypeTag::String => Ok(Value::Text(text.to_string())),
        TypeTag::Number => decode_number(text).ok_or_else(fail),
        TypeTag::Date => match decode_number(text) {
            Some(Value::Integer(millis)) => Ok(Value::Date(millis)),
            _ => Err(fail()),
        },
        TypeTag::Object => {
            let bytes = STANDARD.decode(text).map_err(|_| fail())?;
            from_cbor(&bytes).map_err(|_| fail())
        }
        TypeTag::Ref => Ok(Value::Ref(text.to_string())),
        TypeTag::Entity => match text.split_once('#') {
            Some((kind, id)) => Ok(Value::Entity {
                kind: kind.to_string(),
                id: id.to_string(),
            }),
            None => Err(fail()),
        },
        TypeTag::Id => Ok(Value::Id(text.to_string())),
    }
}

/// Pack a full value for an overflow record.
///
/// # Errors
///
/// Returns an error if the value cannot be CBOR encoded.
pub fn pack(value: &Value) -> CodecResult<Vec<u8>> {
    to_canonical_cbor(value)
}

/// Unpack an overflow record.
///
/// # Errors
///
/// Returns an error if the bytes are not a canonical CBOR value.
pub fn unpack(bytes: &[u8]) -> CodecResult<Value> {
    from_cbor(bytes)
}

/// Longest prefix of `text` that fits in `max_bytes` without splitting a
/// character.
pub fn truncate(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn encode_integer(n: i64) -> String {
    let digits = format!("{:0width$}", n.unsigned_abs(), width = NUMBER_DIGITS);
    if n < 0 {
        negate(&digits)
    } else {
        digits
    }
}

/// A float with no fractional part that fits an `i64`. Such floats share
/// the integer text so equal numbers compare equal in the column.
fn integral(f: f64) -> Option<i64> {
    // 2^63
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.is_finite() && f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f) {
        #[allow(clippy::cast_possible_truncation)]
        Some(f as i64)
    } else {
        None
    }
}

fn encode_float(f: f64) -> CodecResult<String> {
    if !f.is_finite() {
        return Err(CodecError::NonFiniteNumber {
            value: f.to_string(),
        });
    }
    // f64 Display never uses exponent notation
    let abs = f.abs().to_string();
    let (int_part, frac_part) = abs.split_once('.').unwrap_or((abs.as_str(), "0"));
    if int_part.len() > NUMBER_DIGITS {
        return Err(CodecError::ValueTooLarge {
            value: f.to_string(),
            max_digits: NUMBER_DIGITS,
        });
    }
    let digits = format!("{int_part:0>width$}.{frac_part}", width = NUMBER_DIGITS);
    // -0.0 stores as 0.0
    if f < 0.0 {
        Ok(negate(&digits))
    } else {
        Ok(digits)
    }
}

fn negate(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + 2);
    out.push(NEGATIVE_PREFIX);
    out.extend(digits.chars().map(complement));
    out.push(NEGATIVE_TERMINATOR);
    out
}

fn complement(c: char) -> char {
    match c.to_digit(10) {
        Some(d) => char::from_digit(9 - d, 10).unwrap_or(c),
        None => c,
    }
}

fn decode_number(text: &str) -> Option<Value> {
    let (negative, digits) = match text.strip_prefix(NEGATIVE_PREFIX) {
        Some(rest) => {
            let rest = rest.strip_suffix(NEGATIVE_TERMINATOR)?;
            (true, rest.chars().map(complement).collect::<String>())
        }
        None => (false, text.to_string()),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }

    if digits.contains('.') {
        let f: f64 = digits.parse().ok()?;
        Some(Value::Float(if negative { -f } else { f }))
    } else {
        let abs: i128 = digits.parse().ok()?;
        let n = if negative { -abs } else { abs };
        i64::try_from(n).ok().map(Value::Integer)
    }
}
