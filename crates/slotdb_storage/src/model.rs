//! Row types exchanged with a store.

use std::fmt::Write as _;

/// A named entity collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    /// Internal numeric id.
    pub id: i64,
    /// Unique resource name.
    pub name: String,
}

/// Mapping of a flattened attribute name to its column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRecord {
    /// Flattened attribute name.
    pub name: String,
    /// 0-based column number.
    pub col: u32,
}

/// The `(t_i, v_i)` content of one present column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Persisted type tag.
    pub tag: u8,
    /// Serialized text, `None` for null values.
    pub text: Option<String>,
}

impl Slot {
    /// Create a slot.
    pub fn new(tag: u8, text: Option<String>) -> Self {
        Self { tag, text }
    }
}

/// One wide row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    /// Internal numeric id.
    pub id: i64,
    /// External id.
    pub cid: String,
    /// Creation time, epoch millis.
    pub created_at: i64,
    /// Last update time, epoch millis.
    pub updated_at: i64,
    /// One entry per column; `None` when the column is absent.
    pub slots: Vec<Option<Slot>>,
}

impl EntityRecord {
    /// The slot stored in column `col`, if present.
    pub fn slot(&self, col: u32) -> Option<&Slot> {
        self.slots.get(col as usize).and_then(Option::as_ref)
    }
}

/// A write to one column. `slot: None` makes the column absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotWrite {
    /// Target column.
    pub col: u32,
    /// New content.
    pub slot: Option<Slot>,
}

/// Full value of an attribute whose text did not fit its column.
///
/// `value: None` marks a record that no longer overflows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverflowRecord {
    /// Flattened attribute name.
    pub name: String,
    /// Packed full value.
    pub value: Option<Vec<u8>>,
}

/// One usage histogram bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    /// Usage kind (`whereCols`, `orderCols`, `filter`).
    pub kind: String,
    /// Column or filter key.
    pub key: String,
    /// Occurrences.
    pub count: i64,
}

/// Table names and width of one entity kind.
///
/// The prefix escapes the kind name so that distinct kinds never share a
/// table: `[a-z0-9]` is kept and every other byte is written as `_xx` hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KindTables {
    prefix: String,
    columns: u32,
}

impl KindTables {
    /// Tables for kind `name` with `columns` slot pairs.
    pub fn new(name: &str, columns: u32) -> Self {
        let mut prefix = String::from("slot_k_");
        for byte in name.bytes() {
            if byte.is_ascii_lowercase() || byte.is_ascii_digit() {
                prefix.push(char::from(byte));
            } else {
                let _ = write!(prefix, "_{byte:02x}");
            }
        }
        Self { prefix, columns }
    }

    /// Escaped table prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number of slot pairs per row.
    pub fn columns(&self) -> u32 {
        self.columns
    }

    /// Name of the wide row table.
    pub fn entities(&self) -> String {
        format!("{}_entities", self.prefix)
    }

    /// Name of the overflow table.
    pub fn extras(&self) -> String {
        format!("{}_extras", self.prefix)
    }

    /// Name of the attribute map table.
    pub fn attributes(&self) -> String {
        format!("{}_attributes", self.prefix)
    }
}
