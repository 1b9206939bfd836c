//! Filter and sort translation.
//!
//! A filter is a map from attribute name to:
//!
//! - a literal: equality (`null` tests for absence, an array means `$in`);
//! - a map of operators: `$eq $ne $gt $gte $lt $lte $in $nin $notIn
//!   $between $notBetween $like $notLike`;
//! - a map of sub-fields: `{bar: {n: 1}}` tests `bar.n`.
//!
//! `$or` and `$and` keys combine nested filters, and a top-level array is
//! an OR across its elements. Operands are serialized with the column
//! codec so comparisons run against the stored text.
//!
//! `id`, `$$num` and `$$at` address the row's external id, internal id and
//! update time. Other `$$` names and unknown operators are logged and
//! ignored. Names the kind has never stored follow [`UnknownFieldPolicy`].

use std::collections::BTreeSet;

use slotdb_codec::{serialize, truncate, Value};
use slotdb_storage::{Column, Condition, Operand, Predicate, SortKey};
use tracing::{debug, warn};

use crate::attribute::AttributeIndex;
use crate::config::UnknownFieldPolicy;
use crate::error::{CoreError, CoreResult};

/// A translated filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Translated {
    /// Row predicate.
    pub predicate: Predicate,
    /// Resolved attribute names the predicate tests.
    pub where_cols: Vec<String>,
    /// Top-level keys of the filter.
    pub filter_names: Vec<String>,
    /// Names the kind has not stored.
    pub unknown_names: Vec<String>,
}

/// A translated sort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedSort {
    /// Ordering terms, most significant first.
    pub keys: Vec<SortKey>,
    /// Resolved attribute names sorted on.
    pub order_cols: Vec<String>,
}

/// Translates filters and sorts against one kind's attribute map.
#[derive(Debug, Clone, Copy)]
pub struct Translator<'a> {
    index: &'a AttributeIndex,
    policy: UnknownFieldPolicy,
    base_length: usize,
}

#[derive(Default)]
struct Seen {
    cols: BTreeSet<String>,
    unknown: BTreeSet<String>,
}

enum Target {
    Column(Column),
    Ignored,
    Unknown,
}

impl<'a> Translator<'a> {
    /// Creates a translator.
    pub fn new(index: &'a AttributeIndex, policy: UnknownFieldPolicy, base_length: usize) -> Self {
        Self {
            index,
            policy,
            base_length,
        }
    }

    /// Translate a filter.
    ///
    /// # Errors
    ///
    /// Returns an error if an operand cannot be serialized (too large or
    /// not finite).
    pub fn parse_filter(&self, filter: &Value) -> CoreResult<Translated> {
        let mut seen = Seen::default();
        let predicate = self.filter(filter, &mut seen)?;
        let filter_names = match filter {
            Value::Map(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        };
        Ok(Translated {
            predicate,
            where_cols: seen.cols.into_iter().collect(),
            filter_names,
            unknown_names: seen.unknown.into_iter().collect(),
        })
    }

    fn filter(&self, filter: &Value, seen: &mut Seen) -> CoreResult<Predicate> {
        match filter {
            Value::Null => Ok(Predicate::All),
            Value::Array(items) => self.any(items, seen),
            Value::Map(map) => {
                let mut parts = Vec::with_capacity(map.len());
                for (key, value) in map {
                    let part = match key.as_str() {
                        "$or" => match value {
                            Value::Array(items) => self.any(items, seen)?,
                            Value::Map(map) => {
                                let items: Vec<Value> = map
                                    .iter()
                                    .map(|(k, v)| Value::map([(k.clone(), v.clone())]))
                                    .collect();
                                self.any(&items, seen)?
                            }
                            other => self.filter(other, seen)?,
                        },
                        "$and" => match value {
                            Value::Array(items) => {
                                let mut all = Vec::with_capacity(items.len());
                                for item in items {
                                    all.push(self.filter(item, seen)?);
                                }
                                Predicate::and(all)
                            }
                            other => self.filter(other, seen)?,
                        },
                        _ => self.field(key, value, seen)?,
                    };
                    parts.push(part);
                }
                Ok(Predicate::and(parts))
            }
            other => {
                warn!("ignoring filter of type {}", other.type_name());
                Ok(Predicate::All)
            }
        }
    }

    fn any(&self, items: &[Value], seen: &mut Seen) -> CoreResult<Predicate> {
        if items.is_empty() {
            return Ok(Predicate::All);
        }
        let mut parts = Vec::with_capacity(items.len());
        for item in items {
            parts.push(self.filter(item, seen)?);
        }
        Ok(Predicate::or(parts))
    }

    fn field(&self, name: &str, value: &Value, seen: &mut Seen) -> CoreResult<Predicate> {
        match value {
            Value::Map(map) if !map.is_empty() => {
                let mut parts = Vec::with_capacity(map.len());
                for (key, inner) in map {
                    if key.starts_with('$') {
                        parts.push(self.operator(name, key, inner, seen)?);
                    } else {
                        parts.push(self.field(&format!("{name}.{key}"), inner, seen)?);
                    }
                }
                Ok(Predicate::and(parts))
            }
            Value::Array(items) => self.condition(name, seen, |t| {
                Ok(Some(Condition::In(t.operands(items)?)))
            }),
            Value::Null => self.condition(name, seen, |_| Ok(Some(Condition::IsNull))),
            scalar => self.condition(name, seen, |t| Ok(Some(Condition::Eq(t.operand(scalar)?)))),
        }
    }

    fn operator(
        &self,
        name: &str,
        op: &str,
        value: &Value,
        seen: &mut Seen,
    ) -> CoreResult<Predicate> {
        let list = |value: &Value| -> Vec<Value> {
            match value {
                Value::Array(items) => items.clone(),
                other => vec![other.clone()],
            }
        };
        self.condition(name, seen, |t| {
            Ok(Some(match (op, value) {
                ("$eq", Value::Null) => Condition::IsNull,
                ("$ne", Value::Null) => Condition::NotNull,
                ("$eq", v) => Condition::Eq(t.operand(v)?),
                ("$ne", v) => Condition::Ne(t.operand(v)?),
                ("$gt", v) => Condition::Gt(t.bound(v, Round::Down)?),
                ("$gte", v) => Condition::Gte(t.bound(v, Round::Up)?),
                ("$lt", v) => Condition::Lt(t.bound(v, Round::Up)?),
                ("$lte", v) => Condition::Lte(t.bound(v, Round::Down)?),
                ("$in", v) => Condition::In(t.operands(&list(v))?),
                ("$nin" | "$notIn", v) => Condition::NotIn(t.operands(&list(v))?),
                ("$between" | "$notBetween", Value::Array(pair)) if pair.len() == 2 => {
                    let lo = t.bound(&pair[0], Round::Up)?;
                    let hi = t.bound(&pair[1], Round::Down)?;
                    if op == "$between" {
                        Condition::Between(lo, hi)
                    } else {
                        Condition::NotBetween(lo, hi)
                    }
                }
                ("$like", Value::Text(pattern)) => Condition::Like(pattern.clone()),
                ("$notLike", Value::Text(pattern)) => Condition::NotLike(pattern.clone()),
                (op, value) => {
                    warn!("ignoring operator {} with {} operand on {}", op, value.type_name(), name);
                    return Ok(None);
                }
            }))
        })
    }

    /// Resolve `name` and build a condition on its column.
    fn condition<F>(&self, name: &str, seen: &mut Seen, build: F) -> CoreResult<Predicate>
    where
        F: FnOnce(&OperandEncoder) -> CoreResult<Option<Condition>>,
    {
        let column = match self.resolve(name) {
            Target::Column(column) => column,
            Target::Ignored => return Ok(Predicate::All),
            Target::Unknown => {
                seen.unknown.insert(name.to_string());
                return Ok(match self.policy {
                    UnknownFieldPolicy::MatchNothing => Predicate::Nothing,
                    UnknownFieldPolicy::Ignore => Predicate::All,
                })
            }
        };
        if let Column::Slot(_) = column {
            seen.cols.insert(name.to_string());
        }
        let encoder = OperandEncoder {
            column,
            base_length: self.base_length,
        };
        Ok(match build(&encoder)? {
            Some(condition) => Predicate::cond(column, condition),
            None => Predicate::All,
        })
    }

    fn resolve(&self, name: &str) -> Target {
        match name {
            "id" => Target::Column(Column::Cid),
            "$$num" => Target::Column(Column::Num),
            "$$at" => Target::Column(Column::UpdatedAt),
            reserved if reserved.starts_with("$$") => {
                warn!("ignoring reserved name {}", reserved);
                Target::Ignored
            }
            name => match self.index.col_of(name) {
                Some(col) => Target::Column(Column::Slot(col)),
                None => {
                    debug!("unknown filter name {}", name);
                    Target::Unknown
                }
            },
        }
    }

    /// Translate sort specs such as `"-age,name"`.
    ///
    /// Unresolvable keys are dropped; the row id ascending is always the
    /// last key so pages are stable.
    pub fn parse_sort(&self, sort: &[String]) -> TranslatedSort {
        let mut keys = Vec::new();
        let mut order_cols = Vec::new();
        for spec in sort.iter().flat_map(|s| s.split(',')) {
            let spec = spec.trim();
            let (name, descending) = match spec.strip_prefix('-') {
                Some(name) => (name.trim(), true),
                None => (spec, false),
            };
            if name.is_empty() {
                continue;
            }
            let column = match self.resolve(name) {
                Target::Column(column) => column,
                Target::Ignored | Target::Unknown => {
                    debug!("dropping sort key {}", name);
                    continue;
                }
            };
            if let Column::Slot(_) = column {
                order_cols.push(name.to_string());
            }
            keys.push(SortKey { column, descending });
        }
        if !keys.iter().any(|key| key.column == Column::Num) {
            keys.push(SortKey::asc(Column::Num));
        }
        TranslatedSort { keys, order_cols }
    }
}

/// Direction a fractional bound moves to on an integer column.
#[derive(Debug, Clone, Copy)]
enum Round {
    Down,
    Up,
}

/// Serializes operands for one column.
struct OperandEncoder {
    column: Column,
    base_length: usize,
}

impl OperandEncoder {
    fn operand(&self, value: &Value) -> CoreResult<Operand> {
        match self.column {
            Column::Slot(_) => {
                let encoded = serialize(value)?;
                let text = encoded.text.unwrap_or_default();
                if text.len() > self.base_length {
                    warn!(
                        "filter operand of {} bytes truncated to {}; matches by prefix only",
                        text.len(),
                        self.base_length
                    );
                    return Ok(Operand::Text(truncate(&text, self.base_length).to_string()));
                }
                Ok(Operand::Text(text))
            }
            Column::Cid => Ok(Operand::Text(match value {
                Value::Text(s) | Value::Id(s) | Value::Ref(s) => s.clone(),
                Value::Integer(n) => n.to_string(),
                other => serialize(other)?.text.unwrap_or_default(),
            })),
            Column::Num | Column::UpdatedAt => Ok(match value {
                Value::Integer(n) | Value::Date(n) => Operand::Int(*n),
                Value::Float(f) if f.fract() == 0.0 => Operand::Int(*f as i64),
                Value::Float(f) => {
                    return Err(CoreError::invalid_argument(format!(
                        "fractional operand {f} on an integer column"
                    )))
                }
                Value::Text(s) => match s.parse() {
                    Ok(n) => Operand::Int(n),
                    Err(_) => Operand::Text(s.clone()),
                },
                other => Operand::Text(serialize(other)?.text.unwrap_or_default()),
            }),
        }
    }

    /// Operand of a range bound. Integer row columns round fractional
    /// bounds so the comparison keeps its meaning.
    fn bound(&self, value: &Value, round: Round) -> CoreResult<Operand> {
        match (self.column, value) {
            (Column::Num | Column::UpdatedAt, Value::Float(f)) if f.is_finite() => {
                let rounded = match round {
                    Round::Down => f.floor(),
                    Round::Up => f.ceil(),
                };
                Ok(Operand::Int(rounded as i64))
            }
            _ => self.operand(value),
        }
    }

    fn operands(&self, values: &[Value]) -> CoreResult<Vec<Operand>> {
        values.iter().map(|v| self.operand(v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotdb_storage::AttributeRecord;

    fn index() -> AttributeIndex {
        AttributeIndex::from_records(
            ["group", "age", "bar.n", "bar.s", "name"]
                .iter()
                .enumerate()
                .map(|(col, name)| AttributeRecord {
                    name: name.to_string(),
                    col: col as u32,
                }),
        )
    }

    fn json(s: &str) -> Value {
        Value::from_json(serde_json::from_str(s).unwrap())
    }

    fn text(s: &str) -> Operand {
        Operand::Text(s.to_string())
    }

    fn num(n: i64) -> Operand {
        Operand::Text(serialize(&Value::Integer(n)).unwrap().text.unwrap())
    }

    fn translate(filter: &str, policy: UnknownFieldPolicy) -> Translated {
        let index = index();
        Translator::new(&index, policy, 255)
            .parse_filter(&json(filter))
            .unwrap()
    }

    #[test]
    fn literal_equality_and_null() {
        let t = translate(r#"{"group": "g1", "name": null}"#, UnknownFieldPolicy::MatchNothing);
        assert_eq!(
            t.predicate,
            Predicate::and(vec![
                Predicate::cond(Column::Slot(0), Condition::Eq(text("g1"))),
                Predicate::cond(Column::Slot(4), Condition::IsNull),
            ])
        );
        assert_eq!(t.where_cols, vec!["group".to_string(), "name".to_string()]);
        assert_eq!(t.filter_names, vec!["group".to_string(), "name".to_string()]);
    }

    #[test]
    fn operators_serialize_operands() {
        let t = translate(
            r#"{"age": {"$gte": 2, "$lt": 10, "$nin": [5]}}"#,
            UnknownFieldPolicy::MatchNothing,
        );
        assert_eq!(
            t.predicate,
            Predicate::and(vec![
                Predicate::cond(Column::Slot(1), Condition::Gte(num(2))),
                Predicate::cond(Column::Slot(1), Condition::Lt(num(10))),
                Predicate::cond(Column::Slot(1), Condition::NotIn(vec![num(5)])),
            ])
        );
    }

    #[test]
    fn nested_fields_and_or() {
        let t = translate(
            r#"{"bar": {"n": 1}, "$or": [{"name": "a"}, {"name": {"$like": "b%"}}]}"#,
            UnknownFieldPolicy::MatchNothing,
        );
        assert_eq!(
            t.predicate,
            Predicate::and(vec![
                Predicate::or(vec![
                    Predicate::cond(Column::Slot(4), Condition::Eq(text("a"))),
                    Predicate::cond(Column::Slot(4), Condition::Like("b%".into())),
                ]),
                Predicate::cond(Column::Slot(2), Condition::Eq(num(1))),
            ])
        );
        assert_eq!(t.where_cols, vec!["bar.n".to_string(), "name".to_string()]);
    }

    #[test]
    fn top_level_array_is_or() {
        let t = translate(r#"[{"age": 1}, {"age": 2}]"#, UnknownFieldPolicy::MatchNothing);
        assert_eq!(
            t.predicate,
            Predicate::or(vec![
                Predicate::cond(Column::Slot(1), Condition::Eq(num(1))),
                Predicate::cond(Column::Slot(1), Condition::Eq(num(2))),
            ])
        );
    }

    #[test]
    fn array_literal_is_in() {
        let t = translate(r#"{"name": ["a", "b"]}"#, UnknownFieldPolicy::MatchNothing);
        assert_eq!(
            t.predicate,
            Predicate::cond(Column::Slot(4), Condition::In(vec![text("a"), text("b")]))
        );
    }

    #[test]
    fn reserved_names_map_to_row_columns() {
        let t = translate(
            r#"{"id": "e1", "$$num": {"$gt": 10}, "$$at": {"$lte": 99}, "$$secret": 1}"#,
            UnknownFieldPolicy::MatchNothing,
        );
        assert_eq!(
            t.predicate,
            Predicate::and(vec![
                Predicate::cond(Column::UpdatedAt, Condition::Lte(Operand::Int(99))),
                Predicate::cond(Column::Num, Condition::Gt(Operand::Int(10))),
                Predicate::cond(Column::Cid, Condition::Eq(text("e1"))),
            ])
        );
        assert!(t.where_cols.is_empty());
    }

    #[test]
    fn fractional_bounds_round_on_row_columns() {
        let t = translate(
            r#"{"$$at": {"$lt": 4.5, "$gte": 1.5}, "$$num": {"$gt": 2.5, "$lte": 8.5}}"#,
            UnknownFieldPolicy::MatchNothing,
        );
        assert_eq!(
            t.predicate,
            Predicate::and(vec![
                Predicate::and(vec![
                    Predicate::cond(Column::UpdatedAt, Condition::Gte(Operand::Int(2))),
                    Predicate::cond(Column::UpdatedAt, Condition::Lt(Operand::Int(5))),
                ]),
                Predicate::and(vec![
                    Predicate::cond(Column::Num, Condition::Gt(Operand::Int(2))),
                    Predicate::cond(Column::Num, Condition::Lte(Operand::Int(8))),
                ]),
            ])
        );

        let between = translate(
            r#"{"$$num": {"$between": [1.5, 4.5]}}"#,
            UnknownFieldPolicy::MatchNothing,
        );
        assert_eq!(
            between.predicate,
            Predicate::cond(
                Column::Num,
                Condition::Between(Operand::Int(2), Operand::Int(4))
            )
        );

        let index = index();
        let err = Translator::new(&index, UnknownFieldPolicy::MatchNothing, 255)
            .parse_filter(&json(r#"{"$$num": 4.5}"#))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument { .. }));
    }

    #[test]
    fn unknown_names_follow_policy() {
        let strict = translate(r#"{"age": 1, "ghost": 2}"#, UnknownFieldPolicy::MatchNothing);
        assert_eq!(strict.predicate, Predicate::Nothing);
        assert_eq!(strict.unknown_names, vec!["ghost".to_string()]);

        let lax = translate(r#"{"age": 1, "ghost": 2}"#, UnknownFieldPolicy::Ignore);
        assert_eq!(
            lax.predicate,
            Predicate::cond(Column::Slot(1), Condition::Eq(num(1)))
        );
    }

    #[test]
    fn unknown_operator_is_ignored() {
        let t = translate(r#"{"age": {"$near": 1}}"#, UnknownFieldPolicy::MatchNothing);
        assert_eq!(t.predicate, Predicate::All);
    }

    #[test]
    fn long_operand_is_truncated() {
        let index = index();
        let long = "x".repeat(40);
        let filter = Value::map([("name", Value::from(long.as_str()))]);
        let t = Translator::new(&index, UnknownFieldPolicy::MatchNothing, 16)
            .parse_filter(&filter)
            .unwrap();
        assert_eq!(
            t.predicate,
            Predicate::cond(Column::Slot(4), Condition::Eq(text(&long[..16])))
        );
    }

    #[test]
    fn sort_resolves_and_appends_tiebreaker() {
        let index = index();
        let translator = Translator::new(&index, UnknownFieldPolicy::MatchNothing, 255);
        let sort = translator.parse_sort(&["-age, ghost".to_string(), "name,$$at".to_string()]);
        assert_eq!(
            sort.keys,
            vec![
                SortKey::desc(Column::Slot(1)),
                SortKey::asc(Column::Slot(4)),
                SortKey::asc(Column::UpdatedAt),
                SortKey::asc(Column::Num),
            ]
        );
        assert_eq!(sort.order_cols, vec!["age".to_string(), "name".to_string()]);

        let by_num = translator.parse_sort(&["-$$num".to_string()]);
        assert_eq!(by_num.keys, vec![SortKey::desc(Column::Num)]);
    }
}
