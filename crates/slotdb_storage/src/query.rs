//! Predicates and ordering over the wide row table.
//!
//! Comparisons follow SQL semantics: a condition other than `IsNull` never
//! matches a row whose column is null, so `Ne`, `NotIn`, `NotBetween` and
//! `NotLike` skip absent columns too.

/// A column of the wide row table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    /// Serialized value `v_i`.
    Slot(u32),
    /// External id.
    Cid,
    /// Internal numeric id.
    Num,
    /// Last update time.
    UpdatedAt,
}

impl Column {
    /// Whether the column holds integers rather than text.
    pub fn is_integer(self) -> bool {
        matches!(self, Column::Num | Column::UpdatedAt)
    }
}

/// A bound comparison value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// Text operand.
    Text(String),
    /// Integer operand.
    Int(i64),
}

/// A test applied to one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// `= x`
    Eq(Operand),
    /// `<> x`
    Ne(Operand),
    /// `> x`
    Gt(Operand),
    /// `>= x`
    Gte(Operand),
    /// `< x`
    Lt(Operand),
    /// `<= x`
    Lte(Operand),
    /// `IN (..)`; empty never matches.
    In(Vec<Operand>),
    /// `NOT IN (..)`; empty always matches.
    NotIn(Vec<Operand>),
    /// `BETWEEN a AND b`
    Between(Operand, Operand),
    /// `NOT BETWEEN a AND b`
    NotBetween(Operand, Operand),
    /// `LIKE p` (`%` and `_` wildcards, ASCII case-insensitive)
    Like(String),
    /// `NOT LIKE p`
    NotLike(String),
    /// `IS NULL`
    IsNull,
    /// `IS NOT NULL`
    NotNull,
}

/// A row filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Matches every row.
    All,
    /// Matches no row.
    Nothing,
    /// Single column test.
    Cond {
        /// Tested column.
        column: Column,
        /// Test applied.
        condition: Condition,
    },
    /// All sub-predicates match; empty matches every row.
    And(Vec<Predicate>),
    /// Any sub-predicate matches; empty matches no row.
    Or(Vec<Predicate>),
}

impl Predicate {
    /// Single column test.
    pub fn cond(column: Column, condition: Condition) -> Self {
        Predicate::Cond { column, condition }
    }

    /// Conjunction, collapsing trivial cases.
    pub fn and(mut parts: Vec<Predicate>) -> Self {
        parts.retain(|p| *p != Predicate::All);
        if parts.contains(&Predicate::Nothing) {
            return Predicate::Nothing;
        }
        match parts.len() {
            0 => Predicate::All,
            1 => parts.remove(0),
            _ => Predicate::And(parts),
        }
    }

    /// Disjunction, collapsing trivial cases.
    pub fn or(mut parts: Vec<Predicate>) -> Self {
        parts.retain(|p| *p != Predicate::Nothing);
        if parts.contains(&Predicate::All) {
            return Predicate::All;
        }
        match parts.len() {
            0 => Predicate::Nothing,
            1 => parts.remove(0),
            _ => Predicate::Or(parts),
        }
    }

    /// Visit every tested column.
    pub fn columns(&self, out: &mut Vec<Column>) {
        match self {
            Predicate::All | Predicate::Nothing => {}
            Predicate::Cond { column, .. } => out.push(*column),
            Predicate::And(parts) | Predicate::Or(parts) => {
                for part in parts {
                    part.columns(out);
                }
            }
        }
    }
}

/// One ordering term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    /// Sorted column.
    pub column: Column,
    /// Descending when set.
    pub descending: bool,
}

impl SortKey {
    /// Ascending order on `column`.
    pub fn asc(column: Column) -> Self {
        Self {
            column,
            descending: false,
        }
    }

    /// Descending order on `column`.
    pub fn desc(column: Column) -> Self {
        Self {
            column,
            descending: true,
        }
    }
}

/// A page request against the wide row table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Row filter.
    pub predicate: Predicate,
    /// Ordering, first key most significant.
    pub sort: Vec<SortKey>,
    /// Maximum rows returned.
    pub limit: Option<u64>,
    /// Rows skipped.
    pub offset: u64,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            predicate: Predicate::All,
            sort: Vec::new(),
            limit: None,
            offset: 0,
        }
    }
}

/// SQL `LIKE` matching: `%` any run, `_` one character, ASCII
/// case-insensitive.
pub fn like_matches(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    // dp over text positions reachable after consuming a pattern prefix
    let mut reachable = vec![false; text.len() + 1];
    reachable[0] = true;
    for p in &pattern {
        let mut next = vec![false; text.len() + 1];
        match p {
            '%' => {
                let mut seen = false;
                for i in 0..=text.len() {
                    seen |= reachable[i];
                    next[i] = seen;
                }
            }
            '_' => {
                for i in 0..text.len() {
                    next[i + 1] = reachable[i];
                }
            }
            c => {
                for i in 0..text.len() {
                    next[i + 1] = reachable[i] && text[i].eq_ignore_ascii_case(c);
                }
            }
        }
        reachable = next;
    }
    reachable[text.len()]
}
