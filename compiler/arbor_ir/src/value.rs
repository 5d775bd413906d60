//! Compile-time constant values.
//!
//! A [`ConstValue`] is the payload of a constant node and of qualifier
//! values. Ordered sets are kept flat: `o(1, o(2, 3))` and `o(1, 2, 3)` are
//! the same value, a one-element set is its element, and an empty set is
//! [`ConstValue::Empty`].

use std::fmt::{self, Write as _};

use crate::{Name, StringInterner, ValueKinds, ValueType};

/// A constant value.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum ConstValue {
    /// The empty ordered set `o()`; also the result of a failed selection.
    Empty,
    Bool(bool),
    /// A number stored as `f64` bits (see [`ConstValue::number`]).
    Number(u64),
    String(Name),
    /// Attribute-value map, sorted by attribute name, no duplicate keys.
    AttributeValue(Vec<(Name, ConstValue)>),
    /// Flat ordered set with at least two elements.
    Set(Vec<ConstValue>),
    Range {
        low: Box<ConstValue>,
        high: Box<ConstValue>,
        closed_low: bool,
        closed_high: bool,
    },
    /// Negated set `n(...)`: matches anything not matched by its elements.
    Negation(Vec<ConstValue>),
}

impl ConstValue {
    /// Build a number, normalizing `-0.0` and NaN payloads so equal numbers
    /// hash equally.
    pub fn number(value: f64) -> Self {
        let normalized = if value == 0.0 {
            0.0
        } else if value.is_nan() {
            f64::NAN
        } else {
            value
        };
        ConstValue::Number(normalized.to_bits())
    }

    /// Numeric payload, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ConstValue::Number(bits) => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }

    /// Build an attribute-value from unsorted pairs. Later duplicates win.
    pub fn attribute_value(pairs: impl IntoIterator<Item = (Name, ConstValue)>) -> Self {
        let mut sorted: Vec<(Name, ConstValue)> = Vec::new();
        for (name, value) in pairs {
            match sorted.binary_search_by(|(n, _)| n.cmp(&name)) {
                Ok(pos) => sorted[pos].1 = value,
                Err(pos) => sorted.insert(pos, (name, value)),
            }
        }
        ConstValue::AttributeValue(sorted)
    }

    /// Build an ordered set, flattening nested sets and dropping empties.
    pub fn set(items: impl IntoIterator<Item = ConstValue>) -> Self {
        let mut flat = Vec::new();
        for item in items {
            match item {
                ConstValue::Empty => {}
                ConstValue::Set(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => ConstValue::Empty,
            1 => flat.pop().unwrap_or(ConstValue::Empty),
            _ => ConstValue::Set(flat),
        }
    }

    /// Elements of this value viewed as an ordered set.
    pub fn elements(&self) -> &[ConstValue] {
        match self {
            ConstValue::Empty => &[],
            ConstValue::Set(items) => items,
            other => std::slice::from_ref(other),
        }
    }

    pub fn is_empty_value(&self) -> bool {
        matches!(self, ConstValue::Empty)
    }

    /// Truthiness: `false` and `o()` are false, everything else is true.
    /// A set is true when any of its elements is.
    pub fn is_truthy(&self) -> bool {
        match self {
            ConstValue::Empty | ConstValue::Bool(false) => false,
            ConstValue::Set(items) => items.iter().any(ConstValue::is_truthy),
            _ => true,
        }
    }

    /// Look up an attribute of an attribute-value.
    pub fn attribute(&self, name: Name) -> Option<&ConstValue> {
        match self {
            ConstValue::AttributeValue(pairs) => pairs
                .binary_search_by(|(n, _)| n.cmp(&name))
                .ok()
                .map(|pos| &pairs[pos].1),
            _ => None,
        }
    }

    /// Whether this value matches `pattern`.
    ///
    /// - `true` matches any truthy value, `false` any falsy value.
    /// - A set pattern matches when any element matches.
    /// - A range matches numbers inside it.
    /// - A negation matches when none of its elements match.
    /// - A set value matches when any of its elements matches.
    pub fn matches(&self, pattern: &ConstValue) -> bool {
        match pattern {
            ConstValue::Bool(true) => self.is_truthy(),
            ConstValue::Bool(false) => !self.is_truthy(),
            ConstValue::Set(options) => options.iter().any(|p| self.matches(p)),
            ConstValue::Negation(excluded) => !excluded.iter().any(|p| self.matches(p)),
            ConstValue::Empty => self.is_empty_value(),
            _ => match self {
                ConstValue::Set(items) => items.iter().any(|item| item.matches(pattern)),
                value => value.matches_single(pattern),
            },
        }
    }

    fn matches_single(&self, pattern: &ConstValue) -> bool {
        match pattern {
            ConstValue::Range {
                low,
                high,
                closed_low,
                closed_high,
            } => {
                let (Some(v), Some(lo), Some(hi)) =
                    (self.as_number(), low.as_number(), high.as_number())
                else {
                    return false;
                };
                let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
                let above = if *closed_low { v >= lo } else { v > lo };
                let below = if *closed_high { v <= hi } else { v < hi };
                above && below
            }
            other => self == other,
        }
    }

    /// Static type of this constant.
    pub fn value_type(&self) -> ValueType {
        let kind = match self {
            ConstValue::Empty => return ValueType::empty(),
            ConstValue::Bool(_) => ValueKinds::BOOLEAN,
            ConstValue::Number(_) => ValueKinds::NUMBER,
            ConstValue::String(_) => ValueKinds::STRING,
            ConstValue::AttributeValue(_) => ValueKinds::ATTRIBUTE_VALUE,
            ConstValue::Range { .. } => ValueKinds::RANGE,
            ConstValue::Negation(_) => ValueKinds::NEGATION,
            ConstValue::Set(items) => {
                let mut ty = ValueType::unknown();
                for item in items {
                    ty = ty.merge(&item.value_type());
                }
                #[expect(
                    clippy::cast_possible_truncation,
                    reason = "constant sets are far below u32::MAX elements"
                )]
                let len = items.len() as u32;
                return ty.with_cardinality(crate::Cardinality::exactly(len));
            }
        };
        ValueType::single(kind)
    }

    /// Render with resolved names.
    pub fn display<'a>(&'a self, interner: &'a StringInterner) -> impl fmt::Display + 'a {
        DisplayValue {
            value: self,
            interner,
        }
    }
}

struct DisplayValue<'a> {
    value: &'a ConstValue,
    interner: &'a StringInterner,
}

impl<'a> fmt::Display for DisplayValue<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nested = move |value: &'a ConstValue| DisplayValue {
            value,
            interner: self.interner,
        };
        match self.value {
            ConstValue::Empty => f.write_str("o()"),
            ConstValue::Bool(b) => write!(f, "{b}"),
            ConstValue::Number(_) => {
                let n = self.value.as_number().unwrap_or(f64::NAN);
                write!(f, "{n}")
            }
            ConstValue::String(name) => write!(f, "{:?}", self.interner.lookup(*name)),
            ConstValue::AttributeValue(pairs) => {
                f.write_char('{')?;
                for (i, (name, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", self.interner.lookup(*name), nested(value))?;
                }
                f.write_char('}')
            }
            ConstValue::Set(items) => write_list(f, "o", items.iter().map(nested)),
            ConstValue::Negation(items) => write_list(f, "n", items.iter().map(nested)),
            ConstValue::Range {
                low,
                high,
                closed_low,
                closed_high,
            } => {
                let open = if *closed_low { '[' } else { '(' };
                let close = if *closed_high { ']' } else { ')' };
                write!(f, "r{open}{}, {}{close}", nested(low), nested(high))
            }
        }
    }
}

fn write_list<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    head: &str,
    items: impl Iterator<Item = T>,
) -> fmt::Result {
    f.write_str(head)?;
    f.write_char('(')?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_char(')')
}

/// Comparison operator of a comparison node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum CompareOp {
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Equal,
    NotEqual,
}

impl CompareOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Less => "<",
            CompareOp::LessEq => "<=",
            CompareOp::Greater => ">",
            CompareOp::GreaterEq => ">=",
            CompareOp::Equal => "==",
            CompareOp::NotEqual => "!=",
        }
    }

    /// Evaluate on two constants. `None` when the operands are not comparable.
    pub fn evaluate(self, lhs: &ConstValue, rhs: &ConstValue) -> Option<bool> {
        match self {
            CompareOp::Equal => return Some(lhs == rhs),
            CompareOp::NotEqual => return Some(lhs != rhs),
            _ => {}
        }
        let (a, b) = (lhs.as_number()?, rhs.as_number()?);
        Some(match self {
            CompareOp::Less => a < b,
            CompareOp::LessEq => a <= b,
            CompareOp::Greater => a > b,
            CompareOp::GreaterEq => a >= b,
            CompareOp::Equal | CompareOp::NotEqual => return None,
        })
    }
}

/// Kind of a mutable storage cell.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum StorageKind {
    /// Local cell holding the last written value.
    Plain,
    /// Cell mirrored with a remote server.
    Remote,
    /// Append-only message queue.
    Queue,
    /// Closure parameter cell, bound on application.
    Parameter,
    /// Indirection to another cell chosen at runtime.
    Pointer,
}

impl StorageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKind::Plain => "plain",
            StorageKind::Remote => "remote",
            StorageKind::Queue => "queue",
            StorageKind::Parameter => "parameter",
            StorageKind::Pointer => "pointer",
        }
    }
}
