//! Static value-type lattice.
//!
//! A [`ValueType`] over-approximates what a node can produce at runtime: the
//! set of value kinds that may appear and how many elements the ordered set
//! may hold. It forms a join-semilattice under [`ValueType::merge`] with
//! [`ValueType::unknown`] as bottom ("nothing known yet").

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Kinds of values a node may produce.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct ValueKinds: u16 {
        /// The empty ordered set.
        const UNDEFINED = 1 << 0;
        const BOOLEAN = 1 << 1;
        const NUMBER = 1 << 2;
        const STRING = 1 << 3;
        const ATTRIBUTE_VALUE = 1 << 4;
        /// Area references produced by area navigation.
        const AREA = 1 << 5;
        /// Function values (closures and builtin references).
        const DEFUN = 1 << 6;
        const RANGE = 1 << 7;
        const NEGATION = 1 << 8;
    }
}

/// Bounds on the number of elements of a value.
///
/// `max == None` means unbounded.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Cardinality {
    pub min: u32,
    pub max: Option<u32>,
}

impl Cardinality {
    pub const ZERO: Cardinality = Cardinality::exactly(0);
    pub const ONE: Cardinality = Cardinality::exactly(1);
    pub const ANY: Cardinality = Cardinality { min: 0, max: None };

    pub const fn exactly(n: u32) -> Self {
        Cardinality {
            min: n,
            max: Some(n),
        }
    }

    /// Smallest interval containing both.
    pub fn merge(self, other: Cardinality) -> Cardinality {
        Cardinality {
            min: self.min.min(other.min),
            max: match (self.max, other.max) {
                (Some(a), Some(b)) => Some(a.max(b)),
                _ => None,
            },
        }
    }

    /// Cardinality of the concatenation of two sets.
    pub fn concat(self, other: Cardinality) -> Cardinality {
        Cardinality {
            min: self.min.saturating_add(other.min),
            max: match (self.max, other.max) {
                (Some(a), Some(b)) => Some(a.saturating_add(b)),
                _ => None,
            },
        }
    }

    pub fn contains(self, other: Cardinality) -> bool {
        let upper = match (self.max, other.max) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) => b <= a,
        };
        self.min <= other.min && upper
    }
}

/// Static type and cardinality of a node's value.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ValueType {
    kinds: ValueKinds,
    cardinality: Cardinality,
    known: bool,
}

impl ValueType {
    /// Bottom of the lattice: nothing derived yet.
    pub const fn unknown() -> Self {
        ValueType {
            kinds: ValueKinds::empty(),
            cardinality: Cardinality::ZERO,
            known: false,
        }
    }

    /// The type of `o()`.
    pub const fn empty() -> Self {
        ValueType {
            kinds: ValueKinds::UNDEFINED,
            cardinality: Cardinality::ZERO,
            known: true,
        }
    }

    /// A single value of the given kinds.
    pub const fn single(kinds: ValueKinds) -> Self {
        ValueType {
            kinds,
            cardinality: Cardinality::ONE,
            known: true,
        }
    }

    /// Top of the lattice: any kind, any number of elements.
    pub const fn any() -> Self {
        ValueType {
            kinds: ValueKinds::all(),
            cardinality: Cardinality::ANY,
            known: true,
        }
    }

    pub const fn of(kinds: ValueKinds, cardinality: Cardinality) -> Self {
        ValueType {
            kinds,
            cardinality,
            known: true,
        }
    }

    pub fn kinds(&self) -> ValueKinds {
        self.kinds
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn is_unknown(&self) -> bool {
        !self.known
    }

    #[must_use]
    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        if self.known {
            self.cardinality = cardinality;
        }
        self
    }

    /// Least upper bound.
    #[must_use]
    pub fn merge(&self, other: &ValueType) -> ValueType {
        match (self.known, other.known) {
            (false, _) => *other,
            (_, false) => *self,
            (true, true) => ValueType {
                kinds: self.kinds | other.kinds,
                cardinality: self.cardinality.merge(other.cardinality),
                known: true,
            },
        }
    }

    /// Whether every value of `other` is also a value of `self`.
    pub fn subsumes(&self, other: &ValueType) -> bool {
        if !other.known {
            return true;
        }
        if !self.known {
            return false;
        }
        self.kinds.contains(other.kinds) && self.cardinality.contains(other.cardinality)
    }

    /// Equal, or at least one side has not been derived yet.
    pub fn is_equal_or_unknown(&self, other: &ValueType) -> bool {
        !self.known || !other.known || self == other
    }

    /// Whether the value can only ever be an attribute-value (or empty).
    pub fn is_attribute_value_only(&self) -> bool {
        self.known
            && !self.kinds.is_empty()
            && (ValueKinds::ATTRIBUTE_VALUE | ValueKinds::UNDEFINED).contains(self.kinds)
    }
}

impl Default for ValueType {
    fn default() -> Self {
        Self::unknown()
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.known {
            return f.write_str("?");
        }
        let mut first = true;
        for (name, _) in self.kinds.iter_names() {
            if !first {
                f.write_str("|")?;
            }
            first = false;
            f.write_str(&name.to_ascii_lowercase())?;
        }
        if first {
            f.write_str("never")?;
        }
        match self.cardinality.max {
            Some(max) => write!(f, "[{}..{max}]", self.cardinality.min),
            None => write!(f, "[{}..]", self.cardinality.min),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_is_bottom() {
        let number = ValueType::single(ValueKinds::NUMBER);
        assert_eq!(ValueType::unknown().merge(&number), number);
        assert_eq!(number.merge(&ValueType::unknown()), number);
        assert!(number.subsumes(&ValueType::unknown()));
        assert!(number.is_equal_or_unknown(&ValueType::unknown()));
    }

    #[test]
    fn merge_widens_kinds_and_cardinality() {
        let number = ValueType::single(ValueKinds::NUMBER);
        let merged = number.merge(&ValueType::empty());
        assert!(merged.subsumes(&number));
        assert!(merged.subsumes(&ValueType::empty()));
        assert_eq!(merged.cardinality(), Cardinality { min: 0, max: Some(1) });
        assert!(!number.subsumes(&merged));
    }

    #[test]
    fn display() {
        let ty = ValueType::of(ValueKinds::NUMBER | ValueKinds::STRING, Cardinality::ANY);
        assert_eq!(ty.to_string(), "number|string[0..]");
        assert_eq!(ValueType::unknown().to_string(), "?");
    }

    #[test]
    fn attribute_value_only() {
        let av = ValueType::single(ValueKinds::ATTRIBUTE_VALUE);
        assert!(av.is_attribute_value_only());
        assert!(av.merge(&ValueType::empty()).is_attribute_value_only());
        assert!(!av.merge(&ValueType::single(ValueKinds::NUMBER)).is_attribute_value_only());
    }
}
