//! Qualifier algebra.
//!
//! A [`Qualifier`] is the predicate "the context attribute `node` has a
//! value satisfying `value`". A [`Conjunction`] requires all of its
//! qualifiers; a [`Guard`] is a disjunction of conjunctions and guards one
//! variant alternative.
//!
//! Reasoning is three-valued: under a [`Knowledge`] set (qualifiers known
//! true, qualifiers known false) and whatever context attributes are
//! compile-time constants, a guard evaluates to [`Truth::True`],
//! [`Truth::False`] or [`Truth::Unknown`].
//!
//! The algebra assumes a context attribute holds a single value. Qualifiers
//! on different nodes never imply or contradict each other.

use std::fmt;
use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;
use smallvec::SmallVec;

use arbor_ir::{ConstValue, Name, StringInterner};

use crate::NodeId;

/// Three-valued truth.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Truth {
    True,
    False,
    Unknown,
}

impl Truth {
    pub fn from_bool(b: bool) -> Self {
        if b {
            Truth::True
        } else {
            Truth::False
        }
    }
}

/// Source of compile-time constant values for qualifier nodes.
pub trait ConstLookup {
    fn constant(&self, node: NodeId) -> Option<&ConstValue>;
}

/// No node is known to be constant.
pub struct NoConstants;

impl ConstLookup for NoConstants {
    fn constant(&self, _node: NodeId) -> Option<&ConstValue> {
        None
    }
}

/// The test a qualifier applies to its attribute's value.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QualifierValue {
    /// `Bool(true)` holds for any truthy value, `Bool(false)` for falsy ones.
    Bool(bool),
    Equals(ConstValue),
    /// Holds when the value equals one of these (sorted, at least two).
    OneOf(Vec<ConstValue>),
    /// Holds when the value lies in this constant range.
    Range(ConstValue),
}

impl QualifierValue {
    /// Normalize a source-level qualifier value.
    pub fn from_const(value: ConstValue) -> Self {
        match value {
            ConstValue::Bool(b) => QualifierValue::Bool(b),
            ConstValue::Empty => QualifierValue::Bool(false),
            ConstValue::Set(mut items) => {
                items.sort();
                items.dedup();
                if items.len() == 1 {
                    items
                        .pop()
                        .map_or(QualifierValue::Bool(false), QualifierValue::from_const)
                } else {
                    QualifierValue::OneOf(items)
                }
            }
            range @ ConstValue::Range { .. } => QualifierValue::Range(range),
            other => QualifierValue::Equals(other),
        }
    }

    /// Whether a concrete attribute value satisfies this test.
    pub fn test(&self, value: &ConstValue) -> bool {
        match self {
            QualifierValue::Bool(b) => value.is_truthy() == *b,
            QualifierValue::Equals(v) => value == v,
            QualifierValue::OneOf(vs) => vs.contains(value),
            QualifierValue::Range(r) => value.matches(r),
        }
    }

    /// Every value satisfying `self` also satisfies `other`.
    pub fn implies(&self, other: &QualifierValue) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (QualifierValue::Equals(v), _) => other.test(v),
            (QualifierValue::OneOf(vs), _) => vs.iter().all(|v| other.test(v)),
            // Ranges hold numbers, which are truthy.
            (QualifierValue::Range(_), QualifierValue::Bool(true)) => true,
            _ => false,
        }
    }

    /// No value satisfies both.
    pub fn contradicts(&self, other: &QualifierValue) -> bool {
        match (self, other) {
            (QualifierValue::Bool(a), QualifierValue::Bool(b)) => a != b,
            (QualifierValue::Equals(v), _) => !other.test(v),
            (_, QualifierValue::Equals(w)) => !self.test(w),
            (QualifierValue::OneOf(vs), _) => vs.iter().all(|v| !other.test(v)),
            (_, QualifierValue::OneOf(ws)) => ws.iter().all(|w| !self.test(w)),
            (QualifierValue::Range(_), QualifierValue::Bool(false))
            | (QualifierValue::Bool(false), QualifierValue::Range(_)) => true,
            _ => false,
        }
    }
}

/// "Context attribute `node` satisfies `value`".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Qualifier {
    pub node: NodeId,
    /// Attribute name, kept for rendering.
    pub attribute: Name,
    pub value: QualifierValue,
}

impl Qualifier {
    pub fn new(node: NodeId, attribute: Name, value: QualifierValue) -> Self {
        Qualifier {
            node,
            attribute,
            value,
        }
    }

    pub fn implies(&self, other: &Qualifier) -> bool {
        self.node == other.node && self.value.implies(&other.value)
    }

    pub fn contradicts(&self, other: &Qualifier) -> bool {
        self.node == other.node && self.value.contradicts(&other.value)
    }

    /// Truth under `know`, falling back to constant attribute values.
    pub fn evaluate(&self, know: &Knowledge, consts: &impl ConstLookup) -> Truth {
        for k in &know.known_true {
            if k.implies(self) {
                return Truth::True;
            }
            if k.contradicts(self) {
                return Truth::False;
            }
        }
        if know.known_false.iter().any(|k| self.implies(k)) {
            return Truth::False;
        }
        match consts.constant(self.node) {
            Some(value) => Truth::from_bool(self.value.test(value)),
            None => Truth::Unknown,
        }
    }
}

/// All qualifiers must hold. Empty means true.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Conjunction(SmallVec<[Qualifier; 2]>);

impl Conjunction {
    pub fn always() -> Self {
        Conjunction(SmallVec::new())
    }

    pub fn new(qualifiers: impl IntoIterator<Item = Qualifier>) -> Self {
        let mut qs: SmallVec<[Qualifier; 2]> = qualifiers.into_iter().collect();
        qs.sort();
        qs.dedup();
        Conjunction(qs)
    }

    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.0
    }

    pub fn is_true(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_contradictory(&self) -> bool {
        self.0
            .iter()
            .enumerate()
            .any(|(i, a)| self.0[i + 1..].iter().any(|b| a.contradicts(b)))
    }

    /// Conjoin two conjunctions.
    ///
    /// `None` when they contradict. A qualifier implied by a more specific
    /// one on the same attribute is dropped, so a generic `{a: true}` is
    /// absorbed by `{a: "x"}`.
    pub fn and(&self, other: &Conjunction) -> Option<Conjunction> {
        let mut union: Vec<Qualifier> = self.0.iter().chain(other.0.iter()).cloned().collect();
        union.sort();
        union.dedup();
        for (i, a) in union.iter().enumerate() {
            if union[i + 1..].iter().any(|b| a.contradicts(b)) {
                return None;
            }
        }
        let keep: Vec<bool> = union
            .iter()
            .enumerate()
            .map(|(i, q)| {
                !union.iter().enumerate().any(|(j, p)| {
                    j != i && p.implies(q) && (!q.implies(p) || j < i)
                })
            })
            .collect();
        Some(Conjunction::new(
            union
                .into_iter()
                .zip(keep)
                .filter_map(|(q, k)| k.then_some(q)),
        ))
    }

    /// Whenever `self` holds, `other` holds.
    pub fn implies(&self, other: &Conjunction) -> bool {
        self.is_contradictory()
            || other
                .0
                .iter()
                .all(|q| self.0.iter().any(|p| p.implies(q)))
    }

    pub fn semantically_eq(&self, other: &Conjunction) -> bool {
        self.implies(other) && other.implies(self)
    }

    pub fn evaluate(&self, know: &Knowledge, consts: &impl ConstLookup) -> Truth {
        let mut result = Truth::True;
        for q in &self.0 {
            match q.evaluate(know, consts) {
                Truth::False => return Truth::False,
                Truth::Unknown => result = Truth::Unknown,
                Truth::True => {}
            }
        }
        result
    }

    /// Drop qualifiers that `know` already establishes.
    pub fn strip_known(&self, know: &Knowledge) -> Conjunction {
        Conjunction::new(
            self.0
                .iter()
                .filter(|q| !know.known_true.iter().any(|k| k.implies(q)))
                .cloned(),
        )
    }

    /// If `self` and `other` differ in exactly one qualifier, and that
    /// qualifier is a boolean test on the same attribute with opposite
    /// polarity, return the shared remainder.
    fn merge_opposite(&self, other: &Conjunction) -> Option<Conjunction> {
        if self.0.len() != other.0.len() {
            return None;
        }
        let only_self: Vec<&Qualifier> = self.0.iter().filter(|q| !other.0.contains(q)).collect();
        let only_other: Vec<&Qualifier> =
            other.0.iter().filter(|q| !self.0.contains(q)).collect();
        match (only_self.as_slice(), only_other.as_slice()) {
            ([a], [b]) if a.node == b.node => match (&a.value, &b.value) {
                (QualifierValue::Bool(x), QualifierValue::Bool(y)) if x != y => Some(
                    Conjunction::new(self.0.iter().filter(|q| *q != *a).cloned()),
                ),
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut NodeId> {
        self.0.iter_mut().map(|q| &mut q.node)
    }

    fn normalize(&mut self) {
        self.0.sort();
        self.0.dedup();
    }
}

/// Disjunction of conjunctions. Empty means false.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Guard(Vec<Conjunction>);

impl Guard {
    /// The guard that always holds.
    pub fn always() -> Self {
        Guard(vec![Conjunction::always()])
    }

    /// The guard that never holds.
    pub fn never() -> Self {
        Guard(Vec::new())
    }

    pub fn from_conjunction(conjunction: Conjunction) -> Self {
        let mut guard = Guard::never();
        guard.or(conjunction);
        guard
    }

    pub fn from_qualifiers(qualifiers: impl IntoIterator<Item = Qualifier>) -> Self {
        Self::from_conjunction(Conjunction::new(qualifiers))
    }

    pub fn conjunctions(&self) -> &[Conjunction] {
        &self.0
    }

    pub fn is_always_true(&self) -> bool {
        self.0.iter().any(Conjunction::is_true)
    }

    pub fn is_never(&self) -> bool {
        self.0.is_empty()
    }

    /// The guard's only conjunction, if it has exactly one.
    pub fn single_conjunction(&self) -> Option<&Conjunction> {
        match self.0.as_slice() {
            [c] => Some(c),
            _ => None,
        }
    }

    /// Add a conjunction unless a semantically equal one is present.
    /// Contradictory conjunctions never hold and are skipped.
    pub fn or(&mut self, conjunction: Conjunction) {
        if conjunction.is_contradictory() || self.0.iter().any(|c| c.semantically_eq(&conjunction)) {
            return;
        }
        let pos = self.0.binary_search(&conjunction).unwrap_or_else(|p| p);
        self.0.insert(pos, conjunction);
    }

    #[must_use]
    pub fn or_guard(&self, other: &Guard) -> Guard {
        let mut out = self.clone();
        for c in &other.0 {
            out.or(c.clone());
        }
        out
    }

    /// Conjoin every pair of conjunctions.
    #[must_use]
    pub fn and_conjunction(&self, conjunction: &Conjunction) -> Guard {
        let mut out = Guard::never();
        for c in &self.0 {
            if let Some(both) = c.and(conjunction) {
                out.or(both);
            }
        }
        out
    }

    /// Absorb subsumed conjunctions and merge pairs that differ only in one
    /// opposite boolean qualifier, repeating until nothing changes.
    #[must_use]
    pub fn simplify(&self) -> Guard {
        let mut conjs: Vec<Conjunction> = self
            .0
            .iter()
            .filter(|c| !c.is_contradictory())
            .cloned()
            .collect();
        'restart: loop {
            if conjs.iter().any(Conjunction::is_true) {
                return Guard::always();
            }
            for j in 0..conjs.len() {
                for i in 0..conjs.len() {
                    if i == j {
                        continue;
                    }
                    // conjs[j] is at least as strong as conjs[i]: i absorbs j.
                    if conjs[j].implies(&conjs[i]) && (!conjs[i].implies(&conjs[j]) || i < j) {
                        conjs.remove(j);
                        continue 'restart;
                    }
                }
            }
            for i in 0..conjs.len() {
                for j in i + 1..conjs.len() {
                    if let Some(merged) = conjs[i].merge_opposite(&conjs[j]) {
                        conjs.remove(j);
                        conjs[i] = merged;
                        continue 'restart;
                    }
                }
            }
            break;
        }
        conjs.sort();
        Guard(conjs)
    }

    /// Whenever `self` holds, `other` holds.
    pub fn implies(&self, other: &Guard) -> bool {
        self.0
            .iter()
            .all(|c| c.is_contradictory() || other.0.iter().any(|d| c.implies(d)))
    }

    pub fn evaluate(&self, know: &Knowledge, consts: &impl ConstLookup) -> Truth {
        let mut result = Truth::False;
        for c in &self.0 {
            match c.evaluate(know, consts) {
                Truth::True => return Truth::True,
                Truth::Unknown => result = Truth::Unknown,
                Truth::False => {}
            }
        }
        result
    }

    /// Drop qualifiers that `know` establishes from every conjunction.
    #[must_use]
    pub fn strip_known(&self, know: &Knowledge) -> Guard {
        let mut out = Guard::never();
        for c in &self.0 {
            out.or(c.strip_known(know));
        }
        out.simplify()
    }

    /// Every qualifier node, in conjunction order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.0
            .iter()
            .flat_map(|c| c.qualifiers().iter().map(|q| q.node))
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut NodeId> {
        self.0.iter_mut().flat_map(Conjunction::nodes_mut)
    }

    /// Restore sorted order after qualifier nodes were remapped.
    pub(crate) fn normalize(&mut self) {
        for c in &mut self.0 {
            c.normalize();
        }
        self.0.sort();
        self.0.dedup();
    }

    /// Render with qualifier nodes as `#index` into `refs`.
    pub fn display<'a>(
        &'a self,
        interner: &'a StringInterner,
        refs: &'a [NodeId],
    ) -> impl fmt::Display + 'a {
        DisplayGuard {
            guard: self,
            interner,
            refs,
        }
    }
}

struct DisplayGuard<'a> {
    guard: &'a Guard,
    interner: &'a StringInterner,
    refs: &'a [NodeId],
}

impl fmt::Display for DisplayGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, c) in self.guard.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str("{")?;
            for (j, q) in c.qualifiers().iter().enumerate() {
                if j > 0 {
                    f.write_str(", ")?;
                }
                let slot = self.refs.iter().position(|r| *r == q.node);
                match slot {
                    Some(slot) => write!(f, "#{slot}.")?,
                    None => write!(f, "{}.", q.node)?,
                }
                f.write_str(self.interner.lookup(q.attribute))?;
                match &q.value {
                    QualifierValue::Bool(b) => write!(f, ": {b}")?,
                    QualifierValue::Equals(v) | QualifierValue::Range(v) => {
                        write!(f, ": {}", v.display(self.interner))?;
                    }
                    QualifierValue::OneOf(vs) => {
                        let set = ConstValue::Set(vs.clone());
                        write!(f, ": {}", set.display(self.interner))?;
                    }
                }
            }
            f.write_str("}")?;
        }
        f.write_str("]")
    }
}

/// Qualifiers known to hold and known not to hold at some point of the
/// graph.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Knowledge {
    known_true: Vec<Qualifier>,
    known_false: Vec<Qualifier>,
}

impl Knowledge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.known_true.is_empty() && self.known_false.is_empty()
    }

    pub fn known_true(&self) -> &[Qualifier] {
        &self.known_true
    }

    pub fn known_false(&self) -> &[Qualifier] {
        &self.known_false
    }

    /// Add every qualifier of `conjunction` as known true.
    #[must_use]
    pub fn with_true(&self, conjunction: &Conjunction) -> Knowledge {
        let mut out = self.clone();
        for q in conjunction.qualifiers() {
            if let Err(pos) = out.known_true.binary_search(q) {
                out.known_true.insert(pos, q.clone());
            }
        }
        out
    }

    #[must_use]
    pub fn with_false(&self, qualifier: &Qualifier) -> Knowledge {
        let mut out = self.clone();
        if let Err(pos) = out.known_false.binary_search(qualifier) {
            out.known_false.insert(pos, qualifier.clone());
        }
        out
    }

    /// Stable key for memoization.
    pub fn key(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}
