//! Pre-IR source tree.
//!
//! This is the shape the parser hands over: one entry per area template with
//! its context attribute definitions and writes, expressions as a plain
//! owned tree. Names are indices into [`SourceProgram::strings`], which the
//! consumer loads into a [`StringInterner`](crate::StringInterner).

use crate::{CompareOp, ConstValue, Name, Origin, StorageKind};

/// A whole program.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceProgram {
    /// String table; `Name::from_raw(i)` refers to `strings[i]`.
    pub strings: Vec<String>,
    /// Templates, parents before children. `parent` indexes this list.
    pub templates: Vec<SourceTemplate>,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceTemplate {
    pub name: Name,
    pub parent: Option<u32>,
    pub classes: Vec<Name>,
    /// Attributes this template exports to area projections.
    pub exports: Vec<Name>,
    pub context: Vec<SourceAttribute>,
    pub writes: Vec<SourceWrite>,
}

/// A context attribute definition.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceAttribute {
    pub origin: Origin,
    pub name: Name,
    pub definition: SourceDefinition,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum SourceDefinition {
    Expr(SourceExpr),
    /// A mutable cell with an initial value.
    Storage {
        kind: StorageKind,
        initial: Option<ConstValue>,
    },
}

/// An assignment `target <- value`, triggered by the runtime.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceWrite {
    pub origin: Origin,
    pub target: SourceExpr,
    pub value: SourceExpr,
}

/// One alternative of a variant definition.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceVariant {
    /// Context attribute name and the value it must match. Empty means
    /// unconditional.
    pub qualifier: Vec<(Name, ConstValue)>,
    pub value: SourceExpr,
}

/// Source expressions.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum SourceExpr {
    Literal(ConstValue),
    AttributeMap(Vec<(Name, SourceExpr)>),
    OrderedSet(Vec<SourceExpr>),
    Range {
        low: Box<SourceExpr>,
        high: Box<SourceExpr>,
        closed_low: bool,
        closed_high: bool,
    },
    Negation(Vec<SourceExpr>),
    Substring(Vec<SourceExpr>),
    /// Builtin call by name.
    Call {
        function: Name,
        args: Vec<SourceExpr>,
    },
    Compare {
        op: CompareOp,
        lhs: Box<SourceExpr>,
        rhs: Box<SourceExpr>,
    },
    Variant(Vec<SourceVariant>),
    /// `[cond, selector, o({on: .., use: ..}, ...)]`
    Cond {
        selector: Box<SourceExpr>,
        alternatives: Vec<(SourceExpr, SourceExpr)>,
    },
    /// Context attribute of the enclosing template.
    Context(Name),
    /// The current area.
    Me,
    /// The embedding area.
    Embedding,
    /// Child areas named `name` of the given areas.
    Children {
        of: Box<SourceExpr>,
        name: Name,
    },
    /// Exported attribute of the given areas.
    AreaProject {
        areas: Box<SourceExpr>,
        attribute: Name,
    },
    /// Areas among the given ones that belong to `class`.
    Class {
        areas: Box<SourceExpr>,
        class: Name,
    },
    /// Attribute path selection on data.
    Project {
        path: Vec<Name>,
        data: Box<SourceExpr>,
    },
    Query {
        query: Box<SourceExpr>,
        data: Box<SourceExpr>,
    },
    Sort {
        data: Box<SourceExpr>,
        keys: Vec<SourceExpr>,
        ascending: bool,
    },
    Geometry {
        label: Name,
        area: Box<SourceExpr>,
    },
    Defun {
        params: Vec<Name>,
        body: Box<SourceExpr>,
    },
    /// Parameter of an enclosing closure.
    Param(Name),
    /// Application of a function value.
    Apply {
        function: Box<SourceExpr>,
        args: Vec<SourceExpr>,
    },
}

impl SourceExpr {
    pub fn literal(value: ConstValue) -> Self {
        SourceExpr::Literal(value)
    }

    pub fn call(function: Name, args: impl IntoIterator<Item = SourceExpr>) -> Self {
        SourceExpr::Call {
            function,
            args: args.into_iter().collect(),
        }
    }

    pub fn project(path: impl IntoIterator<Item = Name>, data: SourceExpr) -> Self {
        SourceExpr::Project {
            path: path.into_iter().collect(),
            data: Box::new(data),
        }
    }
}
