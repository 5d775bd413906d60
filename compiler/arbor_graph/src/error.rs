//! Builder errors and the cycle-repair signal.
//!
//! Fatal problems are [`BuildError`]s. The repairable-cycle signal is not an
//! error: internal internalization returns `Result<_, Interrupt>`, and only
//! the frame of the variant named in the [`CycleSignal`] reacts to it.

use std::fmt;

use arbor_diagnostic::{Diagnostic, ErrorCode};
use arbor_ir::{ClosureId, Name, Origin, ScopeError, TemplateId, ValueType};

use crate::NodeId;

/// One entry of a cycle trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceEntry {
    pub node: NodeId,
    pub kind: &'static str,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.node, self.kind)
    }
}

/// Render a trace as `n3 variant -> n5 quals -> n3 variant`.
pub fn render_trace(trace: &[TraceEntry]) -> String {
    let mut out = String::new();
    for (i, entry) in trace.iter().enumerate() {
        if i > 0 {
            out.push_str(" -> ");
        }
        out.push_str(&entry.to_string());
    }
    out
}

/// Fatal graph construction errors.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("incompatible scopes: {error}")]
    ScopeIncompatible {
        error: ScopeError,
        origin: Option<Origin>,
    },
    #[error("structural cycle through {}", render_trace(trace))]
    StructuralCycle {
        trace: Vec<TraceEntry>,
        origin: Option<Origin>,
    },
    #[error("unresolved reference to context attribute {name:?} of {template}")]
    UnresolvedReference {
        name: Name,
        template: TemplateId,
        origin: Option<Origin>,
    },
    #[error("cached node {node} has type {existing}, an equal node derived {derived}")]
    ValueTypeMismatch {
        node: NodeId,
        existing: ValueType,
        derived: ValueType,
        origin: Option<Origin>,
    },
    #[error("body of closure {closure} requested while it is being built")]
    ReentrantClosureBody {
        closure: ClosureId,
        origin: Option<Origin>,
    },
    #[error("context attribute {name:?} of {template} is defined twice")]
    DuplicateDefinition {
        name: Name,
        template: TemplateId,
        origin: Option<Origin>,
    },
    #[error("unknown function `{name}`")]
    UnknownFunction { name: String, origin: Option<Origin> },
    #[error("`{function}` does not accept {found} argument(s)")]
    Arity {
        function: &'static str,
        found: usize,
        origin: Option<Origin>,
    },
    #[error("{error}")]
    Scope {
        error: ScopeError,
        origin: Option<Origin>,
    },
    #[error("applied value is not a function")]
    NotAClosure { origin: Option<Origin> },
    #[error("unknown parameter `{name}`")]
    UnknownParameter { name: String, origin: Option<Origin> },
}

impl BuildError {
    pub fn code(&self) -> ErrorCode {
        match self {
            BuildError::ScopeIncompatible { .. } => ErrorCode::E1001,
            BuildError::StructuralCycle { .. } => ErrorCode::E1002,
            BuildError::UnresolvedReference { .. } => ErrorCode::E1003,
            BuildError::ValueTypeMismatch { .. } => ErrorCode::E1004,
            BuildError::ReentrantClosureBody { .. } => ErrorCode::E1005,
            BuildError::DuplicateDefinition { .. } => ErrorCode::E1006,
            BuildError::UnknownFunction { .. } => ErrorCode::E2001,
            BuildError::Arity { .. } => ErrorCode::E2002,
            BuildError::Scope { .. } => ErrorCode::E2003,
            BuildError::NotAClosure { .. } => ErrorCode::E2004,
            BuildError::UnknownParameter { .. } => ErrorCode::E2005,
        }
    }

    pub fn origin(&self) -> Option<Origin> {
        match self {
            BuildError::ScopeIncompatible { origin, .. }
            | BuildError::StructuralCycle { origin, .. }
            | BuildError::UnresolvedReference { origin, .. }
            | BuildError::ValueTypeMismatch { origin, .. }
            | BuildError::ReentrantClosureBody { origin, .. }
            | BuildError::DuplicateDefinition { origin, .. }
            | BuildError::UnknownFunction { origin, .. }
            | BuildError::Arity { origin, .. }
            | BuildError::Scope { origin, .. }
            | BuildError::NotAClosure { origin }
            | BuildError::UnknownParameter { origin, .. } => *origin,
        }
    }

    /// Fill in the origin if the error does not carry one yet.
    #[must_use]
    pub fn or_origin(mut self, fallback: Option<Origin>) -> Self {
        match &mut self {
            BuildError::ScopeIncompatible { origin, .. }
            | BuildError::StructuralCycle { origin, .. }
            | BuildError::UnresolvedReference { origin, .. }
            | BuildError::ValueTypeMismatch { origin, .. }
            | BuildError::ReentrantClosureBody { origin, .. }
            | BuildError::DuplicateDefinition { origin, .. }
            | BuildError::UnknownFunction { origin, .. }
            | BuildError::Arity { origin, .. }
            | BuildError::Scope { origin, .. }
            | BuildError::NotAClosure { origin }
            | BuildError::UnknownParameter { origin, .. } => {
                if origin.is_none() {
                    *origin = fallback;
                }
            }
        }
        self
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(self.code())
            .with_message(self.to_string())
            .with_origin(self.origin());
        match self {
            BuildError::StructuralCycle { trace, .. } => {
                diag.with_note(format!("probe trace: {}", render_trace(trace)))
            }
            BuildError::ValueTypeMismatch { .. } => {
                diag.with_note("this is an internal consistency error in the graph builder")
            }
            _ => diag,
        }
    }
}

/// Raised when internalization re-enters a variant whose cycle may be
/// repaired by specialization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleSignal {
    /// The variant to repair.
    pub variant: NodeId,
    pub trace: Vec<TraceEntry>,
}

/// Why internalization stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Interrupt {
    Cycle(CycleSignal),
    Fatal(BuildError),
}

impl From<BuildError> for Interrupt {
    fn from(error: BuildError) -> Self {
        Interrupt::Fatal(error)
    }
}

impl Interrupt {
    /// A signal that escaped every variant frame is an unrepairable cycle.
    pub fn into_fatal(self, origin: Option<Origin>) -> BuildError {
        match self {
            Interrupt::Fatal(error) => error,
            Interrupt::Cycle(signal) => BuildError::StructuralCycle {
                trace: signal.trace,
                origin,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_diagnostic_carries_trace() {
        let error = BuildError::StructuralCycle {
            trace: vec![
                TraceEntry {
                    node: NodeId::new(3),
                    kind: "variant",
                },
                TraceEntry {
                    node: NodeId::new(5),
                    kind: "quals",
                },
            ],
            origin: Some(Origin::new(2)),
        };
        let diag = error.to_diagnostic();
        assert_eq!(diag.code, ErrorCode::E1002);
        assert_eq!(diag.origin, Some(Origin::new(2)));
        assert_eq!(diag.notes, vec!["probe trace: n3 variant -> n5 quals"]);
    }

    #[test]
    fn escaped_signal_becomes_fatal() {
        let signal = CycleSignal {
            variant: NodeId::new(1),
            trace: Vec::new(),
        };
        let error = Interrupt::Cycle(signal).into_fatal(Some(Origin::new(9)));
        assert_eq!(error.code(), ErrorCode::E1002);
        assert_eq!(error.origin(), Some(Origin::new(9)));
    }

    #[test]
    fn or_origin_keeps_existing() {
        let error = BuildError::NotAClosure {
            origin: Some(Origin::new(1)),
        };
        assert_eq!(error.or_origin(Some(Origin::new(2))).origin(), Some(Origin::new(1)));
    }
}
