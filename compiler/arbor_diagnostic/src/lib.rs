//! Diagnostic system for the Arbor graph builder.
//!
//! Every diagnostic carries:
//! - An error code for searchability
//! - A message (what went wrong)
//! - The origin of the source construct it was raised for
//! - Notes (context, such as a cycle trace)
//!
//! Diagnostics are collected in a [`DiagnosticQueue`], which deduplicates
//! repeated reports for the same construct and enforces an error limit.
//!
//! # Error Guarantees
//!
//! [`ErrorGuaranteed`] is type-level proof that at least one error was
//! emitted. The queue is the only place that hands one out.

mod diagnostic;
mod error_code;
mod guarantee;
pub mod queue;

pub use diagnostic::{Diagnostic, Severity};
pub use error_code::ErrorCode;
pub use guarantee::ErrorGuaranteed;
pub use queue::{DiagnosticConfig, DiagnosticQueue};
