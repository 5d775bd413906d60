//! Arbor IR - shared vocabulary of the Arbor compiler.
//!
//! This crate holds the types every later phase agrees on:
//! - Names for interned identifiers
//! - Constant values (literals, attribute-values, ordered sets, ranges)
//! - Scope identifiers and the scope registry (area templates and closures)
//! - The value-type lattice used for static reasoning about node results
//! - The pre-IR source tree the parser hands over
//!
//! # Design Philosophy
//!
//! - **Intern Everything**: attribute and function names are `Name(u32)`.
//! - **Handles, not pointers**: templates, closures and exports are small
//!   integer ids into registries owned by one compilation pass.
//!
//! Types that contain floats store them as u64 bits for Hash compatibility.

mod interner;
mod name;
mod origin;
pub mod scope;
pub mod source;
mod value;
pub mod value_type;

pub use interner::StringInterner;
pub use name::Name;
pub use origin::Origin;
pub use scope::{ClosureId, ExportId, Scope, ScopeError, ScopeTree, TemplateId};
pub use value::{CompareOp, ConstValue, StorageKind};
pub use value_type::{Cardinality, ValueKinds, ValueType};
