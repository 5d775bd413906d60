use std::fmt;

/// Error codes for all graph builder diagnostics.
///
/// Format: E#### / W#### where the first digit indicates the phase:
/// - E1xxx: Graph construction errors (caching, scopes, cycles)
/// - E2xxx: Lowering errors (pre-IR tree to builder calls)
/// - W3xxx: Analysis warnings
/// - E9xxx: Internal compiler errors
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorCode {
    // Construction Errors (E1xxx)
    /// Inputs live in scopes that do not nest
    E1001,
    /// Unrepairable structural cycle
    E1002,
    /// Forward reference never resolved
    E1003,
    /// Structurally equal nodes disagree on value type
    E1004,
    /// Closure body requested while it is being built
    E1005,
    /// Context attribute defined twice
    E1006,

    // Lowering Errors (E2xxx)
    /// Unknown builtin function
    E2001,
    /// Argument count mismatch
    E2002,
    /// Unknown area template
    E2003,
    /// Applied value is not a function
    E2004,
    /// Unknown closure parameter
    E2005,

    // Analysis Warnings (W3xxx)
    /// Input scheduled at or after its consumer
    W3001,
    /// Write target does not reach any storage
    W3002,

    // Internal Errors (E9xxx)
    /// Internal compiler error
    E9001,
    /// Too many errors
    E9002,
}

impl ErrorCode {
    /// Get the code as a string (e.g., "E1001").
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::E1001 => "E1001",
            ErrorCode::E1002 => "E1002",
            ErrorCode::E1003 => "E1003",
            ErrorCode::E1004 => "E1004",
            ErrorCode::E1005 => "E1005",
            ErrorCode::E1006 => "E1006",
            ErrorCode::E2001 => "E2001",
            ErrorCode::E2002 => "E2002",
            ErrorCode::E2003 => "E2003",
            ErrorCode::E2004 => "E2004",
            ErrorCode::E2005 => "E2005",
            ErrorCode::W3001 => "W3001",
            ErrorCode::W3002 => "W3002",
            ErrorCode::E9001 => "E9001",
            ErrorCode::E9002 => "E9002",
        }
    }

    /// Check if this is a warning code (Wxxxx range).
    pub fn is_warning(&self) -> bool {
        self.as_str().starts_with('W')
    }

    /// Check if this is a graph construction error (E1xxx range).
    pub fn is_construction_error(&self) -> bool {
        self.as_str().starts_with("E1")
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
