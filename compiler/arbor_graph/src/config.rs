//! Builder configuration.

use arbor_diagnostic::DiagnosticConfig;

/// Knobs for one compilation pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuilderConfig {
    /// Probe stack depth past which the repeating-tail search runs.
    pub max_probe_depth: usize,
    /// How many back-to-back copies of a segment count as a cycle.
    pub cycle_min_repeats: usize,
    /// Attempt to repair self-referential variants by specialization.
    pub repair_cycles: bool,
    /// Specialize variant alternatives under their own guards.
    pub specialize_variants: bool,
    /// Check and report scheduling-order violations.
    pub check_scheduling: bool,
    pub diagnostics: DiagnosticConfig,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        BuilderConfig {
            max_probe_depth: 512,
            cycle_min_repeats: 2,
            repair_cycles: true,
            specialize_variants: true,
            check_scheduling: true,
            diagnostics: DiagnosticConfig::default(),
        }
    }
}

impl BuilderConfig {
    #[must_use]
    pub fn with_max_probe_depth(mut self, depth: usize) -> Self {
        self.max_probe_depth = depth;
        self
    }

    #[must_use]
    pub fn with_cycle_min_repeats(mut self, repeats: usize) -> Self {
        self.cycle_min_repeats = repeats.max(2);
        self
    }

    #[must_use]
    pub fn with_repair_cycles(mut self, enabled: bool) -> Self {
        self.repair_cycles = enabled;
        self
    }

    #[must_use]
    pub fn with_specialize_variants(mut self, enabled: bool) -> Self {
        self.specialize_variants = enabled;
        self
    }

    #[must_use]
    pub fn with_check_scheduling(mut self, enabled: bool) -> Self {
        self.check_scheduling = enabled;
        self
    }

    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: DiagnosticConfig) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}
