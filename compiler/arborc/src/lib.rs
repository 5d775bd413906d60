//! Driver for the Arbor graph builder.
//!
//! Reads a bincode-encoded [`SourceProgram`] (the parser's hand-over form),
//! runs one compilation pass and writes the graph export, as text or as
//! bincode. Diagnostics are handed back to the caller to print.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Once;

use arbor_diagnostic::Diagnostic;
use arbor_graph::{BuilderConfig, CompileFailure};
use arbor_ir::source::SourceProgram;
use arbor_ir::StringInterner;

/// Export form written by the driver.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Emit {
    #[default]
    Text,
    Bin,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub emit: Emit,
    pub config: BuilderConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("{0}")]
    Usage(String),
    #[error("malformed program: {0}")]
    Decode(#[source] bincode::Error),
    #[error("cannot encode the export: {0}")]
    Encode(#[source] bincode::Error),
    #[error("cannot write the export: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a pass that got as far as the builder.
#[derive(Debug)]
pub struct Report {
    /// Every diagnostic of the pass, warnings included.
    pub diagnostics: Vec<Diagnostic>,
    /// Errors were reported and nothing was written.
    pub failed: bool,
}

impl Report {
    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }
}

/// Parse the command line (without the program name).
pub fn parse_options(args: &[String]) -> Result<Options, DriverError> {
    let mut input = None;
    let mut output = None;
    let mut emit = Emit::default();
    let mut config = BuilderConfig::default();

    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        if arg == "-o" {
            let Some(path) = args.get(i + 1) else {
                return Err(DriverError::Usage("`-o` needs a path".to_owned()));
            };
            output = Some(PathBuf::from(path));
            i += 2;
            continue;
        }
        if let Some(form) = arg.strip_prefix("--emit=") {
            emit = match form {
                "text" => Emit::Text,
                "bin" => Emit::Bin,
                _ => return Err(DriverError::Usage(format!("unknown export form `{form}`"))),
            };
        } else if let Some(depth) = arg.strip_prefix("--max-probe-depth=") {
            let depth = depth
                .parse()
                .map_err(|_| DriverError::Usage(format!("invalid probe depth `{depth}`")))?;
            config = config.with_max_probe_depth(depth);
        } else if arg == "--no-repair" {
            config = config.with_repair_cycles(false);
        } else if arg == "--no-specialize" {
            config = config.with_specialize_variants(false);
        } else if arg == "--no-schedule-check" {
            config = config.with_check_scheduling(false);
        } else if arg.starts_with('-') {
            return Err(DriverError::Usage(format!("unknown option `{arg}`")));
        } else if input.is_none() {
            input = Some(PathBuf::from(arg));
        } else {
            return Err(DriverError::Usage(format!("unexpected argument `{arg}`")));
        }
        i += 1;
    }

    let input = input.ok_or_else(|| DriverError::Usage("missing input file".to_owned()))?;
    Ok(Options {
        input,
        output,
        emit,
        config,
    })
}

/// Compile the encoded program in `input` and write the export to `out`.
///
/// A program with errors is not an `Err`: the report carries its
/// diagnostics and `out` is left untouched.
pub fn run(options: &Options, input: &[u8], out: &mut impl Write) -> Result<Report, DriverError> {
    let program: SourceProgram = bincode::deserialize(input).map_err(DriverError::Decode)?;
    let interner = StringInterner::from_table(&program.strings);
    tracing::debug!(
        input = %options.input.display(),
        templates = program.templates.len(),
        "compiling"
    );

    match arbor_graph::lower_program(&program, &interner, options.config.clone()) {
        Ok(compiled) => {
            let exported = compiled.export(&interner);
            tracing::debug!(
                nodes = exported.node_count(),
                writes = exported.writes.len(),
                "exporting"
            );
            match options.emit {
                Emit::Text => write!(out, "{exported}")?,
                Emit::Bin => out.write_all(&exported.to_bytes().map_err(DriverError::Encode)?)?,
            }
            Ok(Report {
                diagnostics: compiled.diagnostics,
                failed: false,
            })
        }
        Err(CompileFailure { diagnostics }) => Ok(Report {
            diagnostics,
            failed: true,
        }),
    }
}

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Only installs a subscriber when `RUST_LOG` is set, e.g.
/// `RUST_LOG=arbor_graph=debug`. `ARBOR_LOG_TREE=1` switches to indented
/// hierarchical output. Safe to call more than once.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_err() {
            return;
        }
        let filter = EnvFilter::from_default_env();
        let registry = tracing_subscriber::registry().with(filter);
        if std::env::var("ARBOR_LOG_TREE").is_ok_and(|v| v == "1") {
            registry
                .with(
                    tracing_tree::HierarchicalLayer::new(2)
                        .with_targets(true)
                        .with_bracketed_fields(true),
                )
                .init();
        } else {
            registry
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_level(true)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    });
}
