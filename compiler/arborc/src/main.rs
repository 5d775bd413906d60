//! Arbor compiler CLI.

use std::io::Write as _;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "-h" || a == "--help") {
        print_usage();
        return;
    }

    let options = match arborc::parse_options(&args) {
        Ok(options) => options,
        Err(error) => {
            eprintln!("error: {error}");
            eprintln!();
            print_usage();
            std::process::exit(2);
        }
    };

    arborc::init_tracing();

    let input = match std::fs::read(&options.input) {
        Ok(bytes) => bytes,
        Err(error) => {
            let path = options.input.display();
            let msg = match error.kind() {
                std::io::ErrorKind::NotFound => format!("cannot find file '{path}'"),
                std::io::ErrorKind::PermissionDenied => format!("permission denied reading '{path}'"),
                _ => format!("error reading '{path}': {error}"),
            };
            eprintln!("{msg}");
            std::process::exit(1);
        }
    };

    let mut output: Vec<u8> = Vec::new();
    let report = match arborc::run(&options, &input, &mut output) {
        Ok(report) => report,
        Err(error) => {
            eprintln!("error: {error}");
            std::process::exit(1);
        }
    };

    for diagnostic in &report.diagnostics {
        eprintln!("{diagnostic}");
    }
    if report.failed {
        eprintln!("compilation failed: {} error(s)", report.error_count());
        std::process::exit(1);
    }

    let written = match &options.output {
        Some(path) => std::fs::write(path, &output)
            .map_err(|error| format!("cannot write '{}': {error}", path.display())),
        None => std::io::stdout()
            .write_all(&output)
            .map_err(|error| format!("cannot write output: {error}")),
    };
    if let Err(msg) = written {
        eprintln!("{msg}");
        std::process::exit(1);
    }
}

fn print_usage() {
    eprintln!("Usage: arborc <program.bin> [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --emit=<form>            Export form: text (default), bin");
    eprintln!("  -o <path>                Output file (default: stdout)");
    eprintln!("  --no-repair              Report self-referential variants instead of repairing them");
    eprintln!("  --no-specialize          Keep variant alternatives as written");
    eprintln!("  --no-schedule-check      Skip the scheduling check");
    eprintln!("  --max-probe-depth=<n>    Probe depth between repeating-tail checks (default: 512)");
    eprintln!();
    eprintln!("Logging:");
    eprintln!("  RUST_LOG=arbor_graph=debug    Enable tracing output");
    eprintln!("  ARBOR_LOG_TREE=1              Hierarchical (indented) tracing output");
}
