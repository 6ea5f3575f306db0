//! rill CLI entry point.
//!
//! Usage:
//!   rill                  # Interactive REPL
//!   rill -c <code>        # Evaluate code and exit
//!   rill script.rill      # Run a script

use std::env;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use rill_repl::Repl;

fn main() -> ExitCode {
    // Respects RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        None => {
            rill_repl::run()?;
            Ok(ExitCode::SUCCESS)
        }

        Some("--help" | "-h") => {
            print_help();
            Ok(ExitCode::SUCCESS)
        }

        Some("--version" | "-V") => {
            println!("rill {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }

        Some("-c") => {
            let code = args.get(2).context("-c requires a code argument")?;
            run_source(code)
        }

        Some(path) if !path.starts_with('-') => run_script(path),

        Some(unknown) => {
            eprintln!("Unknown option: {unknown}");
            eprintln!("Run 'rill --help' for usage.");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_help() {
    println!(
        r#"rill v{}

Usage:
  rill                  Interactive REPL
  rill -c <code>        Evaluate code and exit
  rill <script>         Run a script file

Options:
  -c <code>             Evaluate code, printing each value on its own line
  -h, --help            Show this help
  -V, --version         Show version

Set RUST_LOG=debug for evaluation traces."#,
        env!("CARGO_PKG_VERSION")
    );
}

fn run_script(path: &str) -> Result<ExitCode> {
    let source = std::fs::read_to_string(path).with_context(|| format!("Failed to read script: {path}"))?;

    // Skip shebang if present
    let source = match source.strip_prefix("#!") {
        Some(rest) => rest.split_once('\n').map(|(_, body)| body).unwrap_or("").to_string(),
        None => source,
    };

    run_source(&source)
}

fn run_source(source: &str) -> Result<ExitCode> {
    let repl = Repl::new()?;
    match repl.eval(source) {
        Ok(values) => {
            for value in values {
                println!("{value}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("rill: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}
