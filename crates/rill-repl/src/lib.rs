//! rill REPL: line-oriented front-end for the rill kernel.
//!
//! Input comes from stdin through an [`AsyncReader`]. The reader is stopped
//! while a line evaluates, so external commands run by that line can read
//! the terminal themselves.

use std::io::{self, Write};

use anyhow::{Context, Result};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::Receiver;

use rill_edit::AsyncReader;
use rill_kernel::{Kernel, KernelConfig, Value};

/// REPL state: one kernel session and the runtime that drives it.
pub struct Repl {
    kernel: Kernel,
    runtime: Runtime,
}

impl Repl {
    pub fn new() -> Result<Self> {
        Self::with_config(KernelConfig::default().with_name("repl"))
    }

    pub fn with_config(config: KernelConfig) -> Result<Self> {
        let runtime = Runtime::new().context("Failed to create tokio runtime")?;
        Ok(Self {
            kernel: Kernel::new(config),
            runtime,
        })
    }

    /// Evaluate `source`, returning the values it put.
    ///
    /// Byte output goes straight to stdout.
    pub fn eval(&self, source: &str) -> Result<Vec<Value>> {
        Ok(self.runtime.block_on(self.kernel.eval(source))?)
    }

    /// Evaluate one interactive line, returning the formatted values.
    pub fn process_line(&mut self, line: &str) -> Result<Option<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let values = self.eval(trimmed)?;
        if values.is_empty() {
            return Ok(None);
        }
        Ok(Some(format_values(&values)))
    }
}

/// One `▶ repr` line per value.
pub fn format_values(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| format!("▶ {}", v.repr()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The working directory, or `?` when it cannot be determined.
pub fn getwd() -> String {
    std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "?".to_string())
}

pub fn prompt() -> String {
    format!("{}> ", getwd())
}

/// Read one line, `None` once input has ended.
fn read_line(chars: &mut Receiver<char>) -> Option<String> {
    let mut line = String::new();
    loop {
        match chars.blocking_recv() {
            Some('\n') => return Some(line),
            Some(c) => line.push(c),
            None if line.is_empty() => return None,
            None => return Some(line),
        }
    }
}

/// Run the interactive loop until stdin ends.
pub fn run() -> Result<()> {
    let mut repl = Repl::new()?;
    let (reader, mut chars) = AsyncReader::spawn(io::stdin()).context("Failed to start input reader")?;
    tracing::debug!("interactive session started");

    loop {
        print!("{}", prompt());
        io::stdout().flush().ok();

        let Some(line) = read_line(&mut chars) else {
            println!();
            break;
        };

        reader.stop().context("Failed to pause input reader")?;
        match repl.process_line(&line) {
            Ok(Some(output)) => println!("{output}"),
            Ok(None) => {}
            Err(e) => eprintln!("Error: {e}"),
        }
        reader.cont().context("Failed to resume input reader")?;
    }

    reader.quit().context("Failed to stop input reader")?;
    Ok(())
}
