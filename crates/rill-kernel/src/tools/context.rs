//! Execution context for tools.

use crate::interpreter::{EvalResult, Scope};
use crate::scheduler::Ports;
use crate::value::Value;

/// Execution context passed to tools: the calling scope and the ports of
/// the stage the tool runs in.
pub struct ExecContext {
    pub scope: Scope,
    pub ports: Ports,
}

impl ExecContext {
    pub fn new(scope: Scope, ports: Ports) -> Self {
        Self { scope, ports }
    }

    /// Emit a value downstream.
    pub async fn put(&self, value: Value) -> EvalResult<()> {
        self.ports.value_out.send(value).await
    }

    /// Write text to the byte output.
    pub async fn write_str(&self, s: &str) -> EvalResult<()> {
        self.ports.byte_out.write_str(s).await
    }

    /// Next line of byte input, or `None` at end of stream.
    pub async fn read_line(&self) -> EvalResult<Option<String>> {
        Ok(self.ports.byte_in.read_line().await?)
    }

    /// Next input value, or `None` once upstream is done.
    pub async fn recv(&self) -> Option<Value> {
        self.ports.value_in.recv().await
    }
}
