//! The Kernel: one rill session.
//!
//! A kernel owns a top-level frame and the builtin namespace. Chunks
//! evaluated through the same kernel share that frame, so declarations made
//! by one chunk are visible to the next.
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> Result<(), rill_kernel::KernelError> {
//! use rill_kernel::Kernel;
//!
//! let kernel = Kernel::default();
//! kernel.eval("var $x = hello").await?;
//! let values = kernel.eval("put $x").await?;
//! assert_eq!(values[0].to_string(), "hello");
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::ast::Chunk;
use crate::interpreter::{EvalError, EvalResult, Globals, Scope, eval_chunk};
use crate::parser::{ParseError, parse};
use crate::scheduler::{ByteIn, ByteOut, PIPE_BUFFER_SIZE, PipeConfig, Ports, VALUE_CHAN_SIZE, ValueIn, ValueOut};
use crate::tools::{ToolRegistry, register_builtins};
use crate::value::{Status, Value};

/// Configuration for kernel initialization.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Name of this kernel (for identification).
    pub name: String,

    /// Capacity of each value conduit between pipeline stages.
    pub value_chan_size: usize,

    /// Capacity in bytes of each byte conduit between pipeline stages.
    pub pipe_buffer_size: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            value_chan_size: VALUE_CHAN_SIZE,
            pipe_buffer_size: PIPE_BUFFER_SIZE,
        }
    }
}

impl KernelConfig {
    /// Set the kernel name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the value conduit capacity.
    pub fn with_value_chan_size(mut self, size: usize) -> Self {
        self.value_chan_size = size;
        self
    }
}

/// Failure of a whole chunk.
#[derive(Debug, Clone, Error)]
pub enum KernelError {
    #[error("{}", join_parse_errors(.0))]
    Parse(Vec<ParseError>),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

fn join_parse_errors(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(ParseError::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<Vec<ParseError>> for KernelError {
    fn from(errors: Vec<ParseError>) -> Self {
        KernelError::Parse(errors)
    }
}

/// Everything a chunk produced, including what it wrote before failing.
#[derive(Debug, Clone, Default)]
pub struct Captured {
    pub values: Vec<Value>,
    /// Byte output, decoded lossily as UTF-8.
    pub output: String,
    pub error: Option<KernelError>,
}

/// A rill session.
pub struct Kernel {
    name: String,
    scope: Scope,
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new(KernelConfig::default())
    }
}

impl Kernel {
    /// Create a kernel with a fresh top-level frame.
    pub fn new(config: KernelConfig) -> Self {
        let mut tools = ToolRegistry::new();
        register_builtins(&mut tools);
        let pipes = PipeConfig {
            value_chan_size: config.value_chan_size,
            pipe_buffer_size: config.pipe_buffer_size,
        };
        let globals = Globals::new(Arc::new(tools), pipes);
        tracing::debug!(name = %config.name, "kernel created");
        Self {
            name: config.name,
            scope: Scope::new(Arc::new(globals)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The session scope.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Evaluate `text`, returning the values it put. Bytes go to stdout.
    pub async fn eval(&self, text: &str) -> Result<Vec<Value>, KernelError> {
        let chunk = parse(text)?;
        let (values, result) = self.collect_values(&chunk, ByteOut::stdout()).await;
        result?;
        Ok(values)
    }

    /// Evaluate `text`, collecting values and bytes.
    ///
    /// Output produced before an error is kept.
    pub async fn capture(&self, text: &str) -> Captured {
        let chunk = match parse(text) {
            Ok(chunk) => chunk,
            Err(errors) => {
                return Captured {
                    error: Some(KernelError::Parse(errors)),
                    ..Captured::default()
                };
            }
        };

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let (values, result) = self.collect_values(&chunk, ByteOut::to_buffer(buffer.clone())).await;
        let output = String::from_utf8_lossy(&buffer.lock().unwrap_or_else(|e| e.into_inner())).into_owned();
        Captured {
            values,
            output,
            error: result.err().map(KernelError::Eval),
        }
    }

    /// Evaluate `text` against caller-supplied ports.
    ///
    /// Returns the per-stage statuses of the last pipeline.
    pub async fn eval_with(&self, text: &str, ports: &Ports) -> Result<Vec<Status>, KernelError> {
        let chunk = parse(text)?;
        Ok(eval_chunk(&chunk, &self.scope, ports).await?)
    }

    async fn collect_values(&self, chunk: &Chunk, byte_out: ByteOut) -> (Vec<Value>, EvalResult<Vec<Status>>) {
        let (tx, mut rx) = mpsc::channel(self.scope.pipes().value_chan_size.max(1));
        let drainer = tokio::spawn(async move {
            let mut values = Vec::new();
            while let Some(value) = rx.recv().await {
                values.push(value);
            }
            values
        });

        let ports = Ports {
            byte_in: ByteIn::empty(),
            value_in: ValueIn::empty(),
            value_out: ValueOut::from_channel(tx),
            byte_out,
        };
        let result = eval_chunk(chunk, &self.scope, &ports).await;
        drop(ports);

        match drainer.await {
            Ok(values) => (values, result),
            Err(e) => (Vec::new(), result.and(Err(e.into()))),
        }
    }
}
