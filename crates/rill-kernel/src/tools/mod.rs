//! Tool system for rill.
//!
//! Every builtin command implements the same `Tool` trait and is looked up
//! by name in a `ToolRegistry`. A tool sees its stage's ports through the
//! `ExecContext` and decides for itself which conduits it reads and writes.
//!
//! # Architecture
//!
//! ```text
//! ToolRegistry
//! ├── value producers   (put, typeof, + - * /)
//! ├── byte producers    (print, println, echo)
//! ├── byte filters      (sed, grep)
//! └── bridges           (feedchan: bytes → values, each: values → calls)
//! ```

mod builtin;
mod context;
mod registry;
mod traits;

pub use builtin::register_builtins;
pub use context::ExecContext;
pub use registry::ToolRegistry;
pub use traits::{Tool, ToolArgs};

#[cfg(test)]
pub(crate) mod testing {
    //! Run a single tool against canned input.

    use std::sync::{Arc, Mutex};

    use tokio::sync::mpsc;

    use crate::interpreter::{EvalResult, Globals, Scope};
    use crate::scheduler::{ByteIn, ByteOut, PIPE_BUFFER_SIZE, PipeConfig, Ports, ValueIn, ValueOut, pipe_stream};
    use crate::value::{Status, Value};

    use super::{ExecContext, Tool, ToolArgs, ToolRegistry, register_builtins};

    pub struct ToolRun {
        pub status: EvalResult<Status>,
        pub values: Vec<Value>,
        pub output: String,
    }

    pub fn session() -> Scope {
        let mut tools = ToolRegistry::new();
        register_builtins(&mut tools);
        Scope::new(Arc::new(Globals::new(Arc::new(tools), PipeConfig::default())))
    }

    pub fn args(words: &[&str]) -> Vec<Value> {
        words.iter().map(|w| Value::str(*w)).collect()
    }

    pub async fn run_tool(tool: &dyn Tool, args: Vec<Value>, stdin: &str, values_in: Vec<Value>) -> ToolRun {
        let (writer, reader) = pipe_stream(PIPE_BUFFER_SIZE);
        writer.write_all_bytes(stdin.as_bytes()).await.unwrap();
        drop(writer);

        let (in_tx, in_rx) = mpsc::channel(values_in.len().max(1));
        for value in values_in {
            in_tx.send(value).await.unwrap();
        }
        drop(in_tx);

        let (out_tx, mut out_rx) = mpsc::channel(1024);
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let ports = Ports {
            byte_in: ByteIn::from_pipe(reader),
            value_in: ValueIn::from_channel(in_rx),
            value_out: ValueOut::from_channel(out_tx),
            byte_out: ByteOut::to_buffer(buffer.clone()),
        };

        let mut ctx = ExecContext::new(session(), ports);
        let status = tool.execute(ToolArgs::new(args), &mut ctx).await;
        drop(ctx);

        let mut values = Vec::new();
        while let Some(value) = out_rx.recv().await {
            values.push(value);
        }
        let output = String::from_utf8_lossy(&buffer.lock().unwrap()).into_owned();
        ToolRun { status, values, output }
    }
}
