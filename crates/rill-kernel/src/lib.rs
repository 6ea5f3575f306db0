//! rill-kernel: the evaluator core of the rill shell.
//!
//! This crate provides:
//!
//! - **Lexer**: Tokenizes rill source code using logos
//! - **Parser**: Builds the syntax tree from tokens using chumsky
//! - **AST**: Chunks, pipelines, forms and compounds
//! - **Value**: Strings, booleans, statuses, shared tables and closures
//! - **Interpreter**: Scope chains with pseudo-namespaces, and evaluation
//! - **Scheduler**: Byte pipes, value channels and concurrent pipeline stages
//! - **Tools**: Tool trait, registry, and builtin commands
//! - **Kernel**: A session that evaluates chunks against one top-level frame

pub mod ast;
pub mod external;
pub mod interpreter;
pub mod kernel;
pub mod lexer;
pub mod parser;
pub mod scheduler;
pub mod tools;
pub mod value;

pub use interpreter::{EvalError, EvalResult};
pub use kernel::{Captured, Kernel, KernelConfig, KernelError};
pub use value::{Status, Value};
