//! Interpreter module for rill.
//!
//! # Architecture
//!
//! The interpreter is built in layers:
//!
//! - **Scope**: chains of frames holding mutable cells, plus the builtin
//!   and env pseudo-namespaces
//! - **Evaluator**: walks chunks, runs each pipeline through the scheduler
//!   and reduces compounds to values
//! - **EvalError**: the runtime failures that halt a chunk
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rill_kernel::ast::VarName;
//! use rill_kernel::interpreter::{Globals, Scope};
//! use rill_kernel::scheduler::PipeConfig;
//! use rill_kernel::tools::ToolRegistry;
//! use rill_kernel::value::Value;
//!
//! let globals = Globals::new(Arc::new(ToolRegistry::new()), PipeConfig::default());
//! let scope = Scope::new(Arc::new(globals));
//! scope.declare(&VarName::simple("x"), Value::str("lorem")).unwrap();
//! assert_eq!(scope.get("x"), Some(Value::str("lorem")));
//! ```

mod error;
mod eval;
mod scope;

pub use error::{EvalError, EvalResult};
pub use eval::{call, eval_chunk, eval_form};
pub use scope::{Globals, Scope};
