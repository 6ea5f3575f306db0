//! each — Call a function with every input value.

use async_trait::async_trait;

use crate::interpreter::{EvalError, EvalResult, call};
use crate::tools::{ExecContext, Tool, ToolArgs};
use crate::value::Status;

pub struct Each;

#[async_trait]
impl Tool for Each {
    fn name(&self) -> &str {
        "each"
    }

    /// The status is that of the last call, or ok when there was no input.
    async fn execute(&self, args: ToolArgs, ctx: &mut ExecContext) -> EvalResult<Status> {
        let [f] = args.positional.as_slice() else {
            return Err(EvalError::ArityMismatch {
                expected: 1,
                got: args.len(),
            });
        };
        if !f.is_callable() {
            return Err(EvalError::NotCallable(f.repr()));
        }

        let mut status = Status::Ok;
        while let Some(value) = ctx.recv().await {
            status = call(f, vec![value], &ctx.scope, &ctx.ports).await?;
        }
        Ok(status)
    }
}
