//! true/false — Fixed exit status builtins.
//!
//! - `true` exits with code 0
//! - `false` exits with code 1

use async_trait::async_trait;

use crate::interpreter::EvalResult;
use crate::tools::{ExecContext, Tool, ToolArgs};
use crate::value::Status;

/// True builtin: always succeeds (exit code 0).
pub struct True;

#[async_trait]
impl Tool for True {
    fn name(&self) -> &str {
        "true"
    }

    async fn execute(&self, _args: ToolArgs, _ctx: &mut ExecContext) -> EvalResult<Status> {
        Ok(Status::Ok)
    }
}

/// False builtin: always fails (exit code 1).
pub struct False;

#[async_trait]
impl Tool for False {
    fn name(&self) -> &str {
        "false"
    }

    async fn execute(&self, _args: ToolArgs, _ctx: &mut ExecContext) -> EvalResult<Status> {
        Ok(Status::Failure(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{args, run_tool};

    #[tokio::test]
    async fn true_returns_success() {
        let run = run_tool(&True, args(&["ignored"]), "", vec![]).await;
        assert_eq!(run.status, Ok(Status::Ok));
    }

    #[tokio::test]
    async fn false_returns_failure() {
        let run = run_tool(&False, vec![], "", vec![]).await;
        assert_eq!(run.status, Ok(Status::Failure(1)));
        assert!(run.output.is_empty());
    }
}
