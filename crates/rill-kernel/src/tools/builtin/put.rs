//! put — Emit each argument as a value.

use async_trait::async_trait;

use crate::interpreter::EvalResult;
use crate::tools::{ExecContext, Tool, ToolArgs};
use crate::value::Status;

/// Put tool: writes its arguments to the value output.
pub struct Put;

#[async_trait]
impl Tool for Put {
    fn name(&self) -> &str {
        "put"
    }

    async fn execute(&self, args: ToolArgs, ctx: &mut ExecContext) -> EvalResult<Status> {
        for value in args.positional {
            ctx.put(value).await?;
        }
        Ok(Status::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{args, run_tool};
    use crate::value::{Table, Value};

    #[tokio::test]
    async fn puts_values_unchanged() {
        let table = Value::Table(Table::from_list(args(&["a"])));
        let run = run_tool(&Put, vec![Value::str("233"), table.clone(), Value::Bool(true)], "", vec![]).await;
        assert_eq!(run.status, Ok(Status::Ok));
        assert_eq!(run.values, vec![Value::str("233"), table, Value::Bool(true)]);
        assert!(run.output.is_empty());
    }

    #[tokio::test]
    async fn no_args_puts_nothing() {
        let run = run_tool(&Put, vec![], "", vec![]).await;
        assert!(run.values.is_empty());
    }
}
