//! typeof — Emit the type name of each argument.

use async_trait::async_trait;

use crate::interpreter::EvalResult;
use crate::tools::{ExecContext, Tool, ToolArgs};
use crate::value::{Status, Value};

pub struct TypeOf;

#[async_trait]
impl Tool for TypeOf {
    fn name(&self) -> &str {
        "typeof"
    }

    async fn execute(&self, args: ToolArgs, ctx: &mut ExecContext) -> EvalResult<Status> {
        for value in &args.positional {
            ctx.put(Value::str(value.type_name())).await?;
        }
        Ok(Status::Ok)
    }
}
