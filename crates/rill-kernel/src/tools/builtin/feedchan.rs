//! feedchan — Turn lines of byte input into string values.

use async_trait::async_trait;

use crate::interpreter::EvalResult;
use crate::tools::{ExecContext, Tool, ToolArgs};
use crate::value::{Status, Value};

pub struct Feedchan;

#[async_trait]
impl Tool for Feedchan {
    fn name(&self) -> &str {
        "feedchan"
    }

    async fn execute(&self, _args: ToolArgs, ctx: &mut ExecContext) -> EvalResult<Status> {
        while let Some(line) = ctx.read_line().await? {
            ctx.put(Value::str(line)).await?;
        }
        Ok(Status::Ok)
    }
}
