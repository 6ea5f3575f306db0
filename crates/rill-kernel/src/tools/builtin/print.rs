//! print, println, echo — Write arguments to the byte output.

use async_trait::async_trait;

use crate::interpreter::EvalResult;
use crate::tools::{ExecContext, Tool, ToolArgs};
use crate::value::Status;

/// Joins its arguments with spaces, optionally ending the line.
pub struct Print {
    name: &'static str,
    newline: bool,
}

impl Print {
    pub const PRINT: Print = Print {
        name: "print",
        newline: false,
    };
    pub const PRINTLN: Print = Print {
        name: "println",
        newline: true,
    };
    pub const ECHO: Print = Print {
        name: "echo",
        newline: true,
    };
}

#[async_trait]
impl Tool for Print {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(&self, args: ToolArgs, ctx: &mut ExecContext) -> EvalResult<Status> {
        let mut output = args.strings().join(" ");
        if self.newline {
            output.push('\n');
        }
        ctx.write_str(&output).await?;
        Ok(Status::Ok)
    }
}
