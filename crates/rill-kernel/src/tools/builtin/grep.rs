//! grep — Keep the lines of byte input that match a regex.
//!
//! ```text
//! grep [-v] [-i] [-c] PATTERN
//! ```
//!
//! Exits with status 1 when no line is selected.

use async_trait::async_trait;
use regex::RegexBuilder;

use crate::interpreter::{EvalError, EvalResult};
use crate::tools::{ExecContext, Tool, ToolArgs};
use crate::value::Status;

pub struct Grep;

#[async_trait]
impl Tool for Grep {
    fn name(&self) -> &str {
        "grep"
    }

    async fn execute(&self, args: ToolArgs, ctx: &mut ExecContext) -> EvalResult<Status> {
        let (flags, words) = args.split_flags("vic");
        let [pattern] = words.as_slice() else {
            return Err(EvalError::bad_argument(
                "grep",
                format!("expected one pattern, got {}", words.len()),
            ));
        };

        let invert = flags.contains(&'v');
        let count_only = flags.contains(&'c');
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(flags.contains(&'i'))
            .build()
            .map_err(|e| EvalError::bad_argument("grep", format!("invalid regex: {}", e)))?;

        let mut selected = 0usize;
        while let Some(line) = ctx.read_line().await? {
            if regex.is_match(&line) != invert {
                selected += 1;
                if !count_only {
                    ctx.write_str(&format!("{}\n", line)).await?;
                }
            }
        }

        if count_only {
            ctx.write_str(&format!("{}\n", selected)).await?;
        }
        Ok(if selected > 0 { Status::Ok } else { Status::Failure(1) })
    }
}
