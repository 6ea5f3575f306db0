//! Core tool traits and types.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::interpreter::EvalResult;
use crate::value::{Status, Value};

use super::context::ExecContext;

/// Evaluated arguments ready for tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolArgs {
    /// Positional arguments in order.
    pub positional: Vec<Value>,
}

impl ToolArgs {
    pub fn new(positional: Vec<Value>) -> Self {
        Self { positional }
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }

    /// Get a positional argument by index.
    pub fn get_positional(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// Plain string form of a positional argument.
    pub fn get_string(&self, index: usize) -> Option<String> {
        self.positional.get(index).map(Value::to_string)
    }

    /// Every argument in plain string form.
    pub fn strings(&self) -> Vec<String> {
        self.positional.iter().map(Value::to_string).collect()
    }

    /// Split leading single-letter flags (`-v`, `-ic`) off the arguments.
    ///
    /// Flag parsing stops at `--`, at a lone `-`, and at the first word
    /// containing a letter outside `known`.
    pub fn split_flags(&self, known: &str) -> (HashSet<char>, Vec<String>) {
        let mut flags = HashSet::new();
        let mut words = self.strings().into_iter().peekable();

        while let Some(word) = words.peek() {
            if word == "--" {
                words.next();
                break;
            }
            let Some(letters) = word.strip_prefix('-') else {
                break;
            };
            if letters.is_empty() || !letters.chars().all(|c| known.contains(c)) {
                break;
            }
            flags.extend(letters.chars());
            words.next();
        }

        (flags, words.collect())
    }
}

/// A builtin command.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool's name (used for lookup).
    fn name(&self) -> &str;

    /// Execute the tool with the given arguments and context.
    ///
    /// A non-zero exit is an `Ok` status; `Err` halts the chunk.
    async fn execute(&self, args: ToolArgs, ctx: &mut ExecContext) -> EvalResult<Status>;
}
