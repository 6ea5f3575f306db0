//! sed — Regex substitution over lines of byte input.
//!
//! Only the substitute command is supported:
//!
//! ```text
//! sed s/RE/REPLACEMENT/[FLAGS]
//! ```
//!
//! Any character may stand in for `/`. Flags: `g` replaces every match on
//! a line instead of the first, `i` matches case-insensitively. In the
//! replacement, `&` is the whole match and `\1`-`\9` are capture groups.

use async_trait::async_trait;
use regex::{Captures, Regex, RegexBuilder};

use crate::interpreter::{EvalError, EvalResult};
use crate::tools::{ExecContext, Tool, ToolArgs};
use crate::value::Status;

pub struct Sed;

#[async_trait]
impl Tool for Sed {
    fn name(&self) -> &str {
        "sed"
    }

    async fn execute(&self, args: ToolArgs, ctx: &mut ExecContext) -> EvalResult<Status> {
        let [script] = args.strings().try_into().map_err(|words: Vec<String>| {
            EvalError::bad_argument("sed", format!("expected one script, got {}", words.len()))
        })?;
        let sub = Substitution::parse(&script).map_err(|e| EvalError::bad_argument("sed", e))?;

        while let Some(line) = ctx.read_line().await? {
            let mut out = sub.apply(&line);
            out.push('\n');
            ctx.write_str(&out).await?;
        }
        Ok(Status::Ok)
    }
}

/// A parsed `s` command.
#[derive(Debug)]
struct Substitution {
    pattern: Regex,
    replacement: String,
    global: bool,
}

impl Substitution {
    fn parse(script: &str) -> Result<Self, String> {
        let chars: Vec<char> = script.chars().collect();
        let (delimiter, rest) = match chars.as_slice() {
            ['s', delimiter, rest @ ..] if !delimiter.is_alphanumeric() && *delimiter != '\\' => (*delimiter, rest),
            _ => return Err(format!("unsupported script: {}", script)),
        };

        let (pattern, rest) = parse_delimited(rest, delimiter)?;
        let (replacement, rest) = parse_delimited(rest, delimiter)?;

        let mut global = false;
        let mut insensitive = false;
        for &flag in rest {
            match flag {
                'g' => global = true,
                'i' | 'I' => insensitive = true,
                other => return Err(format!("unknown flag: {}", other)),
            }
        }

        let pattern = RegexBuilder::new(&pattern)
            .case_insensitive(insensitive)
            .build()
            .map_err(|e| format!("invalid regex: {}", e))?;

        Ok(Self {
            pattern,
            replacement,
            global,
        })
    }

    fn apply(&self, line: &str) -> String {
        if self.global {
            substitute_all(&self.pattern, line, &self.replacement)
        } else {
            substitute_first(&self.pattern, line, &self.replacement)
        }
    }
}

/// Read up to an unescaped `delimiter`.
///
/// `\DELIM` becomes a literal delimiter; other escapes keep their backslash
/// for the regex or the replacement to interpret.
fn parse_delimited(chars: &[char], delimiter: char) -> Result<(String, &[char]), String> {
    let mut result = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() {
            let next = chars[i + 1];
            if next != delimiter {
                result.push('\\');
            }
            result.push(next);
            i += 2;
        } else if c == delimiter {
            return Ok((result, &chars[i + 1..]));
        } else {
            result.push(c);
            i += 1;
        }
    }

    Err("unterminated s command".to_string())
}

fn substitute_first(pattern: &Regex, text: &str, replacement: &str) -> String {
    match pattern.captures(text) {
        Some(captures) => splice(text, std::iter::once(captures), replacement),
        None => text.to_string(),
    }
}

fn substitute_all(pattern: &Regex, text: &str, replacement: &str) -> String {
    splice(text, pattern.captures_iter(text), replacement)
}

fn splice<'t>(text: &'t str, matches: impl Iterator<Item = Captures<'t>>, replacement: &str) -> String {
    let mut result = String::new();
    let mut last_end = 0;

    for captures in matches {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        result.push_str(&text[last_end..whole.start()]);
        result.push_str(&expand_replacement(replacement, &captures));
        last_end = whole.end();
    }

    result.push_str(&text[last_end..]);
    result
}

/// Expand `&`, `\1`-`\9`, `\n`, `\t` and `\\` in a replacement.
fn expand_replacement(replacement: &str, captures: &Captures) -> String {
    let mut result = String::new();
    let mut chars = replacement.chars();

    while let Some(c) = chars.next() {
        match c {
            '&' => {
                if let Some(m) = captures.get(0) {
                    result.push_str(m.as_str());
                }
            }
            '\\' => match chars.next() {
                Some(d @ '0'..='9') => {
                    let group = (d as u8 - b'0') as usize;
                    if let Some(m) = captures.get(group) {
                        result.push_str(m.as_str());
                    }
                }
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('&') => result.push('&'),
                Some(other) => result.push(other),
                None => result.push('\\'),
            },
            c => result.push(c),
        }
    }

    result
}
