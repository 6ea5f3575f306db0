//! + - * / — Floating-point arithmetic.
//!
//! Arguments are parsed as `f64` and the result is put as a string value.
//! Division by zero follows IEEE 754 (`+Inf`, `-Inf`, `NaN`) instead of
//! failing.

use async_trait::async_trait;

use crate::interpreter::{EvalError, EvalResult};
use crate::tools::{ExecContext, Tool, ToolArgs};
use crate::value::{Status, Value, format_number};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arith {
    Add,
    Sub,
    Mul,
    Div,
}

impl Arith {
    fn symbol(self) -> &'static str {
        match self {
            Arith::Add => "+",
            Arith::Sub => "-",
            Arith::Mul => "*",
            Arith::Div => "/",
        }
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Arith::Add => a + b,
            Arith::Sub => a - b,
            Arith::Mul => a * b,
            Arith::Div => a / b,
        }
    }

    /// `+` and `*` fold from their identity; `-` and `/` fold from the
    /// first operand, and a lone operand is negated or inverted.
    fn fold(self, operands: &[f64]) -> EvalResult<f64> {
        match (self, operands) {
            (Arith::Add, _) => Ok(operands.iter().fold(0.0, |acc, &x| acc + x)),
            (Arith::Mul, _) => Ok(operands.iter().fold(1.0, |acc, &x| acc * x)),
            (_, []) => Err(EvalError::bad_argument(self.symbol(), "needs at least one operand")),
            (_, [only]) => Ok(self.apply(if self == Arith::Sub { 0.0 } else { 1.0 }, *only)),
            (_, [first, rest @ ..]) => Ok(rest.iter().fold(*first, |acc, &x| self.apply(acc, x))),
        }
    }
}

fn parse_operand(value: &Value) -> EvalResult<f64> {
    let text = value.to_string();
    text.trim()
        .parse::<f64>()
        .map_err(|_| EvalError::NotANumber(value.repr()))
}

#[async_trait]
impl Tool for Arith {
    fn name(&self) -> &str {
        self.symbol()
    }

    async fn execute(&self, args: ToolArgs, ctx: &mut ExecContext) -> EvalResult<Status> {
        let operands = args
            .positional
            .iter()
            .map(parse_operand)
            .collect::<EvalResult<Vec<f64>>>()?;
        let result = self.fold(&operands)?;
        ctx.put(Value::str(format_number(result))).await?;
        Ok(Status::Ok)
    }
}
