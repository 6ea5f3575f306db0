//! Evaluation of chunks, forms and compounds.
//!
//! Every recursive entry point returns a boxed future: closures call back
//! into `eval_chunk`, captures nest chunks inside compounds, and pipeline
//! stages are spawned as tasks, so the futures must be `Send` and finitely
//! sized.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tracing::Instrument;

use crate::ast::{
    Chunk, ClosureDef, Command, Compound, Form, IfForm, Primary, PrimaryKind, SetForm, TableItem, VarForm, VarName,
};
use crate::external::run_external;
use crate::scheduler::{PipelineRunner, Ports, ValueOut};
use crate::tools::{ExecContext, ToolArgs};
use crate::value::{Closure, Status, Table, Value};

use super::error::{EvalError, EvalResult};
use super::scope::Scope;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Evaluate a chunk, one pipeline after another.
///
/// Returns the per-stage statuses of the last pipeline. The first runtime
/// error stops the chunk; output already written stays written.
pub fn eval_chunk<'a>(chunk: &'a Chunk, scope: &'a Scope, ports: &'a Ports) -> BoxFuture<'a, EvalResult<Vec<Status>>> {
    let span = tracing::debug_span!("eval_chunk", pipelines = chunk.pipelines.len());
    Box::pin(
        async move {
            let runner = PipelineRunner::new(scope.clone());
            let mut statuses = Vec::new();
            for pipeline in &chunk.pipelines {
                statuses = runner.run(pipeline, ports).await?;
            }
            Ok(statuses)
        }
        .instrument(span),
    )
}

/// Evaluate one pipeline stage.
pub fn eval_form<'a>(form: &'a Form, scope: &'a Scope, ports: &'a Ports) -> BoxFuture<'a, EvalResult<Status>> {
    let span = tracing::debug_span!("eval_form", kind = form.kind_name());
    Box::pin(
        async move {
            match form {
                Form::Command(cmd) => eval_command(cmd, scope, ports).await,
                Form::Var(var) => eval_var(var, scope, ports).await,
                Form::Set(set) => eval_set(set, scope, ports).await,
                Form::Del(names) => {
                    for name in names {
                        scope.delete(name)?;
                    }
                    Ok(Status::Ok)
                }
                Form::Fn(def) => {
                    let closure = make_closure(&def.closure, scope);
                    scope.declare(&VarName::simple(def.name.clone()), closure)?;
                    Ok(Status::Ok)
                }
                Form::If(form) => eval_if(form, scope, ports).await,
            }
        }
        .instrument(span),
    )
}

/// Call a callable value with arguments.
///
/// `scope` is the caller's scope; builtins run in it, closures run in a
/// child of the scope they captured.
pub fn call<'a>(f: &'a Value, args: Vec<Value>, scope: &'a Scope, ports: &'a Ports) -> BoxFuture<'a, EvalResult<Status>> {
    Box::pin(async move {
        match f {
            Value::Closure(closure) => call_closure(closure, args, ports).await,
            Value::Builtin(name) => call_tool(name, args, scope, ports).await,
            other => Err(EvalError::NotCallable(other.repr())),
        }
    })
}

async fn call_closure(closure: &Closure, args: Vec<Value>, ports: &Ports) -> EvalResult<Status> {
    let params = closure.params();
    if params.len() != args.len() {
        return Err(EvalError::ArityMismatch {
            expected: params.len(),
            got: args.len(),
        });
    }

    let frame = closure.scope().child();
    for (param, arg) in params.iter().zip(args) {
        frame.declare(&VarName::simple(param.clone()), arg)?;
    }

    let statuses = eval_chunk(closure.body(), &frame, ports).await?;
    Ok(statuses.last().copied().unwrap_or(Status::Ok))
}

async fn call_tool(name: &str, args: Vec<Value>, scope: &Scope, ports: &Ports) -> EvalResult<Status> {
    let tool = scope
        .tools()
        .get(name)
        .ok_or_else(|| EvalError::NotCallable(name.to_string()))?;
    let mut ctx = ExecContext::new(scope.clone(), ports.clone());
    tool.execute(ToolArgs::new(args), &mut ctx).await
}

// ═══════════════════════════════════════════════════════════════════════════
// Commands
// ═══════════════════════════════════════════════════════════════════════════

/// What a command head refers to.
enum Head {
    Callable(Value),
    Tool(String),
    External(String),
}

#[tracing::instrument(level = "debug", skip_all, fields(head = ?cmd.head.as_bareword()))]
async fn eval_command(cmd: &Command, scope: &Scope, ports: &Ports) -> EvalResult<Status> {
    let head = resolve_head(&cmd.head, scope, ports).await?;
    let args = eval_args(&cmd.args, scope, ports).await?;

    match head {
        Head::Callable(f) => call(&f, args, scope, ports).await,
        Head::Tool(name) => call_tool(&name, args, scope, ports).await,
        Head::External(name) => run_external(&name, &args, ports).await,
    }
}

/// Resolve by name: callable variable, then builtin command, then `PATH`.
fn resolve_name(name: &str, scope: &Scope) -> Head {
    if let Some(f) = scope.callable(name) {
        Head::Callable(f)
    } else if scope.tools().contains(name) {
        Head::Tool(name.to_string())
    } else {
        Head::External(name.to_string())
    }
}

async fn resolve_head(head: &Compound, scope: &Scope, ports: &Ports) -> EvalResult<Head> {
    if let Some(name) = head.as_bareword() {
        return Ok(resolve_name(name, scope));
    }

    let mut values = eval_compound(head, scope, ports).await?;
    if values.len() != 1 {
        return Err(EvalError::bad_argument(
            "command",
            format!("head must be a single value, got {}", values.len()),
        ));
    }
    match values.remove(0) {
        Value::String(name) => Ok(resolve_name(&name, scope)),
        f if f.is_callable() => Ok(Head::Callable(f)),
        other => Err(EvalError::NotCallable(other.repr())),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Special forms
// ═══════════════════════════════════════════════════════════════════════════

/// Default value for a declared but unassigned name.
fn default_for(kind: Option<&str>) -> Value {
    match kind {
        Some("table") => Value::Table(Table::new()),
        Some("bool") => Value::Bool(false),
        _ => Value::str(""),
    }
}

async fn eval_var(form: &VarForm, scope: &Scope, ports: &Ports) -> EvalResult<Status> {
    let Some(values) = &form.values else {
        for decl in &form.decls {
            scope.declare(&decl.name, default_for(decl.kind.as_deref()))?;
        }
        return Ok(Status::Ok);
    };

    let values = eval_args(values, scope, ports).await?;
    if values.len() != form.decls.len() {
        tracing::warn!(
            names = form.decls.len(),
            values = values.len(),
            "var: name and value counts differ, nothing declared"
        );
        return Ok(Status::Ok);
    }
    for (decl, value) in form.decls.iter().zip(values) {
        scope.declare(&decl.name, value)?;
    }
    Ok(Status::Ok)
}

async fn eval_set(form: &SetForm, scope: &Scope, ports: &Ports) -> EvalResult<Status> {
    let values = eval_args(&form.values, scope, ports).await?;
    if values.len() != form.names.len() {
        tracing::warn!(
            names = form.names.len(),
            values = values.len(),
            "set: name and value counts differ, nothing assigned"
        );
        return Ok(Status::Ok);
    }
    for (name, value) in form.names.iter().zip(values) {
        scope.assign(name, value)?;
    }
    Ok(Status::Ok)
}

async fn eval_if(form: &IfForm, scope: &Scope, ports: &Ports) -> EvalResult<Status> {
    for clause in &form.clauses {
        if conditions_hold(&clause.conditions, scope, ports).await? {
            return run_body(&clause.body, scope, ports).await;
        }
    }
    match &form.else_body {
        Some(body) => run_body(body, scope, ports).await,
        None => Ok(Status::Ok),
    }
}

/// True when every value of every condition is truthy.
async fn conditions_hold(conditions: &[Compound], scope: &Scope, ports: &Ports) -> EvalResult<bool> {
    for condition in conditions {
        let values = eval_compound(condition, scope, ports).await?;
        if !values.iter().all(Value::is_truthy) {
            return Ok(false);
        }
    }
    Ok(true)
}

async fn run_body(body: &ClosureDef, scope: &Scope, ports: &Ports) -> EvalResult<Status> {
    let Value::Closure(closure) = make_closure(body, scope) else {
        return Err(EvalError::Internal("closure literal did not make a closure".into()));
    };
    call_closure(&closure, Vec::new(), ports).await
}

fn make_closure(def: &ClosureDef, scope: &Scope) -> Value {
    Value::Closure(Closure::new(def.params.clone(), def.body.clone(), scope.capture()))
}

// ═══════════════════════════════════════════════════════════════════════════
// Compounds
// ═══════════════════════════════════════════════════════════════════════════

/// Evaluate arguments and concatenate their values.
async fn eval_args(args: &[Compound], scope: &Scope, ports: &Ports) -> EvalResult<Vec<Value>> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.extend(eval_compound(arg, scope, ports).await?);
    }
    Ok(values)
}

/// Evaluate a compound.
///
/// A lone primary yields its values unchanged. Several primaries yield the
/// cartesian product of their string forms, leftmost varying slowest.
fn eval_compound<'a>(compound: &'a Compound, scope: &'a Scope, ports: &'a Ports) -> BoxFuture<'a, EvalResult<Vec<Value>>> {
    Box::pin(async move {
        let mut acc: Option<Vec<Value>> = None;
        for primary in &compound.primaries {
            let values = eval_primary(primary, scope, ports).await?;
            acc = Some(match acc {
                None => values,
                Some(prefixes) => prefixes
                    .iter()
                    .flat_map(|prefix| {
                        values
                            .iter()
                            .map(move |suffix| Value::String(format!("{}{}", prefix, suffix)))
                    })
                    .collect(),
            });
        }
        Ok(acc.unwrap_or_default())
    })
}

async fn eval_primary(primary: &Primary, scope: &Scope, ports: &Ports) -> EvalResult<Vec<Value>> {
    let mut values = match &primary.kind {
        PrimaryKind::Bareword(s) | PrimaryKind::Quoted(s) => vec![Value::str(s.clone())],
        PrimaryKind::Variable(name) => vec![scope.lookup(name)?],
        PrimaryKind::Table(items) => vec![eval_table(items, scope, ports).await?],
        PrimaryKind::Braced(items) => eval_args(items, scope, ports).await?,
        PrimaryKind::Closure(def) => vec![make_closure(def, scope)],
        PrimaryKind::Capture(chunk) => capture_values(chunk, scope, ports).await?,
        PrimaryKind::StatusCapture(chunk) => eval_chunk(chunk, scope, ports)
            .await?
            .into_iter()
            .map(Value::Status)
            .collect(),
    };

    for index in &primary.indices {
        let keys = eval_compound(index, scope, ports).await?;
        let mut indexed = Vec::with_capacity(values.len() * keys.len());
        for value in &values {
            for key in &keys {
                indexed.push(value.index(&key.to_string())?);
            }
        }
        values = indexed;
    }
    Ok(values)
}

async fn eval_table(items: &[TableItem], scope: &Scope, ports: &Ports) -> EvalResult<Value> {
    let table = Table::new();
    for item in items {
        match item {
            TableItem::Item(compound) => {
                for value in eval_compound(compound, scope, ports).await? {
                    table.push(value);
                }
            }
            TableItem::Pair(key, value) => {
                let key = single(eval_compound(key, scope, ports).await?, "table key")?;
                let value = single(eval_compound(value, scope, ports).await?, "table value")?;
                table.insert(key.to_string(), value);
            }
        }
    }
    Ok(Value::Table(table))
}

fn single(mut values: Vec<Value>, what: &str) -> EvalResult<Value> {
    if values.len() != 1 {
        return Err(EvalError::bad_argument(
            "table",
            format!("{} must be a single value, got {}", what, values.len()),
        ));
    }
    Ok(values.remove(0))
}

/// Run `chunk` with its values collected instead of forwarded.
///
/// The drainer is running before the chunk starts.
async fn capture_values(chunk: &Chunk, scope: &Scope, ports: &Ports) -> EvalResult<Vec<Value>> {
    let (tx, mut rx) = mpsc::channel(scope.pipes().value_chan_size.max(1));
    let drainer = tokio::spawn(async move {
        let mut values = Vec::new();
        while let Some(value) = rx.recv().await {
            values.push(value);
        }
        values
    });

    let inner = ports.with_value_out(ValueOut::from_channel(tx));
    let result = eval_chunk(chunk, scope, &inner).await;
    drop(inner);

    let values = drainer.await?;
    result?;
    Ok(values)
}
