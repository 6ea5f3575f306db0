//! AST type definitions.

use std::fmt;
use std::sync::Arc;

/// A chunk is a sequence of pipelines separated by `;` or newlines.
///
/// Chunks are the unit of evaluation: a whole REPL line, a closure body,
/// or the inside of an output capture `(...)`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Chunk {
    pub pipelines: Vec<Arc<Pipeline>>,
}

impl Chunk {
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

/// Forms connected by `|`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub forms: Vec<Arc<Form>>,
}

/// A single pipeline stage.
///
/// Special forms are recognised from the head word while parsing, so the
/// evaluator never has to re-inspect command names.
#[derive(Debug, Clone, PartialEq)]
pub enum Form {
    /// `head arg...`
    Command(Command),
    /// `var $a $b [type] [= v1 v2]`
    Var(VarForm),
    /// `set $a $b = v1 v2`
    Set(SetForm),
    /// `del $a $b`
    Del(Vec<VarName>),
    /// `fn name $params... { body }`
    Fn(FnDef),
    /// `if cond... { } else if cond... { } else { }`
    If(IfForm),
}

impl Form {
    /// Short name for tracing spans.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Form::Command(_) => "command",
            Form::Var(_) => "var",
            Form::Set(_) => "set",
            Form::Del(_) => "del",
            Form::Fn(_) => "fn",
            Form::If(_) => "if",
        }
    }
}

/// An ordinary command invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub head: Compound,
    pub args: Vec<Compound>,
}

/// `var` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct VarForm {
    pub decls: Vec<VarDecl>,
    /// Right-hand side after `=`, if any.
    pub values: Option<Vec<Compound>>,
}

/// One declared name and the type annotation that followed it, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: VarName,
    pub kind: Option<String>,
}

/// `set` assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct SetForm {
    pub names: Vec<VarName>,
    pub values: Vec<Compound>,
}

/// Named function definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FnDef {
    pub name: String,
    pub closure: Arc<ClosureDef>,
}

/// Conditional with any number of `else if` clauses.
#[derive(Debug, Clone, PartialEq)]
pub struct IfForm {
    pub clauses: Vec<IfClause>,
    pub else_body: Option<Arc<ClosureDef>>,
}

/// `cond... { body }`
#[derive(Debug, Clone, PartialEq)]
pub struct IfClause {
    pub conditions: Vec<Compound>,
    pub body: Arc<ClosureDef>,
}

/// Closure literal `{ |params| body }`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosureDef {
    pub params: Vec<String>,
    pub body: Arc<Chunk>,
}

/// Adjacent primaries with no whitespace between them.
///
/// `a$x'b'` is one compound of three primaries.
#[derive(Debug, Clone, PartialEq)]
pub struct Compound {
    pub primaries: Vec<Primary>,
}

impl Compound {
    /// The single bareword this compound consists of, if that is all it is.
    pub fn as_bareword(&self) -> Option<&str> {
        match self.primaries.as_slice() {
            [Primary { kind: PrimaryKind::Bareword(s), indices }] if indices.is_empty() => Some(s),
            _ => None,
        }
    }

    /// The single variable reference this compound consists of.
    pub fn as_variable(&self) -> Option<&VarName> {
        match self.primaries.as_slice() {
            [Primary { kind: PrimaryKind::Variable(name), indices }] if indices.is_empty() => Some(name),
            _ => None,
        }
    }

    /// The single closure literal this compound consists of.
    pub fn as_closure(&self) -> Option<&Arc<ClosureDef>> {
        match self.primaries.as_slice() {
            [Primary { kind: PrimaryKind::Closure(def), indices }] if indices.is_empty() => Some(def),
            _ => None,
        }
    }
}

/// A primary expression with optional postfix subscripts: `$x[0][key]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Primary {
    pub kind: PrimaryKind,
    pub indices: Vec<Compound>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryKind {
    /// Unquoted word: `lorem`, `s/a/b/g`, `+`
    Bareword(String),
    /// Quoted string, escapes already processed.
    Quoted(String),
    /// `$name` or `$ns:name`
    Variable(VarName),
    /// `[a b &key value]`
    Table(Vec<TableItem>),
    /// `{a b}` expands to each element.
    Braced(Vec<Compound>),
    /// `{ |params| body }`
    Closure(Arc<ClosureDef>),
    /// `(chunk)` captures the value output.
    Capture(Arc<Chunk>),
    /// `?(chunk)` captures stage statuses.
    StatusCapture(Arc<Chunk>),
}

/// Element of a table literal.
#[derive(Debug, Clone, PartialEq)]
pub enum TableItem {
    Item(Compound),
    Pair(Compound, Compound),
}

/// Explicit pseudo-namespace prefix on a variable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Local,
    Up,
    Builtin,
    Env,
}

impl Namespace {
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "local" => Some(Namespace::Local),
            "up" => Some(Namespace::Up),
            "builtin" => Some(Namespace::Builtin),
            "env" => Some(Namespace::Env),
            _ => None,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Local => write!(f, "local"),
            Namespace::Up => write!(f, "up"),
            Namespace::Builtin => write!(f, "builtin"),
            Namespace::Env => write!(f, "env"),
        }
    }
}

/// A possibly namespace-qualified variable name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VarName {
    pub namespace: Option<Namespace>,
    pub name: String,
}

impl VarName {
    /// Unqualified name.
    pub fn simple(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    pub fn qualified(namespace: Namespace, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace),
            name: name.into(),
        }
    }
}

impl fmt::Display for VarName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace {
            Some(ns) => write!(f, "${}:{}", ns, self.name),
            None => write!(f, "${}", self.name),
        }
    }
}
