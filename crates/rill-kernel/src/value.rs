//! Runtime values.
//!
//! Values are cheap handles. Strings and booleans are plain data; tables and
//! closures share their storage through `Arc`, so cloning a table value gives
//! another handle onto the same list and map.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::ast::Chunk;
use crate::interpreter::{EvalError, EvalResult, Scope};

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    String(String),
    Bool(bool),
    Status(Status),
    Table(Table),
    Closure(Closure),
    /// A builtin command referenced by name (`$put`, `$builtin:echo`).
    Builtin(String),
}

/// Outcome of a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Failure(i32),
}

impl Status {
    pub fn from_code(code: i32) -> Self {
        if code == 0 {
            Status::Ok
        } else {
            Status::Failure(code)
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::Failure(code) => *code,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "ok"),
            Status::Failure(code) => write!(f, "failure({})", code),
        }
    }
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn ok() -> Self {
        Value::Status(Status::Ok)
    }

    pub fn failure(code: i32) -> Self {
        Value::Status(Status::Failure(code))
    }

    /// Type name as reported by `typeof`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Bool(_) => "bool",
            Value::Status(_) => "status",
            Value::Table(_) => "table",
            Value::Closure(_) => "closure",
            Value::Builtin(_) => "builtin",
        }
    }

    /// Condition semantics for `if`.
    ///
    /// `$false`, `failure(..)` and the empty string are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Status(s) => s.is_ok(),
            Value::String(s) => !s.is_empty(),
            Value::Table(_) | Value::Closure(_) | Value::Builtin(_) => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Closure(_) | Value::Builtin(_))
    }

    /// Subscript `value[key]`.
    ///
    /// Integer keys index the list part of a table, any other key the map
    /// part.
    pub fn index(&self, key: &str) -> EvalResult<Value> {
        match self {
            Value::Table(t) => t.get(key),
            other => Err(EvalError::NotIndexable(other.type_name())),
        }
    }

    /// Round-trippable form, used for table elements.
    pub fn repr(&self) -> String {
        match self {
            Value::String(s) => quote_if_needed(s),
            Value::Bool(true) => "$true".to_string(),
            Value::Bool(false) => "$false".to_string(),
            Value::Status(s) => s.to_string(),
            Value::Table(t) => t.repr(),
            Value::Closure(_) => "<closure>".to_string(),
            Value::Builtin(name) => format!("<builtin {}>", name),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Status(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.repr()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Status(s) => write!(f, "Status({})", s),
            other => write!(f, "{}", other.repr()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Status(a), Value::Status(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => Arc::ptr_eq(&a.0, &b.0),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Status> for Value {
    fn from(s: Status) -> Self {
        Value::Status(s)
    }
}

impl From<Table> for Value {
    fn from(t: Table) -> Self {
        Value::Table(t)
    }
}

fn is_bareword_safe(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_alphanumeric() || "-_./:+,@%!~^*".contains(c))
}

fn quote_if_needed(s: &str) -> String {
    if is_bareword_safe(s) {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// ═══════════════════════════════════════════════════════════════════════════
// Tables
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct TableData {
    pub list: Vec<Value>,
    pub map: BTreeMap<String, Value>,
}

/// Shared table: an ordered list part plus a string-keyed map part.
#[derive(Clone, Default)]
pub struct Table(Arc<RwLock<TableData>>);

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(list: Vec<Value>, map: BTreeMap<String, Value>) -> Self {
        Table(Arc::new(RwLock::new(TableData { list, map })))
    }

    pub fn from_list(list: Vec<Value>) -> Self {
        Self::from_parts(list, BTreeMap::new())
    }

    /// Read access. A poisoned lock still yields the data.
    pub fn read(&self) -> RwLockReadGuard<'_, TableData> {
        self.0.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, TableData> {
        self.0.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, value: Value) {
        self.write().list.push(value);
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.write().map.insert(key.into(), value);
    }

    pub fn len(&self) -> usize {
        let data = self.read();
        data.list.len() + data.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str) -> EvalResult<Value> {
        let data = self.read();
        match key.parse::<i64>() {
            Ok(index) => usize::try_from(index)
                .ok()
                .and_then(|i| data.list.get(i).cloned())
                .ok_or_else(|| EvalError::IndexOutOfRange {
                    index: key.to_string(),
                    len: data.list.len(),
                }),
            Err(_) => data
                .map
                .get(key)
                .cloned()
                .ok_or_else(|| EvalError::KeyNotFound(key.to_string())),
        }
    }

    pub fn ptr_eq(&self, other: &Table) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn repr(&self) -> String {
        let data = self.read();
        let mut parts: Vec<String> = data.list.iter().map(Value::repr).collect();
        for (k, v) in &data.map {
            parts.push(format!("&{} {}", quote_if_needed(k), v.repr()));
        }
        format!("[{}]", parts.join(" "))
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let (a, b) = (self.read(), other.read());
        a.list == b.list && a.map == b.map
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Closures
// ═══════════════════════════════════════════════════════════════════════════

pub struct ClosureInner {
    pub params: Vec<String>,
    pub body: Arc<Chunk>,
    /// Captured at creation; shares cells with the frames it came from.
    pub scope: Scope,
}

/// A closure value. Equality is identity.
#[derive(Clone)]
pub struct Closure(pub Arc<ClosureInner>);

impl Closure {
    pub fn new(params: Vec<String>, body: Arc<Chunk>, scope: Scope) -> Self {
        Closure(Arc::new(ClosureInner {
            params,
            body,
            scope,
        }))
    }

    pub fn params(&self) -> &[String] {
        &self.0.params
    }

    pub fn body(&self) -> &Arc<Chunk> {
        &self.0.body
    }

    pub fn scope(&self) -> &Scope {
        &self.0.scope
    }
}

/// Format a number the way arithmetic commands print it.
///
/// Integral values print without a fractional part; infinities print as
/// `+Inf` and `-Inf`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "+Inf" } else { "-Inf" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_repr() {
        let mut map = BTreeMap::new();
        map.insert("key".to_string(), Value::str("value"));
        let t = Table::from_parts(vec!["a".into(), "b".into(), "c".into()], map);
        assert_eq!(Value::Table(t).to_string(), "[a b c &key value]");
    }

    #[test]
    fn repr_quotes_unsafe_strings() {
        assert_eq!(Value::str("a b").repr(), "\"a b\"");
        assert_eq!(Value::str("").repr(), "\"\"");
        assert_eq!(Value::str("s/l/1/g").repr(), "s/l/1/g");
        assert_eq!(Value::Bool(true).repr(), "$true");
    }

    #[test]
    fn tables_share_storage() {
        let t = Table::new();
        let alias = Value::Table(t.clone());
        t.push(Value::str("x"));
        assert_eq!(alias.index("0"), Ok(Value::str("x")));
    }

    #[test]
    fn index_errors() {
        let t = Value::Table(Table::from_list(vec!["a".into()]));
        assert!(matches!(t.index("1"), Err(EvalError::IndexOutOfRange { .. })));
        assert!(matches!(t.index("-1"), Err(EvalError::IndexOutOfRange { .. })));
        assert!(matches!(t.index("k"), Err(EvalError::KeyNotFound(_))));
        assert!(matches!(Value::str("s").index("0"), Err(EvalError::NotIndexable("string"))));
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::failure(1).is_truthy());
        assert!(!Value::str("").is_truthy());
        assert!(Value::ok().is_truthy());
        assert!(Value::str("x").is_truthy());
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(233333.0), "233333");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(f64::INFINITY), "+Inf");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Inf");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(-3.0), "-3");
    }
}
