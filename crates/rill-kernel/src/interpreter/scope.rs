//! Lexical scopes for rill.
//!
//! A scope is a chain of frames. Each frame maps names to cells.
//!
//! ```text
//!   local ──▶ enclosing ... ──▶ session ──▶ builtin (read-only)
//!                                            └─ also every builtin command
//!   env: proxies process environment variables
//! ```
//!
//! Declaring a name always makes a new cell, so a redeclared name shadows the
//! old binding for everything that looks it up afterwards.
//!
//! A closure holds a capture of its chain: copies of each frame's map that
//! share the same cells. Assignments are seen both ways, while a name
//! redeclared after the capture still resolves to the old cell inside the
//! closure. Names the capture does not know about are looked up in the live
//! frame it was taken from, which is how a function finds itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::ast::{Namespace, VarName};
use crate::scheduler::PipeConfig;
use crate::tools::ToolRegistry;
use crate::value::Value;

use super::error::{EvalError, EvalResult};

/// Serializes every environment mutation made through `env:`.
static ENV_LOCK: Mutex<()> = Mutex::new(());

/// A mutable slot holding one value.
#[derive(Debug)]
struct Cell(RwLock<Value>);

impl Cell {
    fn new(value: Value) -> Arc<Self> {
        Arc::new(Cell(RwLock::new(value)))
    }

    fn get(&self) -> Value {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set(&self, value: Value) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = value;
    }
}

#[derive(Debug, Default)]
struct Frame {
    cells: RwLock<HashMap<String, Arc<Cell>>>,
    parent: Option<Arc<Frame>>,
    /// Set on captured copies: the live frame the copy was taken from.
    origin: Option<Arc<Frame>>,
}

impl Frame {
    fn child_of(parent: Arc<Frame>) -> Arc<Self> {
        Arc::new(Frame {
            cells: RwLock::default(),
            parent: Some(parent),
            origin: None,
        })
    }

    /// Copy this frame and its ancestors, sharing every cell.
    fn capture(self: &Arc<Self>) -> Arc<Frame> {
        Arc::new(Frame {
            cells: RwLock::new(self.cells.read().unwrap_or_else(|e| e.into_inner()).clone()),
            parent: self.parent.as_ref().map(Frame::capture),
            origin: Some(self.origin.clone().unwrap_or_else(|| self.clone())),
        })
    }

    fn own_cell(&self, name: &str) -> Option<Arc<Cell>> {
        self.cells
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    fn cell(&self, name: &str) -> Option<Arc<Cell>> {
        self.own_cell(name)
            .or_else(|| self.origin.as_ref()?.own_cell(name))
    }

    fn declare(&self, name: &str, value: Value) {
        self.bind(name, Cell::new(value));
    }

    fn bind(&self, name: &str, cell: Arc<Cell>) {
        if let Some(origin) = &self.origin {
            origin.bind(name, cell.clone());
        }
        self.cells
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), cell);
    }

    /// Remove `name`. On a captured copy, the live frame loses it too when
    /// both still hold the same cell.
    fn remove(&self, name: &str) -> bool {
        let removed = self
            .cells
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
        let Some(origin) = &self.origin else {
            return removed.is_some();
        };
        let live = origin.own_cell(name);
        let same = match (&removed, &live) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, Some(_)) => true,
            _ => false,
        };
        if same {
            origin.remove(name);
        }
        removed.is_some() || same
    }

    /// First frame, starting here and walking outward, that binds `name`.
    fn find(self: &Arc<Self>, name: &str) -> Option<(Arc<Frame>, Arc<Cell>)> {
        let mut frame = Some(self.clone());
        while let Some(f) = frame {
            if let Some(cell) = f.cell(name) {
                return Some((f, cell));
            }
            frame = f.parent.clone();
        }
        None
    }
}

/// Process-wide state shared by every scope of a kernel: the builtin
/// namespace, the command registry and pipe sizing.
pub struct Globals {
    builtin: HashMap<String, Value>,
    tools: Arc<ToolRegistry>,
    pipes: PipeConfig,
}

impl Globals {
    pub fn new(tools: Arc<ToolRegistry>, pipes: PipeConfig) -> Self {
        let mut builtin = HashMap::new();
        builtin.insert("pid".to_string(), Value::str(std::process::id().to_string()));
        builtin.insert("true".to_string(), Value::Bool(true));
        builtin.insert("false".to_string(), Value::Bool(false));
        builtin.insert("ok".to_string(), Value::ok());
        Self {
            builtin,
            tools,
            pipes,
        }
    }

    /// Builtin variable, or a builtin command as a value.
    fn builtin(&self, name: &str) -> Option<Value> {
        self.builtin.get(name).cloned().or_else(|| {
            self.tools
                .contains(name)
                .then(|| Value::Builtin(name.to_string()))
        })
    }

    fn is_builtin(&self, name: &str) -> bool {
        self.builtin(name).is_some()
    }
}

/// A position in the scope chain.
#[derive(Clone)]
pub struct Scope {
    frame: Arc<Frame>,
    globals: Arc<Globals>,
}

impl Scope {
    /// A fresh session scope: one empty frame directly above builtin.
    pub fn new(globals: Arc<Globals>) -> Self {
        Self {
            frame: Arc::new(Frame::default()),
            globals,
        }
    }

    /// A new innermost frame whose parent is this scope's frame.
    pub fn child(&self) -> Self {
        Self {
            frame: Frame::child_of(self.frame.clone()),
            globals: self.globals.clone(),
        }
    }

    /// The scope a closure created here keeps.
    pub fn capture(&self) -> Self {
        Self {
            frame: self.frame.capture(),
            globals: self.globals.clone(),
        }
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.globals.tools
    }

    pub fn pipes(&self) -> PipeConfig {
        self.globals.pipes
    }

    /// Frame that unqualified and `up:` searches start from.
    fn search_start(&self, ns: Option<Namespace>) -> Option<Arc<Frame>> {
        match ns {
            Some(Namespace::Up) => self.frame.parent.clone(),
            _ => Some(self.frame.clone()),
        }
    }

    /// Resolve a name to its frame and cell, honouring the namespace prefix.
    ///
    /// Builtin and env names never resolve to a cell.
    fn resolve(&self, name: &VarName) -> Option<(Arc<Frame>, Arc<Cell>)> {
        match name.namespace {
            Some(Namespace::Local) => self
                .frame
                .cell(&name.name)
                .map(|cell| (self.frame.clone(), cell)),
            Some(Namespace::Builtin) | Some(Namespace::Env) => None,
            ns => self.search_start(ns)?.find(&name.name),
        }
    }

    /// Look up a variable.
    pub fn lookup(&self, name: &VarName) -> EvalResult<Value> {
        let undefined = || EvalError::UndefinedName(name.to_string().trim_start_matches('$').to_string());
        match name.namespace {
            Some(Namespace::Env) => Ok(Value::str(std::env::var(&name.name).unwrap_or_default())),
            Some(Namespace::Builtin) => self.globals.builtin(&name.name).ok_or_else(undefined),
            Some(Namespace::Local) => self.resolve(name).map(|(_, c)| c.get()).ok_or_else(undefined),
            None | Some(Namespace::Up) => match self.resolve(name) {
                Some((_, cell)) => Ok(cell.get()),
                None => self.globals.builtin(&name.name).ok_or_else(undefined),
            },
        }
    }

    /// Look up a plain name without failing.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.lookup(&VarName::simple(name)).ok()
    }

    /// Bind `name` in a fresh cell.
    pub fn declare(&self, name: &VarName, value: Value) -> EvalResult<()> {
        match name.namespace {
            None | Some(Namespace::Local) => {
                self.frame.declare(&name.name, value);
                Ok(())
            }
            Some(Namespace::Up) => match &self.frame.parent {
                Some(parent) => {
                    parent.declare(&name.name, value);
                    Ok(())
                }
                None => Err(EvalError::UndefinedName(format!("up:{}", name.name))),
            },
            Some(Namespace::Env) => {
                set_env(&name.name, &value.to_string());
                Ok(())
            }
            Some(Namespace::Builtin) => Err(EvalError::ReadOnly(format!("builtin:{}", name.name))),
        }
    }

    /// Mutate an existing binding in place.
    pub fn assign(&self, name: &VarName, value: Value) -> EvalResult<()> {
        if name.namespace == Some(Namespace::Env) {
            set_env(&name.name, &value.to_string());
            return Ok(());
        }
        match self.resolve(name) {
            Some((_, cell)) => {
                cell.set(value);
                Ok(())
            }
            None => Err(self.missing(name)),
        }
    }

    /// Remove a binding from the frame that holds it.
    pub fn delete(&self, name: &VarName) -> EvalResult<()> {
        if name.namespace == Some(Namespace::Env) {
            remove_env(&name.name);
            return Ok(());
        }
        match self.resolve(name) {
            Some((frame, _)) => {
                frame.remove(&name.name);
                Ok(())
            }
            None => Err(self.missing(name)),
        }
    }

    /// Error for a name with no writable cell.
    fn missing(&self, name: &VarName) -> EvalError {
        let searched_builtin = matches!(name.namespace, None | Some(Namespace::Up | Namespace::Builtin));
        let display = name.to_string().trim_start_matches('$').to_string();
        if searched_builtin && self.globals.is_builtin(&name.name) {
            EvalError::ReadOnly(display)
        } else {
            EvalError::UndefinedName(display)
        }
    }

    /// A callable bound to `name` in the frame chain (not the builtin namespace).
    pub fn callable(&self, name: &str) -> Option<Value> {
        let (_, cell) = self.frame.find(name)?;
        let value = cell.get();
        value.is_callable().then_some(value)
    }
}

fn set_env(name: &str, value: &str) {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    // SAFETY: every environment write in this process goes through ENV_LOCK.
    unsafe { std::env::set_var(name, value) };
}

fn remove_env(name: &str) {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    // SAFETY: see set_env.
    unsafe { std::env::remove_var(name) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::register_builtins;

    fn session() -> Scope {
        let mut tools = ToolRegistry::new();
        register_builtins(&mut tools);
        Scope::new(Arc::new(Globals::new(Arc::new(tools), PipeConfig::default())))
    }

    fn var(s: &str) -> VarName {
        match s.split_once(':') {
            Some((ns, n)) => VarName::qualified(Namespace::from_prefix(ns).expect("namespace"), n),
            None => VarName::simple(s),
        }
    }

    #[test]
    fn builtin_vars_are_visible() {
        let scope = session();
        assert_eq!(scope.lookup(&var("true")).unwrap(), Value::Bool(true));
        assert_eq!(scope.lookup(&var("pid")).unwrap(), Value::str(std::process::id().to_string()));
        assert_eq!(scope.lookup(&var("builtin:put")).unwrap(), Value::Builtin("put".into()));
    }

    #[test]
    fn declare_shadows_in_child_only() {
        let outer = session();
        outer.declare(&var("x"), Value::str("ipsum")).unwrap();
        let inner = outer.child();
        inner.declare(&var("x"), Value::str("lorem")).unwrap();

        assert_eq!(inner.lookup(&var("x")).unwrap(), Value::str("lorem"));
        assert_eq!(inner.lookup(&var("up:x")).unwrap(), Value::str("ipsum"));
        assert_eq!(outer.lookup(&var("x")).unwrap(), Value::str("ipsum"));
    }

    #[test]
    fn assign_reaches_enclosing_frame() {
        let outer = session();
        outer.declare(&var("x"), Value::str("lorem")).unwrap();
        outer.child().assign(&var("x"), Value::str("ipsum")).unwrap();
        assert_eq!(outer.lookup(&var("x")).unwrap(), Value::str("ipsum"));
    }

    #[test]
    fn local_does_not_walk() {
        let outer = session();
        outer.declare(&var("x"), Value::str("lorem")).unwrap();
        let inner = outer.child();
        assert!(matches!(inner.lookup(&var("local:x")), Err(EvalError::UndefinedName(_))));
    }

    #[test]
    fn redeclare_makes_new_cell() {
        let scope = session();
        scope.declare(&var("x"), Value::str("a")).unwrap();
        let closure_view = scope.child();
        scope.declare(&var("x"), Value::str("b")).unwrap();
        assert_eq!(closure_view.lookup(&var("x")).unwrap(), Value::str("b"));
    }

    #[test]
    fn capture_shares_cells_but_not_later_shadows() {
        let scope = session();
        scope.declare(&var("x"), Value::str("a")).unwrap();
        let captured = scope.capture();

        scope.assign(&var("x"), Value::str("b")).unwrap();
        assert_eq!(captured.lookup(&var("x")).unwrap(), Value::str("b"));
        captured.assign(&var("x"), Value::str("c")).unwrap();
        assert_eq!(scope.lookup(&var("x")).unwrap(), Value::str("c"));

        scope.declare(&var("x"), Value::str("shadow")).unwrap();
        assert_eq!(captured.lookup(&var("x")).unwrap(), Value::str("c"));
        assert_eq!(scope.lookup(&var("x")).unwrap(), Value::str("shadow"));
    }

    #[test]
    fn capture_sees_names_declared_later() {
        let scope = session();
        let captured = scope.capture().child();
        scope.declare(&var("f"), Value::Builtin("put".into())).unwrap();
        assert_eq!(captured.callable("f"), Some(Value::Builtin("put".into())));
    }

    #[test]
    fn up_declare_from_capture_reaches_live_frame() {
        let scope = session();
        let call_frame = scope.capture().child();
        call_frame.declare(&var("up:y"), Value::str("lorem")).unwrap();
        assert_eq!(scope.lookup(&var("y")).unwrap(), Value::str("lorem"));

        call_frame.delete(&var("up:y")).unwrap();
        assert!(scope.lookup(&var("y")).is_err());
    }

    #[test]
    fn builtin_is_read_only() {
        let scope = session();
        assert!(matches!(scope.declare(&var("builtin:x"), Value::str("a")), Err(EvalError::ReadOnly(_))));
        assert!(matches!(scope.assign(&var("true"), Value::str("a")), Err(EvalError::ReadOnly(_))));
        assert!(matches!(scope.delete(&var("pid")), Err(EvalError::ReadOnly(_))));
    }

    #[test]
    fn missing_names() {
        let scope = session();
        assert!(matches!(scope.lookup(&var("nope")), Err(EvalError::UndefinedName(_))));
        assert!(matches!(scope.assign(&var("nope"), Value::str("a")), Err(EvalError::UndefinedName(_))));
        assert!(matches!(scope.delete(&var("nope")), Err(EvalError::UndefinedName(_))));
        assert!(matches!(scope.declare(&var("up:x"), Value::str("a")), Err(EvalError::UndefinedName(_))));
    }

    #[test]
    fn delete_removes_binding() {
        let scope = session();
        scope.declare(&var("x"), Value::str("a")).unwrap();
        scope.delete(&var("x")).unwrap();
        assert!(scope.lookup(&var("x")).is_err());
    }

    #[test]
    fn env_roundtrip() {
        let scope = session();
        let name = format!("RILL_SCOPE_TEST_{}", std::process::id());
        let qualified = VarName::qualified(Namespace::Env, name.clone());
        scope.assign(&qualified, Value::str("lorem")).unwrap();
        assert_eq!(scope.lookup(&qualified).unwrap(), Value::str("lorem"));
        scope.delete(&qualified).unwrap();
        assert_eq!(scope.lookup(&qualified).unwrap(), Value::str(""));
    }

    #[test]
    fn callable_lookup_skips_plain_values() {
        let scope = session();
        scope.declare(&var("put"), Value::str("not a function")).unwrap();
        assert!(scope.callable("put").is_none());
        scope.declare(&var("f"), Value::Builtin("echo".into())).unwrap();
        assert_eq!(scope.callable("f"), Some(Value::Builtin("echo".into())));
    }
}
