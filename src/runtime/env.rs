//! kesh environments
//!
//! Scopes form a parent-linked chain of shared handles. Closures hold the
//! handle of their defining scope, so a name resolved at call time sees
//! mutations made after the closure was built (late binding). Lock order
//! is always child before parent; walks drop each guard before taking the
//! next one.

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, RwLock};

use crate::runtime::value::Value;

/// Where `print`-family natives write. Replaceable at runtime through any
/// environment handle; all handles of one interpreter share the pair.
pub struct Sinks {
    pub out: Mutex<Box<dyn Write + Send>>,
    pub err: Mutex<Box<dyn Write + Send>>,
}

impl Sinks {
    pub fn stdio() -> Arc<Sinks> {
        Arc::new(Sinks {
            out: Mutex::new(Box::new(io::stdout())),
            err: Mutex::new(Box::new(io::stderr())),
        })
    }
}

struct Scope {
    vars: HashMap<String, Value>,
    parent: Option<Env>,
}

/// A cheap-to-clone handle on one scope in the chain.
#[derive(Clone)]
pub struct Env {
    scope: Arc<RwLock<Scope>>,
    sinks: Arc<Sinks>,
}

impl Env {
    /// A fresh root scope writing to stdout/stderr.
    pub fn root() -> Env {
        Env::with_sinks(Sinks::stdio())
    }

    pub fn with_sinks(sinks: Arc<Sinks>) -> Env {
        Env {
            scope: Arc::new(RwLock::new(Scope {
                vars: HashMap::new(),
                parent: None,
            })),
            sinks,
        }
    }

    /// A new scope whose parent is this one.
    pub fn child(&self) -> Env {
        Env {
            scope: Arc::new(RwLock::new(Scope {
                vars: HashMap::new(),
                parent: Some(self.clone()),
            })),
            sinks: Arc::clone(&self.sinks),
        }
    }

    /// Creates or overwrites `name` in THIS scope.
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.scope.write().unwrap().vars.insert(name.into(), value);
    }

    /// Updates `name` in the nearest scope that holds it. Returns false
    /// when no scope in the chain knows the name.
    pub fn assign(&self, name: &str, value: Value) -> bool {
        match self.scope_holding(name) {
            Some(env) => {
                env.scope
                    .write()
                    .unwrap()
                    .vars
                    .insert(name.to_string(), value);
                true
            }
            None => false,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut current = self.clone();
        loop {
            let (hit, next) = {
                let scope = current.scope.read().unwrap();
                (scope.vars.get(name).cloned(), scope.parent.clone())
            };
            if hit.is_some() {
                return hit;
            }
            current = next?;
        }
    }

    /// Reads `name` from this scope only, ignoring parents. Module member
    /// access resolves against exports this way.
    pub fn get_local(&self, name: &str) -> Option<Value> {
        self.scope.read().unwrap().vars.get(name).cloned()
    }

    fn scope_holding(&self, name: &str) -> Option<Env> {
        let mut current = self.clone();
        loop {
            let (found, next) = {
                let scope = current.scope.read().unwrap();
                (scope.vars.contains_key(name), scope.parent.clone())
            };
            if found {
                return Some(current);
            }
            current = next?;
        }
    }

    pub fn same_scope(&self, other: &Env) -> bool {
        Arc::ptr_eq(&self.scope, &other.scope)
    }

    // === OUTPUT ===

    pub fn set_out(&self, sink: Box<dyn Write + Send>) {
        *self.sinks.out.lock().unwrap() = sink;
    }

    pub fn set_err(&self, sink: Box<dyn Write + Send>) {
        *self.sinks.err.lock().unwrap() = sink;
    }

    /// Write errors are dropped; a broken sink must not fault a script.
    pub fn write_out(&self, text: &str) {
        let mut out = self.sinks.out.lock().unwrap();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    pub fn write_err(&self, text: &str) {
        let mut err = self.sinks.err.lock().unwrap();
        let _ = err.write_all(text.as_bytes());
        let _ = err.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_at(env: &Env, name: &str) -> i64 {
        match env.lookup(name) {
            Some(Value::Int(n)) => n,
            other => panic!("expected int for {}, got {:?}", name, other),
        }
    }

    #[test]
    fn test_define_and_lookup() {
        let env = Env::root();
        env.define("x", Value::Int(1));
        assert_eq!(int_at(&env, "x"), 1);
        assert!(env.lookup("missing").is_none());
    }

    #[test]
    fn test_child_sees_parent() {
        let root = Env::root();
        root.define("x", Value::Int(1));
        let child = root.child();
        assert_eq!(int_at(&child, "x"), 1);
    }

    #[test]
    fn test_define_shadows() {
        let root = Env::root();
        root.define("x", Value::Int(1));
        let child = root.child();
        child.define("x", Value::Int(2));
        assert_eq!(int_at(&child, "x"), 2);
        assert_eq!(int_at(&root, "x"), 1);
    }

    #[test]
    fn test_assign_updates_owning_scope() {
        let root = Env::root();
        root.define("x", Value::Int(1));
        let child = root.child();
        assert!(child.assign("x", Value::Int(5)));
        assert_eq!(int_at(&root, "x"), 5);
        assert!(!child.assign("missing", Value::Int(0)));
    }

    #[test]
    fn test_handles_share_mutations() {
        // the late-binding property closures rely on
        let env = Env::root();
        let alias = env.clone();
        env.define("n", Value::Int(1));
        alias.define("n", Value::Int(2));
        assert_eq!(int_at(&env, "n"), 2);
    }

    #[test]
    fn test_sink_capture() {
        struct Buf(Arc<Mutex<Vec<u8>>>);
        impl Write for Buf {
            fn write(&mut self, data: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(data);
                Ok(data.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let captured = Arc::new(Mutex::new(Vec::new()));
        let env = Env::root();
        env.set_out(Box::new(Buf(Arc::clone(&captured))));
        env.write_out("hello");
        // children share the sink pair
        env.child().write_out(" world");
        assert_eq!(String::from_utf8(captured.lock().unwrap().clone()).unwrap(), "hello world");
    }
}
