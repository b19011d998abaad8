//! # kesh
//!
//! An embeddable, dynamically-typed scripting language with Go-flavored
//! syntax: closures, ordered maps, array views, channels and `go` tasks,
//! `try`/`catch`/`finally`, and a small importable standard library.
//!
//! ## The language
//! ```kesh
//! func greet(name) {
//!     return "hello " + name
//! }
//!
//! var ch = make(chan, 1)
//! go func() {
//!     ch <- greet("kesh")
//! }()
//! println(<-ch)
//! ```
//!
//! ## Embedding
//! ```
//! use kesh::{Interp, Value};
//!
//! let interp = Interp::new();
//! interp.define("limit", Value::Int(10));
//! let value = interp.run("limit * 2").unwrap();
//! assert_eq!(value.to_string(), "20");
//! ```

pub mod ast;
pub mod diagnostics;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod span;
pub mod stdlib;

pub use error::{EvalResult, Fault, FaultKind, KeshError, KeshResult};
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::Parser;
pub use runtime::{Env, HostObject, ObjectRef, Signal, Value};
pub use span::Span;

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Lex and parse source into a program.
pub fn parse(source: &str) -> KeshResult<ast::Program> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(&tokens).parse()
}

/// An interpreter instance: one root scope, the prelude, and the output
/// sinks scripts print through. Cheap handles to the same scope tree are
/// shared with every closure and spawned task, so an `Interp` can keep
/// running scripts against accumulated state.
pub struct Interp {
    env: Env,
}

impl Interp {
    pub fn new() -> Interp {
        let env = Env::root();
        stdlib::install_prelude(&env);
        Interp { env }
    }

    /// The root scope, for direct manipulation.
    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Run a script and return its value.
    pub fn run(&self, source: &str) -> KeshResult<Value> {
        let program = parse(source)?;
        runtime::execute(&program, &self.env)
    }

    /// Run a script from a file.
    pub fn run_file(&self, path: impl AsRef<Path>) -> KeshResult<Value> {
        let source = fs::read_to_string(path)?;
        self.run(&source)
    }

    /// Define a global visible to scripts.
    pub fn define(&self, name: &str, value: impl Into<Value>) {
        self.env.define(name, value.into());
    }

    /// Read a global, including ones scripts defined.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.env.lookup(name)
    }

    /// Register a native function under `name`.
    pub fn register(&self, name: &str, imp: runtime::NativeImpl) {
        self.env
            .define(name, Value::NativeFn(name.to_string(), imp));
    }

    /// Register a named record type; `make(name)` and `new(name)` build
    /// a map with these fields preset to nil.
    pub fn register_type(&self, name: &str, fields: &[&str]) {
        let def = runtime::TypeDef {
            name: name.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        };
        self.env.define(name, Value::Type(Arc::new(def)));
    }

    /// Expose a host object to scripts under `name`.
    pub fn register_object(&self, name: &str, object: ObjectRef) {
        self.env.define(name, Value::Object(object));
    }

    /// Redirect standard output for this interpreter's scripts.
    pub fn set_out(&self, sink: Box<dyn Write + Send>) {
        self.env.set_out(sink);
    }

    /// Redirect standard error for this interpreter's scripts.
    pub fn set_err(&self, sink: Box<dyn Write + Send>) {
        self.env.set_err(sink);
    }

    /// Call a script value from the host.
    pub fn call(&self, callee: &Value, args: Vec<Value>) -> KeshResult<Value> {
        runtime::call_value(callee, args, &self.env, Span::default()).map_err(KeshError::from)
    }

    /// Faults reported by `go` tasks since the last drain.
    pub fn task_faults(&self) -> Vec<Fault> {
        runtime::task_faults()
    }
}

impl Default for Interp {
    fn default() -> Self {
        Interp::new()
    }
}

pub const VERSION: &str = "0.1.0";

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_interp_state_persists_across_runs() {
        let interp = Interp::new();
        interp.run("var total = 1").unwrap();
        interp.run("total += 10").unwrap();
        assert_eq!(interp.run("total").unwrap().to_string(), "11");
        assert_eq!(interp.get("total").unwrap().to_string(), "11");
    }

    #[test]
    fn test_host_defined_globals() {
        let interp = Interp::new();
        interp.define("greeting", Value::Str("hi".to_string()));
        assert_eq!(interp.run("greeting + \"!\"").unwrap().to_string(), "hi!");
    }

    #[test]
    fn test_define_converts_rust_values() {
        let interp = Interp::new();
        interp.define("n", 21i64);
        interp.define("name", "kesh");
        interp.define("ratio", 0.5);
        interp.define("on", true);
        assert_eq!(
            interp.run("string(n * 2) + \" \" + name").unwrap().to_string(),
            "42 kesh"
        );
        assert_eq!(interp.run("on ? ratio * 2 : 0").unwrap().to_string(), "1");
    }

    #[test]
    fn test_run_file() {
        let path = std::env::temp_dir().join("kesh_lib_run_file.kesh");
        fs::write(&path, "var x = 6\nx * 7").unwrap();
        let interp = Interp::new();
        assert_eq!(interp.run_file(&path).unwrap().to_string(), "42");
        fs::remove_file(&path).ok();
        assert!(matches!(
            interp.run_file("/nonexistent/kesh_script.kesh"),
            Err(KeshError::Io(_))
        ));
    }

    #[test]
    fn test_register_native() {
        let interp = Interp::new();
        interp.register("twice", |_env, args| {
            Ok(Value::Int(args[0].as_int()? * 2))
        });
        assert_eq!(interp.run("twice(21)").unwrap().to_string(), "42");
    }

    #[test]
    fn test_register_type() {
        let interp = Interp::new();
        interp.register_type("point", &["x", "y"]);
        let src = "
var p = new(point)
p.x = 3
p.y = 4
p.x * p.x + p.y * p.y
";
        assert_eq!(interp.run(src).unwrap().to_string(), "25");
        assert!(interp.run("make(point).x").unwrap().is_nil());
    }

    #[test]
    fn test_call_script_function_from_host() {
        let interp = Interp::new();
        interp.run("func add(a, b) {\n    return a + b\n}").unwrap();
        let add = interp.get("add").unwrap();
        let out = interp
            .call(&add, vec![Value::Int(2), Value::Int(40)])
            .unwrap();
        assert_eq!(out.to_string(), "42");
    }

    #[test]
    fn test_parse_error_surfaces() {
        let interp = Interp::new();
        assert!(matches!(
            interp.run("var = 3"),
            Err(KeshError::Syntax { .. })
        ));
    }
}
