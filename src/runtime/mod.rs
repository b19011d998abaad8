//! The tree-walking runtime: values, scopes, and the evaluator.

pub mod concurrent;
pub mod convert;
pub mod env;
pub mod expr;
pub mod interop;
pub mod ops;
pub mod stmt;
pub mod value;

pub use concurrent::{spawn_task, task_faults, ChanRef};
pub use env::{Env, Sinks};
pub use expr::{call_value, eval_expr};
pub use interop::{HostObject, ObjectRef};
pub use stmt::{exec_block, exec_stmt, Signal};
pub use value::{ArrayRef, FuncDef, MapKey, MapRef, ModuleDef, NativeImpl, TypeDef, Value};

use crate::ast::Program;
use crate::error::{Fault, KeshResult};

/// Run a parsed program to completion in `env`.
///
/// The program's value is its last expression statement's; `return` at
/// the top level ends it early with the returned value. Faults that no
/// `try` consumed come back as errors.
pub fn execute(program: &Program, env: &Env) -> KeshResult<Value> {
    let mut last = Value::Nil;
    for stmt in &program.stmts {
        match stmt::exec_stmt(stmt, env) {
            Signal::Normal(value) => last = value,
            Signal::Return(value) => return Ok(value),
            Signal::Break => return Err(Fault::flow("break outside loop", stmt.span()).into()),
            Signal::Continue => {
                return Err(Fault::flow("continue outside loop", stmt.span()).into())
            }
            Signal::Throw(fault) => return Err(fault.into()),
        }
    }
    Ok(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KeshError;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use pretty_assertions::assert_eq;

    fn run(src: &str) -> KeshResult<Value> {
        let tokens = Lexer::new(src).tokenize()?;
        let program = Parser::new(&tokens).parse()?;
        let env = Env::root();
        crate::stdlib::install_prelude(&env);
        execute(&program, &env)
    }

    #[test]
    fn test_empty_program_is_nil() {
        assert!(run("").unwrap().is_nil());
        assert!(run("\n\n# just a comment\n").unwrap().is_nil());
    }

    #[test]
    fn test_program_value_is_last_expression() {
        assert_eq!(run("1\n2\n3").unwrap().to_string(), "3");
        // Declarations at the end still carry their value.
        assert_eq!(run("var x = 9").unwrap().to_string(), "9");
    }

    #[test]
    fn test_uncaught_faults_map_to_errors() {
        assert!(matches!(run("missing"), Err(KeshError::Lookup { .. })));
        assert!(matches!(run("1 + nil"), Err(KeshError::Coerce { .. })));
        assert!(matches!(run("[1][5]"), Err(KeshError::Range { .. })));
        match run("throw 3") {
            Err(KeshError::Thrown { payload, .. }) => assert_eq!(payload.to_string(), "3"),
            other => panic!("expected an uncaught throw, got {:?}", other),
        }
    }

    #[test]
    fn test_aliasing_is_by_reference() {
        let src = "
var a = [1, 2]
var b = a
b[0] = 99
a[0]
";
        assert_eq!(run(src).unwrap().to_string(), "99");
        let src = "
var m = {\"n\": 1}
var m2 = m
m2.n = 5
m.n
";
        assert_eq!(run(src).unwrap().to_string(), "5");
    }

    #[test]
    fn test_deep_call_chain() {
        let src = "
func fib(n) {
    n < 2 ? n : fib(n - 1) + fib(n - 2)
}
fib(15)
";
        assert_eq!(run(src).unwrap().to_string(), "610");
    }
}
