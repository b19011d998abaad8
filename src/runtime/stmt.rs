//! Statement execution.
//!
//! Statements produce a `Signal` rather than a `Result`: `break`,
//! `continue` and `return` travel the same path as faults until some
//! construct consumes them. Faults become `Signal::Throw` at the
//! statement boundary and turn back into `Err` at call boundaries.

use std::sync::Arc;

use crate::ast::{Block, Expr, Stmt};
use crate::error::{EvalResult, Fault};
use crate::runtime::concurrent;
use crate::runtime::env::Env;
use crate::runtime::expr::{self, eval_expr};
use crate::runtime::ops;
use crate::runtime::value::{MapKey, ModuleDef, Value};
use crate::span::Span;

/// What a statement did. `Normal` carries the statement's value so a
/// block can report its last one.
#[derive(Debug)]
pub enum Signal {
    Normal(Value),
    Return(Value),
    Break,
    Continue,
    Throw(Fault),
}

// Unwrap an eval result inside the executor, turning faults into signals.
macro_rules! eval {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(fault) => return Signal::Throw(fault),
        }
    };
}

// === BLOCKS ===

pub fn exec_block(block: &Block, env: &Env) -> Signal {
    let mut last = Value::Nil;
    for stmt in &block.stmts {
        match exec_stmt(stmt, env) {
            Signal::Normal(value) => last = value,
            other => return other,
        }
    }
    Signal::Normal(last)
}

// === STATEMENTS ===

pub fn exec_stmt(stmt: &Stmt, env: &Env) -> Signal {
    match stmt {
        Stmt::Expr { expr, .. } => Signal::Normal(eval!(eval_expr(expr, env))),

        Stmt::Var { names, exprs, span } => {
            if names.len() == 2 && exprs.len() == 1 {
                match eval!(probe_pair_source(&exprs[0], env)) {
                    PairSource::Pair(value, flag) => {
                        env.define(names[0].as_str(), value.clone());
                        env.define(names[1].as_str(), flag);
                        return Signal::Normal(value);
                    }
                    PairSource::Single(value) => return spread_define(names, value, env, *span),
                    PairSource::Plain => {}
                }
            }
            let mut values = Vec::with_capacity(exprs.len());
            for e in exprs {
                values.push(eval!(eval_expr(e, env)));
            }
            if values.len() == names.len() {
                let last = values.last().cloned().unwrap_or(Value::Nil);
                for (name, value) in names.iter().zip(values) {
                    env.define(name.as_str(), value);
                }
                Signal::Normal(last)
            } else if values.len() == 1 {
                // A single array spreads across multiple names.
                let value = values.pop().unwrap_or(Value::Nil);
                spread_define(names, value, env, *span)
            } else {
                Signal::Throw(Fault::arity(
                    format!(
                        "cannot assign {} values to {} targets",
                        values.len(),
                        names.len()
                    ),
                    *span,
                ))
            }
        }

        Stmt::Assign {
            targets,
            exprs,
            span,
        } => exec_assign(targets, exprs, env, *span),

        Stmt::If {
            cond,
            then_block,
            else_block,
            ..
        } => {
            if eval!(eval_expr(cond, env)).as_bool() {
                exec_block(then_block, &env.child())
            } else if let Some(block) = else_block {
                exec_block(block, &env.child())
            } else {
                Signal::Normal(Value::Nil)
            }
        }

        Stmt::Try {
            body,
            catch_name,
            catch_block,
            finally_block,
            ..
        } => {
            let body_signal = exec_block(body, &env.child());
            let mut result = match (body_signal, catch_block) {
                (Signal::Throw(fault), Some(catch)) => {
                    let scope = env.child();
                    if let Some(name) = catch_name {
                        scope.define(name.as_str(), fault.catch_value());
                    }
                    exec_block(catch, &scope)
                }
                (signal, _) => signal,
            };
            if let Some(finally) = finally_block {
                let finally_signal = exec_block(finally, &env.child());
                // A non-normal finally outcome replaces whatever came
                // before it.
                if !matches!(finally_signal, Signal::Normal(_)) {
                    result = finally_signal;
                }
            }
            result
        }

        Stmt::Loop { cond, body, .. } => {
            loop {
                if let Some(cond_expr) = cond {
                    if !eval!(eval_expr(cond_expr, env)).as_bool() {
                        break;
                    }
                }
                match exec_block(body, &env.child()) {
                    Signal::Break => break,
                    Signal::Continue | Signal::Normal(_) => {}
                    other => return other,
                }
            }
            Signal::Normal(Value::Nil)
        }

        Stmt::ForIn {
            names,
            iterable,
            body,
            span,
        } => exec_for_in(names, iterable, body, env, *span),

        Stmt::ForC {
            init,
            cond,
            post,
            body,
            ..
        } => {
            // init and post run in the loop's own scope; the body gets a
            // fresh child each iteration.
            let loop_env = env.child();
            if let Some(init_stmt) = init {
                match exec_stmt(init_stmt, &loop_env) {
                    Signal::Normal(_) => {}
                    other => return other,
                }
            }
            loop {
                if let Some(cond_expr) = cond {
                    if !eval!(eval_expr(cond_expr, &loop_env)).as_bool() {
                        break;
                    }
                }
                match exec_block(body, &loop_env.child()) {
                    Signal::Break => break,
                    Signal::Continue | Signal::Normal(_) => {}
                    other => return other,
                }
                if let Some(post_stmt) = post {
                    match exec_stmt(post_stmt, &loop_env) {
                        Signal::Normal(_) => {}
                        other => return other,
                    }
                }
            }
            Signal::Normal(Value::Nil)
        }

        Stmt::Switch {
            subject,
            cases,
            default,
            ..
        } => {
            let subject_value = eval!(eval_expr(subject, env));
            for case in cases {
                for candidate in &case.exprs {
                    let value = eval!(eval_expr(candidate, env));
                    if ops::values_equal(&subject_value, &value) {
                        return run_case(&case.body, env);
                    }
                }
            }
            match default {
                Some(block) => run_case(block, env),
                None => Signal::Normal(Value::Nil),
            }
        }

        Stmt::Throw { expr, span } => {
            let payload = eval!(eval_expr(expr, env));
            Signal::Throw(Fault::thrown(payload, *span))
        }

        Stmt::Module { name, body, .. } => {
            let exports = env.child();
            match exec_block(body, &exports) {
                Signal::Normal(_) => {}
                other => return other,
            }
            env.define(
                name.as_str(),
                Value::Module(Arc::new(ModuleDef {
                    name: name.clone(),
                    exports,
                })),
            );
            Signal::Normal(Value::Nil)
        }

        Stmt::Go { call, span } => {
            // Callee and arguments are fixed before the task starts, so
            // races only involve what the closure captured.
            let parts = match call {
                Expr::Call {
                    callee,
                    args,
                    spread,
                    span: call_span,
                } => expr::eval_call_parts(callee, args, *spread, env, *call_span),
                other => Err(Fault::coerce("expected a call after go", other.span())),
            };
            let (target, args) = eval!(parts);
            let task_env = env.clone();
            let call_span = *span;
            concurrent::spawn_task(move || {
                expr::call_value(&target, args, &task_env, call_span)
            });
            Signal::Normal(Value::Nil)
        }

        Stmt::Delete { target, key, span } => {
            let container = eval!(eval_expr(target, env));
            let key_value = eval!(eval_expr(key, env));
            match &container {
                Value::Map(map) => {
                    let map_key = eval!(MapKey::from_value(&key_value, *span));
                    map.remove(&map_key);
                    Signal::Normal(Value::Nil)
                }
                other => Signal::Throw(Fault::coerce(
                    format!("delete needs a map, got {}", other.type_name()),
                    *span,
                )),
            }
        }

        Stmt::Close { chan, span } => {
            let target = eval!(eval_expr(chan, env));
            match &target {
                Value::Chan(ch) => {
                    eval!(ch.close(*span));
                    Signal::Normal(Value::Nil)
                }
                other => Signal::Throw(Fault::coerce(
                    format!("close needs a channel, got {}", other.type_name()),
                    *span,
                )),
            }
        }

        Stmt::Send { chan, value, span } => {
            let target = eval!(eval_expr(chan, env));
            let payload = eval!(eval_expr(value, env));
            match &target {
                Value::Chan(ch) => {
                    eval!(ch.send(payload, *span));
                    Signal::Normal(Value::Nil)
                }
                other => Signal::Throw(Fault::coerce(
                    format!("cannot send to {}", other.type_name()),
                    *span,
                )),
            }
        }

        Stmt::Break { .. } => Signal::Break,

        Stmt::Continue { .. } => Signal::Continue,

        Stmt::Return { exprs, .. } => {
            let mut values = Vec::with_capacity(exprs.len());
            for e in exprs {
                values.push(eval!(eval_expr(e, env)));
            }
            let value = if values.len() == 1 {
                values.pop().unwrap_or(Value::Nil)
            } else if values.is_empty() {
                Value::Nil
            } else {
                // `return a, b` packs into an array.
                Value::array(values)
            };
            Signal::Return(value)
        }
    }
}

// === ASSIGNMENT ===

/// Outcome of probing `<-ch` / `m[k]` on the right of a two-name binding.
enum PairSource {
    Pair(Value, Value),
    /// The expression matched by shape but produced one value; holds it
    /// so the fallback path does not evaluate the expression twice.
    Single(Value),
    Plain,
}

fn probe_pair_source(expr: &Expr, env: &Env) -> EvalResult<PairSource> {
    match expr {
        Expr::Recv { chan, span } => {
            let target = eval_expr(chan, env)?;
            match &target {
                Value::Chan(ch) => {
                    let (value, open) = ch.recv();
                    Ok(PairSource::Pair(value, Value::Bool(open)))
                }
                other => Err(Fault::coerce(
                    format!("cannot receive from {}", other.type_name()),
                    *span,
                )),
            }
        }
        Expr::Index {
            object,
            index,
            span,
        } => {
            let container = eval_expr(object, env)?;
            let key = eval_expr(index, env)?;
            if let Value::Map(map) = &container {
                let map_key = MapKey::from_value(&key, *span)?;
                let found = map.contains(&map_key);
                let value = map.get(&map_key).unwrap_or(Value::Nil);
                Ok(PairSource::Pair(value, Value::Bool(found)))
            } else {
                Ok(PairSource::Single(expr::index_value(
                    &container, &key, *span,
                )?))
            }
        }
        _ => Ok(PairSource::Plain),
    }
}

fn exec_assign(targets: &[Expr], exprs: &[Expr], env: &Env, span: Span) -> Signal {
    // Two-value forms: `v, ok = <-ch` and `v, ok = m[k]`.
    if targets.len() == 2 && exprs.len() == 1 {
        match eval!(probe_pair_source(&exprs[0], env)) {
            PairSource::Pair(value, flag) => {
                eval!(assign_target(&targets[0], value.clone(), env));
                eval!(assign_target(&targets[1], flag, env));
                return Signal::Normal(value);
            }
            PairSource::Single(value) => return spread_assign(targets, value, env, span),
            PairSource::Plain => {}
        }
    }

    let mut values = Vec::with_capacity(exprs.len());
    for e in exprs {
        values.push(eval!(eval_expr(e, env)));
    }
    if values.len() == targets.len() {
        let last = values.last().cloned().unwrap_or(Value::Nil);
        for (target, value) in targets.iter().zip(values) {
            eval!(assign_target(target, value, env));
        }
        Signal::Normal(last)
    } else if values.len() == 1 {
        let value = values.pop().unwrap_or(Value::Nil);
        spread_assign(targets, value, env, span)
    } else {
        Signal::Throw(Fault::arity(
            format!(
                "cannot assign {} values to {} targets",
                values.len(),
                targets.len()
            ),
            span,
        ))
    }
}

fn spread_define(names: &[String], value: Value, env: &Env, span: Span) -> Signal {
    let items = match &value {
        Value::Array(arr) if arr.len() == names.len() => arr.to_vec(),
        Value::Array(arr) => {
            return Signal::Throw(Fault::arity(
                format!(
                    "cannot assign {} values to {} targets",
                    arr.len(),
                    names.len()
                ),
                span,
            ))
        }
        _ => {
            return Signal::Throw(Fault::arity(
                format!("cannot assign 1 value to {} targets", names.len()),
                span,
            ))
        }
    };
    for (name, item) in names.iter().zip(items) {
        env.define(name.as_str(), item);
    }
    Signal::Normal(value)
}

fn spread_assign(targets: &[Expr], value: Value, env: &Env, span: Span) -> Signal {
    let items = match &value {
        Value::Array(arr) if arr.len() == targets.len() => arr.to_vec(),
        Value::Array(arr) => {
            return Signal::Throw(Fault::arity(
                format!(
                    "cannot assign {} values to {} targets",
                    arr.len(),
                    targets.len()
                ),
                span,
            ))
        }
        _ => {
            return Signal::Throw(Fault::arity(
                format!("cannot assign 1 value to {} targets", targets.len()),
                span,
            ))
        }
    };
    for (target, item) in targets.iter().zip(items) {
        eval!(assign_target(target, item, env));
    }
    Signal::Normal(value)
}

fn assign_target(target: &Expr, value: Value, env: &Env) -> EvalResult<()> {
    match target {
        Expr::Ident { name, .. } => {
            // Assignment defines the name here when no scope holds it.
            if !env.assign(name, value.clone()) {
                env.define(name.as_str(), value);
            }
            Ok(())
        }
        Expr::Member { object, name, span } => {
            let container = eval_expr(object, env)?;
            match &container {
                Value::Map(map) => {
                    map.insert(MapKey::Str(name.clone()), value);
                    Ok(())
                }
                Value::Object(obj) => obj.set_field(name, value, *span),
                other => Err(Fault::coerce(
                    format!(
                        "cannot assign to member '{}' of {}",
                        name,
                        other.type_name()
                    ),
                    *span,
                )),
            }
        }
        Expr::Index {
            object,
            index,
            span,
        } => {
            let container = eval_expr(object, env)?;
            let key = eval_expr(index, env)?;
            match &container {
                Value::Array(items) => {
                    let idx = key.as_int().map_err(|fault| fault.at(*span))?;
                    let len = items.len();
                    // Writing one past the end appends; views refuse it.
                    if idx < 0 || !items.set(idx as usize, value) {
                        return Err(Fault::range(
                            format!("array index {} out of range (len {})", idx, len),
                            *span,
                        ));
                    }
                    Ok(())
                }
                Value::Map(map) => {
                    map.insert(MapKey::from_value(&key, *span)?, value);
                    Ok(())
                }
                other => Err(Fault::coerce(
                    format!("cannot index {}", other.type_name()),
                    *span,
                )),
            }
        }
        // The parser only produces the three target shapes above.
        other => Err(Fault::coerce("invalid assignment target", other.span())),
    }
}

// === LOOPS AND SWITCH ===

fn exec_for_in(names: &[String], iterable: &Expr, body: &Block, env: &Env, span: Span) -> Signal {
    if names.is_empty() || names.len() > 2 {
        return Signal::Throw(Fault::arity("for loop binds at most 2 names", span));
    }
    let subject = eval!(eval_expr(iterable, env));
    match &subject {
        Value::Array(items) => {
            // Iterate a snapshot so body mutations cannot shift the walk.
            for (i, item) in items.to_vec().into_iter().enumerate() {
                let scope = env.child();
                if names.len() == 2 {
                    scope.define(names[0].as_str(), Value::Int(i as i64));
                    scope.define(names[1].as_str(), item);
                } else {
                    scope.define(names[0].as_str(), item);
                }
                match exec_block(body, &scope) {
                    Signal::Break => break,
                    Signal::Continue | Signal::Normal(_) => {}
                    other => return other,
                }
            }
            Signal::Normal(Value::Nil)
        }
        Value::Map(map) => {
            for (key, value) in map.pairs() {
                let scope = env.child();
                if names.len() == 2 {
                    scope.define(names[0].as_str(), key.to_value());
                    scope.define(names[1].as_str(), value);
                } else {
                    scope.define(names[0].as_str(), key.to_value());
                }
                match exec_block(body, &scope) {
                    Signal::Break => break,
                    Signal::Continue | Signal::Normal(_) => {}
                    other => return other,
                }
            }
            Signal::Normal(Value::Nil)
        }
        Value::Str(text) => {
            for (i, ch) in text.chars().enumerate() {
                let scope = env.child();
                let item = Value::Str(ch.to_string());
                if names.len() == 2 {
                    scope.define(names[0].as_str(), Value::Int(i as i64));
                    scope.define(names[1].as_str(), item);
                } else {
                    scope.define(names[0].as_str(), item);
                }
                match exec_block(body, &scope) {
                    Signal::Break => break,
                    Signal::Continue | Signal::Normal(_) => {}
                    other => return other,
                }
            }
            Signal::Normal(Value::Nil)
        }
        Value::Chan(ch) => {
            if names.len() != 1 {
                return Signal::Throw(Fault::arity("channel loop binds one name", span));
            }
            loop {
                let (value, open) = ch.recv();
                if !open {
                    break;
                }
                let scope = env.child();
                scope.define(names[0].as_str(), value);
                match exec_block(body, &scope) {
                    Signal::Break => break,
                    Signal::Continue | Signal::Normal(_) => {}
                    other => return other,
                }
            }
            Signal::Normal(Value::Nil)
        }
        other => Signal::Throw(Fault::coerce(
            format!("cannot iterate over {}", other.type_name()),
            span,
        )),
    }
}

fn run_case(body: &Block, env: &Env) -> Signal {
    // `break` ends the switch, not an enclosing loop.
    match exec_block(body, &env.child()) {
        Signal::Break => Signal::Normal(Value::Nil),
        other => other,
    }
}

// === TESTS ===

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FaultKind, KeshError};
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use pretty_assertions::assert_eq;

    fn run(src: &str) -> Value {
        let tokens = Lexer::new(src).tokenize().unwrap();
        let program = Parser::new(&tokens).parse().unwrap();
        let env = Env::root();
        crate::stdlib::install_prelude(&env);
        crate::runtime::execute(&program, &env).unwrap()
    }

    fn run_fault(src: &str) -> Fault {
        let tokens = Lexer::new(src).tokenize().unwrap();
        let program = Parser::new(&tokens).parse().unwrap();
        let env = Env::root();
        crate::stdlib::install_prelude(&env);
        let block = Block {
            stmts: program.stmts,
            span: program.span,
        };
        match exec_block(&block, &env) {
            Signal::Throw(fault) => fault,
            other => panic!("expected a fault, got {:?}", other),
        }
    }

    fn run_err(src: &str) -> KeshError {
        let tokens = Lexer::new(src).tokenize().unwrap();
        let program = Parser::new(&tokens).parse().unwrap();
        let env = Env::root();
        crate::stdlib::install_prelude(&env);
        crate::runtime::execute(&program, &env).unwrap_err()
    }

    #[test]
    fn test_var_forms() {
        assert_eq!(run("var x = 5\nx").to_string(), "5");
        assert_eq!(run("var a, b = 1, 2\na + b").to_string(), "3");
        // One array on the right spreads across the names.
        assert_eq!(run("var a, b = [10, 20]\na + b").to_string(), "30");
        let fault = run_fault("var a, b = [1, 2, 3]");
        assert_eq!(fault.kind, FaultKind::Arity);
        assert_eq!(fault.message, "cannot assign 3 values to 2 targets");
        let fault = run_fault("var a, b = 1");
        assert_eq!(fault.kind, FaultKind::Arity);
    }

    #[test]
    fn test_assign_defines_missing_name() {
        assert_eq!(run("x = 7\nx").to_string(), "7");
        // Inner scopes write through to the defining scope.
        let src = "
var n = 1
if true {
    n = 2
}
n
";
        assert_eq!(run(src).to_string(), "2");
    }

    #[test]
    fn test_block_scope_does_not_leak() {
        let fault = run_fault("if true {\n    var hidden = 1\n}\nhidden");
        assert_eq!(fault.kind, FaultKind::Lookup);
    }

    #[test]
    fn test_compound_assign_and_increment() {
        assert_eq!(run("var x = 1\nx += 2\nx++\nx").to_string(), "4");
        assert_eq!(run("var x = 10\nx -= 3\nx--\nx").to_string(), "6");
        assert_eq!(run("var x = 3\nx *= 4\nx").to_string(), "12");
    }

    #[test]
    fn test_multi_assign_evaluates_rhs_first() {
        // Swap must read both old values before writing.
        assert_eq!(run("var a, b = 1, 2\na, b = b, a\na * 10 + b").to_string(), "21");
    }

    #[test]
    fn test_two_value_recv() {
        let src = "
var ch = make(chan, 2)
ch <- 42
close(ch)
var v, ok = <-ch
var v2, ok2 = <-ch
[v, ok, v2, ok2]
";
        assert_eq!(run(src).to_string(), "[42, true, nil, false]");
    }

    #[test]
    fn test_two_value_map_read() {
        let src = "
var m = {\"a\": 1}
var v, ok = m[\"a\"]
var v2, ok2 = m[\"zz\"]
[v, ok, v2, ok2]
";
        assert_eq!(run(src).to_string(), "[1, true, nil, false]");
    }

    #[test]
    fn test_if_else_chain() {
        let src = "
func grade(n) {
    if n >= 90 {
        return \"a\"
    } else if n >= 80 {
        return \"b\"
    } else {
        return \"c\"
    }
}
grade(95) + grade(85) + grade(10)
";
        assert_eq!(run(src).to_string(), "abc");
    }

    #[test]
    fn test_while_and_c_style_loops() {
        let src = "
var total = 0
var i = 0
for i < 5 {
    total += i
    i++
}
total
";
        assert_eq!(run(src).to_string(), "10");

        let src = "
var total = 0
for i = 0; i < 5; i++ {
    total += i
}
total
";
        assert_eq!(run(src).to_string(), "10");
    }

    #[test]
    fn test_continue_still_runs_post() {
        let src = "
var total = 0
for i = 0; i < 6; i++ {
    if i % 2 == 0 {
        continue
    }
    total += i
}
total
";
        assert_eq!(run(src).to_string(), "9");
    }

    #[test]
    fn test_bare_loop_break() {
        let src = "
var n = 0
for {
    n++
    if n == 3 {
        break
    }
}
n
";
        assert_eq!(run(src).to_string(), "3");
    }

    #[test]
    fn test_for_in_forms() {
        assert_eq!(
            run("var total = 0\nfor n in [1, 2, 3] {\n    total += n\n}\ntotal").to_string(),
            "6"
        );
        assert_eq!(
            run("var out = \"\"\nfor i, n in [5, 6] {\n    out += string(i) + \":\" + string(n) + \" \"\n}\nout")
                .to_string(),
            "0:5 1:6 "
        );
        assert_eq!(
            run("var out = \"\"\nfor k, v in {\"a\": 1, \"b\": 2} {\n    out += k + string(v)\n}\nout")
                .to_string(),
            "a1b2"
        );
        assert_eq!(
            run("var out = \"\"\nfor c in \"héllo\" {\n    out = c + out\n}\nout").to_string(),
            "olléh"
        );
        let fault = run_fault("for x in 5 {\n}");
        assert_eq!(fault.kind, FaultKind::Coerce);
        assert_eq!(fault.message, "cannot iterate over int");
    }

    #[test]
    fn test_for_in_channel_drains() {
        let src = "
var ch = make(chan, 3)
ch <- 1
ch <- 2
ch <- 3
close(ch)
var total = 0
for n in ch {
    total += n
}
total
";
        assert_eq!(run(src).to_string(), "6");
    }

    #[test]
    fn test_switch_cases() {
        let src = "
func classify(n) {
    switch n {
    case 1, 2:
        return \"small\"
    case 3:
        return \"three\"
    default:
        return \"big\"
    }
}
classify(2) + classify(3) + classify(9)
";
        assert_eq!(run(src).to_string(), "smallthreebig");
    }

    #[test]
    fn test_switch_consumes_break() {
        let src = "
var out = \"start\"
switch 1 {
case 1:
    break
    out = \"unreachable\"
}
out
";
        assert_eq!(run(src).to_string(), "start");
    }

    #[test]
    fn test_continue_passes_through_switch() {
        let src = "
var total = 0
for i in [1, 2, 3, 4] {
    switch i % 2 {
    case 0:
        continue
    }
    total += i
}
total
";
        assert_eq!(run(src).to_string(), "4");
    }

    #[test]
    fn test_try_catch_binds_payload() {
        let src = "
try {
    throw {\"code\": 7}
} catch e {
    e.code
}
";
        assert_eq!(run(src).to_string(), "7");
        // A thrown int is caught as that int, not its rendering.
        assert_eq!(
            run("try {\n    throw 2\n} catch e {\n    e + 1\n}").to_string(),
            "3"
        );
        // Evaluator faults bind their message string.
        let src = "
try {
    missing
} catch e {
    e
}
";
        assert_eq!(run(src).to_string(), "undefined symbol 'missing'");
    }

    #[test]
    fn test_catch_can_rethrow() {
        let fault = run_fault("try {\n    throw 1\n} catch e {\n    throw 2\n}");
        assert_eq!(fault.kind, FaultKind::Thrown);
        assert_eq!(fault.catch_value().to_string(), "2");
        // An empty finally leaves the rethrow in flight.
        let fault = run_fault("try {\n    throw 1\n} catch e {\n    throw 2\n} finally {\n}");
        assert_eq!(fault.catch_value().to_string(), "2");
    }

    #[test]
    fn test_finally_supersedes() {
        let src = "
func f() {
    try {
        throw 1
    } catch e {
        return 10
    } finally {
        return 20
    }
}
f()
";
        assert_eq!(run(src).to_string(), "20");
        // A normal finally leaves the earlier outcome in place.
        let src = "
func f() {
    try {
        return 1
    } finally {
        var cleanup = true
    }
}
f()
";
        assert_eq!(run(src).to_string(), "1");
    }

    #[test]
    fn test_finally_runs_without_catch() {
        let src = "
var ran = false
try {
    try {
        throw \"boom\"
    } finally {
        ran = true
    }
} catch e {
}
ran
";
        assert_eq!(run(src).to_string(), "true");
    }

    #[test]
    fn test_module_exports() {
        let src = "
module geo {
    var pi = 3
    func area(r) {
        return pi * r * r
    }
}
geo.area(2)
";
        assert_eq!(run(src).to_string(), "12");
        let fault = run_fault("module m {\n    var x = 1\n}\nm.missing");
        assert_eq!(fault.kind, FaultKind::Lookup);
        assert_eq!(fault.message, "no member named 'missing' for module m");
    }

    #[test]
    fn test_append_at_len() {
        assert_eq!(run("var a = [1]\na[len(a)] = 2\na").to_string(), "[1, 2]");
        // Views refuse the append form.
        let fault = run_fault("var a = [1, 2, 3]\nvar b = a[0:2]\nb[2] = 9");
        assert_eq!(fault.kind, FaultKind::Range);
        assert_eq!(fault.message, "array index 2 out of range (len 2)");
    }

    #[test]
    fn test_member_and_index_assignment() {
        assert_eq!(run("var m = {}\nm.a = 1\nm[\"b\"] = 2\nlen(m)").to_string(), "2");
        assert_eq!(run("var a = [1, 2]\na[0] = 9\na[0]").to_string(), "9");
        let fault = run_fault("var a = [1]\na[5] = 0");
        assert_eq!(fault.kind, FaultKind::Range);
    }

    #[test]
    fn test_delete_statement() {
        assert_eq!(
            run("var m = {\"a\": 1, \"b\": 2}\ndelete(m, \"a\")\nlen(m)").to_string(),
            "1"
        );
        // Deleting an absent key is a no-op.
        assert_eq!(
            run("var m = {\"a\": 1}\ndelete m[\"zz\"]\nlen(m)").to_string(),
            "1"
        );
        let fault = run_fault("delete([1], 0)");
        assert_eq!(fault.kind, FaultKind::Coerce);
    }

    #[test]
    fn test_return_packs_multiple_values() {
        let src = "
func pair() {
    return 1, 2
}
var a, b = pair()
a * 10 + b
";
        assert_eq!(run(src).to_string(), "12");
        assert_eq!(run("func f() {\n    return\n}\nf()").is_nil(), true);
    }

    #[test]
    fn test_top_level_break_is_fatal() {
        assert!(matches!(run_err("break"), KeshError::Fatal { .. }));
        assert!(matches!(run_err("continue"), KeshError::Fatal { .. }));
    }

    #[test]
    fn test_top_level_return_yields_value() {
        assert_eq!(run("return 5\nthis_never_runs").to_string(), "5");
    }

    #[test]
    fn test_go_task_fault_reaches_hub() {
        run("go func() {\n    throw \"stmt-task-marker\"\n}()");
        assert!(concurrent::wait_for_task_fault("stmt-task-marker"));
    }

    #[test]
    fn test_go_runs_eagerly_evaluated_args() {
        let src = "
var ch = make(chan, 1)
func put(c, v) {
    c <- v
}
go put(ch, 9)
<-ch
";
        assert_eq!(run(src).to_string(), "9");
    }
}
