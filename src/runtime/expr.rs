//! Expression evaluation.
//!
//! Everything returns `EvalResult<Value>`; faults bubble to the statement
//! executor, which decides whether a `try` is waiting for them. The
//! short-circuit forms (`&&`, `||`, `??`) live here rather than in the
//! operator table because they must skip evaluation of the right side.

use std::sync::Arc;

use crate::ast::{BinOp, Expr, MakeKind};
use crate::error::{EvalResult, Fault};
use crate::runtime::concurrent::ChanRef;
use crate::runtime::env::Env;
use crate::runtime::interop::member_fault;
use crate::runtime::ops;
use crate::runtime::stmt::{exec_block, Signal};
use crate::runtime::value::{FuncDef, MapKey, MapRef, Value};
use crate::span::Span;

// === DISPATCH ===

pub fn eval_expr(expr: &Expr, env: &Env) -> EvalResult<Value> {
    match expr {
        Expr::Nil { .. } => Ok(Value::Nil),
        Expr::Bool { value, .. } => Ok(Value::Bool(*value)),
        Expr::Int { value, .. } => Ok(Value::Int(*value)),
        Expr::Float { value, .. } => Ok(Value::Float(*value)),
        Expr::Str { value, .. } => Ok(Value::Str(value.clone())),

        Expr::Ident { name, span } => env
            .lookup(name)
            .ok_or_else(|| Fault::lookup(format!("undefined symbol '{}'", name), *span)),

        Expr::Array { items, .. } => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval_expr(item, env)?);
            }
            Ok(Value::array(values))
        }

        Expr::Map { entries, .. } => {
            let map = MapRef::new();
            for (key_expr, value_expr) in entries {
                let key = eval_expr(key_expr, env)?;
                let value = eval_expr(value_expr, env)?;
                map.insert(MapKey::from_value(&key, key_expr.span())?, value);
            }
            Ok(Value::Map(map))
        }

        Expr::Paren { inner, .. } => eval_expr(inner, env),

        Expr::Unary { op, operand, span } => {
            let value = eval_expr(operand, env)?;
            ops::eval_unary(*op, &value, *span)
        }

        Expr::Binary {
            op,
            left,
            right,
            span,
        } => eval_binary(*op, left, right, env, *span),

        Expr::Ternary {
            cond,
            then_expr,
            else_expr,
            ..
        } => {
            if eval_expr(cond, env)?.as_bool() {
                eval_expr(then_expr, env)
            } else {
                eval_expr(else_expr, env)
            }
        }

        Expr::Member { object, name, span } => {
            let target = eval_expr(object, env)?;
            read_member(&target, name, *span)
        }

        Expr::Index {
            object,
            index,
            span,
        } => {
            let target = eval_expr(object, env)?;
            let key = eval_expr(index, env)?;
            index_value(&target, &key, *span)
        }

        Expr::Slice {
            object,
            begin,
            end,
            cap,
            span,
        } => {
            let target = eval_expr(object, env)?;
            let begin = eval_bound(begin, env, *span)?;
            let end = eval_bound(end, env, *span)?;
            let cap = eval_bound(cap, env, *span)?;
            slice_value(&target, begin, end, cap, *span)
        }

        Expr::Call {
            callee,
            args,
            spread,
            span,
        } => {
            let (target, values) = eval_call_parts(callee, args, *spread, env, *span)?;
            call_value(&target, values, env, *span)
        }

        Expr::Func {
            name,
            params,
            vararg,
            body,
            ..
        } => {
            let def = Arc::new(FuncDef {
                name: name.clone(),
                params: params.clone(),
                vararg: *vararg,
                body: body.clone(),
                captured: env.clone(),
            });
            let value = Value::Func(def);
            // A named function literal also binds its name in the
            // surrounding scope.
            if let Some(func_name) = name {
                env.define(func_name.as_str(), value.clone());
            }
            Ok(value)
        }

        Expr::Recv { chan, span } => {
            let target = eval_expr(chan, env)?;
            match &target {
                Value::Chan(ch) => {
                    let (value, _open) = ch.recv();
                    Ok(value)
                }
                other => Err(Fault::coerce(
                    format!("cannot receive from {}", other.type_name()),
                    *span,
                )),
            }
        }

        Expr::Len { expr, span } => {
            let target = eval_expr(expr, env)?;
            match &target {
                Value::Str(text) => Ok(Value::Int(text.chars().count() as i64)),
                Value::Array(items) => Ok(Value::Int(items.len() as i64)),
                Value::Map(map) => Ok(Value::Int(map.len() as i64)),
                other => Err(Fault::coerce(
                    format!("cannot take len of {}", other.type_name()),
                    *span,
                )),
            }
        }

        Expr::Make { kind, span } => eval_make(kind, env, *span),

        Expr::New { type_name, span } => construct_named(type_name, env, *span),

        Expr::Import { name, span } => {
            let value = eval_expr(name, env)?;
            match &value {
                Value::Str(module) => crate::stdlib::import_module(module)
                    .ok_or_else(|| Fault::lookup(format!("unknown import '{}'", module), *span)),
                other => Err(Fault::coerce(
                    format!("import needs a string name, got {}", other.type_name()),
                    *span,
                )),
            }
        }
    }
}

// === OPERATORS ===

fn eval_binary(op: BinOp, left: &Expr, right: &Expr, env: &Env, span: Span) -> EvalResult<Value> {
    match op {
        BinOp::And => {
            if !eval_expr(left, env)?.as_bool() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval_expr(right, env)?.as_bool()))
        }
        BinOp::Or => {
            if eval_expr(left, env)?.as_bool() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval_expr(right, env)?.as_bool()))
        }
        // `??` recovers: any fault or nil on the left selects the right side.
        BinOp::Coalesce => match eval_expr(left, env) {
            Ok(value) if !value.is_nil() => Ok(value),
            _ => eval_expr(right, env),
        },
        _ => {
            let lhs = eval_expr(left, env)?;
            let rhs = eval_expr(right, env)?;
            ops::eval_binop(op, &lhs, &rhs, span)
        }
    }
}

// === MEMBERS AND INDEXING ===

fn read_member(target: &Value, name: &str, span: Span) -> EvalResult<Value> {
    match target {
        // Map members are key sugar; a missing key reads as nil.
        Value::Map(map) => Ok(map
            .get(&MapKey::Str(name.to_string()))
            .unwrap_or(Value::Nil)),
        Value::Module(def) => def
            .exports
            .get_local(name)
            .ok_or_else(|| member_fault(name, &target.type_name(), span)),
        Value::Object(obj) => {
            if let Some(value) = obj.get_field(name) {
                Ok(value)
            } else if obj.has_method(name) {
                Ok(Value::Method(obj.clone(), name.to_string()))
            } else {
                Err(member_fault(name, &obj.type_name(), span))
            }
        }
        other => Err(Fault::coerce(
            format!("cannot access member '{}' on {}", name, other.type_name()),
            span,
        )),
    }
}

pub fn index_value(target: &Value, key: &Value, span: Span) -> EvalResult<Value> {
    match target {
        Value::Array(items) => {
            let idx = key.as_int().map_err(|fault| fault.at(span))?;
            let len = items.len();
            if idx < 0 || idx as usize >= len {
                return Err(Fault::range(
                    format!("array index {} out of range (len {})", idx, len),
                    span,
                ));
            }
            Ok(items.get(idx as usize).unwrap_or(Value::Nil))
        }
        Value::Map(map) => {
            let map_key = MapKey::from_value(key, span)?;
            Ok(map.get(&map_key).unwrap_or(Value::Nil))
        }
        Value::Str(text) => {
            let idx = key.as_int().map_err(|fault| fault.at(span))?;
            match usize::try_from(idx).ok().and_then(|i| text.chars().nth(i)) {
                Some(ch) => Ok(Value::Str(ch.to_string())),
                None => Err(Fault::range(
                    format!(
                        "string index {} out of range (len {})",
                        idx,
                        text.chars().count()
                    ),
                    span,
                )),
            }
        }
        other => Err(Fault::coerce(
            format!("cannot index {}", other.type_name()),
            span,
        )),
    }
}

fn eval_bound(bound: &Option<Box<Expr>>, env: &Env, span: Span) -> EvalResult<Option<i64>> {
    match bound {
        Some(expr) => Ok(Some(
            eval_expr(expr, env)?.as_int().map_err(|fault| fault.at(span))?,
        )),
        None => Ok(None),
    }
}

fn slice_value(
    target: &Value,
    begin: Option<i64>,
    end: Option<i64>,
    cap: Option<i64>,
    span: Span,
) -> EvalResult<Value> {
    match target {
        Value::Array(items) => {
            let len = items.len();
            let (b, e) = clamp_bounds(begin, end, len, span)?;
            // The three-index form checks its capacity, then discards it;
            // views carry no capacity of their own.
            if let Some(limit) = cap {
                if limit < e as i64 || limit > len as i64 {
                    return Err(Fault::range(
                        format!("slice capacity {} out of range", limit),
                        span,
                    ));
                }
            }
            Ok(Value::Array(items.slice_view(b, e)))
        }
        Value::Str(text) => {
            if cap.is_some() {
                return Err(Fault::coerce("cannot full-slice a string", span));
            }
            let chars: Vec<char> = text.chars().collect();
            let (b, e) = clamp_bounds(begin, end, chars.len(), span)?;
            Ok(Value::Str(chars[b..e].iter().collect()))
        }
        other => Err(Fault::coerce(
            format!("cannot slice {}", other.type_name()),
            span,
        )),
    }
}

fn clamp_bounds(
    begin: Option<i64>,
    end: Option<i64>,
    len: usize,
    span: Span,
) -> EvalResult<(usize, usize)> {
    let b = begin.unwrap_or(0).clamp(0, len as i64);
    let e = end.unwrap_or(len as i64).clamp(0, len as i64);
    if b > e {
        return Err(Fault::range(
            format!("slice bounds out of order ({} > {})", b, e),
            span,
        ));
    }
    Ok((b as usize, e as usize))
}

// === CALLS ===

/// Evaluate a call's callee and arguments without invoking it. `go`
/// shares this so its callee and arguments are fixed before the task
/// starts.
pub fn eval_call_parts(
    callee: &Expr,
    args: &[Expr],
    spread: bool,
    env: &Env,
    span: Span,
) -> EvalResult<(Value, Vec<Value>)> {
    let target = eval_expr(callee, env)?;
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(eval_expr(arg, env)?);
    }
    if spread {
        // The parser puts the spread marker on the final argument.
        match values.pop() {
            Some(Value::Array(items)) => values.extend(items.to_vec()),
            Some(other) => {
                return Err(Fault::coerce(
                    format!("spread argument must be an array, got {}", other.type_name()),
                    span,
                ))
            }
            None => {}
        }
    }
    Ok((target, values))
}

pub fn call_value(callee: &Value, args: Vec<Value>, env: &Env, span: Span) -> EvalResult<Value> {
    match callee {
        Value::Func(def) => call_func(def, args, span),
        Value::NativeFn(_, imp) => imp(env, args).map_err(|fault| fault.at(span)),
        Value::Method(obj, name) => obj.invoke(name, args, span),
        other => Err(Fault::coerce(
            format!("cannot call {}", other.type_name()),
            span,
        )),
    }
}

fn call_func(def: &FuncDef, mut args: Vec<Value>, span: Span) -> EvalResult<Value> {
    let scope = def.captured.child();
    if def.vararg {
        let required = def.params.len() - 1;
        if args.len() < required {
            return Err(Fault::arity(
                format!(
                    "{} takes at least {} arguments, got {}",
                    func_label(def),
                    required,
                    args.len()
                ),
                span,
            ));
        }
        let rest = args.split_off(required);
        for (param, value) in def.params[..required].iter().zip(args) {
            scope.define(param.as_str(), value);
        }
        scope.define(def.params[required].as_str(), Value::array(rest));
    } else {
        if args.len() != def.params.len() {
            return Err(Fault::arity(
                format!(
                    "{} takes {} arguments, got {}",
                    func_label(def),
                    def.params.len(),
                    args.len()
                ),
                span,
            ));
        }
        for (param, value) in def.params.iter().zip(args) {
            scope.define(param.as_str(), value);
        }
    }
    // A body that runs off the end yields its last statement's value.
    match exec_block(&def.body, &scope) {
        Signal::Normal(value) | Signal::Return(value) => Ok(value),
        Signal::Break => Err(Fault::flow("break outside loop", span)),
        Signal::Continue => Err(Fault::flow("continue outside loop", span)),
        Signal::Throw(fault) => Err(fault),
    }
}

fn func_label(def: &FuncDef) -> &str {
    def.name.as_deref().unwrap_or("function")
}

// === CONSTRUCTION ===

fn eval_make(kind: &MakeKind, env: &Env, span: Span) -> EvalResult<Value> {
    match kind {
        MakeKind::Chan { cap } => {
            let capacity = match cap {
                Some(expr) => eval_expr(expr, env)?.as_int().map_err(|fault| fault.at(span))?,
                None => 0,
            };
            if capacity < 0 {
                return Err(Fault::range(
                    format!("channel capacity {} out of range", capacity),
                    span,
                ));
            }
            Ok(Value::Chan(ChanRef::new(capacity as usize)))
        }
        MakeKind::Array { len } => {
            let count = match len {
                Some(expr) => eval_expr(expr, env)?.as_int().map_err(|fault| fault.at(span))?,
                None => 0,
            };
            if count < 0 {
                return Err(Fault::range(
                    format!("array length {} out of range", count),
                    span,
                ));
            }
            Ok(Value::array(vec![Value::Nil; count as usize]))
        }
        MakeKind::Map => Ok(Value::empty_map()),
        MakeKind::Named(name) => construct_named(name, env, span),
    }
}

fn construct_named(name: &str, env: &Env, span: Span) -> EvalResult<Value> {
    match env.lookup(name) {
        Some(Value::Type(def)) => Ok(def.construct()),
        Some(_) => Err(Fault::coerce(format!("'{}' is not a type", name), span)),
        None => Err(Fault::lookup(format!("undefined type '{}'", name), span)),
    }
}

// === TESTS ===
