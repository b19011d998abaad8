//! Prelude functions and the importable module registry.
//!
//! The prelude is installed into the root scope of every interpreter;
//! everything else arrives through `import("name")`, which builds the
//! module's export scope on each call.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{EvalResult, Fault};
use crate::runtime::env::Env;
use crate::runtime::value::{MapKey, MapRef, ModuleDef, NativeImpl, Value};
use crate::span::Span;

fn define_native(env: &Env, name: &str, imp: NativeImpl) {
    env.define(name, Value::NativeFn(name.to_string(), imp));
}

fn want(args: &[Value], name: &str, count: usize) -> EvalResult<()> {
    if args.len() != count {
        let noun = if count == 1 { "argument" } else { "arguments" };
        return Err(Fault::arity(
            format!("{}: expected {} {}, got {}", name, count, noun, args.len()),
            Span::default(),
        ));
    }
    Ok(())
}

fn string_arg(value: &Value, who: &str) -> EvalResult<String> {
    match value {
        Value::Str(s) => Ok(s.clone()),
        other => Err(Fault::coerce(
            format!("{}: expected a string, got {}", who, other.type_name()),
            Span::default(),
        )),
    }
}

fn join_values(args: &[Value]) -> String {
    args.iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

// === PRELUDE ===

pub fn install_prelude(env: &Env) {
    define_native(env, "print", |env, args| {
        env.write_out(&join_values(&args));
        Ok(Value::Nil)
    });

    define_native(env, "println", |env, args| {
        let mut text = join_values(&args);
        text.push('\n');
        env.write_out(&text);
        Ok(Value::Nil)
    });

    define_native(env, "printf", |env, args| {
        if args.is_empty() {
            return Err(Fault::arity(
                "printf: expected a format string",
                Span::default(),
            ));
        }
        let fmt = string_arg(&args[0], "printf")?;
        env.write_out(&format_verbs(&fmt, &args[1..])?);
        Ok(Value::Nil)
    });

    define_native(env, "string", |_env, args| {
        want(&args, "string", 1)?;
        Ok(Value::Str(args[0].as_str()))
    });

    define_native(env, "int", |_env, args| {
        want(&args, "int", 1)?;
        Ok(Value::Int(args[0].as_int()?))
    });

    define_native(env, "float", |_env, args| {
        want(&args, "float", 1)?;
        Ok(Value::Float(args[0].as_float()?))
    });

    define_native(env, "bool", |_env, args| {
        want(&args, "bool", 1)?;
        Ok(Value::Bool(args[0].as_bool()))
    });

    define_native(env, "type_of", |_env, args| {
        want(&args, "type_of", 1)?;
        Ok(Value::Str(args[0].type_name()))
    });

    define_native(env, "keys", |_env, args| {
        want(&args, "keys", 1)?;
        match &args[0] {
            Value::Map(map) => Ok(Value::array(
                map.keys().into_iter().map(|k| k.to_value()).collect(),
            )),
            other => Err(Fault::coerce(
                format!("keys: expected a map, got {}", other.type_name()),
                Span::default(),
            )),
        }
    });

    define_native(env, "range", |_env, args| {
        let (start, stop) = match args.len() {
            1 => (0, args[0].as_int()?),
            2 => (args[0].as_int()?, args[1].as_int()?),
            n => {
                return Err(Fault::arity(
                    format!("range: expected 1 or 2 arguments, got {}", n),
                    Span::default(),
                ))
            }
        };
        Ok(Value::array((start..stop).map(Value::Int).collect()))
    });
}

/// A small slice of printf: `%v` and `%s` take the display form, `%d`
/// and `%f` convert, `%t` takes truthiness, `%%` escapes. Unknown verbs
/// pass through untouched.
fn format_verbs(fmt: &str, args: &[Value]) -> EvalResult<String> {
    let mut out = String::with_capacity(fmt.len());
    let mut next = 0usize;
    let mut chars = fmt.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('v') | Some('s') => out.push_str(&take_arg(args, &mut next)?.to_string()),
            Some('d') => out.push_str(&take_arg(args, &mut next)?.as_int()?.to_string()),
            Some('f') => {
                let x = take_arg(args, &mut next)?.as_float()?;
                out.push_str(&format!("{:.6}", x));
            }
            Some('t') => out.push_str(if take_arg(args, &mut next)?.as_bool() {
                "true"
            } else {
                "false"
            }),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    Ok(out)
}

fn take_arg<'a>(args: &'a [Value], next: &mut usize) -> EvalResult<&'a Value> {
    let value = args.get(*next).ok_or_else(|| {
        Fault::arity("printf: not enough arguments for format", Span::default())
    })?;
    *next += 1;
    Ok(value)
}

// === MODULES ===

/// Build the named stdlib module, or `None` if there is no such module.
pub fn import_module(name: &str) -> Option<Value> {
    let exports = Env::root();
    match name {
        "strings" => strings_module(&exports),
        "math" => math_module(&exports),
        "json" => json_module(&exports),
        "time" => time_module(&exports),
        _ => return None,
    }
    Some(Value::Module(Arc::new(ModuleDef {
        name: name.to_string(),
        exports,
    })))
}

fn strings_module(env: &Env) {
    define_native(env, "to_upper", |_env, args| {
        want(&args, "to_upper", 1)?;
        Ok(Value::Str(string_arg(&args[0], "to_upper")?.to_uppercase()))
    });

    define_native(env, "to_lower", |_env, args| {
        want(&args, "to_lower", 1)?;
        Ok(Value::Str(string_arg(&args[0], "to_lower")?.to_lowercase()))
    });

    define_native(env, "trim_space", |_env, args| {
        want(&args, "trim_space", 1)?;
        Ok(Value::Str(
            string_arg(&args[0], "trim_space")?.trim().to_string(),
        ))
    });

    define_native(env, "split", |_env, args| {
        want(&args, "split", 2)?;
        let text = string_arg(&args[0], "split")?;
        let sep = string_arg(&args[1], "split")?;
        // An empty separator splits into characters.
        let parts: Vec<Value> = if sep.is_empty() {
            text.chars().map(|c| Value::Str(c.to_string())).collect()
        } else {
            text.split(sep.as_str())
                .map(|p| Value::Str(p.to_string()))
                .collect()
        };
        Ok(Value::array(parts))
    });

    define_native(env, "join", |_env, args| {
        want(&args, "join", 2)?;
        let items = match &args[0] {
            Value::Array(arr) => arr.to_vec(),
            other => {
                return Err(Fault::coerce(
                    format!("join: expected an array, got {}", other.type_name()),
                    Span::default(),
                ))
            }
        };
        let sep = string_arg(&args[1], "join")?;
        Ok(Value::Str(
            items
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(&sep),
        ))
    });

    define_native(env, "contains", |_env, args| {
        want(&args, "contains", 2)?;
        let text = string_arg(&args[0], "contains")?;
        let sub = string_arg(&args[1], "contains")?;
        Ok(Value::Bool(text.contains(sub.as_str())))
    });

    define_native(env, "has_prefix", |_env, args| {
        want(&args, "has_prefix", 2)?;
        let text = string_arg(&args[0], "has_prefix")?;
        let prefix = string_arg(&args[1], "has_prefix")?;
        Ok(Value::Bool(text.starts_with(prefix.as_str())))
    });

    define_native(env, "has_suffix", |_env, args| {
        want(&args, "has_suffix", 2)?;
        let text = string_arg(&args[0], "has_suffix")?;
        let suffix = string_arg(&args[1], "has_suffix")?;
        Ok(Value::Bool(text.ends_with(suffix.as_str())))
    });

    define_native(env, "index", |_env, args| {
        want(&args, "index", 2)?;
        let text = string_arg(&args[0], "index")?;
        let sub = string_arg(&args[1], "index")?;
        // Character position, consistent with indexing and len.
        let position = match text.find(sub.as_str()) {
            Some(byte_idx) => text[..byte_idx].chars().count() as i64,
            None => -1,
        };
        Ok(Value::Int(position))
    });

    define_native(env, "replace", |_env, args| {
        want(&args, "replace", 3)?;
        let text = string_arg(&args[0], "replace")?;
        let old = string_arg(&args[1], "replace")?;
        let new = string_arg(&args[2], "replace")?;
        Ok(Value::Str(text.replace(old.as_str(), new.as_str())))
    });

    define_native(env, "repeat", |_env, args| {
        want(&args, "repeat", 2)?;
        let text = string_arg(&args[0], "repeat")?;
        let count = args[1].as_int()?;
        if count < 0 {
            return Err(Fault::range(
                format!("repeat: negative count {}", count),
                Span::default(),
            ));
        }
        Ok(Value::Str(text.repeat(count as usize)))
    });
}

fn math_module(env: &Env) {
    env.define("pi", Value::Float(std::f64::consts::PI));
    env.define("e", Value::Float(std::f64::consts::E));

    define_native(env, "abs", |_env, args| {
        want(&args, "abs", 1)?;
        match &args[0] {
            Value::Int(n) => Ok(Value::Int(n.wrapping_abs())),
            other => Ok(Value::Float(other.as_float()?.abs())),
        }
    });

    define_native(env, "floor", |_env, args| {
        want(&args, "floor", 1)?;
        Ok(Value::Float(args[0].as_float()?.floor()))
    });

    define_native(env, "ceil", |_env, args| {
        want(&args, "ceil", 1)?;
        Ok(Value::Float(args[0].as_float()?.ceil()))
    });

    define_native(env, "round", |_env, args| {
        want(&args, "round", 1)?;
        Ok(Value::Float(args[0].as_float()?.round()))
    });

    define_native(env, "sqrt", |_env, args| {
        want(&args, "sqrt", 1)?;
        Ok(Value::Float(args[0].as_float()?.sqrt()))
    });

    define_native(env, "pow", |_env, args| {
        want(&args, "pow", 2)?;
        Ok(Value::Float(args[0].as_float()?.powf(args[1].as_float()?)))
    });

    define_native(env, "min", |_env, args| {
        want(&args, "min", 2)?;
        numeric_pick(&args[0], &args[1], true)
    });

    define_native(env, "max", |_env, args| {
        want(&args, "max", 2)?;
        numeric_pick(&args[0], &args[1], false)
    });
}

fn numeric_pick(a: &Value, b: &Value, smaller: bool) -> EvalResult<Value> {
    match (a, b) {
        // Two ints stay an int.
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(if smaller {
            *x.min(y)
        } else {
            *x.max(y)
        })),
        _ => {
            let x = a.as_float()?;
            let y = b.as_float()?;
            Ok(Value::Float(if smaller { x.min(y) } else { x.max(y) }))
        }
    }
}

fn json_module(env: &Env) {
    define_native(env, "encode", |_env, args| {
        want(&args, "encode", 1)?;
        let json = value_to_json(&args[0], Span::default())?;
        Ok(Value::Str(json.to_string()))
    });

    define_native(env, "decode", |_env, args| {
        want(&args, "decode", 1)?;
        let text = string_arg(&args[0], "decode")?;
        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(json) => Ok(json_to_value(json)),
            Err(err) => Err(Fault::coerce(
                format!("decode: {}", err),
                Span::default(),
            )),
        }
    });
}

fn value_to_json(value: &Value, span: Span) -> EvalResult<serde_json::Value> {
    match value {
        Value::Nil => Ok(serde_json::Value::Null),
        Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
        Value::Int(n) => Ok(serde_json::Value::from(*n)),
        Value::Float(x) => serde_json::Number::from_f64(*x)
            .map(serde_json::Value::Number)
            .ok_or_else(|| Fault::coerce("json: cannot encode a non-finite float", span)),
        Value::Str(s) => Ok(serde_json::Value::String(s.clone())),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items.to_vec() {
                out.push(value_to_json(&item, span)?);
            }
            Ok(serde_json::Value::Array(out))
        }
        Value::Map(map) => {
            let mut out = serde_json::Map::new();
            for (key, item) in map.pairs() {
                out.insert(key.to_value().to_string(), value_to_json(&item, span)?);
            }
            Ok(serde_json::Value::Object(out))
        }
        other => Err(Fault::coerce(
            format!("json: cannot encode {}", other.type_name()),
            span,
        )),
    }
}

fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::Str(s),
        serde_json::Value::Array(items) => {
            Value::array(items.into_iter().map(json_to_value).collect())
        }
        serde_json::Value::Object(entries) => {
            let map = MapRef::new();
            for (key, item) in entries {
                map.insert(MapKey::Str(key), json_to_value(item));
            }
            Value::Map(map)
        }
    }
}

fn time_module(env: &Env) {
    define_native(env, "now", |_env, args| {
        want(&args, "now", 0)?;
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Ok(Value::Float(secs))
    });

    define_native(env, "unix", |_env, args| {
        want(&args, "unix", 0)?;
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(Value::Int(secs))
    });

    define_native(env, "sleep", |_env, args| {
        want(&args, "sleep", 1)?;
        let secs = args[0].as_float()?;
        if secs.is_finite() && secs > 0.0 {
            thread::sleep(Duration::from_secs_f64(secs));
        }
        Ok(Value::Nil)
    });
}

// === TESTS ===
