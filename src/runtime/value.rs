//! kesh dynamic values
//!
//! One closed enum covers every value a script can hold. Aggregates are
//! shared handles: cloning a `Value::Array` or `Value::Map` clones the
//! handle, not the contents, so aliases observe each other's writes.

use std::fmt;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;

use crate::ast::Block;
use crate::error::{EvalResult, Fault};
use crate::runtime::concurrent::ChanRef;
use crate::runtime::env::Env;
use crate::runtime::interop::ObjectRef;
use crate::span::Span;

/// Host function signature. The environment gives natives access to the
/// configured output sinks.
pub type NativeImpl = fn(&Env, Vec<Value>) -> EvalResult<Value>;

#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(ArrayRef),
    Map(MapRef),
    Func(Arc<FuncDef>),
    NativeFn(String, NativeImpl),
    Chan(ChanRef),
    Object(ObjectRef),
    /// A method plucked off a host object; calling it dispatches through
    /// the object's capability trait.
    Method(ObjectRef, String),
    Type(Arc<TypeDef>),
    Module(Arc<ModuleDef>),
}

impl Value {
    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(ArrayRef::new(items))
    }

    pub fn empty_map() -> Value {
        Value::Map(MapRef::new())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// The name scripts see in fault messages and `type_of`.
    pub fn type_name(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Str(_) => "string".to_string(),
            Value::Array(_) => "array".to_string(),
            Value::Map(_) => "map".to_string(),
            Value::Func(_) | Value::NativeFn(_, _) | Value::Method(_, _) => "func".to_string(),
            Value::Chan(_) => "chan".to_string(),
            Value::Object(obj) => obj.type_name(),
            Value::Type(def) => format!("type {}", def.name),
            Value::Module(def) => format!("module {}", def.name),
        }
    }
}

// Host-side conversions, so embedding code can write `interp.define("n", 3.into())`.

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Value {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Value {
        Value::array(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Value {
        match opt {
            Some(v) => v.into(),
            None => Value::Nil,
        }
    }
}

/// A script function together with its defining environment. The
/// environment is held by handle, so names resolved at call time see
/// mutations made after the function was defined.
pub struct FuncDef {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub vararg: bool,
    pub body: Block,
    pub captured: Env,
}

/// A registered constructible type: `new(T)` / `make(T)` produce a map
/// instance with these fields preset to nil.
pub struct TypeDef {
    pub name: String,
    pub fields: Vec<String>,
}

impl TypeDef {
    pub fn construct(&self) -> Value {
        let map = MapRef::new();
        for field in &self.fields {
            map.insert(MapKey::Str(field.clone()), Value::Nil);
        }
        Value::Map(map)
    }
}

/// A named scope of exported values, produced by `module` blocks and
/// `import(...)`.
pub struct ModuleDef {
    pub name: String,
    pub exports: Env,
}

// === ARRAYS ===

/// Shared array storage with an optional fixed window.
///
/// A whole-array handle (`window == None`) tracks the buffer as it grows:
/// assigning at index == len appends. A sliced view pins a `(start, end)`
/// window into the same buffer; writes inside the window alias the parent,
/// writes past it are refused. The buffer only ever grows at the end, so
/// windows never dangle.
#[derive(Clone)]
pub struct ArrayRef {
    buf: Arc<RwLock<Vec<Value>>>,
    window: Option<(usize, usize)>,
}

impl ArrayRef {
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            buf: Arc::new(RwLock::new(items)),
            window: None,
        }
    }

    pub fn len(&self) -> usize {
        match self.window {
            Some((start, end)) => end - start,
            None => self.buf.read().unwrap().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        let buf = self.buf.read().unwrap();
        let base = self.window.map(|(start, _)| start).unwrap_or(0);
        if index >= self.len() {
            return None;
        }
        buf.get(base + index).cloned()
    }

    /// Stores `value` at `index`. On a whole-array handle index == len
    /// appends; through a view only in-window writes succeed. Returns
    /// false when the index is out of range.
    pub fn set(&self, index: usize, value: Value) -> bool {
        let mut buf = self.buf.write().unwrap();
        match self.window {
            Some((start, end)) => {
                if index < end - start {
                    buf[start + index] = value;
                    true
                } else {
                    false
                }
            }
            None => {
                if index < buf.len() {
                    buf[index] = value;
                    true
                } else if index == buf.len() {
                    buf.push(value);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// A view over `[begin, end)` of this handle. Callers validate the
    /// bounds against `len()` first.
    pub fn slice_view(&self, begin: usize, end: usize) -> ArrayRef {
        let base = self.window.map(|(start, _)| start).unwrap_or(0);
        ArrayRef {
            buf: Arc::clone(&self.buf),
            window: Some((base + begin, base + end)),
        }
    }

    pub fn to_vec(&self) -> Vec<Value> {
        let buf = self.buf.read().unwrap();
        match self.window {
            Some((start, end)) => buf[start..end].to_vec(),
            None => buf.clone(),
        }
    }

    pub fn same_buffer(&self, other: &ArrayRef) -> bool {
        Arc::ptr_eq(&self.buf, &other.buf)
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Array({:?})", self.to_vec())
    }
}

// === MAPS ===

/// Map keys are restricted to scalars. Floats key by bit pattern so the
/// table can hash them.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MapKey {
    Nil,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(String),
}

impl MapKey {
    pub fn from_value(value: &Value, span: Span) -> Result<MapKey, Fault> {
        match value {
            Value::Nil => Ok(MapKey::Nil),
            Value::Bool(b) => Ok(MapKey::Bool(*b)),
            Value::Int(n) => Ok(MapKey::Int(*n)),
            Value::Float(x) => Ok(MapKey::Float(x.to_bits())),
            Value::Str(s) => Ok(MapKey::Str(s.clone())),
            other => Err(Fault::coerce(
                format!("cannot use {} as a map key", other.type_name()),
                span,
            )),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Nil => Value::Nil,
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::Int(n) => Value::Int(*n),
            MapKey::Float(bits) => Value::Float(f64::from_bits(*bits)),
            MapKey::Str(s) => Value::Str(s.clone()),
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Nil => write!(f, "nil"),
            MapKey::Bool(b) => write!(f, "{}", b),
            MapKey::Int(n) => write!(f, "{}", n),
            MapKey::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
            MapKey::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// Shared insertion-ordered map storage.
#[derive(Clone)]
pub struct MapRef {
    entries: Arc<RwLock<IndexMap<MapKey, Value>>>,
}

impl MapRef {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(IndexMap::new())),
        }
    }

    pub fn from_entries(entries: IndexMap<MapKey, Value>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }

    pub fn get(&self, key: &MapKey) -> Option<Value> {
        self.entries.read().unwrap().get(key).cloned()
    }

    pub fn insert(&self, key: MapKey, value: Value) {
        self.entries.write().unwrap().insert(key, value);
    }

    /// Removes a key, keeping the insertion order of the rest. Removing an
    /// absent key is a no-op.
    pub fn remove(&self, key: &MapKey) {
        self.entries.write().unwrap().shift_remove(key);
    }

    pub fn contains(&self, key: &MapKey) -> bool {
        self.entries.read().unwrap().contains_key(key)
    }

    pub fn keys(&self) -> Vec<MapKey> {
        self.entries.read().unwrap().keys().cloned().collect()
    }

    pub fn pairs(&self) -> Vec<(MapKey, Value)> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn same_table(&self, other: &MapRef) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

impl Default for MapRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MapRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Map({:?})", self.pairs())
    }
}

// === FORMATTING ===

/// Strings print bare at the top level but quoted inside aggregates.
fn fmt_nested(value: &Value, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value {
        Value::Str(s) => write!(f, "{:?}", s),
        other => write!(f, "{}", other),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Array(arr) => {
                write!(f, "[")?;
                for (i, item) in arr.to_vec().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    fmt_nested(item, f)?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.pairs().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: ", key)?;
                    fmt_nested(value, f)?;
                }
                write!(f, "}}")
            }
            Value::Func(def) => match &def.name {
                Some(name) => write!(f, "<func {}>", name),
                None => write!(f, "<func>"),
            },
            Value::NativeFn(name, _) => write!(f, "<func {}>", name),
            Value::Chan(_) => write!(f, "<chan>"),
            Value::Object(obj) => write!(f, "<{}>", obj.type_name()),
            Value::Method(_, name) => write!(f, "<func {}>", name),
            Value::Type(def) => write!(f, "<type {}>", def.name),
            Value::Module(def) => write!(f, "<module {}>", def.name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(n) => write!(f, "Int({})", n),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Array(arr) => write!(f, "{:?}", arr),
            Value::Map(map) => write!(f, "{:?}", map),
            Value::Func(def) => write!(f, "Func({:?})", def.name),
            Value::NativeFn(name, _) => write!(f, "NativeFn({})", name),
            Value::Chan(_) => write!(f, "Chan"),
            Value::Object(obj) => write!(f, "Object({})", obj.type_name()),
            Value::Method(obj, name) => write!(f, "Method({}, {})", obj.type_name(), name),
            Value::Type(def) => write!(f, "Type({})", def.name),
            Value::Module(def) => write!(f, "Module({})", def.name),
        }
    }
}
