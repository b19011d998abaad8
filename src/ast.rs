//! kesh Abstract Syntax Tree
//!
//! The node inventory the evaluator walks. Statements and expressions are
//! two closed enums, dispatched exhaustively: adding a node kind without
//! handling it everywhere is a compile error, not a runtime surprise.
//! Every node carries the span of the source it came from.

use crate::span::Span;

/// A parsed program: top-level statements in order.
#[derive(Debug, Clone)]
pub struct Program {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

/// A braced statement list.
#[derive(Debug, Clone)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

// === STATEMENTS ===

#[derive(Debug, Clone)]
pub enum Stmt {
    /// An expression in statement position: `f(x)`
    Expr { expr: Expr, span: Span },

    /// `var a, b = e1, e2`
    Var {
        names: Vec<String>,
        exprs: Vec<Expr>,
        span: Span,
    },

    /// `a, m[k], o.f = e1, e2, e3`; also what `+=`, `++` etc. desugar to
    Assign {
        targets: Vec<Expr>,
        exprs: Vec<Expr>,
        span: Span,
    },

    /// `if cond { } else { }`; chained `else if` nests inside else_block
    If {
        cond: Expr,
        then_block: Block,
        else_block: Option<Block>,
        span: Span,
    },

    /// `try { } catch e { } finally { }`
    Try {
        body: Block,
        catch_name: Option<String>,
        catch_block: Option<Block>,
        finally_block: Option<Block>,
        span: Span,
    },

    /// `for { }` and the while-form `for cond { }`
    Loop {
        cond: Option<Expr>,
        body: Block,
        span: Span,
    },

    /// `for x in xs { }` / `for k, v in m { }`
    ForIn {
        names: Vec<String>,
        iterable: Expr,
        body: Block,
        span: Span,
    },

    /// `for init; cond; post { }`
    ForC {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Box<Stmt>>,
        body: Block,
        span: Span,
    },

    /// `switch subject { case a, b: ... default: ... }`
    Switch {
        subject: Expr,
        cases: Vec<SwitchCase>,
        default: Option<Block>,
        span: Span,
    },

    /// `throw expr`
    Throw { expr: Expr, span: Span },

    /// `module name { }`
    Module {
        name: String,
        body: Block,
        span: Span,
    },

    /// `go f(args)`; call must be a Call expression
    Go { call: Expr, span: Span },

    /// `delete(m, k)` / `delete m[k]`
    Delete {
        target: Expr,
        key: Expr,
        span: Span,
    },

    /// `close(ch)`
    Close { chan: Expr, span: Span },

    /// `ch <- value`
    Send {
        chan: Expr,
        value: Expr,
        span: Span,
    },

    /// `break`
    Break { span: Span },

    /// `continue`
    Continue { span: Span },

    /// `return`, `return e`, `return e1, e2`
    Return { exprs: Vec<Expr>, span: Span },
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    pub exprs: Vec<Expr>,
    pub body: Block,
    pub span: Span,
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Expr { span, .. }
            | Stmt::Var { span, .. }
            | Stmt::Assign { span, .. }
            | Stmt::If { span, .. }
            | Stmt::Try { span, .. }
            | Stmt::Loop { span, .. }
            | Stmt::ForIn { span, .. }
            | Stmt::ForC { span, .. }
            | Stmt::Switch { span, .. }
            | Stmt::Throw { span, .. }
            | Stmt::Module { span, .. }
            | Stmt::Go { span, .. }
            | Stmt::Delete { span, .. }
            | Stmt::Close { span, .. }
            | Stmt::Send { span, .. }
            | Stmt::Break { span }
            | Stmt::Continue { span }
            | Stmt::Return { span, .. } => *span,
        }
    }
}

// === EXPRESSIONS ===

#[derive(Debug, Clone)]
pub enum Expr {
    /// `nil`
    Nil { span: Span },

    /// `true` / `false`
    Bool { value: bool, span: Span },

    /// `42`, `0x2a`
    Int { value: i64, span: Span },

    /// `3.5`, `1e3`
    Float { value: f64, span: Span },

    /// `"text"`, `` `raw` ``
    Str { value: String, span: Span },

    /// `name`
    Ident { name: String, span: Span },

    /// `[1, 2, 3]`
    Array { items: Vec<Expr>, span: Span },

    /// `{"k": v}`; keys are expressions, evaluated at construction
    Map {
        entries: Vec<(Expr, Expr)>,
        span: Span,
    },

    /// `(expr)`
    Paren { inner: Box<Expr>, span: Span },

    /// `-x`, `!x`, `^x`
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },

    /// `a + b` and friends; `&&`/`||`/`??` short-circuit in the evaluator
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },

    /// `cond ? a : b`
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
        span: Span,
    },

    /// `obj.name`
    Member {
        object: Box<Expr>,
        name: String,
        span: Span,
    },

    /// `obj[index]`
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },

    /// `xs[begin:end]`; the 3-arg cap form parses but only validates
    Slice {
        object: Box<Expr>,
        begin: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
        cap: Option<Box<Expr>>,
        span: Span,
    },

    /// `f(a, b)` / `f(xs...)`; spread expands the final array argument
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        spread: bool,
        span: Span,
    },

    /// `func name(a, b...) { }`; name optional, the body is the closure
    Func {
        name: Option<String>,
        params: Vec<String>,
        vararg: bool,
        body: Block,
        span: Span,
    },

    /// `<-ch`
    Recv { chan: Box<Expr>, span: Span },

    /// `len(x)`
    Len { expr: Box<Expr>, span: Span },

    /// `make(chan, cap)`, `make([], n)`, `make(map)`, `make(T)`
    Make { kind: MakeKind, span: Span },

    /// `new(T)`
    New { type_name: String, span: Span },

    /// `import("strings")`
    Import { name: Box<Expr>, span: Span },
}

#[derive(Debug, Clone)]
pub enum MakeKind {
    Chan { cap: Option<Box<Expr>> },
    Array { len: Option<Box<Expr>> },
    Map,
    Named(String),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Nil { span }
            | Expr::Bool { span, .. }
            | Expr::Int { span, .. }
            | Expr::Float { span, .. }
            | Expr::Str { span, .. }
            | Expr::Ident { span, .. }
            | Expr::Array { span, .. }
            | Expr::Map { span, .. }
            | Expr::Paren { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Ternary { span, .. }
            | Expr::Member { span, .. }
            | Expr::Index { span, .. }
            | Expr::Slice { span, .. }
            | Expr::Call { span, .. }
            | Expr::Func { span, .. }
            | Expr::Recv { span, .. }
            | Expr::Len { span, .. }
            | Expr::Make { span, .. }
            | Expr::New { span, .. }
            | Expr::Import { span, .. } => *span,
        }
    }
}

// === OPERATORS ===

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Comparison
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    // Logical (short-circuit)
    And,
    Or,

    // Nil-coalescing (short-circuit)
    Coalesce,

    // Membership
    In,

    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinOp {
    /// The operator as written in source, for fault messages.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Coalesce => "??",
            BinOp::In => "in",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "^",
        }
    }
}
