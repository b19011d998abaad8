//! Error types for the kesh interpreter
//!
//! Two layers: [`Fault`] is the lightweight failure that travels up the
//! evaluator until a `try` consumes it; [`KeshError`] is the public surface
//! a host sees when a fault (or a front-end error) escapes `eval`.

use crate::runtime::value::Value;
use crate::span::Span;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeshError {
    #[error("syntax error at {span:?}: {message}")]
    Syntax { message: String, span: Span },

    #[error("type error: {message}")]
    Coerce { message: String, span: Span },

    #[error("lookup error: {message}")]
    Lookup { message: String, span: Span },

    #[error("arity error: {message}")]
    Arity { message: String, span: Span },

    #[error("range error: {message}")]
    Range { message: String, span: Span },

    #[error("channel error: {message}")]
    Channel { message: String, span: Span },

    #[error("uncaught throw: {payload}")]
    Thrown { payload: Value, span: Span },

    #[error("fatal runtime error: {message}")]
    Fatal { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KeshError {
    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        KeshError::Syntax {
            message: message.into(),
            span,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        KeshError::Fatal {
            message: message.into(),
        }
    }

    /// Span of the offending source, when the error carries one.
    pub fn span(&self) -> Option<Span> {
        match self {
            KeshError::Syntax { span, .. }
            | KeshError::Coerce { span, .. }
            | KeshError::Lookup { span, .. }
            | KeshError::Arity { span, .. }
            | KeshError::Range { span, .. }
            | KeshError::Channel { span, .. }
            | KeshError::Thrown { span, .. } => Some(*span),
            KeshError::Fatal { .. } | KeshError::Io(_) => None,
        }
    }

    /// True for front-end errors, false for errors raised while running.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, KeshError::Syntax { .. })
    }

    /// Short human-readable name for diagnostics headings.
    pub fn kind_name(&self) -> &'static str {
        match self {
            KeshError::Syntax { .. } => "syntax error",
            KeshError::Coerce { .. } => "type error",
            KeshError::Lookup { .. } => "lookup error",
            KeshError::Arity { .. } => "arity error",
            KeshError::Range { .. } => "range error",
            KeshError::Channel { .. } => "channel error",
            KeshError::Thrown { .. } => "uncaught throw",
            KeshError::Fatal { .. } => "fatal runtime error",
            KeshError::Io(_) => "io error",
        }
    }
}

/// Classification of a fault raised during evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Illegal conversion or operator operand kinds.
    Coerce,
    /// Undefined identifier, member, or module.
    Lookup,
    /// Wrong argument or binding count.
    Arity,
    /// Index/slice bounds, shift counts, division by zero.
    Range,
    /// Send on closed, double close.
    Channel,
    /// An explicit `throw` payload.
    Thrown,
    /// `break`/`continue`/`return` escaping their construct.
    Flow,
}

/// A fault propagating up the evaluator.
///
/// `payload` is set for `throw` so catch binds the original value rather
/// than a stringified copy.
#[derive(Debug, Clone)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
    pub span: Span,
    pub payload: Option<Value>,
}

impl Fault {
    fn new(kind: FaultKind, message: impl Into<String>, span: Span) -> Self {
        Fault {
            kind,
            message: message.into(),
            span,
            payload: None,
        }
    }

    pub fn coerce(message: impl Into<String>, span: Span) -> Self {
        Fault::new(FaultKind::Coerce, message, span)
    }

    pub fn lookup(message: impl Into<String>, span: Span) -> Self {
        Fault::new(FaultKind::Lookup, message, span)
    }

    pub fn arity(message: impl Into<String>, span: Span) -> Self {
        Fault::new(FaultKind::Arity, message, span)
    }

    pub fn range(message: impl Into<String>, span: Span) -> Self {
        Fault::new(FaultKind::Range, message, span)
    }

    pub fn channel(message: impl Into<String>, span: Span) -> Self {
        Fault::new(FaultKind::Channel, message, span)
    }

    pub fn flow(message: impl Into<String>, span: Span) -> Self {
        Fault::new(FaultKind::Flow, message, span)
    }

    pub fn thrown(payload: Value, span: Span) -> Self {
        Fault {
            kind: FaultKind::Thrown,
            message: payload.to_string(),
            span,
            payload: Some(payload),
        }
    }

    /// The value `catch` binds: the thrown payload, or the message string
    /// for evaluator-raised faults.
    pub fn catch_value(&self) -> Value {
        match &self.payload {
            Some(v) => v.clone(),
            None => Value::Str(self.message.clone()),
        }
    }

    /// Attach a span to a fault raised without one (native calls).
    pub fn at(mut self, span: Span) -> Self {
        if self.span == Span::default() {
            self.span = span;
        }
        self
    }
}

impl From<Fault> for KeshError {
    fn from(fault: Fault) -> Self {
        let Fault {
            kind,
            message,
            span,
            payload,
        } = fault;
        match kind {
            FaultKind::Coerce => KeshError::Coerce { message, span },
            FaultKind::Lookup => KeshError::Lookup { message, span },
            FaultKind::Arity => KeshError::Arity { message, span },
            FaultKind::Range => KeshError::Range { message, span },
            FaultKind::Channel => KeshError::Channel { message, span },
            FaultKind::Thrown => KeshError::Thrown {
                payload: payload.unwrap_or(Value::Str(message)),
                span,
            },
            FaultKind::Flow => KeshError::Fatal { message },
        }
    }
}

/// Result type for host-facing operations.
pub type KeshResult<T> = Result<T, KeshError>;

/// Result type threaded through expression evaluation.
pub type EvalResult<T> = Result<T, Fault>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catch_value_prefers_payload() {
        let fault = Fault::thrown(Value::Int(2), Span::new(0, 1));
        assert!(matches!(fault.catch_value(), Value::Int(2)));

        let fault = Fault::range("index out of range", Span::new(0, 1));
        match fault.catch_value() {
            Value::Str(s) => assert_eq!(s, "index out of range"),
            other => panic!("expected message string, got {:?}", other),
        }
    }

    #[test]
    fn test_fault_to_error_keeps_kind() {
        let err: KeshError = Fault::lookup("undefined symbol 'x'", Span::new(4, 5)).into();
        assert!(matches!(err, KeshError::Lookup { .. }));
        assert_eq!(err.span(), Some(Span::new(4, 5)));
        assert!(!err.is_parse_error());
    }

    #[test]
    fn test_at_fills_missing_span() {
        let fault = Fault::arity("expected 2 arguments", Span::default()).at(Span::new(9, 12));
        assert_eq!(fault.span, Span::new(9, 12));

        let kept = Fault::arity("expected 2 arguments", Span::new(1, 2)).at(Span::new(9, 12));
        assert_eq!(kept.span, Span::new(1, 2));
    }
}
