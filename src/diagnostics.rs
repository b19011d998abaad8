//! Pretty error reporting.
//!
//! Renders errors as ariadne reports pointing into the original source.
//! Errors that carry no span (fatal flow errors, IO) fall back to a
//! plain one-line form.

use ariadne::{Color, Label, Report, ReportKind, Source};

use crate::error::KeshError;
use crate::span::Span;

pub struct Diagnostics<'a> {
    source: &'a str,
    filename: &'a str,
}

impl<'a> Diagnostics<'a> {
    pub fn new(source: &'a str, filename: &'a str) -> Self {
        Self { source, filename }
    }

    /// Format an error with source context.
    pub fn render(&self, error: &KeshError) -> String {
        let (title, message, span) = error_parts(error);
        // Spans that miss the source entirely (stale, or none) fall back
        // to the plain one-line form.
        let span = match span {
            Some(s) if s != Span::default() && s.start < self.source.len() => s,
            _ => return format!("{}: {}", title, message),
        };
        let start = span.start;
        let end = span.end.min(self.source.len()).max(start);

        let mut buf = Vec::new();
        let outcome = Report::build(ReportKind::Error, self.filename, start)
            .with_message(title)
            .with_label(
                Label::new((self.filename, start..end))
                    .with_message(&message)
                    .with_color(Color::Red),
            )
            .finish()
            .write((self.filename, Source::from(self.source)), &mut buf);
        match outcome {
            Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => format!("{}: {}", title, message),
        }
    }
}

/// Format an error without source context.
pub fn plain(error: &KeshError) -> String {
    let (title, message, _span) = error_parts(error);
    format!("{}: {}", title, message)
}

fn error_parts(error: &KeshError) -> (&'static str, String, Option<Span>) {
    match error {
        KeshError::Syntax { message, span } => ("syntax error", message.clone(), Some(*span)),
        KeshError::Coerce { message, span } => ("type error", message.clone(), Some(*span)),
        KeshError::Lookup { message, span } => ("lookup error", message.clone(), Some(*span)),
        KeshError::Arity { message, span } => ("arity error", message.clone(), Some(*span)),
        KeshError::Range { message, span } => ("range error", message.clone(), Some(*span)),
        KeshError::Channel { message, span } => ("channel error", message.clone(), Some(*span)),
        KeshError::Thrown { payload, span } => ("uncaught throw", payload.to_string(), Some(*span)),
        KeshError::Fatal { message } => ("fatal runtime error", message.clone(), None),
        KeshError::Io(err) => ("IO error", err.to_string(), None),
    }
}
