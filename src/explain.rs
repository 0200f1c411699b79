use log::trace;
use smallvec::SmallVec;

use crate::span::Span;

/// Renders errors against the candidate text they were found in.
pub struct Pretty<'src> {
    src: &'src str,
}

impl<'src> Pretty<'src> {
    pub fn new(src: &'src str) -> Self {
        Self { src }
    }

    pub fn explain_builder(&self) -> ExplainBuilder<'src> {
        ExplainBuilder {
            src: self.src,
            error_context: None,
            notes: Default::default(),
        }
    }
}

pub struct ExplainBuilder<'src> {
    src: &'src str,
    error_context: Option<Context>,
    notes: SmallVec<[String; 4]>,
}

impl<'src> ExplainBuilder<'src> {
    /// Add a note printed after the source excerpt.
    pub fn note(&mut self, note: impl Into<String>) -> &mut Self {
        self.notes.push(note.into());
        self
    }

    /// Add an error context to the error message.
    pub fn error(&mut self, context: Context) -> &mut Self {
        self.error_context = Some(context);
        self
    }

    /// Build pretty explanation from the provided contexts.
    ///
    /// ```text
    /// expected a number or `(` at position 3, found `*`
    ///   |
    ///   | 2 ** 0.5
    ///   |    ^ not allowed here
    /// = note: use `^` for powers
    /// ```
    pub fn build(&self) -> Result<PrettyError, ExplainBuildError> {
        trace!("Building explanation");

        let context = self
            .error_context
            .as_ref()
            .ok_or(ExplainBuildError::MissingErrorContext)?;

        let Context {
            span,
            label,
            message,
        } = context;

        trace!("Check span {span} against source of {} bytes", self.src.len());
        if span.end() > self.src.len()
            || !self.src.is_char_boundary(span.start())
            || !self.src.is_char_boundary(span.end())
        {
            return Err(ExplainBuildError::SpanOutOfSource(*span));
        }

        let line_start = self.src[..span.start()]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let line_end = self.src[span.start()..]
            .find('\n')
            .map(|i| i + span.start())
            .unwrap_or(self.src.len());
        let line = self.src[line_start..line_end].trim_end_matches('\r');

        // Columns are counted in characters so carets line up under non-ASCII text.
        let column = self.src[line_start..span.start()].chars().count();
        let width = self.src[span.start()..span.end().min(line_end)]
            .chars()
            .count()
            .max(1);

        let mut out = String::with_capacity(message.len() + 3 * line.len());
        out.push_str(message);
        out.push_str("\n  |\n  | ");
        out.push_str(line);
        out.push_str("\n  | ");
        out.push_str(&" ".repeat(column));
        out.push_str(&"^".repeat(width));
        if let Some(label) = label {
            out.push(' ');
            out.push_str(label);
        }
        for note in &self.notes {
            out.push_str("\n= note: ");
            out.push_str(note);
        }

        Ok(PrettyError(out))
    }
}

#[derive(Debug, Clone)]
pub struct PrettyError(String);

impl std::fmt::Display for PrettyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for PrettyError {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::convert::AsRef<str> for PrettyError {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<PrettyError> for String {
    fn from(e: PrettyError) -> String {
        e.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExplainBuildError {
    #[error("error context is missing")]
    MissingErrorContext,

    #[error("span {0} does not point into the source text")]
    SpanOutOfSource(Span),
}

pub struct Context {
    span: Span,
    label: Option<String>,
    message: String,
}

#[derive(Debug, Default)]
pub struct ContextBuilder {
    span: Option<Span>,
    label: Option<String>,
    message: Option<String>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The offending part of the source.
    pub fn span(&mut self, span: Span) -> &mut Self {
        self.span = Some(span);
        self
    }

    /// Short text printed right after the carets.
    pub fn label(&mut self, label: impl Into<String>) -> &mut Self {
        self.label = Some(label.into());
        self
    }

    pub fn message(&mut self, message: impl Into<String>) -> &mut Self {
        self.message = Some(message.into());
        self
    }

    pub fn build(&mut self) -> Result<Context, ContextBuildError> {
        trace!("Building context");

        trace!("Check if span is present");
        let span = self.span.take().ok_or(ContextBuildError::MissingSpan)?;

        trace!("Check if message is present");
        let message = self
            .message
            .take()
            .ok_or(ContextBuildError::MissingMessage)?;

        trace!("Context is built successfully");
        Ok(Context {
            span,
            label: self.label.take(),
            message,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContextBuildError {
    #[error("missing span")]
    MissingSpan,

    #[error("missing message")]
    MissingMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caret_under_token() {
        crate::init_log();

        let context = ContextBuilder::new()
            .span(Span::from(3..4))
            .label("not allowed here")
            .message("expected a number or `(` at position 3, found `*`")
            .build()
            .unwrap();

        let pretty = Pretty::new("2 ** 0.5")
            .explain_builder()
            .error(context)
            .note("use `^` for powers")
            .build()
            .unwrap();

        assert_eq!(
            &*pretty,
            "expected a number or `(` at position 3, found `*`\n\
             \x20 |\n\
             \x20 | 2 ** 0.5\n\
             \x20 |    ^ not allowed here\n\
             = note: use `^` for powers"
        );
    }

    #[test]
    fn empty_span_at_end() {
        let context = ContextBuilder::new()
            .span(Span::at(3))
            .message("unexpected end")
            .build()
            .unwrap();

        let pretty = Pretty::new("5 +").explain_builder().error(context).build().unwrap();
        assert!(pretty.ends_with("  | 5 +\n  |    ^"), "{pretty}");
    }

    #[test]
    fn multiline_source() {
        let context = ContextBuilder::new()
            .span(Span::from(4..7))
            .message("bad")
            .build()
            .unwrap();

        let pretty = Pretty::new("1 +\nabc")
            .explain_builder()
            .error(context)
            .build()
            .unwrap();
        assert!(pretty.ends_with("  | abc\n  | ^^^"), "{pretty}");
    }

    #[test]
    fn missing_parts() {
        assert!(matches!(
            ContextBuilder::new().message("m").build(),
            Err(ContextBuildError::MissingSpan)
        ));
        assert!(matches!(
            ContextBuilder::new().span(Span::NONE).build(),
            Err(ContextBuildError::MissingMessage)
        ));
        let err = Pretty::new("1").explain_builder().build().unwrap_err();
        assert!(matches!(err, ExplainBuildError::MissingErrorContext));
        assert_eq!(err.to_string(), "error context is missing");
        assert_eq!(ContextBuildError::MissingSpan.to_string(), "missing span");
    }

    #[test]
    fn span_outside_source() {
        let context = ContextBuilder::new()
            .span(Span::from(2..9))
            .message("m")
            .build()
            .unwrap();

        assert!(matches!(
            Pretty::new("1 + 2").explain_builder().error(context).build(),
            Err(ExplainBuildError::SpanOutOfSource(_))
        ));
    }
}
