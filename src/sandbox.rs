use log::{debug, error};

use crate::{
    explain::{ContextBuilder, Pretty, PrettyError},
    expr::{
        eval::DEFAULT_MAGNITUDE_BOUND, parse::DEFAULT_MAX_DEPTH, EvalError, Evaluator, Number,
        ParseError, Parser,
    },
    span::Span,
};

/// Default limit of candidate length, in bytes.
pub const DEFAULT_MAX_INPUT_LEN: usize = 4096;

/// Closing note of every feedback text.
const SYNTAX_REMINDER: &str = "reply with a single arithmetic expression using only numbers, \
                               `+`, `-`, `*`, `/`, `^` for powers and parentheses";

/// Bounds applied to every candidate passing through the [Sandbox].
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Limits {
    /// Longest accepted candidate, in bytes. Checked before any parsing.
    pub max_input_len: usize,

    /// Tallest accepted expression tree. Operators, negations and groups all
    /// count, so `1+1+1` is as deep as `((1))`. Never more than
    /// [MAX_DEPTH_CAP](crate::expr::parse::MAX_DEPTH_CAP).
    pub max_depth: usize,

    /// Largest magnitude of any intermediate value.
    pub magnitude_bound: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_input_len: DEFAULT_MAX_INPUT_LEN,
            max_depth: DEFAULT_MAX_DEPTH,
            magnitude_bound: DEFAULT_MAGNITUDE_BOUND,
        }
    }
}

/// Turn a candidate string into a number under the default [Limits].
pub fn solve_expression(raw: &str) -> Result<Number, SandboxError> {
    Sandbox::default().solve(raw)
}

/// The only way from text to a number. A candidate is length checked, parsed
/// against the closed arithmetic grammar, and only then evaluated. Nothing in
/// the candidate can reach anything but the arithmetic operators.
///
/// Solving is pure: the same candidate always gives the same result.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sandbox {
    limits: Limits,
}

impl Sandbox {
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    pub fn solve(&self, raw: &str) -> Result<Number, SandboxError> {
        if raw.len() > self.limits.max_input_len {
            debug!(
                "Rejecting candidate of {} bytes without parsing",
                raw.len()
            );
            return Err(SandboxError::InputTooLong {
                len: raw.len(),
                max: self.limits.max_input_len,
            });
        }

        let expr = Parser::new(raw)
            .with_max_depth(self.limits.max_depth)
            .parse()?;
        let value = Evaluator::new(self.limits.magnitude_bound).evaluate(&expr)?;

        debug!("Candidate `{raw}` solved to {value}");
        Ok(value)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SandboxError {
    #[error("expression is {len} bytes long, at most {max} bytes are accepted")]
    InputTooLong { len: usize, max: usize },

    #[error("syntax error: {0}")]
    Parse(#[from] ParseError),

    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),
}

impl SandboxError {
    /// Span of the candidate text responsible for the error.
    pub fn span(&self) -> Option<Span> {
        match self {
            SandboxError::InputTooLong { .. } => None,
            SandboxError::Parse(e) => Some(e.span()),
            SandboxError::Eval(e) => Some(e.span()),
        }
    }

    /// Corrective text for the translator describing why `candidate` was
    /// rejected, with the offending part of it marked.
    pub fn feedback(&self, candidate: &str) -> String {
        let mut out = format!("The previous expression was rejected. {self}.\n");

        let explained = self.span().map(|span| self.explain(candidate, span));
        if let Some(Err(e)) = &explained {
            error!("Failed to explain sandbox error: {e}");
        }

        match explained {
            Some(Ok(pretty)) => out.push_str(&pretty),
            _ => {
                out.push_str("= note: ");
                out.push_str(SYNTAX_REMINDER);
            }
        }
        out
    }

    fn explain(&self, candidate: &str, span: Span) -> Result<PrettyError, String> {
        let label = match self {
            SandboxError::Parse(ParseError::UnexpectedEnd { .. }) => "expression ends here",
            SandboxError::Parse(_) => "not allowed here",
            _ => "fails here",
        };

        let context = ContextBuilder::new()
            .span(span)
            .label(label)
            .message("Previous expression:")
            .build()
            .map_err(|e| e.to_string())?;

        Pretty::new(candidate)
            .explain_builder()
            .error(context)
            .note(SYNTAX_REMINDER)
            .build()
            .map_err(|e| e.to_string())
    }
}
