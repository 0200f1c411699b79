//! Reckon answers arithmetic word problems without ever running untrusted code.
//!
//! An external translator (usually a language model behind some service) turns
//! the problem text into a candidate arithmetic expression. The candidate is
//! then treated as hostile input: it is checked against a small closed grammar
//! and evaluated by a pure tree walker. If the candidate is rejected, the
//! translator is asked again with feedback explaining what was wrong, up to a
//! fixed number of attempts.
//!
//! # Grammar
//! ```text
//! expr    := term (('+'|'-') term)*
//! term    := factor (('*'|'/') factor)*
//! factor  := unary ('^' factor)?
//! unary   := '-'? primary
//! primary := NUMBER | '(' expr ')'
//! ```
//! Numbers are decimal literals with an optional fraction and exponent. There
//! are no identifiers, calls, strings or statements, so no candidate can reach
//! anything beyond these operators. `^` is the power operator; `**` is rejected.
//!
//! # Numbers
//! Values are `f64`. Every intermediate value must stay finite and within a
//! magnitude bound (`1e18` by default); division by zero and fractional powers
//! of negative numbers are errors rather than infinities or NaN.
//!
//! # Retrying
//! [solve::Solver] runs a bounded state machine per problem. Syntax and
//! evaluation errors become feedback for the next request. Translator failures
//! (unavailable, timed out, empty answer) end the session at once, since asking
//! a service that is down again only wastes attempts.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use reckon::{solve_problem, Translator, TranslatorError};
//!
//! struct Echo;
//!
//! impl Translator for Echo {
//!     async fn translate(
//!         &self,
//!         problem: &str,
//!         _feedback: Option<&str>,
//!     ) -> Result<String, TranslatorError> {
//!         Ok(problem.to_owned())
//!     }
//! }
//!
//! # async fn run() {
//! let answer = solve_problem(Echo, "2 + 2", 3, Duration::from_secs(5)).await;
//! assert_eq!(answer.unwrap(), 4.0);
//! # }
//! ```

/// Module with source spans used to point at offending parts of a candidate.
pub mod span;

/// Module with the arithmetic grammar: lexer, parser, syntax tree and evaluator.
pub mod expr;

/// Module that is the only entry point from a candidate string to a number.
pub mod sandbox;

/// Module to render errors against the candidate text, so that the translator
/// can see what exactly was wrong.
pub mod explain;

/// Module with the translator interface and helpers around it.
pub mod translate;

/// Module driving the translate-evaluate-retry loop.
pub mod solve;

/// Module to load settings of the crate.
pub mod config;

pub use config::Config;
pub use expr::Number;
pub use sandbox::{solve_expression, Sandbox, SandboxError};
pub use solve::{solve_problem, Attempt, Solution, SolveError, Solver};
pub use translate::{Translator, TranslatorError};

#[cfg(test)]
pub fn init_log() {
    use log::*;

    static INIT: std::sync::Once = std::sync::Once::new();

    INIT.call_once(|| {
        flexi_logger::Logger::with(LevelFilter::Trace)
            .format(format)
            .start()
            .unwrap();
    });

    fn format(
        write: &mut dyn std::io::Write,
        _: &mut flexi_logger::DeferredNow,
        record: &Record,
    ) -> std::io::Result<()> {
        write.write_all(
            format!(
                "[{} {}:{}] {} - {}",
                record.level(),
                record.file().unwrap_or_default(),
                record.line().unwrap_or_default(),
                record.module_path().unwrap_or_default(),
                record.args()
            )
            .as_bytes(),
        )
    }
}
