use std::time::Duration;

use log::{debug, info, warn};

use crate::{
    config::Config,
    expr::Number,
    sandbox::{Sandbox, SandboxError},
    translate::{clean_candidate, Translator, TranslatorError},
};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings of the translate-evaluate-retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolveConfig {
    /// Most candidates requested for one problem. Zero is treated as one.
    pub max_retries: u32,

    /// Time one translator call may take.
    #[serde(rename = "per_call_timeout_ms", deserialize_with = "millis")]
    pub per_call_timeout: Duration,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            per_call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl SolveConfig {
    pub fn max_attempts(&self) -> usize {
        self.max_retries.max(1) as usize
    }
}

fn millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;
    u64::deserialize(deserializer).map(Duration::from_millis)
}

/// One round of the loop: what the translator said and what the sandbox made of it.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    /// Translator response as received.
    pub response: String,

    /// The response with wrapping removed, as handed to the sandbox.
    pub candidate: String,

    pub outcome: Result<Number, SandboxError>,

    /// Text sent back to the translator with the next request. Only set when
    /// the candidate failed and another attempt followed.
    pub feedback: Option<String>,
}

/// Answer to a problem together with every attempt it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub value: Number,
    pub attempts: Vec<Attempt>,
}

#[derive(Debug, thiserror::Error)]
pub enum SolveError {
    #[error("no valid expression after {} attempts", .attempts.len())]
    RetriesExhausted { attempts: Vec<Attempt> },

    #[error("could not get an expression. {source}")]
    TranslatorUnavailable {
        source: TranslatorError,
        attempts: Vec<Attempt>,
    },
}

impl SolveError {
    /// Attempts made before giving up, oldest first.
    pub fn attempts(&self) -> &[Attempt] {
        match self {
            SolveError::RetriesExhausted { attempts }
            | SolveError::TranslatorUnavailable { attempts, .. } => attempts,
        }
    }
}

/// Solve a word problem with default sandbox limits.
pub async fn solve_problem<T: Translator>(
    translator: T,
    problem: &str,
    max_retries: u32,
    per_call_timeout: Duration,
) -> Result<Number, SolveError> {
    Solver::new(translator)
        .with_config(SolveConfig {
            max_retries,
            per_call_timeout,
        })
        .solve(problem)
        .await
        .map(|solution| solution.value)
}

/// Drives a [Translator] and a [Sandbox] through the bounded retry loop.
///
/// A solver holds no per-problem state and can serve many problems at once;
/// every call to [Solver::solve] runs its own session. Dropping the future
/// returned by `solve` cancels the pending translator call and discards the
/// session.
#[derive(Debug)]
pub struct Solver<T> {
    translator: T,
    sandbox: Sandbox,
    config: SolveConfig,
}

impl<T: Translator> Solver<T> {
    pub fn new(translator: T) -> Self {
        Self {
            translator,
            sandbox: Sandbox::default(),
            config: SolveConfig::default(),
        }
    }

    pub fn from_config(translator: T, config: &Config) -> Self {
        Self {
            translator,
            sandbox: Sandbox::new(config.sandbox),
            config: config.solve,
        }
    }

    pub fn with_config(mut self, config: SolveConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_sandbox(mut self, sandbox: Sandbox) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn translator(&self) -> &T {
        &self.translator
    }

    pub async fn solve(&self, problem: &str) -> Result<Solution, SolveError> {
        info!("Solving problem: {problem}");

        Session {
            solver: self,
            problem,
            attempts: Vec::with_capacity(self.config.max_attempts()),
        }
        .run()
        .await
    }
}

#[derive(Debug)]
enum State {
    AwaitingTranslation { feedback: Option<String> },
    Validating { response: String, candidate: String },
    Retrying { feedback: String },
    Succeeded(Number),
    Failed(Failure),
}

#[derive(Debug)]
enum Failure {
    RetriesExhausted,
    Translator(TranslatorError),
}

/// State of solving one problem. Lives only as long as the `solve` call.
struct Session<'s, T> {
    solver: &'s Solver<T>,
    problem: &'s str,
    attempts: Vec<Attempt>,
}

impl<'s, T: Translator> Session<'s, T> {
    async fn run(mut self) -> Result<Solution, SolveError> {
        let mut state = State::AwaitingTranslation { feedback: None };

        loop {
            debug!("Attempt {}: {state:?}", self.attempts.len() + 1);

            state = match state {
                State::AwaitingTranslation { feedback } => self.translate(feedback).await,
                State::Validating {
                    response,
                    candidate,
                } => self.validate(response, candidate),
                State::Retrying { feedback } => self.retry(feedback),
                State::Succeeded(value) => {
                    info!(
                        "Solved in {} attempt(s): {value}",
                        self.attempts.len()
                    );
                    return Ok(Solution {
                        value,
                        attempts: self.attempts,
                    });
                }
                State::Failed(failure) => return Err(self.fail(failure)),
            };
        }
    }

    async fn translate(&mut self, feedback: Option<String>) -> State {
        let timeout = self.solver.config.per_call_timeout;
        let call = self
            .solver
            .translator
            .translate(self.problem, feedback.as_deref());

        let response = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return State::Failed(Failure::Translator(e)),
            Err(_) => return State::Failed(Failure::Translator(TranslatorError::Timeout(timeout))),
        };

        match clean_candidate(&response) {
            Some(candidate) => State::Validating {
                response,
                candidate,
            },
            None => State::Failed(Failure::Translator(TranslatorError::MalformedResponse(
                format!("no expression in `{response}`"),
            ))),
        }
    }

    fn validate(&mut self, response: String, candidate: String) -> State {
        let outcome = self.solver.sandbox.solve(&candidate);
        let next = match &outcome {
            Ok(value) => State::Succeeded(*value),
            Err(e) => {
                warn!("Candidate `{candidate}` rejected: {e}");
                State::Retrying {
                    feedback: e.feedback(&candidate),
                }
            }
        };

        self.attempts.push(Attempt {
            response,
            candidate,
            outcome,
            feedback: None,
        });
        next
    }

    fn retry(&mut self, feedback: String) -> State {
        if self.attempts.len() >= self.solver.config.max_attempts() {
            return State::Failed(Failure::RetriesExhausted);
        }

        if let Some(last) = self.attempts.last_mut() {
            last.feedback = Some(feedback.clone());
        }
        State::AwaitingTranslation {
            feedback: Some(feedback),
        }
    }

    fn fail(self, failure: Failure) -> SolveError {
        let attempts = self.attempts;
        match failure {
            Failure::RetriesExhausted => {
                warn!("Giving up after {} attempts", attempts.len());
                SolveError::RetriesExhausted { attempts }
            }
            Failure::Translator(source) => {
                warn!("Translator failed: {source}");
                SolveError::TranslatorUnavailable { source, attempts }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use super::*;
    use crate::expr::{EvalErrorKind, ParseError};

    /// Replies with the scripted responses in order, repeating the last one,
    /// and records the feedback of every request.
    struct Script {
        responses: Vec<Result<String, TranslatorError>>,
        calls: AtomicUsize,
        feedback: Mutex<Vec<Option<String>>>,
    }

    impl Script {
        fn new<'a>(responses: impl IntoIterator<Item = &'a str>) -> Arc<Self> {
            Self::results(responses.into_iter().map(|r| Ok(r.to_owned())))
        }

        fn results(responses: impl IntoIterator<Item = Result<String, TranslatorError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: responses.into_iter().collect(),
                calls: AtomicUsize::new(0),
                feedback: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn feedback(&self) -> Vec<Option<String>> {
            self.feedback.lock().unwrap().clone()
        }
    }

    impl Translator for Script {
        async fn translate(
            &self,
            _problem: &str,
            feedback: Option<&str>,
        ) -> Result<String, TranslatorError> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            self.feedback.lock().unwrap().push(feedback.map(str::to_owned));
            self.responses[i.min(self.responses.len() - 1)].clone()
        }
    }

    /// Never answers.
    struct Silent;

    impl Translator for Silent {
        async fn translate(&self, _: &str, _: Option<&str>) -> Result<String, TranslatorError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn first_try() {
        crate::init_log();

        let script = Script::new(["'5 * 12 - 25'"]);
        let solution = Solver::new(script.clone())
            .solve("A baker has 5 dozen cookies. She sells 25 of them. How many cookies are left?")
            .await
            .unwrap();

        assert_eq!(solution.value, 35.0);
        assert_eq!(solution.attempts.len(), 1);
        assert_eq!(solution.attempts[0].response, "'5 * 12 - 25'");
        assert_eq!(solution.attempts[0].candidate, "5 * 12 - 25");
        assert_eq!(solution.attempts[0].feedback, None);
        assert_eq!(script.feedback(), vec![None]);
    }

    #[tokio::test]
    async fn retry_after_parse_error() {
        crate::init_log();

        let script = Script::new(["5 +", "5 + 3"]);
        let solution = Solver::new(script.clone())
            .solve("What is five plus three?")
            .await
            .unwrap();

        assert_eq!(solution.value, 8.0);
        assert_eq!(solution.attempts.len(), 2);
        assert!(matches!(
            solution.attempts[0].outcome,
            Err(SandboxError::Parse(ParseError::UnexpectedEnd { .. }))
        ));
        assert!(solution.attempts[1].outcome.is_ok());
        assert_eq!(script.calls(), 2);

        // The second request carries feedback about the first candidate.
        let feedback = script.feedback();
        assert_eq!(feedback[0], None);
        let sent = feedback[1].as_deref().unwrap();
        assert!(sent.contains("  | 5 +"), "{sent}");
        assert_eq!(solution.attempts[0].feedback.as_deref(), Some(sent));
    }

    #[tokio::test]
    async fn retry_after_eval_error() {
        let script = Script::new(["10 / (5 - 5)", "10 / 5"]);
        let solution = Solver::new(script.clone())
            .solve("Ten split five ways?")
            .await
            .unwrap();

        assert_eq!(solution.value, 2.0);
        assert_eq!(solution.attempts.len(), 2);

        let Err(SandboxError::Eval(e)) = &solution.attempts[0].outcome else {
            panic!(
                "expected an evaluation error, got {:?}",
                solution.attempts[0].outcome
            );
        };
        assert_eq!(e.kind(), EvalErrorKind::DivisionByZero);
        assert_eq!(e.expr(), "10 / (5 - 5)");

        let feedback = script.feedback();
        let sent = feedback[1].as_deref().unwrap();
        assert!(sent.contains("division by zero in `10 / (5 - 5)`"), "{sent}");
    }

    #[tokio::test]
    async fn solve_problem_returns_value() {
        let script = Script::new(["10 / (5 - 5)", "10 / 5"]);
        let timeout = Duration::from_secs(1);
        let value = solve_problem(script.clone(), "Ten split five ways?", 3, timeout)
            .await
            .unwrap();

        assert_eq!(value, 2.0);
        assert_eq!(script.calls(), 2);
    }

    #[tokio::test]
    async fn retries_exhausted() {
        crate::init_log();

        let script = Script::new(["import os"]);
        let err = Solver::new(script.clone())
            .with_config(SolveConfig {
                max_retries: 3,
                ..Default::default()
            })
            .solve("Delete everything")
            .await
            .unwrap_err();

        let SolveError::RetriesExhausted { attempts } = &err else {
            panic!("expected RetriesExhausted, got {err:?}");
        };
        assert_eq!(attempts.len(), 3);
        assert_eq!(script.calls(), 3);
        assert!(attempts
            .iter()
            .all(|a| matches!(a.outcome, Err(SandboxError::Parse(_)))));

        // Only attempts followed by another request carry feedback.
        assert!(attempts[0].feedback.is_some());
        assert!(attempts[1].feedback.is_some());
        assert!(attempts[2].feedback.is_none());
        assert_eq!(err.to_string(), "no valid expression after 3 attempts");
    }

    #[tokio::test]
    async fn zero_retries_still_tries_once() {
        let script = Script::new(["nope"]);
        let err = solve_problem(script.clone(), "?", 0, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.attempts().len(), 1);
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test]
    async fn translator_error_is_not_retried() {
        let script = Script::results([
            Ok("1 +".to_owned()),
            Err(TranslatorError::Unavailable("connection refused".to_owned())),
        ]);
        let err = Solver::new(script.clone()).solve("?").await.unwrap_err();

        let SolveError::TranslatorUnavailable { source, attempts } = &err else {
            panic!("expected TranslatorUnavailable, got {err:?}");
        };
        assert_eq!(
            source,
            &TranslatorError::Unavailable("connection refused".to_owned())
        );
        assert_eq!(attempts.len(), 1);
        assert_eq!(script.calls(), 2);
    }

    #[tokio::test]
    async fn empty_response_is_malformed() {
        let script = Script::new(["  ``  "]);
        let err = Solver::new(script.clone()).solve("?").await.unwrap_err();

        assert!(matches!(
            err,
            SolveError::TranslatorUnavailable {
                source: TranslatorError::MalformedResponse(_),
                ..
            }
        ));
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn translator_timeout() {
        let timeout = Duration::from_millis(250);
        let err = solve_problem(Silent, "?", 3, timeout).await.unwrap_err();

        let SolveError::TranslatorUnavailable { source, attempts } = err else {
            panic!("expected TranslatorUnavailable, got {err:?}");
        };
        assert_eq!(source, TranslatorError::Timeout(timeout));
        assert!(attempts.is_empty());
    }

    /// Hangs forever and flags when its pending call is dropped.
    struct Hanging {
        dropped: Arc<AtomicBool>,
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    impl Translator for Hanging {
        async fn translate(&self, _: &str, _: Option<&str>) -> Result<String, TranslatorError> {
            let _flag = DropFlag(self.dropped.clone());
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn abandoning_solve_drops_pending_call() {
        let dropped = Arc::new(AtomicBool::new(false));
        let solver = Solver::new(Hanging {
            dropped: dropped.clone(),
        });

        let abandoned = tokio::time::timeout(Duration::from_millis(10), solver.solve("?")).await;

        assert!(abandoned.is_err());
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn concurrent_sessions_are_independent() {
        let solver = Arc::new(Solver::new(Script::new(["1 +", "2 * 21"])));

        let mut handles = Vec::new();
        for i in 0..4 {
            let solver = solver.clone();
            handles.push(tokio::spawn(async move {
                solver.solve(&format!("problem {i}")).await
            }));
        }

        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap().map(|s| s.value));
        }

        // The shared script only fails the very first call.
        assert_eq!(values.iter().filter(|v| v.is_ok()).count(), 4);
        assert_eq!(solver.translator().calls(), 5);
    }
}
