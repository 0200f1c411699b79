use std::{future::Future, sync::Arc, time::Duration};

use lazy_regex::regex_captures;
use log::trace;
use tokio::sync::Semaphore;

/// External service turning a word problem into a candidate arithmetic expression.
///
/// Implementations own their connection details, credentials and prompting.
/// `feedback` is the corrective text for the previous rejected candidate, if any.
pub trait Translator {
    fn translate(
        &self,
        problem: &str,
        feedback: Option<&str>,
    ) -> impl Future<Output = Result<String, TranslatorError>> + Send;
}

impl<T> Translator for Arc<T>
where
    T: Translator + Send + Sync,
{
    fn translate(
        &self,
        problem: &str,
        feedback: Option<&str>,
    ) -> impl Future<Output = Result<String, TranslatorError>> + Send {
        (**self).translate(problem, feedback)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslatorError {
    #[error("translator is unavailable. {0}")]
    Unavailable(String),

    #[error("translator did not answer within {0:?}")]
    Timeout(Duration),

    #[error("translator returned a malformed response. {0}")]
    MalformedResponse(String),
}

/// Translator wrapper limiting how many calls may be in flight at once.
///
/// Clones share the same permits, so one `Throttled` cloned into every
/// session caps the load on the service for the whole process. A session
/// waiting for a permit holds nothing else.
#[derive(Debug, Clone)]
pub struct Throttled<T> {
    inner: T,
    permits: Arc<Semaphore>,
}

impl<T> Throttled<T> {
    pub fn new(inner: T, max_in_flight: usize) -> Self {
        Self {
            inner,
            permits: Arc::new(Semaphore::new(max_in_flight)),
        }
    }

    /// Share permits with other throttled translators.
    pub fn with_permits(inner: T, permits: Arc<Semaphore>) -> Self {
        Self { inner, permits }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T> Translator for Throttled<T>
where
    T: Translator + Sync,
{
    async fn translate(
        &self,
        problem: &str,
        feedback: Option<&str>,
    ) -> Result<String, TranslatorError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| TranslatorError::Unavailable("translator throttle is closed".into()))?;

        trace!(
            "Acquired translator permit, {} left",
            self.permits.available_permits()
        );
        self.inner.translate(problem, feedback).await
    }
}

/// Strip the wrapping translators tend to put around an expression: code
/// fences, quotes, backticks and a trailing `=`. Returns `None` if nothing is left.
pub fn clean_candidate(response: &str) -> Option<String> {
    let mut text = response.trim();

    if let Some((_, body)) = regex_captures!(r"(?s)^```[A-Za-z0-9_+-]*\s*(.*?)\s*```$", text) {
        text = body;
    }

    loop {
        let unquoted = ['\'', '"', '`'].iter().find_map(|&q| {
            text.strip_prefix(q)
                .and_then(|t| t.strip_suffix(q))
                .map(str::trim)
        });
        match unquoted {
            Some(t) => text = t,
            None => break,
        }
    }

    let text = text.strip_suffix('=').map(str::trim_end).unwrap_or(text);

    (!text.is_empty()).then(|| text.to_owned())
}
