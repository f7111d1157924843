use crate::core::config::RetryConfig;
use crate::core::error::{ConversionError, ErrorKind, RetryError};
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

pub const MAX_RETRIES_MESSAGE: &str =
    "Maximum retry attempts exceeded. Please try again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorState {
    Idle,
    Error,
    Retrying,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorSnapshot {
    pub state: ErrorState,
    pub error: Option<ConversionError>,
    pub message: Option<String>,
    pub retry_count: u32,
}

impl ErrorSnapshot {
    fn idle() -> Self {
        Self {
            state: ErrorState::Idle,
            error: None,
            message: None,
            retry_count: 0,
        }
    }
}

/// Tracks the most recent failure and drives caller-initiated retries with
/// exponential backoff. Never retries on its own.
pub struct ErrorHandler {
    inner: Mutex<ErrorSnapshot>,
    max_retries: u32,
    base_delay: Duration,
}

impl ErrorHandler {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            inner: Mutex::new(ErrorSnapshot::idle()),
            max_retries: config.max_retries,
            base_delay: config.base_delay(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ErrorSnapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `error` and returns its classification.
    pub fn handle_error(&self, error: &ConversionError) -> ErrorKind {
        let kind = error.kind();
        warn!(%kind, error = %error, "Currency conversion error");
        let mut state = self.lock();
        state.state = ErrorState::Error;
        state.message = Some(error.user_message());
        state.error = Some(error.clone());
        kind
    }

    pub fn clear_error(&self) {
        *self.lock() = ErrorSnapshot::idle();
    }

    pub fn can_retry(&self) -> bool {
        let state = self.lock();
        state.retry_count < self.max_retries && state.state != ErrorState::Retrying
    }

    pub fn snapshot(&self) -> ErrorSnapshot {
        self.lock().clone()
    }

    pub fn message(&self) -> Option<String> {
        self.lock().message.clone()
    }

    pub fn state(&self) -> ErrorState {
        self.lock().state
    }

    pub fn retry_count(&self) -> u32 {
        self.lock().retry_count
    }

    /// Runs `retry_fn` after a backoff of `base_delay * 2^retry_count`.
    ///
    /// Success clears all error state. Failure bumps the retry count, and once
    /// the limit is reached the message is replaced by a terminal notice.
    pub async fn retry<T, F, Fut>(&self, retry_fn: F) -> Result<T, RetryError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ConversionError>>,
    {
        let attempt = {
            let mut state = self.lock();
            if state.state == ErrorState::Retrying {
                return Err(RetryError::InProgress);
            }
            if state.retry_count >= self.max_retries {
                return Err(RetryError::Exhausted {
                    attempts: state.retry_count,
                });
            }
            state.state = ErrorState::Retrying;
            state.retry_count
        };

        let guard = RetryGuard {
            handler: self,
            armed: true,
        };

        let delay = self.base_delay * 2u32.saturating_pow(attempt);
        debug!(attempt = attempt + 1, ?delay, "Retrying after backoff");
        tokio::time::sleep(delay).await;

        let result = retry_fn().await;
        guard.disarm();
        match result {
            Ok(value) => {
                debug!("Retry succeeded");
                self.clear_error();
                Ok(value)
            }
            Err(error) => {
                let mut state = self.lock();
                state.retry_count += 1;
                state.state = ErrorState::Error;
                state.message = if state.retry_count >= self.max_retries {
                    Some(MAX_RETRIES_MESSAGE.to_string())
                } else {
                    Some(error.user_message())
                };
                state.error = Some(error.clone());
                warn!(retry_count = state.retry_count, error = %error, "Retry failed");
                Err(RetryError::Failed(error))
            }
        }
    }
}

/// Leaves `Retrying` when a retry future is dropped before it settles.
struct RetryGuard<'a> {
    handler: &'a ErrorHandler,
    armed: bool,
}

impl RetryGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RetryGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.handler.lock();
        if state.state == ErrorState::Retrying {
            state.state = ErrorState::Error;
            debug!("Retry abandoned before completion");
        }
    }
}
