//! Retry and error classification for Telegram API calls.
//!
//! Only transient failures (network, I/O, flood control) are retried, with
//! exponential backoff and jitter. API rejections surface immediately.

use std::future::Future;
use std::time::Duration;
use teloxide::RequestError;
use tokenpilot_core::config::{
    TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES,
};
use tokenpilot_runtime::TransportError;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::warn;

const ERROR_NOT_MODIFIED: &str = "message is not modified";
const ERROR_EDIT_NOT_FOUND: &str = "message to edit not found";
const ERROR_DELETE_NOT_FOUND: &str = "message to delete not found";
const ERROR_CANT_PARSE: &str = "can't parse entities";

/// Whether a failed request is worth repeating.
#[must_use]
pub fn is_transient(err: &RequestError) -> bool {
    matches!(
        err,
        RequestError::Network(_) | RequestError::Io(_) | RequestError::RetryAfter(_)
    )
}

/// Run a Telegram request, retrying transient failures.
///
/// # Errors
///
/// Returns the last error once retries are exhausted or the error is not
/// transient.
pub async fn retry_request<F, Fut, T>(operation: F) -> Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let retry_strategy = ExponentialBackoff::from_millis(TELEGRAM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TELEGRAM_API_MAX_RETRIES);

    RetryIf::spawn(retry_strategy, operation, is_transient)
        .await
        .map_err(|e| {
            if is_transient(&e) {
                warn!(
                    "Telegram API operation failed after {} attempts: {}",
                    TELEGRAM_API_MAX_RETRIES, e
                );
            }
            e
        })
}

/// Map a Telegram error message onto the runtime's error kinds.
#[must_use]
pub fn classify_message(message: &str) -> TransportError {
    let lower = message.to_lowercase();
    if lower.contains(ERROR_NOT_MODIFIED) {
        TransportError::NotModified
    } else if lower.contains(ERROR_EDIT_NOT_FOUND) || lower.contains(ERROR_DELETE_NOT_FOUND) {
        TransportError::NotFound
    } else if lower.contains(ERROR_CANT_PARSE) {
        TransportError::MarkupRejected(message.to_string())
    } else {
        TransportError::Other(message.to_string())
    }
}

/// Classify a failed request.
#[must_use]
pub fn classify(err: &RequestError) -> TransportError {
    classify_message(&err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_api_messages_are_classified() {
        assert!(matches!(
            classify_message("Bad Request: message is not modified: specified new message content and reply markup are exactly the same"),
            TransportError::NotModified
        ));
        assert!(matches!(
            classify_message("Bad Request: message to edit not found"),
            TransportError::NotFound
        ));
        assert!(matches!(
            classify_message("Bad Request: message to delete not found"),
            TransportError::NotFound
        ));
        assert!(matches!(
            classify_message("Bad Request: can't parse entities: Unsupported start tag \"span\""),
            TransportError::MarkupRejected(_)
        ));
        assert!(matches!(
            classify_message("Forbidden: bot was blocked by the user"),
            TransportError::Other(_)
        ));
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let mut attempts = 0;
        let result: Result<(), RequestError> = retry_request(|| {
            attempts += 1;
            async { Err(RequestError::MigrateToChatId(teloxide::types::ChatId(-100))) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn success_is_returned_on_first_try() {
        let result = retry_request(|| async { Ok::<_, RequestError>(7) }).await;
        assert!(matches!(result, Ok(7)));
    }
}
