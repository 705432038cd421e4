use std::sync::OnceLock;

use regex::Regex;

/// An error surfaced by a Kubernetes API server as a `Status` object with
/// `status: "Failure"`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("ApiError(code={code}, reason={reason:?}, message={message:?})")]
pub struct ApiError {
    pub code: u16,
    pub reason: String,
    pub message: String,
}

/// How local policy should react to an [`ApiError`] (spec.md §7's error
/// taxonomy, restricted to the API-error branches — transport-layer errors
/// are classified separately by whoever owns the transport stack).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// 429/500/502/503/504: retry with backoff.
    Retryable,
    /// 410 Gone with a `too old resource version: N (M)` message: recover by
    /// observing `M` into the cursor and retrying immediately.
    ResourceVersionTooOld,
    /// Anything else: surface to the caller / emit an error sentinel and
    /// terminate the watch task.
    Fatal,
}

fn too_old_pattern() -> &'static Regex {
    static RX: OnceLock<Regex> = OnceLock::new();
    RX.get_or_init(|| Regex::new(r"too old resource version: \d+ \((\d+)\)").expect("valid regex"))
}

impl ApiError {
    pub fn new(code: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.code, 429 | 500 | 502 | 503 | 504)
    }

    pub fn acceptable_resource_version(&self) -> Option<u64> {
        too_old_pattern()
            .captures(&self.message)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    pub fn is_resource_version_too_old(&self) -> bool {
        self.acceptable_resource_version().is_some()
    }

    /// Classify per spec.md §7: too-old takes priority over the generic
    /// retryable code check, since a 410 can carry either shape of message.
    pub fn classify(&self) -> ApiErrorKind {
        if let Some(_v) = self.acceptable_resource_version() {
            ApiErrorKind::ResourceVersionTooOld
        } else if self.is_retryable() {
            ApiErrorKind::Retryable
        } else {
            ApiErrorKind::Fatal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_retryable_codes() {
        for code in [429, 500, 502, 503, 504] {
            let err = ApiError::new(code, "ServerTimeout", "server is busy");
            assert_eq!(err.classify(), ApiErrorKind::Retryable);
        }
    }

    #[test]
    fn classifies_fatal_codes() {
        let err = ApiError::new(403, "Forbidden", "not authorized");
        assert_eq!(err.classify(), ApiErrorKind::Fatal);
    }

    #[test]
    fn extracts_acceptable_resource_version() {
        let err = ApiError::new(410, "Expired", "too old resource version: 100 (250)");
        assert_eq!(err.acceptable_resource_version(), Some(250));
        assert_eq!(err.classify(), ApiErrorKind::ResourceVersionTooOld);
    }

    #[test]
    fn too_old_message_is_never_retryable_even_at_a_retryable_code() {
        // 410 isn't in the retryable set, but make sure the message shape
        // wins regardless of what the code happens to be.
        let err = ApiError::new(503, "Expired", "too old resource version: 1 (2)");
        assert_eq!(err.classify(), ApiErrorKind::ResourceVersionTooOld);
    }
}
