use std::time::Duration;
use super::types::PilotError;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub retryable: bool,
}

impl PilotError {
    /// Classify this error to determine its type and whether it can be retried.
    pub fn classify(&self) -> ErrorClassification {
        let (error_type, retryable) = match self {
            PilotError::RateLimit(_) => ("RateLimitError", true),
            PilotError::Network(_) => ("NetworkError", true),
            PilotError::Timeout(_) => ("TimeoutError", true),
            PilotError::LLMApi(_) => ("LLMApiError", true),
            PilotError::Provider(_) => ("ProviderError", true),
            PilotError::Tool(_) => ("ToolError", true),
            PilotError::Io(_) => ("IoError", true),
            PilotError::Json(_) => ("JsonError", true),
            PilotError::Internal(_) => ("InternalError", true),

            PilotError::Authentication(_) => ("AuthenticationError", false),
            PilotError::Config(_) => ("ConfigError", false),
            PilotError::Yaml(_) => ("YamlError", false),
            PilotError::InvalidTarget(_) => ("InvalidTargetError", false),
            PilotError::Precondition(_) => ("PreconditionError", false),
            PilotError::AlreadyRunning(_) => ("AlreadyRunningError", false),
            PilotError::NotFound(_) => ("NotFoundError", false),
            PilotError::NotRunning(_) => ("NotRunningError", false),
            PilotError::ToolBridgeUnavailable(_) => ("ToolBridgeUnavailableError", false),
            PilotError::Cancelled(_) => ("CancelledError", false),
            PilotError::AllWorkersFailed(_) => ("AllWorkersFailedError", false),
        };
        ErrorClassification { error_type, retryable }
    }
}

impl ErrorClassification {
    /// Backoff before retrying attempt `attempt` (0-indexed), scaled by `base`.
    ///
    /// - RateLimitError: 10 x base + attempt x base
    /// - Default: base x 2^attempt plus up to one base of jitter
    ///
    /// Both are capped at 30s. A zero base disables waiting entirely.
    pub fn retry_delay(&self, attempt: u32, base: Duration) -> Duration {
        if base.is_zero() {
            return Duration::ZERO;
        }
        let delay = match self.error_type {
            "RateLimitError" => base * (10 + attempt),
            _ => {
                let factor = 2.0_f64.powi(attempt.min(16) as i32) + rand::random::<f64>();
                base.mul_f64(factor)
            }
        };
        delay.min(MAX_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_retryable() {
        let class = PilotError::RateLimit("429".into()).classify();
        assert!(class.retryable);
        assert_eq!(class.error_type, "RateLimitError");
    }

    #[test]
    fn test_auth_error_not_retryable() {
        let class = PilotError::Authentication("bad key".into()).classify();
        assert!(!class.retryable);
        assert_eq!(class.error_type, "AuthenticationError");
    }

    #[test]
    fn test_bridge_unavailable_not_retryable() {
        assert!(!PilotError::ToolBridgeUnavailable("down".into()).classify().retryable);
    }

    #[test]
    fn test_zero_base_means_no_wait() {
        let class = PilotError::Network("reset".into()).classify();
        assert_eq!(class.retry_delay(5, Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_retry_delay_rate_limit() {
        let class = PilotError::RateLimit("slow down".into()).classify();
        let base = Duration::from_millis(100);
        assert_eq!(class.retry_delay(0, base), Duration::from_secs(1));
        assert_eq!(class.retry_delay(2, base), Duration::from_millis(1200));
    }

    #[test]
    fn test_retry_delay_exponential_with_jitter() {
        let class = PilotError::Network("reset".into()).classify();
        let base = Duration::from_secs(1);
        let d0 = class.retry_delay(0, base).as_secs_f64();
        let d2 = class.retry_delay(2, base).as_secs_f64();
        assert!((1.0..2.0).contains(&d0));
        assert!((4.0..5.0).contains(&d2));
        assert_eq!(class.retry_delay(12, base), MAX_BACKOFF);
    }

    #[test]
    fn test_precondition_helper() {
        assert!(PilotError::AlreadyRunning("scan-1".into()).is_precondition());
        assert!(!PilotError::Tool("boom".into()).is_precondition());
    }
}
