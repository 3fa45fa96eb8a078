use std::fmt;
use std::time::Duration;

/// Connection health as reported by a store backend.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HealthStatus {
    /// No health check has completed yet.
    #[default]
    Connecting,
    /// The last check succeeded.
    Healthy,
    /// One or more consecutive checks failed; the backend keeps retrying.
    Degraded {
        consecutive_failures: u32,
        last_error: String,
    },
    /// The backend was shut down and will not reconnect.
    ShutDown,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Connecting => write!(f, "connecting"),
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded {
                consecutive_failures,
                last_error,
            } => write!(
                f,
                "degraded ({} consecutive failures, last error: {})",
                consecutive_failures, last_error
            ),
            HealthStatus::ShutDown => write!(f, "shut down"),
        }
    }
}

/// Bounded exponential backoff between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            ..Self::default()
        }
    }

    /// Returns the delay before retry number `attempt` (zero-based).
    ///
    /// The delay is `initial * multiplier^attempt`, capped at `max`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial.as_secs_f64() * self.multiplier.powi(exponent);

        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_connecting() {
        assert_eq!(HealthStatus::default(), HealthStatus::Connecting);
        assert!(!HealthStatus::default().is_healthy());
    }

    #[test]
    fn test_degraded_display() {
        let status = HealthStatus::Degraded {
            consecutive_failures: 2,
            last_error: "connection refused".to_string(),
        };
        assert_eq!(
            status.to_string(),
            "degraded (2 consecutive failures, last error: connection refused)"
        );
    }

    #[test]
    fn test_backoff_grows_geometrically() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(10));

        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(1));

        assert_eq!(policy.delay_for(4), Duration::from_secs(1));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_never_exceeds_max() {
        let policy = BackoffPolicy::default();
        for attempt in 0..64 {
            assert!(policy.delay_for(attempt) <= policy.max);
        }
    }
}
