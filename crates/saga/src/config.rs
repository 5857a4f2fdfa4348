//! Orchestrator configuration loaded from environment variables.

use std::time::Duration;

/// Orchestrator settings with sensible defaults.
///
/// Reads from environment variables:
/// - `SAGA_DEFAULT_TIMEOUT_MS` — saga-wide timeout applied to definitions
///   that do not set their own (default: none)
/// - `SAGA_METRICS_ENABLED` — `false` or `0` disables metric emission (default: enabled)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub default_saga_timeout: Option<Duration>,
    pub emit_metrics: bool,
}

impl OrchestratorConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            default_saga_timeout: lookup("SAGA_DEFAULT_TIMEOUT_MS")
                .and_then(|ms| ms.trim().parse::<u64>().ok())
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            emit_metrics: lookup("SAGA_METRICS_ENABLED")
                .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "false" | "0"))
                .unwrap_or(true),
        }
    }

    /// Uses `timeout` for definitions without a saga timeout of their own.
    pub fn with_default_saga_timeout(mut self, timeout: Duration) -> Self {
        self.default_saga_timeout = Some(timeout);
        self
    }

    pub fn with_metrics(mut self, emit_metrics: bool) -> Self {
        self.emit_metrics = emit_metrics;
        self
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_saga_timeout: None,
            emit_metrics: true,
        }
    }
}
