use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

/// Parse a profiled env var into `T`. Values that do not fit `T` fall back
/// to `default` instead of wrapping.
fn profiled_env_parse<T: FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key).as_deref() {
        Some("true") | Some("1") | Some("yes") => true,
        Some("false") | Some("0") | Some("no") => false,
        _ => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub alerting: AlertingConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `CLOUDMON_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("CLOUDMON_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        Self {
            alerting: AlertingConfig::from_env_profiled(&p),
            profile: p,
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        let a = &self.alerting;
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  alerting:    enabled={}, execute={}, min_interval={}s, max_attempts={}",
            a.enabled,
            a.execute_alerts,
            a.min_interval_seconds,
            a.max_attempts
        );
        tracing::info!(
            "  timeouts:    evaluation={}s, notification={}s, shutdown_grace={}s",
            a.evaluation_timeout_seconds,
            a.notification_timeout_seconds,
            a.shutdown_grace_seconds
        );
        tracing::info!(
            "  scheduling:  exec_queue={}, rule_refresh_ticks={}, ticker_offset={}s",
            a.exec_queue_capacity,
            a.rule_refresh_ticks,
            a.ticker_offset_seconds
        );
    }
}

// ── Alerting ──────────────────────────────────────────────────

/// Settings for the alert scheduling and evaluation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertingConfig {
    /// Master switch; when off the engine does not start.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// When off, due jobs are scheduled but never evaluated.
    #[serde(default = "default_true")]
    pub execute_alerts: bool,
    /// Lower bound on any rule's evaluation interval.
    #[serde(default = "default_min_interval")]
    pub min_interval_seconds: i64,
    /// Evaluation attempts per dispatched job (>= 1).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_evaluation_timeout")]
    pub evaluation_timeout_seconds: u64,
    #[serde(default = "default_notification_timeout")]
    pub notification_timeout_seconds: u64,
    #[serde(default = "default_exec_queue_capacity")]
    pub exec_queue_capacity: usize,
    /// Rule set is re-read every this many ticks.
    #[serde(default = "default_rule_refresh_ticks")]
    pub rule_refresh_ticks: u64,
    /// How long a cancelled job may keep running its current attempt.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
    /// Shifts each tick's deadline; positive values delay ticks.
    #[serde(default)]
    pub ticker_offset_seconds: i64,
}

fn default_true() -> bool { true }
fn default_min_interval() -> i64 { 10 }
fn default_max_attempts() -> u32 { 3 }
fn default_evaluation_timeout() -> u64 { 5 }
fn default_notification_timeout() -> u64 { 30 }
fn default_exec_queue_capacity() -> usize { 1000 }
fn default_rule_refresh_ticks() -> u64 { 10 }
fn default_shutdown_grace() -> u64 { 5 }

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            execute_alerts: default_true(),
            min_interval_seconds: default_min_interval(),
            max_attempts: default_max_attempts(),
            evaluation_timeout_seconds: default_evaluation_timeout(),
            notification_timeout_seconds: default_notification_timeout(),
            exec_queue_capacity: default_exec_queue_capacity(),
            rule_refresh_ticks: default_rule_refresh_ticks(),
            shutdown_grace_seconds: default_shutdown_grace(),
            ticker_offset_seconds: 0,
        }
    }
}

impl AlertingConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            enabled: profiled_env_bool(p, "ALERTING_ENABLED", default_true()),
            execute_alerts: profiled_env_bool(p, "ALERTING_EXECUTE_ALERTS", default_true()),
            min_interval_seconds: profiled_env_parse(
                p,
                "ALERTING_MIN_INTERVAL_SECONDS",
                default_min_interval(),
            ),
            max_attempts: profiled_env_parse(p, "ALERTING_MAX_ATTEMPTS", default_max_attempts()),
            evaluation_timeout_seconds: profiled_env_parse(
                p,
                "ALERTING_EVALUATION_TIMEOUT_SECONDS",
                default_evaluation_timeout(),
            ),
            notification_timeout_seconds: profiled_env_parse(
                p,
                "ALERTING_NOTIFICATION_TIMEOUT_SECONDS",
                default_notification_timeout(),
            ),
            exec_queue_capacity: profiled_env_parse(
                p,
                "ALERTING_EXEC_QUEUE_CAPACITY",
                default_exec_queue_capacity(),
            ),
            rule_refresh_ticks: profiled_env_parse(
                p,
                "ALERTING_RULE_REFRESH_TICKS",
                default_rule_refresh_ticks(),
            ),
            shutdown_grace_seconds: profiled_env_parse(
                p,
                "ALERTING_SHUTDOWN_GRACE_SECONDS",
                default_shutdown_grace(),
            ),
            ticker_offset_seconds: profiled_env_parse(p, "ALERTING_TICKER_OFFSET_SECONDS", 0),
        }
    }

    /// Attempts per job, never below one.
    pub fn resolved_max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Refresh period in ticks, never below one.
    pub fn resolved_rule_refresh_ticks(&self) -> u64 {
        self.rule_refresh_ticks.max(1)
    }

    /// Queue capacity, never below one (tokio channels reject zero).
    pub fn resolved_exec_queue_capacity(&self) -> usize {
        self.exec_queue_capacity.max(1)
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_secs(self.evaluation_timeout_seconds)
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_secs(self.notification_timeout_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}
