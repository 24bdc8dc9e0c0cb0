//! The [`Settings`] struct and its environment loader.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::{ConfigError, ConfigResult};

/// Maintenance mode for the inbound surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaintenanceMode {
    /// Normal operation.
    #[default]
    Off,
    /// Keep processing but warn users on enqueue.
    Soft,
    /// Reject new requests with HTTP 503.
    Hard,
}

impl FromStr for MaintenanceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "" | "none" => Ok(Self::Off),
            "soft" => Ok(Self::Soft),
            "hard" => Ok(Self::Hard),
            other => Err(format!("unknown maintenance mode '{other}'")),
        }
    }
}

/// Operational settings, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Listen address for the HTTP/WS surface.
    pub bind_addr: String,
    /// Active profile name at startup.
    pub profile: String,

    /// Maximum queued (not in-flight) requests.
    pub max_queue_size: usize,
    /// Seconds an in-flight request stays invisible before reclaim.
    pub visibility_timeout: Duration,
    /// Maximum processing attempts per request.
    pub max_retries: u32,
    /// Delay before a failed request is re-enqueued.
    pub retry_delay: Duration,
    /// Number of worker loops.
    pub worker_count: usize,

    /// Ollama API host.
    pub ollama_host: String,
    /// SGLang endpoint (OpenAI-compatible).
    pub sglang_endpoint: String,

    /// VRAM soft limit in GB.
    pub vram_soft_limit_gb: f64,
    /// VRAM hard limit in GB.
    pub vram_hard_limit_gb: f64,
    /// Crashes within the window before the circuit breaker opens.
    pub vram_crash_threshold: usize,
    /// Sliding crash window.
    pub vram_crash_window: Duration,
    /// Eviction strategy name ("hybrid", "lru", "priority").
    pub eviction_strategy: String,

    /// Interval between health probe rounds.
    pub health_check_interval: Duration,
    /// Consecutive failures before an alert fires.
    pub health_alert_threshold: u32,
    /// Minimum gap between repeated alerts for one service.
    pub health_alert_cooldown: Duration,

    /// Interval between metric snapshots.
    pub metrics_write_interval: Duration,
    /// Days metric points are retained.
    pub metrics_retention_days: i64,

    /// Base directory for dated log output.
    pub log_base_dir: PathBuf,
    /// Days log directories are retained.
    pub log_retention_days: i64,
    /// Hours between log cleanup passes.
    pub log_cleanup_interval_hours: u64,

    /// Directory for uploaded files (1 h stale-safety TTL).
    pub temp_upload_dir: PathBuf,
    /// Directory for generated artifacts (12 h TTL).
    pub temp_artifact_dir: PathBuf,

    /// Weekly token budget for new users.
    pub default_weekly_budget: u64,
    /// Maintenance mode at startup.
    pub maintenance_mode: MaintenanceMode,
    /// Message shown in soft maintenance mode.
    pub maintenance_message: String,
    /// Storage path for the embedded database; `None` keeps state in memory.
    pub storage_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            profile: "performance".to_string(),
            max_queue_size: 50,
            visibility_timeout: Duration::from_secs(300),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            worker_count: 2,
            ollama_host: "http://localhost:11434".to_string(),
            sglang_endpoint: "http://localhost:30000".to_string(),
            vram_soft_limit_gb: 100.0,
            vram_hard_limit_gb: 110.0,
            vram_crash_threshold: 2,
            vram_crash_window: Duration::from_secs(300),
            eviction_strategy: "hybrid".to_string(),
            health_check_interval: Duration::from_secs(5),
            health_alert_threshold: 3,
            health_alert_cooldown: Duration::from_secs(300),
            metrics_write_interval: Duration::from_secs(5),
            metrics_retention_days: 2,
            log_base_dir: PathBuf::from("/var/log/strato"),
            log_retention_days: 2,
            log_cleanup_interval_hours: 6,
            temp_upload_dir: PathBuf::from("/tmp/strato/uploads"),
            temp_artifact_dir: PathBuf::from("/tmp/strato/artifacts"),
            default_weekly_budget: 100_000,
            maintenance_mode: MaintenanceMode::Off,
            maintenance_message:
                "Maintenance in progress. Responses may be slower than usual.".to_string(),
            storage_path: None,
        }
    }
}

impl Settings {
    /// Read settings from the environment, applying defaults for unset
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for unparseable values and
    /// [`ConfigError::ValidationError`] when cross-field invariants fail
    /// (e.g. soft limit above hard limit).
    pub fn from_env() -> ConfigResult<Self> {
        let defaults = Self::default();

        let settings = Self {
            bind_addr: env_string("STRATO_BIND_ADDR", defaults.bind_addr),
            profile: env_string("STRATO_PROFILE", defaults.profile),
            max_queue_size: env_parse("MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            visibility_timeout: env_secs("VISIBILITY_TIMEOUT", defaults.visibility_timeout)?,
            max_retries: env_parse("MAX_RETRIES", defaults.max_retries)?,
            retry_delay: env_secs("RETRY_DELAY", defaults.retry_delay)?,
            worker_count: env_parse("WORKER_COUNT", defaults.worker_count)?,
            ollama_host: env_string("OLLAMA_HOST", defaults.ollama_host),
            sglang_endpoint: env_string("SGLANG_ENDPOINT", defaults.sglang_endpoint),
            vram_soft_limit_gb: env_parse("VRAM_SOFT_LIMIT_GB", defaults.vram_soft_limit_gb)?,
            vram_hard_limit_gb: env_parse("VRAM_HARD_LIMIT_GB", defaults.vram_hard_limit_gb)?,
            vram_crash_threshold: env_parse("VRAM_CRASH_THRESHOLD", defaults.vram_crash_threshold)?,
            vram_crash_window: env_secs("VRAM_CRASH_WINDOW_SECONDS", defaults.vram_crash_window)?,
            eviction_strategy: env_string("VRAM_EVICTION_STRATEGY", defaults.eviction_strategy),
            health_check_interval: env_secs(
                "HEALTH_CHECK_INTERVAL_SECONDS",
                defaults.health_check_interval,
            )?,
            health_alert_threshold: env_parse(
                "HEALTH_CHECK_ALERT_THRESHOLD",
                defaults.health_alert_threshold,
            )?,
            health_alert_cooldown: env_secs(
                "HEALTH_CHECK_ALERT_COOLDOWN_SECONDS",
                defaults.health_alert_cooldown,
            )?,
            metrics_write_interval: env_secs(
                "METRICS_WRITE_INTERVAL_SECONDS",
                defaults.metrics_write_interval,
            )?,
            metrics_retention_days: env_parse(
                "METRICS_RETENTION_DAYS",
                defaults.metrics_retention_days,
            )?,
            log_base_dir: env_path("LOG_BASE_DIR", defaults.log_base_dir),
            log_retention_days: env_parse("LOG_RETENTION_DAYS", defaults.log_retention_days)?,
            log_cleanup_interval_hours: env_parse(
                "LOG_CLEANUP_INTERVAL_HOURS",
                defaults.log_cleanup_interval_hours,
            )?,
            temp_upload_dir: env_path("TEMP_UPLOAD_DIR", defaults.temp_upload_dir),
            temp_artifact_dir: env_path("TEMP_ARTIFACT_DIR", defaults.temp_artifact_dir),
            default_weekly_budget: env_parse(
                "DEFAULT_WEEKLY_TOKEN_BUDGET",
                defaults.default_weekly_budget,
            )?,
            maintenance_mode: env_parse("MAINTENANCE_MODE", defaults.maintenance_mode)?,
            maintenance_message: env_string("MAINTENANCE_MESSAGE", defaults.maintenance_message),
            storage_path: std::env::var("STRATO_STORAGE_PATH").ok().map(PathBuf::from),
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Validate cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] on the first violated
    /// invariant.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.vram_soft_limit_gb > self.vram_hard_limit_gb {
            return Err(ConfigError::ValidationError {
                field: "vram_soft_limit_gb".to_string(),
                message: format!(
                    "soft limit {:.1}GB exceeds hard limit {:.1}GB",
                    self.vram_soft_limit_gb, self.vram_hard_limit_gb
                ),
            });
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::ValidationError {
                field: "max_queue_size".to_string(),
                message: "queue capacity must be at least 1".to_string(),
            });
        }
        if self.worker_count == 0 {
            return Err(ConfigError::ValidationError {
                field: "worker_count".to_string(),
                message: "at least one worker is required".to_string(),
            });
        }
        if self.max_retries == 0 {
            warn!("MAX_RETRIES=0: every failure is terminal");
        }
        Ok(())
    }
}

fn env_string(var: &str, default: String) -> String {
    std::env::var(var).ok().filter(|v| !v.is_empty()).unwrap_or(default)
}

fn env_path(var: &str, default: PathBuf) -> PathBuf {
    std::env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .map_or(default, PathBuf::from)
}

fn env_parse<T>(var: &str, default: T) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) if !raw.is_empty() => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            var: var.to_string(),
            message: e.to_string(),
        }),
        _ => Ok(default),
    }
}

fn env_secs(var: &str, default: Duration) -> ConfigResult<Duration> {
    Ok(Duration::from_secs(env_parse(var, default.as_secs())?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn test_soft_above_hard_rejected() {
        let settings = Settings {
            vram_soft_limit_gb: 120.0,
            vram_hard_limit_gb: 110.0,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::ValidationError { field, .. }) if field == "vram_soft_limit_gb"
        ));
    }

    #[test]
    fn test_zero_queue_rejected() {
        let settings = Settings {
            max_queue_size: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_maintenance_mode_parse() {
        assert_eq!("soft".parse::<MaintenanceMode>().unwrap(), MaintenanceMode::Soft);
        assert_eq!("HARD".parse::<MaintenanceMode>().unwrap(), MaintenanceMode::Hard);
        assert_eq!("off".parse::<MaintenanceMode>().unwrap(), MaintenanceMode::Off);
        assert!("loud".parse::<MaintenanceMode>().is_err());
    }
}
