use std::env;
use std::path::PathBuf;
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

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub scheduler: SchedulerSettings,
    pub store: StoreSettings,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `CADENCE_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("CADENCE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            scheduler: SchedulerSettings::from_env_profiled(p),
            store: StoreSettings::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  scheduler:   base_interval={}s, max_attempts={}, eval_timeout={}s",
            self.scheduler.base_interval_seconds,
            self.scheduler.max_attempts,
            self.scheduler.eval_timeout_seconds,
        );
        tracing::info!(
            "  store:       data_path={}, default_interval={}s",
            self.store.data_path.display(),
            self.store.default_interval_seconds,
        );
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: String::new(),
            scheduler: SchedulerSettings::default(),
            store: StoreSettings::default(),
        }
    }
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Tick period. Every rule interval must be a multiple of it.
    pub base_interval_seconds: u64,
    /// Evaluation attempts per due tick before an error state is recorded.
    pub max_attempts: u32,
    /// Upper bound for a single evaluation attempt.
    pub eval_timeout_seconds: u64,
}

impl SchedulerSettings {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            base_interval_seconds: profiled_env_u64(p, "CADENCE_BASE_INTERVAL_SECONDS", 10),
            max_attempts: profiled_env_u32(p, "CADENCE_MAX_ATTEMPTS", 3),
            eval_timeout_seconds: profiled_env_u64(p, "CADENCE_EVAL_TIMEOUT_SECONDS", 30),
        }
    }

    pub fn base_interval(&self) -> Duration {
        Duration::from_secs(self.base_interval_seconds)
    }

    pub fn eval_timeout(&self) -> Duration {
        Duration::from_secs(self.eval_timeout_seconds)
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            base_interval_seconds: 10,
            max_attempts: 3,
            eval_timeout_seconds: 30,
        }
    }
}

// ── Store ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// JSON snapshot file backing the local store.
    pub data_path: PathBuf,
    /// Interval assigned to definitions created without one.
    pub default_interval_seconds: u64,
}

impl StoreSettings {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            data_path: PathBuf::from(profiled_env_or(
                p,
                "CADENCE_DATA_PATH",
                "data/alert_definitions.json",
            )),
            default_interval_seconds: profiled_env_u64(p, "CADENCE_DEFAULT_INTERVAL_SECONDS", 60),
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/alert_definitions.json"),
            default_interval_seconds: 60,
        }
    }
}
