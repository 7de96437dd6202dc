use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TriageError};

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

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_f64(profile: &str, key: &str, default: f64) -> f64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub thresholds: ThresholdConfig,
    pub monitor: MonitorConfig,
    pub notify: NotifyConfig,
    pub roster: RosterConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `TRIAGE_PROFILE` env var. When set (e.g. `WARD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("TRIAGE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            thresholds: ThresholdConfig::from_env_profiled(p),
            monitor: MonitorConfig::from_env_profiled(p),
            notify: NotifyConfig::from_env_profiled(p),
            roster: RosterConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject combinations the monitor cannot work with.
    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        if self.monitor.history_capacity < self.thresholds.rank_min_hr_samples {
            return Err(TriageError::Config(format!(
                "history capacity {} cannot hold the {} HR samples needed for ranking",
                self.monitor.history_capacity, self.thresholds.rank_min_hr_samples
            )));
        }
        if self.monitor.history_capacity < self.thresholds.rank_window_size {
            return Err(TriageError::Config(format!(
                "history capacity {} is smaller than the rank window {}",
                self.monitor.history_capacity, self.thresholds.rank_window_size
            )));
        }
        if self.monitor.evaluation_poll_ms == 0 {
            return Err(TriageError::Config(
                "evaluation poll interval must be positive".to_string(),
            ));
        }
        if self.notify.delivery_timeout_ms == 0 {
            return Err(TriageError::Config(
                "notification delivery timeout must be positive".to_string(),
            ));
        }
        if self.monitor.snapshot_timeout_ms == 0 {
            return Err(TriageError::Config(
                "snapshot timeout must be positive".to_string(),
            ));
        }
        if self.monitor.command_buffer == 0 {
            return Err(TriageError::Config(
                "command buffer must hold at least one command".to_string(),
            ));
        }
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  thresholds:  hr=({}, {}), rr_multiplier={}, min_samples={}, rank_window={}, rank_min_hr={}",
            self.thresholds.lowest_hr_bound,
            self.thresholds.highest_hr_bound,
            self.thresholds.rr_multiplier,
            self.thresholds.min_sample_threshold,
            self.thresholds.rank_window_size,
            self.thresholds.rank_min_hr_samples,
        );
        tracing::info!(
            "  monitor:     history={}, poll={}ms, snapshot_timeout={}ms",
            self.monitor.history_capacity,
            self.monitor.evaluation_poll_ms,
            self.monitor.snapshot_timeout_ms
        );
        tracing::info!(
            "  notify:      webhook={}, headers={}, timeout={}ms",
            if self.notify.is_configured() { "configured" } else { "(none)" },
            self.notify.webhook_headers.len(),
            self.notify.delivery_timeout_ms
        );
        tracing::info!("  roster:      path={}", self.roster.path.display());
    }
}

// ── Thresholds ────────────────────────────────────────────────

/// Bounds and sample counts used by the evaluator and the ranker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Average HR must stay strictly above this.
    pub lowest_hr_bound: f64,
    /// Average HR must stay strictly below this.
    pub highest_hr_bound: f64,
    /// Current RR must stay strictly below `avg_rr * rr_multiplier`.
    pub rr_multiplier: f64,
    /// Samples required before a signal can be evaluated.
    pub min_sample_threshold: usize,
    /// Number of most recent samples used for averages and the RR spread.
    pub rank_window_size: usize,
    /// HR samples required before a rank can be computed.
    pub rank_min_hr_samples: usize,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            lowest_hr_bound: 60.0,
            highest_hr_bound: 110.0,
            rr_multiplier: 2.0,
            min_sample_threshold: 5,
            rank_window_size: 5,
            rank_min_hr_samples: 15,
        }
    }
}

impl ThresholdConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            lowest_hr_bound: profiled_env_f64(p, "TRIAGE_LOWEST_HR", d.lowest_hr_bound),
            highest_hr_bound: profiled_env_f64(p, "TRIAGE_HIGHEST_HR", d.highest_hr_bound),
            rr_multiplier: profiled_env_f64(p, "TRIAGE_RR_MULTIPLIER", d.rr_multiplier),
            min_sample_threshold: profiled_env_usize(
                p,
                "TRIAGE_MIN_SAMPLES",
                d.min_sample_threshold,
            ),
            rank_window_size: profiled_env_usize(p, "TRIAGE_RANK_WINDOW", d.rank_window_size),
            rank_min_hr_samples: profiled_env_usize(
                p,
                "TRIAGE_RANK_MIN_HR_SAMPLES",
                d.rank_min_hr_samples,
            ),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.lowest_hr_bound < self.highest_hr_bound) {
            return Err(TriageError::Config(format!(
                "lowest HR bound {} must be below highest HR bound {}",
                self.lowest_hr_bound, self.highest_hr_bound
            )));
        }
        if !(self.rr_multiplier > 0.0) || !self.rr_multiplier.is_finite() {
            return Err(TriageError::Config(format!(
                "RR multiplier must be a positive number, got {}",
                self.rr_multiplier
            )));
        }
        if self.min_sample_threshold == 0 || self.rank_window_size == 0 {
            return Err(TriageError::Config(
                "sample threshold and rank window must be at least 1".to_string(),
            ));
        }
        if self.rank_min_hr_samples < self.min_sample_threshold {
            return Err(TriageError::Config(format!(
                "rank needs {} HR samples but averaging needs {}",
                self.rank_min_hr_samples, self.min_sample_threshold
            )));
        }
        Ok(())
    }
}

// ── Monitor runtime ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Capacity of each per-signal history window.
    pub history_capacity: usize,
    /// Delay between checks for enough samples while evaluating.
    pub evaluation_poll_ms: u64,
    /// Bounded command queue per patient task.
    pub command_buffer: usize,
    /// How long a board snapshot waits on one patient task.
    pub snapshot_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            history_capacity: 50,
            evaluation_poll_ms: 1_000,
            command_buffer: 256,
            snapshot_timeout_ms: 2_000,
        }
    }
}

impl MonitorConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            history_capacity: profiled_env_usize(p, "TRIAGE_HISTORY_CAPACITY", d.history_capacity),
            evaluation_poll_ms: profiled_env_u64(p, "TRIAGE_POLL_MS", d.evaluation_poll_ms),
            command_buffer: profiled_env_usize(p, "TRIAGE_COMMAND_BUFFER", d.command_buffer),
            snapshot_timeout_ms: profiled_env_u64(
                p,
                "TRIAGE_SNAPSHOT_TIMEOUT_MS",
                d.snapshot_timeout_ms,
            ),
        }
    }

    pub fn evaluation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.evaluation_poll_ms)
    }

    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_millis(self.snapshot_timeout_ms)
    }
}

// ── Notifications ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
    /// HTTP method for the webhook (defaults to POST).
    pub webhook_method: Option<String>,
    /// Extra request headers. Values may reference `${VAR}`.
    pub webhook_headers: BTreeMap<String, String>,
    /// Minijinja template for the webhook request body. JSON when unset.
    pub webhook_body_template: Option<String>,
    /// Minijinja template for the notification subject.
    pub subject_template: Option<String>,
    /// Minijinja template for the notification body.
    pub body_template: Option<String>,
    /// Upper bound for one delivery attempt, HTTP request included.
    pub delivery_timeout_ms: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_method: None,
            webhook_headers: BTreeMap::new(),
            webhook_body_template: None,
            subject_template: None,
            body_template: None,
            delivery_timeout_ms: 5_000,
        }
    }
}

impl NotifyConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            webhook_url: profiled_env_opt(p, "TRIAGE_WEBHOOK_URL"),
            webhook_method: profiled_env_opt(p, "TRIAGE_WEBHOOK_METHOD"),
            webhook_headers: profiled_env_opt(p, "TRIAGE_WEBHOOK_HEADERS")
                .map(|raw| parse_header_list(&raw))
                .unwrap_or_default(),
            webhook_body_template: profiled_env_opt(p, "TRIAGE_WEBHOOK_BODY_TEMPLATE"),
            subject_template: profiled_env_opt(p, "TRIAGE_SUBJECT_TEMPLATE"),
            body_template: profiled_env_opt(p, "TRIAGE_BODY_TEMPLATE"),
            delivery_timeout_ms: profiled_env_u64(p, "TRIAGE_NOTIFY_TIMEOUT_MS", d.delivery_timeout_ms),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.webhook_url.is_some()
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

/// Parse `Name=value;Other=value` into a header map. Entries without `=` are skipped.
fn parse_header_list(raw: &str) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        match entry.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                headers.insert(name.trim().to_string(), value.trim().to_string());
            }
            _ => tracing::warn!(entry, "ignoring malformed webhook header"),
        }
    }
    headers
}

// ── Roster ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterConfig {
    pub path: PathBuf,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("config/roster.yml"),
        }
    }
}

impl RosterConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            path: PathBuf::from(profiled_env_or(p, "TRIAGE_ROSTER", "config/roster.yml")),
        }
    }
}
