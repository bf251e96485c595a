//! Configuration management using the prefer crate.
//!
//! Values are layered: built-in defaults, then the discovered config file,
//! then environment variables (a `.env` file is loaded by the binary), then
//! CLI flags applied by the caller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::browser::connect::RetryPolicy;
use crate::ranking::GroupSpec;

/// Dashboard page holding the store-sales table.
pub const DEFAULT_TARGET_URL: &str = "https://app.upseller.com/pt/analytics/store-sales";

/// Default leaderboard size per group.
pub const DEFAULT_TOP_N: usize = 7;

/// Upper bound for a per-request `top` override.
pub const MAX_TOP_N: usize = 50;

/// Environment variable holding the remote browser WebSocket endpoint.
pub const ENV_BROWSER_WS: &str = "BROWSERLESS_WS";

/// Environment variable holding the serialized session cookies.
pub const ENV_COOKIES_JSON: &str = "UPS_COOKIES_JSON";

/// Per-step timeouts. Every browser wait uses one of these explicitly.
#[derive(Debug, Clone)]
pub struct Timeouts {
    /// Initial `goto` of the target page.
    pub navigation: Duration,
    /// Waiting for the load-complete state after navigation.
    pub load: Duration,
    /// Initial readiness (date-picker-like markers). Fatal on timeout.
    pub initial_ready: Duration,
    /// Post-filter readiness (table or statistics). Tolerated on timeout.
    pub results_ready: Duration,
    /// Re-sync on the load-complete state after a DOM swap.
    pub resync: Duration,
    /// Waiting for the table to differ from its pre-filter snapshot.
    pub refresh: Duration,
    /// Panel visibility after clicking an opener.
    pub panel_open: Duration,
    /// Default bound for any single browser action.
    pub action: Duration,
    /// Whole invocation, teardown excluded.
    pub invocation: Duration,
    /// Readiness polling interval.
    pub poll_interval: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(60),
            load: Duration::from_secs(20),
            initial_ready: Duration::from_secs(15),
            results_ready: Duration::from_secs(8),
            resync: Duration::from_secs(8),
            refresh: Duration::from_secs(4),
            panel_open: Duration::from_millis(1500),
            action: Duration::from_secs(25),
            invocation: Duration::from_secs(90),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Page to load and drive.
    pub target_url: String,
    /// Remote browser endpoint (`wss://...`).
    pub browser_ws: Option<String>,
    /// Raw cookie array as read from configuration.
    pub cookies_json: Option<String>,
    /// Address for the HTTP server.
    pub bind: String,
    /// Rows kept per group.
    pub top_n: usize,
    /// Store-name prefix groups, in output order.
    pub groups: Vec<GroupSpec>,
    /// Region tokens the endpoint host may carry.
    pub regions: Vec<String>,
    /// Connection attempts per endpoint candidate.
    pub connect_attempts: u32,
    /// Backoff base delay in milliseconds.
    pub backoff_base_ms: u64,
    /// Maximum random jitter added to each backoff, in milliseconds.
    pub backoff_jitter_ms: u64,
    /// Bound for a single connect attempt.
    pub connect_timeout: Duration,
    /// Step timeouts.
    pub timeouts: Timeouts,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            browser_ws: None,
            cookies_json: None,
            bind: "0.0.0.0:3000".to_string(),
            top_n: DEFAULT_TOP_N,
            groups: vec![GroupSpec::new("MELI"), GroupSpec::new("SHOPEE")],
            regions: vec!["production-sfo".to_string(), "production-ams".to_string()],
            connect_attempts: 2,
            backoff_base_ms: 800,
            backoff_jitter_ms: 400,
            connect_timeout: Duration::from_secs(20),
            timeouts: Timeouts::default(),
        }
    }
}

impl Settings {
    /// Host of the target application; the default cookie domain.
    pub fn target_host(&self) -> String {
        url::Url::parse(&self.target_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "app.upseller.com".to_string())
    }

    /// Retry policy for one invocation.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts_per_endpoint: self.connect_attempts.max(1),
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_jitter: Duration::from_millis(self.backoff_jitter_ms),
            max_delay: Duration::from_secs(10),
            attempt_timeout: self.connect_timeout,
            regions: self.regions.clone(),
        }
    }

    /// Clamp a requested leaderboard size, falling back to the configured one.
    pub fn effective_top_n(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.top_n).clamp(1, MAX_TOP_N)
    }

    /// Apply environment variable overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(ws) = env_non_empty(ENV_BROWSER_WS) {
            self.browser_ws = Some(ws);
        }
        if let Some(raw) = env_non_empty(ENV_COOKIES_JSON) {
            self.cookies_json = Some(raw);
        }
        if let Some(url) = env_non_empty("UPS_TARGET_URL") {
            self.target_url = url;
        }
        if let Some(bind) = env_non_empty("UPS_BIND") {
            self.bind = bind;
        }
        if let Some(top) = env_non_empty("UPS_TOP_N").and_then(|s| s.parse().ok()) {
            self.top_n = top;
        }
        if let Some(groups) = env_non_empty("UPS_GROUPS") {
            let parsed = parse_group_list(&groups);
            if !parsed.is_empty() {
                self.groups = parsed;
            }
        }
        self
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Page to load and drive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    /// HTTP bind address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    /// Rows kept per group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_n: Option<usize>,
    /// Store-name prefixes, one group each.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
    /// Region tokens for endpoint fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<String>>,
    /// Connection attempts per endpoint candidate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_attempts: Option<u32>,
    /// Backoff base delay in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_base_ms: Option<u64>,
    /// Backoff jitter in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_jitter_ms: Option<u64>,
    /// Whole-invocation deadline in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_timeout_secs: Option<u64>,
    /// Default per-action timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_timeout_secs: Option<u64>,

    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate.
    /// Automatically discovers upseller-kpi config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("upseller-kpi").await {
            Ok(pref_config) => {
                let target_url: Option<String> = pref_config.get("target_url").ok();
                let bind: Option<String> = pref_config.get("bind").ok();
                let top_n: Option<usize> = pref_config.get("top_n").ok();
                let groups: Option<Vec<String>> = pref_config.get("groups").ok();
                let regions: Option<Vec<String>> = pref_config.get("regions").ok();
                let connect_attempts: Option<u32> =
                    pref_config.get("connect_attempts").ok();
                let backoff_base_ms: Option<u64> = pref_config.get("backoff_base_ms").ok();
                let backoff_jitter_ms: Option<u64> =
                    pref_config.get("backoff_jitter_ms").ok();
                let invocation_timeout_secs: Option<u64> =
                    pref_config.get("invocation_timeout_secs").ok();
                let action_timeout_secs: Option<u64> =
                    pref_config.get("action_timeout_secs").ok();

                let source_path = pref_config.source_path().cloned();

                Config {
                    target_url,
                    bind,
                    top_n,
                    groups,
                    regions,
                    connect_attempts,
                    backoff_base_ms,
                    backoff_jitter_ms,
                    invocation_timeout_secs,
                    action_timeout_secs,
                    source_path,
                }
            }
            Err(_) => {
                // No config file found, use defaults
                Self::default()
            }
        }
    }

    /// Load configuration from a specific JSON file.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let mut config: Config = serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file: {}", e))?;

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(ref url) = self.target_url {
            settings.target_url = url.clone();
        }
        if let Some(ref bind) = self.bind {
            settings.bind = bind.clone();
        }
        if let Some(top) = self.top_n {
            settings.top_n = top;
        }
        if let Some(ref groups) = self.groups {
            let parsed: Vec<GroupSpec> = groups
                .iter()
                .map(|g| g.trim())
                .filter(|g| !g.is_empty())
                .map(GroupSpec::new)
                .collect();
            if !parsed.is_empty() {
                settings.groups = parsed;
            }
        }
        if let Some(ref regions) = self.regions {
            settings.regions = regions.clone();
        }
        if let Some(attempts) = self.connect_attempts {
            settings.connect_attempts = attempts;
        }
        if let Some(base) = self.backoff_base_ms {
            settings.backoff_base_ms = base;
        }
        if let Some(jitter) = self.backoff_jitter_ms {
            settings.backoff_jitter_ms = jitter;
        }
        if let Some(secs) = self.invocation_timeout_secs {
            settings.timeouts.invocation = Duration::from_secs(secs);
        }
        if let Some(secs) = self.action_timeout_secs {
            settings.timeouts.action = Duration::from_secs(secs);
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
}

/// Load settings with explicit options.
pub async fn load_settings_with_options(options: LoadOptions) -> Settings {
    let config = match &options.config_path {
        Some(path) => match Config::load_from_path(path).await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}; using defaults", e);
                Config::default()
            }
        },
        None => Config::load().await,
    };

    if let Some(ref path) = config.source_path {
        tracing::debug!("Loaded configuration from {}", path.display());
    }

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings);
    settings.with_env_overrides()
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_group_list(raw: &str) -> Vec<GroupSpec> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(GroupSpec::new)
        .collect()
}
