use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitorConfig {
    pub http_targets: Vec<HttpTarget>,
    #[serde(default)]
    pub websocket: Option<WsTarget>,
    #[serde(default)]
    pub telegram_token: Option<String>,
    #[serde(default)]
    pub telegram_chat_id: Option<String>,
    #[serde(default = "default_summary_interval")]
    pub summary_interval_secs: u64,
    #[serde(default = "default_dashboard_interval")]
    pub dashboard_interval_secs: u64,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

fn default_summary_interval() -> u64 { 600 }
fn default_dashboard_interval() -> u64 { 3600 }
fn default_api_port() -> u16 { 3000 }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpTarget {
    pub name: String,
    pub url: String,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_slow_threshold")]
    pub slow_threshold_ms: u64,
    #[serde(default = "default_check_interval")]
    pub interval_secs: u64,
    #[serde(default)]
    pub accept: AcceptPolicy,
}

fn default_timeout() -> u64 { 2000 }
fn default_slow_threshold() -> u64 { 1000 }
fn default_check_interval() -> u64 { 10 }

/// Which HTTP status codes count as a healthy response.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AcceptPolicy {
    /// 2xx only.
    #[default]
    Strict,
    /// Anything below 500, including 204 and redirects.
    Lenient,
}

impl AcceptPolicy {
    pub fn accepts(&self, status: u16) -> bool {
        match self {
            AcceptPolicy::Strict => (200..300).contains(&status),
            AcceptPolicy::Lenient => status < 500,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WsTarget {
    pub url: String,
    pub symbol: String,
    pub channel: String,
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_watchdog")]
    pub watchdog_secs: u64,
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

fn default_heartbeat() -> u64 { 10 }
fn default_watchdog() -> u64 { 10 }
fn default_stale_after() -> u64 { 60 }
fn default_reconnect_delay() -> u64 { 3000 }

impl MonitorConfig {
    /// Environment variables win over the config file so deployments can
    /// keep credentials out of config.json.
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("TELEGRAM_TOKEN") {
            if !token.is_empty() {
                self.telegram_token = Some(token);
            }
        }
        if let Ok(chat_id) = std::env::var("TELEGRAM_CHAT_ID") {
            if !chat_id.is_empty() {
                self.telegram_chat_id = Some(chat_id);
            }
        }
    }

    /// Periodic timers panic on a zero period, so zero intervals are
    /// rejected before any task is spawned.
    pub fn validate(&self) -> Result<()> {
        for target in &self.http_targets {
            if target.interval_secs == 0 {
                bail!("http target '{}' has a zero check interval", target.name);
            }
        }
        if self.summary_interval_secs == 0 || self.dashboard_interval_secs == 0 {
            bail!("report intervals must be non-zero");
        }
        if let Some(ws) = &self.websocket {
            if ws.heartbeat_secs == 0 || ws.watchdog_secs == 0 {
                bail!("websocket heartbeat and watchdog intervals must be non-zero");
            }
        }
        Ok(())
    }
}
