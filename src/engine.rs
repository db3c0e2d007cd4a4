use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::interval;
use tracing::{debug, info};

use crate::config::{HttpTarget, MonitorConfig, WsTarget};
use crate::models::{CheckCounters, MonitorState, ProbeOutcome};
use crate::notify::Notifier;
use crate::stream::{run_watchdog, WsSession};

pub struct Monitor {
    pub config: MonitorConfig,
    pub state: Arc<Mutex<MonitorState>>,
    http_client: reqwest::Client,
    notifier: Arc<Notifier>,
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Result<Self> {
        let notifier = Arc::new(Notifier::new(
            config.telegram_token.clone(),
            config.telegram_chat_id.clone(),
        ));
        let state = Arc::new(Mutex::new(MonitorState::new(&config)));

        Ok(Self {
            config,
            state,
            http_client: reqwest::Client::new(),
            notifier,
        })
    }

    #[cfg(test)]
    fn with_notifier(config: MonitorConfig, notifier: Arc<Notifier>) -> Self {
        let state = Arc::new(Mutex::new(MonitorState::new(&config)));
        Self {
            config,
            state,
            http_client: reqwest::Client::new(),
            notifier,
        }
    }

    /// Spawns every periodic task: one probe timer per HTTP target, the
    /// WebSocket session plus its idle watchdog, and the reporters. All
    /// tasks run for the process lifetime.
    pub fn run(self: &Arc<Self>) -> Result<()> {
        info!(
            "Monitoring {} HTTP target(s), WebSocket: {}",
            self.config.http_targets.len(),
            self.config
                .websocket
                .as_ref()
                .map_or("disabled".to_string(), |ws| ws.url.clone())
        );
        if self.notifier.remote_enabled() {
            info!("Telegram alerting enabled");
        }

        for target in self.config.http_targets.clone() {
            let monitor = Arc::clone(self);
            tokio::spawn(async move {
                let mut timer = interval(Duration::from_secs(target.interval_secs));
                timer.tick().await;
                loop {
                    timer.tick().await;
                    // Each run is its own task: a probe slower than the
                    // period overlaps the next one instead of delaying it.
                    let monitor = Arc::clone(&monitor);
                    let target = target.clone();
                    tokio::spawn(async move {
                        monitor.run_probe(&target).await;
                    });
                }
            });
        }

        if let Some(ws) = self.config.websocket.clone() {
            let session = WsSession::new(ws.clone(), self.state.clone(), self.notifier.clone());
            tokio::spawn(session.run());
            tokio::spawn(run_watchdog(
                ws.clone(),
                self.state.clone(),
                self.notifier.clone(),
            ));

            let monitor = Arc::clone(self);
            tokio::spawn(async move {
                monitor.run_dashboard_reporter(ws).await;
            });
        }

        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            monitor.run_summary_reporter().await;
        });

        Ok(())
    }

    /// One timed GET against one target. Never fails the scheduler:
    /// every outcome ends up as a counter update, plus an alert for
    /// slow responses and failures.
    async fn run_probe(&self, target: &HttpTarget) {
        let started = Instant::now();
        let response = self
            .http_client
            .get(&target.url)
            .timeout(Duration::from_millis(target.timeout_ms))
            .send()
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let outcome = match response {
            Ok(response) => {
                let status = response.status().as_u16();
                if target.accept.accepts(status) {
                    if elapsed_ms >= target.slow_threshold_ms {
                        ProbeOutcome::Slow { elapsed_ms }
                    } else {
                        ProbeOutcome::Success { elapsed_ms }
                    }
                } else {
                    ProbeOutcome::Failed {
                        reason: format!("unexpected status {}", status),
                    }
                }
            }
            Err(e) => ProbeOutcome::Failed { reason: e.to_string() },
        };

        if let ProbeOutcome::Success { elapsed_ms } = &outcome {
            debug!("{} responded in {}ms", target.name, elapsed_ms);
        }

        {
            let mut state = self.state.lock().await;
            state.record(&target.name, &outcome);
        }

        if let Some(alert) = outcome_alert(&target.name, &outcome) {
            self.notifier.notify(&alert).await;
        }
    }

    /// Flushes every HTTP target's window and pushes one summary per
    /// target, even when nothing happened in the window.
    async fn run_summary_reporter(&self) {
        let mut timer = interval(Duration::from_secs(self.config.summary_interval_secs));
        timer.tick().await;

        loop {
            timer.tick().await;

            let snapshots: Vec<(String, CheckCounters)> = {
                let mut state = self.state.lock().await;
                self.config
                    .http_targets
                    .iter()
                    .map(|target| {
                        let counters = state.counters.entry(target.name.clone()).or_default();
                        (target.name.clone(), counters.flush())
                    })
                    .collect()
            };

            for (name, snapshot) in snapshots {
                self.notifier.notify(&format_summary(&name, &snapshot)).await;
            }
        }
    }

    /// Hourly connection-health dashboard. Reads without resetting;
    /// reconnect counts are cumulative for the process lifetime.
    async fn run_dashboard_reporter(&self, target: WsTarget) {
        let mut timer = interval(Duration::from_secs(self.config.dashboard_interval_secs));
        timer.tick().await;

        loop {
            timer.tick().await;

            let (last_message_at, reconnects) = {
                let state = self.state.lock().await;
                (state.ws.last_message_at, state.ws.reconnects)
            };
            let age_secs = (Utc::now() - last_message_at).num_seconds();

            self.notifier
                .notify(&format_dashboard(&target.url, age_secs, reconnects))
                .await;
        }
    }
}

fn outcome_alert(target_name: &str, outcome: &ProbeOutcome) -> Option<String> {
    match outcome {
        ProbeOutcome::Success { .. } => None,
        ProbeOutcome::Slow { elapsed_ms } => Some(format!(
            "\u{26a0} Slow HTTP response from {}: {}ms",
            target_name, elapsed_ms
        )),
        ProbeOutcome::Failed { reason, .. } => {
            Some(format!("\u{274c} HTTP check failed for {}: {}", target_name, reason))
        }
    }
}

fn format_summary(target_name: &str, snapshot: &CheckCounters) -> String {
    format!(
        "\u{1f4ca} HTTP summary: {}\nchecks: {}\nok: {} (slow: {})\nfailed: {}",
        target_name, snapshot.total, snapshot.success, snapshot.slow, snapshot.failed
    )
}

fn format_dashboard(ws_url: &str, age_secs: i64, reconnects: u64) -> String {
    format!(
        "\u{1f4ca} Dashboard\nWS: {}\nLast message: {}s ago\nReconnects: {}",
        ws_url, age_secs, reconnects
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AcceptPolicy;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn test_monitor() -> (Monitor, UnboundedReceiver<String>) {
        let config: MonitorConfig = serde_json::from_str(r#"{ "http_targets": [] }"#).unwrap();
        let (notifier, rx) = Notifier::with_capture();
        (Monitor::with_notifier(config, Arc::new(notifier)), rx)
    }

    fn test_target(url: String, slow_threshold_ms: u64) -> HttpTarget {
        HttpTarget {
            name: "gateway".into(),
            url,
            timeout_ms: 2000,
            slow_threshold_ms,
            interval_secs: 10,
            accept: AcceptPolicy::Strict,
        }
    }

    /// Minimal HTTP endpoint that answers every request with 200 after
    /// the given delay.
    async fn spawn_responder(delay: Duration) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else { break };
                tokio::spawn(async move {
                    use tokio::io::{AsyncReadExt, AsyncWriteExt};
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf).await;
                    tokio::time::sleep(delay).await;
                    let _ = stream
                        .write_all(
                            b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                        )
                        .await;
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn fast_probe_counts_success_and_stays_silent() {
        let addr = spawn_responder(Duration::ZERO).await;
        let (monitor, mut alert_rx) = test_monitor();
        let target = test_target(format!("http://{}/alive", addr), 10_000);

        monitor.run_probe(&target).await;

        let counters = monitor.state.lock().await.counters["gateway"];
        assert_eq!(counters.total, 1);
        assert_eq!(counters.success, 1);
        assert_eq!(counters.failed, 0);
        assert_eq!(counters.slow, 0);
        assert!(alert_rx.try_recv().is_err(), "no alert expected on a fast success");
    }

    #[tokio::test]
    async fn slow_probe_counts_success_and_emits_exactly_one_slow_alert() {
        let addr = spawn_responder(Duration::from_millis(100)).await;
        let (monitor, mut alert_rx) = test_monitor();
        let target = test_target(format!("http://{}/alive", addr), 10);

        monitor.run_probe(&target).await;

        let counters = monitor.state.lock().await.counters["gateway"];
        assert_eq!(counters.total, 1);
        assert_eq!(counters.success, 1);
        assert_eq!(counters.slow, 1);
        assert_eq!(counters.failed, 0);

        let alert = alert_rx.try_recv().expect("expected one slow alert");
        assert!(alert.contains("Slow HTTP response"));
        assert!(alert.contains("gateway"));
        assert!(alert_rx.try_recv().is_err(), "only one alert expected");
    }

    #[tokio::test]
    async fn refused_probe_counts_failure_and_emits_exactly_one_error_alert() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (monitor, mut alert_rx) = test_monitor();
        let target = test_target(format!("http://{}/alive", addr), 1000);

        monitor.run_probe(&target).await;

        let counters = monitor.state.lock().await.counters["gateway"];
        assert_eq!(counters.total, 1);
        assert_eq!(counters.failed, 1);
        assert_eq!(counters.success, 0);
        assert_eq!(counters.slow, 0);

        let alert = alert_rx.try_recv().expect("expected one error alert");
        assert!(alert.contains("HTTP check failed"));
        assert!(alert_rx.try_recv().is_err(), "only one alert expected");
    }

    #[test]
    fn success_emits_no_alert() {
        let outcome = ProbeOutcome::Success { elapsed_ms: 200 };
        assert!(outcome_alert("gateway", &outcome).is_none());
    }

    #[test]
    fn slow_alert_carries_the_elapsed_time() {
        let outcome = ProbeOutcome::Slow { elapsed_ms: 1500 };
        let alert = outcome_alert("gateway", &outcome).unwrap();
        assert!(alert.contains("1500"));
        assert!(alert.contains("gateway"));
    }

    #[test]
    fn failure_alert_carries_the_reason() {
        let outcome = ProbeOutcome::Failed {
            reason: "unexpected status 503".into(),
        };
        let alert = outcome_alert("gateway", &outcome).unwrap();
        assert!(alert.contains("unexpected status 503"));
    }

    #[test]
    fn summary_is_sent_even_with_zero_traffic() {
        let summary = format_summary("gateway", &CheckCounters::default());
        assert!(summary.contains("gateway"));
        assert!(summary.contains("checks: 0"));
        assert!(summary.contains("failed: 0"));
    }

    #[test]
    fn summary_reports_the_window_counts() {
        let snapshot = CheckCounters {
            total: 60,
            success: 57,
            failed: 3,
            slow: 4,
        };
        let summary = format_summary("gateway", &snapshot);
        assert!(summary.contains("checks: 60"));
        assert!(summary.contains("ok: 57 (slow: 4)"));
        assert!(summary.contains("failed: 3"));
    }

    #[test]
    fn dashboard_reports_staleness_and_reconnects() {
        let dashboard = format_dashboard("wss://ws.example.com/v1/trading", 12, 4);
        assert!(dashboard.contains("wss://ws.example.com/v1/trading"));
        assert!(dashboard.contains("12s ago"));
        assert!(dashboard.contains("Reconnects: 4"));
    }
}
