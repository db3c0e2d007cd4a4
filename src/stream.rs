use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::config::WsTarget;
use crate::models::MonitorState;
use crate::notify::Notifier;

/// Classification of an inbound text frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// `{"event":"pong"}` heartbeat acknowledgment. Ignored entirely:
    /// it does not refresh the last-message timestamp, so the idle
    /// watchdog can fire even while keep-alives are flowing. That
    /// matches the deployed behavior and is kept on purpose.
    Pong,
    /// Any other well-formed JSON frame.
    Data,
    /// Unparseable payload. Logged and dropped, never alerted.
    Malformed,
}

pub fn classify_frame(text: &str) -> FrameKind {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) if value.get("event").and_then(|e| e.as_str()) == Some("pong") => FrameKind::Pong,
        Ok(_) => FrameKind::Data,
        Err(_) => FrameKind::Malformed,
    }
}

/// Alert text for the idle watchdog, or `None` while traffic is fresh.
pub fn staleness_alert(age_secs: i64, stale_after_secs: u64) -> Option<String> {
    if age_secs > stale_after_secs as i64 {
        Some(format!(
            "\u{23f1} No WebSocket messages for over {}s ({}s since last)",
            stale_after_secs, age_secs
        ))
    } else {
        None
    }
}

/// Owns the single persistent WebSocket connection. The session task is
/// the only place a socket handle lives, so at most one connection
/// attempt is in flight at any time; reconnection is the bottom of its
/// loop rather than a recursive retry.
pub struct WsSession {
    target: WsTarget,
    state: Arc<Mutex<MonitorState>>,
    notifier: Arc<Notifier>,
}

impl WsSession {
    pub fn new(target: WsTarget, state: Arc<Mutex<MonitorState>>, notifier: Arc<Notifier>) -> Self {
        Self { target, state, notifier }
    }

    pub async fn run(self) {
        loop {
            self.connect_and_stream().await;

            self.notifier
                .notify(&format!(
                    "\u{274c} WebSocket disconnected, retrying in {}ms...",
                    self.target.reconnect_delay_ms
                ))
                .await;

            tokio::time::sleep(Duration::from_millis(self.target.reconnect_delay_ms)).await;
        }
    }

    /// One full session: connect, subscribe, pump frames until the
    /// stream closes or faults. Returns once the socket is gone.
    async fn connect_and_stream(&self) {
        info!("Connecting WebSocket: {}", self.target.url);

        let stream = match connect_async(self.target.url.as_str()).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                self.notifier.notify(&format!("WebSocket error: {}", e)).await;
                return;
            }
        };

        let reconnects = {
            let mut state = self.state.lock().await;
            state.ws.connected = true;
            state.ws.reconnects += 1;
            state.ws.last_message_at = Utc::now();
            state.ws.reconnects
        };
        self.notifier
            .notify(&format!("\u{2705} WebSocket connected (reconnects: {})", reconnects))
            .await;

        let (mut sink, mut reader) = stream.split();

        let subscribe = serde_json::json!({
            "event": "subscribe",
            "symbol": self.target.symbol,
            "subscription": { "name": self.target.channel },
        });
        if let Err(e) = sink.send(Message::Text(subscribe.to_string())).await {
            self.notifier
                .notify(&format!("WebSocket error: {}", e))
                .await;
            self.mark_disconnected().await;
            return;
        }

        let heartbeat_period = Duration::from_secs(self.target.heartbeat_secs);
        let mut heartbeat =
            tokio::time::interval_at(tokio::time::Instant::now() + heartbeat_period, heartbeat_period);

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    let ping = serde_json::json!({ "event": "ping" });
                    if let Err(e) = sink.send(Message::Text(ping.to_string())).await {
                        self.notifier.notify(&format!("WebSocket error: {}", e)).await;
                        break;
                    }
                }
                frame = reader.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    // tungstenite answers protocol-level pings on its own.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        self.notifier.notify(&format!("WebSocket error: {}", e)).await;
                        break;
                    }
                },
            }
        }

        self.mark_disconnected().await;
    }

    async fn handle_text(&self, text: &str) {
        match classify_frame(text) {
            FrameKind::Pong => {}
            FrameKind::Data => {
                let mut state = self.state.lock().await;
                state.ws.last_message_at = Utc::now();
                drop(state);
                debug!("WebSocket message received");
            }
            FrameKind::Malformed => warn!("Ignoring malformed WebSocket frame"),
        }
    }

    async fn mark_disconnected(&self) {
        let mut state = self.state.lock().await;
        state.ws.connected = false;
    }
}

/// Periodically checks how long the stream has been silent and alerts
/// past the staleness threshold. Purely observational: it never forces
/// a reconnect.
pub async fn run_watchdog(target: WsTarget, state: Arc<Mutex<MonitorState>>, notifier: Arc<Notifier>) {
    let mut timer = tokio::time::interval(Duration::from_secs(target.watchdog_secs));
    timer.tick().await;

    loop {
        timer.tick().await;

        let last_message_at = state.lock().await.ws.last_message_at;
        let age_secs = (Utc::now() - last_message_at).num_seconds();

        if let Some(alert) = staleness_alert(age_secs, target.stale_after_secs) {
            notifier.notify(&alert).await;
        }
    }
}
