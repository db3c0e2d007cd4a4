use tracing::{info, warn};

/// Pushes alert text to the configured Telegram chat. Every alert is
/// logged locally first; the remote send is best-effort and its errors
/// never reach the caller.
pub struct Notifier {
    client: reqwest::Client,
    telegram: Option<TelegramTarget>,
    capture: Option<tokio::sync::mpsc::UnboundedSender<String>>,
}

struct TelegramTarget {
    token: String,
    chat_id: String,
}

impl Notifier {
    pub fn new(token: Option<String>, chat_id: Option<String>) -> Self {
        let telegram = match (token, chat_id) {
            (Some(token), Some(chat_id)) if !token.is_empty() && !chat_id.is_empty() => {
                Some(TelegramTarget { token, chat_id })
            }
            _ => {
                info!("Telegram credentials not configured, alerts are local-only");
                None
            }
        };

        Self {
            client: reqwest::Client::new(),
            telegram,
            capture: None,
        }
    }

    /// Local-only notifier that copies every alert into a channel, so
    /// tests can assert on exactly which alerts a task emitted.
    #[cfg(test)]
    pub fn with_capture() -> (Self, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let notifier = Self {
            client: reqwest::Client::new(),
            telegram: None,
            capture: Some(tx),
        };
        (notifier, rx)
    }

    pub fn remote_enabled(&self) -> bool {
        self.telegram.is_some()
    }

    pub async fn notify(&self, text: &str) {
        info!("[ALERT] {}", text);

        if let Some(capture) = &self.capture {
            let _ = capture.send(text.to_string());
        }

        let Some(telegram) = &self.telegram else {
            return;
        };

        let url = format!("https://api.telegram.org/bot{}/sendMessage", telegram.token);
        let payload = serde_json::json!({
            "chat_id": telegram.chat_id,
            "text": text,
        });

        match self.client.post(&url).json(&payload).send().await {
            Ok(response) if !response.status().is_success() => {
                warn!("Telegram API rejected alert: {}", response.status());
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to deliver Telegram alert: {}", e),
        }
    }
}
