//! Telegram delivery for generated reports.
//!
//! Posts HTML documents through the Bot API `sendDocument` method with a fixed
//! retry delay. A client without token or chat id is disabled and every call is a no-op.

use anyhow::{bail, Context, Result};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::config::TelegramConfig;

#[derive(Debug, Deserialize)]
struct BotResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Optional message placement
#[derive(Debug, Clone, Copy, Default)]
pub struct Placement {
    pub thread_id: Option<i64>,
    pub reply_to: Option<i64>,
}

pub struct TelegramClient {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
    chat_id: Option<String>,
    max_attempts: u32,
    retry_delay: Duration,
    /// Return an error instead of `Ok(false)` when all attempts fail
    raise_on_error: bool,
}

impl TelegramClient {
    pub fn new(cfg: &TelegramConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            token: cfg.bot_token.clone().filter(|t| !t.is_empty()),
            chat_id: cfg.chat_id.clone().filter(|c| !c.is_empty()),
            max_attempts: cfg.max_attempts.max(1),
            retry_delay: Duration::from_millis(cfg.retry_delay_ms),
            raise_on_error: false,
        })
    }

    pub fn raise_on_error(mut self, raise: bool) -> Self {
        self.raise_on_error = raise;
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = delay;
        self
    }

    /// Check if the client has credentials
    pub fn is_enabled(&self) -> bool {
        self.token.is_some() && self.chat_id.is_some()
    }

    fn method_url(&self, method: &str) -> Option<String> {
        let token = self.token.as_ref()?;
        Some(format!("{}/bot{}/{}", self.api_base, token, method))
    }

    /// Upload a file as a document. Returns whether delivery succeeded.
    pub async fn send_document(&self, path: &Path, caption: &str, placement: Placement) -> Result<bool> {
        let (Some(url), Some(chat_id)) = (self.method_url("sendDocument"), self.chat_id.clone()) else {
            tracing::info!(path = %path.display(), "Telegram disabled, skipping document upload");
            return Ok(false);
        };

        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report.html".to_string());

        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            let mut form = Form::new()
                .text("chat_id", chat_id.clone())
                .text("caption", caption.to_string());
            if let Some(thread) = placement.thread_id {
                form = form.text("message_thread_id", thread.to_string());
            }
            if let Some(reply) = placement.reply_to {
                form = form.text("reply_to_message_id", reply.to_string());
            }
            let part = Part::bytes(bytes.clone())
                .file_name(file_name.clone())
                .mime_str("text/html")
                .context("Invalid MIME type")?;
            form = form.part("document", part);

            match self.post(&url, form).await {
                Ok(()) => {
                    tracing::info!(file = %file_name, attempt, "📤 Document sent to Telegram");
                    return Ok(true);
                }
                Err(e) => {
                    tracing::warn!(file = %file_name, attempt, max = self.max_attempts, error = %e, "Telegram upload failed");
                    last_error = e.to_string();
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        if self.raise_on_error {
            bail!("Telegram upload of {} failed: {}", file_name, last_error);
        }
        Ok(false)
    }

    /// Send a plain text message
    pub async fn send_message(&self, text: &str, placement: Placement) -> Result<bool> {
        let (Some(url), Some(chat_id)) = (self.method_url("sendMessage"), self.chat_id.clone()) else {
            return Ok(false);
        };

        let mut payload = serde_json::json!({ "chat_id": chat_id, "text": text });
        if let Some(thread) = placement.thread_id {
            payload["message_thread_id"] = serde_json::json!(thread);
        }
        if let Some(reply) = placement.reply_to {
            payload["reply_to_message_id"] = serde_json::json!(reply);
        }

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .context("Failed to reach Telegram")?;
        let body: BotResponse = response.json().await.context("Failed to parse Telegram response")?;
        if !body.ok {
            tracing::warn!(description = ?body.description, "Telegram rejected message");
        }
        Ok(body.ok)
    }

    async fn post(&self, url: &str, form: Form) -> Result<()> {
        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .context("Failed to reach Telegram")?;
        let status = response.status();
        let body: BotResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse Telegram response (HTTP {})", status))?;
        if !body.ok {
            bail!(
                "Telegram API error (HTTP {}): {}",
                status,
                body.description.unwrap_or_default()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let length = text[..header_end]
            .lines()
            .filter_map(|l| l.split_once(':'))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.trim().parse::<usize>().ok());
        match length {
            Some(n) => raw.len() >= header_end + 4 + n,
            None => text.ends_with("0\r\n\r\n"),
        }
    }

    /// Bot API stand-in answering `ok: false` until request number `ok_from`
    async fn bot_api(ok_from: usize) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let hit = counter.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::spawn(async move {
                    let mut raw = Vec::new();
                    let mut buf = vec![0u8; 16 * 1024];
                    while !request_complete(&raw) {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => raw.extend_from_slice(&buf[..n]),
                        }
                    }
                    let (status, body) = if hit >= ok_from {
                        ("200 OK", r#"{"ok":true}"#)
                    } else {
                        ("400 Bad Request", r#"{"ok":false,"description":"Bad Request: chat not found"}"#)
                    };
                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        (format!("http://{}", addr), hits)
    }

    fn client_for(api_base: &str) -> TelegramClient {
        let mut cfg = AppConfig::from_defaults().unwrap();
        cfg.telegram.api_base = api_base.to_string();
        cfg.telegram.bot_token = Some("1:abc".to_string());
        cfg.telegram.chat_id = Some("42".to_string());
        TelegramClient::new(&cfg.telegram)
            .unwrap()
            .with_retry(3, Duration::from_millis(1))
    }

    fn report_file() -> tempfile::NamedTempFile {
        let file = tempfile::Builder::new().suffix(".html").tempfile().unwrap();
        std::fs::write(file.path(), "<p>report</p>").unwrap();
        file
    }

    #[tokio::test]
    async fn test_upload_gives_up_after_max_attempts() {
        let (base, hits) = bot_api(usize::MAX).await;
        let file = report_file();
        let sent = client_for(&base)
            .send_document(file.path(), "caption", Placement::default())
            .await
            .unwrap();
        assert!(!sent);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_upload_failure_raises_when_asked() {
        let (base, hits) = bot_api(usize::MAX).await;
        let file = report_file();
        let err = client_for(&base)
            .raise_on_error(true)
            .send_document(file.path(), "caption", Placement::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("chat not found"));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_upload_retries_until_accepted() {
        let (base, hits) = bot_api(2).await;
        let file = report_file();
        let placement = Placement {
            thread_id: Some(7),
            reply_to: Some(99),
        };
        let sent = client_for(&base)
            .send_document(file.path(), "caption", placement)
            .await
            .unwrap();
        assert!(sent);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_client_is_noop() {
        let cfg = AppConfig::from_defaults().unwrap();
        let client = TelegramClient::new(&cfg.telegram).unwrap();
        assert!(!client.is_enabled());
        let sent = client
            .send_document(Path::new("/does/not/exist.html"), "caption", Placement::default())
            .await
            .unwrap();
        assert!(!sent);
        assert!(!client.send_message("hi", Placement::default()).await.unwrap());
    }

    #[test]
    fn test_empty_credentials_disable_client() {
        let mut cfg = AppConfig::from_defaults().unwrap();
        cfg.telegram.bot_token = Some(String::new());
        cfg.telegram.chat_id = Some("42".to_string());
        let client = TelegramClient::new(&cfg.telegram).unwrap();
        assert!(!client.is_enabled());

        cfg.telegram.bot_token = Some("1:abc".to_string());
        let client = TelegramClient::new(&cfg.telegram).unwrap();
        assert!(client.is_enabled());
        assert_eq!(
            client.method_url("sendDocument").unwrap(),
            "https://api.telegram.org/bot1:abc/sendDocument"
        );
    }
}
