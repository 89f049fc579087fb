// src/notify/telegram.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use super::Notifier;

const SEND_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_RETRIES: u8 = 3;

/// Telegram sink with a persistent client. Delivery failures are reported
/// via `false` after bounded retries; the caller never retries further.
#[derive(Clone)]
pub struct TelegramNotifier {
    token: String,
    chat_id: i64,
    client: Client,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_thread_id: Option<i64>,
    text: &'a str,
    disable_web_page_preview: bool,
    parse_mode: &'static str,
}

impl TelegramNotifier {
    pub fn new(token: String, chat_id: i64) -> Self {
        Self {
            token,
            chat_id,
            client: Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("https://api.telegram.org/bot{}/sendMessage", self.token)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn deliver(&self, thread_id: i64, text: &str) -> bool {
        if self.token.is_empty() {
            warn!("telegram token missing, dropping notification");
            return false;
        }

        let payload = SendMessage {
            chat_id: self.chat_id,
            message_thread_id: (thread_id != 0).then_some(thread_id),
            text,
            disable_web_page_preview: true,
            parse_mode: "HTML",
        };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(self.endpoint())
                .timeout(SEND_TIMEOUT)
                .json(&payload)
                .send()
                .await;

            match res {
                Ok(rsp) if rsp.status().is_success() => {
                    debug!(thread_id, "telegram message sent");
                    return true;
                }
                Ok(rsp) => {
                    let status = rsp.status();
                    if attempt < MAX_RETRIES {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    warn!(%status, thread_id, "telegram send failed");
                    return false;
                }
                Err(e) => {
                    if attempt < MAX_RETRIES {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    warn!(error = %e, thread_id, "telegram request failed");
                    return false;
                }
            }
        }
    }
}
