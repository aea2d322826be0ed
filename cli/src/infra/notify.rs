//! Escalation delivery through the Telegram Bot API.

use std::time::Duration;

use anyhow::{Context, Result};
use hatchery_common::NotifyTarget;
use tracing::debug;

use crate::application::ports::EscalationNotifier;
use crate::domain::remediation::EscalationNotice;

const TELEGRAM_API: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct TelegramNotifier {
    api_base: String,
}

impl Default for TelegramNotifier {
    fn default() -> Self {
        Self::new(TELEGRAM_API)
    }
}

impl TelegramNotifier {
    #[must_use]
    pub fn new(api_base: &str) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }
}

impl EscalationNotifier for TelegramNotifier {
    async fn notify(&self, target: &NotifyTarget, notice: &EscalationNotice) -> Result<()> {
        let (Some(token), Some(chat_id)) = (&target.bot_token, &target.chat_id) else {
            anyhow::bail!(
                "no parent Telegram bot token and chat id recorded for {}",
                notice.instance
            );
        };
        let url = format!("{}/bot{token}/sendMessage", self.api_base);
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": notice.render_text(),
            "disable_web_page_preview": true,
        })
        .to_string();
        debug!(instance = %notice.instance, "sending escalation");
        tokio::task::spawn_blocking(move || {
            match ureq::post(&url)
                .set("Content-Type", "application/json")
                .timeout(REQUEST_TIMEOUT)
                .send_string(&body)
            {
                Ok(_) => Ok(()),
                // The URL carries the bot token; never surface it.
                Err(ureq::Error::Status(code, _)) => anyhow::bail!("Telegram returned HTTP {code}"),
                Err(ureq::Error::Transport(t)) => {
                    anyhow::bail!("Telegram unreachable: {}", t.kind())
                }
            }
        })
        .await
        .context("notify task panicked")?
    }
}
