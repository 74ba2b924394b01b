// ============================================================================
// OUTBOUND NOTIFICATIONS (fire-and-forget)
// ============================================================================
//
// Operator and user notifications are emitted AFTER the ledger mutation
// commits. A failed notification is logged and dropped; it never rolls
// back or blocks the mutation that already happened.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::config::Config;
use crate::model::WithdrawalRequest;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Alert the operator channel, with approve/reject actions attached
    /// when a withdrawal request is included.
    async fn notify_operator(&self, text: &str, request: Option<&WithdrawalRequest>)
        -> Result<(), String>;

    /// Message a user directly.
    async fn notify_user(&self, user_id: &str, text: &str) -> Result<(), String>;
}

/// Spawn a notification without waiting for it. Failures are logged only.
pub fn notify_operator_detached(
    notifier: Arc<dyn Notifier>,
    text: String,
    request: Option<WithdrawalRequest>,
) {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify_operator(&text, request.as_ref()).await {
            warn!(error = %e, "Operator notification failed");
        }
    });
}

/// Spawn a user notification without waiting for it.
pub fn notify_user_detached(notifier: Arc<dyn Notifier>, user_id: String, text: String) {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify_user(&user_id, &text).await {
            warn!(user_id = %user_id, error = %e, "User notification failed");
        }
    });
}

// ============================================================================
// TELEGRAM NOTIFIER
// ============================================================================

/// Sends messages through the Telegram Bot API. Operator messages carry
/// inline approve/reject buttons whose callback data encodes the request id.
pub struct TelegramNotifier {
    client: reqwest::Client,
    bot_token: String,
    operator_chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token: config.bot_token.clone(),
            operator_chat_id: config.operator_chat_id.clone(),
        }
    }

    async fn send(&self, chat_id: &str, body: serde_json::Value) -> Result<(), String> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("telegram returned {} for chat {}", response.status(), chat_id));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify_operator(
        &self,
        text: &str,
        request: Option<&WithdrawalRequest>,
    ) -> Result<(), String> {
        let mut body = serde_json::json!({
            "chat_id": self.operator_chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });

        if let Some(req) = request {
            body["reply_markup"] = serde_json::json!({
                "inline_keyboard": [[
                    { "text": "✅ Approve", "callback_data": format!("approve:{}", req.id) },
                    { "text": "❌ Reject", "callback_data": format!("reject:{}", req.id) },
                ]]
            });
        }

        self.send(&self.operator_chat_id, body).await
    }

    async fn notify_user(&self, user_id: &str, text: &str) -> Result<(), String> {
        let body = serde_json::json!({
            "chat_id": user_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        self.send(user_id, body).await
    }
}

/// Used when no bot token is configured; drops everything silently.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify_operator(
        &self,
        _text: &str,
        _request: Option<&WithdrawalRequest>,
    ) -> Result<(), String> {
        Ok(())
    }

    async fn notify_user(&self, _user_id: &str, _text: &str) -> Result<(), String> {
        Ok(())
    }
}
