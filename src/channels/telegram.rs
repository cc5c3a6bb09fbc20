//! Telegram channel — long-polls the Bot API for updates.
//!
//! Native Bot API client over reqwest: `getUpdates` long polling for inbound
//! text, plain-text `sendMessage` for replies, and `getMe` / `getChat` /
//! `getChatMember` / `sendChatAction` for startup and group diagnostics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::config::TelegramConfig;
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Pause after a failed poll before trying again.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Envelope every Bot API method responds with.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// `getMe` result.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BotUser {
    pub id: i64,
    pub username: Option<String>,
}

/// `getChat` result.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatInfo {
    pub id: i64,
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
}

/// `getChatMember` result (only the fields diagnostics care about).
#[derive(Debug, Clone, Deserialize)]
struct ChatMember {
    status: String,
}

/// Outcome of [`TelegramChannel::check_bot_status`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct BotStatusReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot: Option<BotUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<ChatInfo>,
    /// Bot's membership status in the target group ("administrator", "member", ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_status: Option<String>,
    /// Whether a chat action could be sent to the target group.
    pub can_send: bool,
    pub errors: Vec<String>,
}

/// Telegram channel — connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    api_base: String,
    target_group_id: String,
    poll_timeout: Duration,
    poll_interval: Duration,
    client: reqwest::Client,
    stopped: Arc<AtomicBool>,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            bot_token: config.bot_token.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            target_group_id: config.target_group_id.trim().to_string(),
            poll_timeout: config.poll_timeout,
            poll_interval: config.poll_interval,
            client: reqwest::Client::new(),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.api_base, &self.bot_token, method)
    }

    /// Call a Bot API method and unwrap its `result`.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("{method}: {e}"),
            })?;

        let status = resp.status();
        let parsed: ApiResponse<T> =
            resp.json().await.map_err(|e| ChannelError::InvalidResponse {
                name: "telegram".into(),
                reason: format!("{method} returned {status}: {e}"),
            })?;

        match parsed {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => Err(ChannelError::InvalidResponse {
                name: "telegram".into(),
                reason: format!(
                    "{method} returned {status}: {}",
                    description.as_deref().unwrap_or("no description")
                ),
            }),
        }
    }

    /// Send a plain-text message, split to fit Telegram's length limit.
    ///
    /// No parse mode is set: survey answers are arbitrary user text and must
    /// not be interpreted as markup.
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            let body = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
            });
            self.call::<serde_json::Value>("sendMessage", &body).await?;
        }
        Ok(())
    }

    pub async fn get_me(&self) -> Result<BotUser, ChannelError> {
        self.call("getMe", &serde_json::json!({})).await
    }

    async fn get_chat(&self, chat_id: &str) -> Result<ChatInfo, ChannelError> {
        self.call("getChat", &serde_json::json!({ "chat_id": chat_id }))
            .await
    }

    async fn get_chat_member(&self, chat_id: &str, user_id: i64) -> Result<ChatMember, ChannelError> {
        self.call(
            "getChatMember",
            &serde_json::json!({ "chat_id": chat_id, "user_id": user_id }),
        )
        .await
    }

    async fn send_chat_action(&self, chat_id: &str, action: &str) -> Result<(), ChannelError> {
        self.call::<bool>(
            "sendChatAction",
            &serde_json::json!({ "chat_id": chat_id, "action": action }),
        )
        .await
        .map(|_| ())
    }

    /// Probe the bot's credentials and its access to the target group.
    ///
    /// Every failure is logged and recorded in the report; this never fails
    /// the caller.
    pub async fn check_bot_status(&self) -> BotStatusReport {
        let mut report = BotStatusReport::default();

        let bot = match self.get_me().await {
            Ok(bot) => bot,
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch bot info");
                report.errors.push(e.to_string());
                return report;
            }
        };

        tracing::info!(
            username = bot.username.as_deref().unwrap_or("unknown"),
            bot_id = bot.id,
            target_group = %self.target_group_id,
            "Bot is running"
        );
        report.bot = Some(bot.clone());

        if self.target_group_id.is_empty() {
            tracing::warn!("Target group id is not configured, skipping group checks");
            return report;
        }
        report.target_group_id = Some(self.target_group_id.clone());

        if let Err(e) = self.check_group_access(bot.id, &mut report).await {
            tracing::error!(
                error = %e,
                group = %self.target_group_id,
                "Group check failed. Verify that: 1) the bot is added to the group, \
                 2) the bot has administrator rights, 3) the group id is correct"
            );
            report.errors.push(e.to_string());
        }

        report
    }

    async fn check_group_access(
        &self,
        bot_id: i64,
        report: &mut BotStatusReport,
    ) -> Result<(), ChannelError> {
        let group = &self.target_group_id;

        let chat = self.get_chat(group).await?;
        tracing::info!(
            title = chat.title.as_deref().unwrap_or(""),
            kind = %chat.kind,
            id = chat.id,
            "Target group found"
        );
        report.group = Some(chat);

        let member = self.get_chat_member(group, bot_id).await?;
        tracing::info!(status = %member.status, "Bot membership in target group");
        report.member_status = Some(member.status);

        self.send_chat_action(group, "typing").await?;
        tracing::info!("Bot can send messages to the target group");
        report.can_send = true;

        Ok(())
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let client = self.client.clone();
        let poll_timeout = self.poll_timeout.as_secs();
        let poll_interval = self.poll_interval;
        let stopped = Arc::clone(&self.stopped);

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            while !stopped.load(Ordering::SeqCst) {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": poll_timeout,
                    "allowed_updates": ["message"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                        continue;
                    }
                };

                let data: serde_json::Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                        continue;
                    }
                };

                if let Some(results) = data.get("result").and_then(serde_json::Value::as_array) {
                    for update in results {
                        // Advance offset past this update
                        if let Some(uid) =
                            update.get("update_id").and_then(serde_json::Value::as_i64)
                        {
                            offset = offset.max(uid + 1);
                        }

                        let Some(incoming) = parse_update(update) else {
                            tracing::debug!("Telegram: skipping non-text update");
                            continue;
                        };

                        if tx.send(incoming).is_err() {
                            tracing::info!("Telegram listener channel closed");
                            return;
                        }
                    }
                } else {
                    tracing::warn!(response = %data, "Telegram getUpdates returned no result");
                }

                tokio::time::sleep(poll_interval).await;
            }

            tracing::info!("Telegram polling stopped");
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        chat_id: &str,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        self.send_message(chat_id, &response.content).await
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let me = self.get_me().await.map_err(|e| ChannelError::StartupFailed {
            name: "telegram".into(),
            reason: e.to_string(),
        })?;
        tracing::info!(
            username = me.username.as_deref().unwrap_or("unknown"),
            "Telegram bot authenticated"
        );
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(api_base: &str, bot_token: &SecretString, method: &str) -> String {
    format!("{api_base}/bot{}/{method}", bot_token.expose_secret())
}

/// Convert one `getUpdates` entry into an incoming message.
///
/// Returns `None` for anything that is not a text message with a chat id.
fn parse_update(update: &serde_json::Value) -> Option<IncomingMessage> {
    let message = update.get("message")?;
    let text = message.get("text").and_then(serde_json::Value::as_str)?;
    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(serde_json::Value::as_i64)?;

    let from = message.get("from");
    let name = from
        .and_then(|f| f.get("first_name"))
        .and_then(|n| n.as_str())
        .or_else(|| {
            from.and_then(|f| f.get("username"))
                .and_then(|u| u.as_str())
        });

    let mut incoming = IncomingMessage::new("telegram", chat_id.to_string(), text);
    if let Some(name) = name {
        incoming = incoming.with_user_name(name);
    }
    Some(incoming)
}

/// Split a message into chunks that fit Telegram's length limit.
///
/// Telegram measures text in UTF-16 code units, so characters outside the
/// BMP (most emoji) count twice. Tries to split on newlines, then spaces,
/// then hard-cuts on a char boundary.
fn split_message(text: &str, max_units: usize) -> Vec<String> {
    if utf16_len(text) <= max_units {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if utf16_len(remaining) <= max_units {
            chunks.push(remaining.to_string());
            break;
        }

        let limit = utf16_boundary(remaining, max_units);

        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

/// Byte offset of the longest prefix of `text` that fits in `max_units`
/// UTF-16 code units. Always covers at least one char.
fn utf16_boundary(text: &str, max_units: usize) -> usize {
    let mut units = 0;
    for (i, c) in text.char_indices() {
        units += c.len_utf16();
        if units > max_units {
            return if i == 0 { c.len_utf8() } else { i };
        }
    }
    text.len()
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn config(token: &str) -> TelegramConfig {
        TelegramConfig {
            bot_token: SecretString::from(token.to_string()),
            target_group_id: String::new(),
            api_base: "https://api.telegram.org".into(),
            poll_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(300),
        }
    }

    #[test]
    fn telegram_channel_name() {
        let ch = TelegramChannel::new(&config("fake-token"));
        assert_eq!(ch.name(), "telegram");
    }

    #[test]
    fn telegram_api_url() {
        let ch = TelegramChannel::new(&config("123:ABC"));
        assert_eq!(
            ch.api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
    }

    #[test]
    fn telegram_api_url_trims_trailing_slash() {
        let mut cfg = config("123:ABC");
        cfg.api_base = "http://127.0.0.1:9000/".into();
        let ch = TelegramChannel::new(&cfg);
        assert_eq!(
            ch.api_url("sendMessage"),
            "http://127.0.0.1:9000/bot123:ABC/sendMessage"
        );
    }

    // ── Update parsing ──────────────────────────────────────────────

    #[test]
    fn parse_text_update() {
        let update = serde_json::json!({
            "update_id": 10,
            "message": {
                "message_id": 1,
                "from": {"id": 42, "first_name": "Jane", "username": "jane_d"},
                "chat": {"id": 42, "type": "private"},
                "text": "/start"
            }
        });
        let msg = parse_update(&update).unwrap();
        assert_eq!(msg.channel, "telegram");
        assert_eq!(msg.chat_id, "42");
        assert_eq!(msg.content, "/start");
        assert_eq!(msg.user_name.as_deref(), Some("Jane"));
    }

    #[test]
    fn parse_update_falls_back_to_username() {
        let update = serde_json::json!({
            "update_id": 11,
            "message": {
                "from": {"id": 7, "username": "woodworker"},
                "chat": {"id": -100500, "type": "group"},
                "text": "hello"
            }
        });
        let msg = parse_update(&update).unwrap();
        assert_eq!(msg.chat_id, "-100500");
        assert_eq!(msg.user_name.as_deref(), Some("woodworker"));
    }

    #[test]
    fn parse_update_skips_non_text() {
        let sticker = serde_json::json!({
            "update_id": 12,
            "message": {
                "chat": {"id": 42, "type": "private"},
                "sticker": {"file_id": "abc"}
            }
        });
        assert!(parse_update(&sticker).is_none());

        let edited = serde_json::json!({
            "update_id": 13,
            "edited_message": {"chat": {"id": 42}, "text": "changed"}
        });
        assert!(parse_update(&edited).is_none());
    }

    #[test]
    fn parse_update_keeps_blank_text() {
        let update = serde_json::json!({
            "update_id": 14,
            "message": {"chat": {"id": 1, "type": "private"}, "text": "   "}
        });
        assert_eq!(parse_update(&update).unwrap().content, "   ");
    }

    // ── Message splitting tests ─────────────────────────────────────

    #[test]
    fn split_message_short() {
        let chunks = split_message("Hello", 4096);
        assert_eq!(chunks, vec!["Hello"]);
    }

    #[test]
    fn split_message_exact_limit() {
        let msg = "a".repeat(4096);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 4096);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "a".repeat(2000));
        assert_eq!(chunks[1], "b".repeat(3000));
    }

    #[test]
    fn split_message_no_good_split_point() {
        let msg = "a".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    #[test]
    fn split_message_counts_utf16_units_not_bytes() {
        // Cyrillic letters are two bytes each in UTF-8.
        let msg = "я".repeat(4096);
        assert_eq!(split_message(&msg, 4096).len(), 1);

        let msg = "я".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 4096);
        assert_eq!(chunks[1].chars().count(), 904);
    }

    #[test]
    fn split_message_counts_emoji_as_two_units() {
        let msg = "😀".repeat(5000);
        let chunks = split_message(&msg, 4096);
        let units: Vec<usize> = chunks.iter().map(|c| c.encode_utf16().count()).collect();
        assert_eq!(units, vec![4096, 4096, 1808]);
        assert_eq!(chunks.concat(), msg);
    }

    #[test]
    fn split_message_never_cuts_a_surrogate_pair() {
        // 1 + 2 * 2048 = 4097 units: the last emoji cannot fit.
        let msg = format!("a{}", "😀".repeat(2048));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].encode_utf16().count(), 4095);
        assert_eq!(chunks[1], "😀");
    }

    #[test]
    fn split_message_summary_with_emoji_answers_fits() {
        let answers = format!("Новая заявка:\n1. ФИО: {}\n2. Email: {}", "🔨".repeat(3000), "✅".repeat(10));
        for chunk in split_message(&answers, 4096) {
            assert!(chunk.encode_utf16().count() <= 4096);
        }
    }

    #[test]
    fn split_message_limit_smaller_than_one_char() {
        assert_eq!(split_message("😀😀", 1), vec!["😀", "😀"]);
    }
}
