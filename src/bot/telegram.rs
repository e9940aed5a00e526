//! Telegram Bot API transport
//!
//! Long-polls `getUpdates`, hands each command to its own task, and answers
//! with `sendMessage`. A slow `/trigger` never holds up `/wallet` or `/status`.
//! On shutdown the bot stops polling, then waits for handlers still running so
//! a sweep already under way still reports its outcome.
//!
//! The bot token is part of every request URL, so request errors are logged
//! with the URL stripped.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::commands::{Command, CommandSurface, Reply};
use crate::error::{Error, Result};

/// Pause after a failed poll before trying again
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// How long shutdown waits for in-flight command handlers
const SHUTDOWN_GRACE: Duration = Duration::from_secs(90);

/// Bot API envelope
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotUser {
    pub id: i64,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest<'a> {
    offset: i64,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
}

/// Minimal Bot API client
#[derive(Clone)]
pub struct TelegramApi {
    client: Client,
    base_url: String,
}

impl TelegramApi {
    /// `poll_timeout` is the long-poll hold time; the HTTP timeout is set above it
    pub fn new(api_base: &str, token: &str, poll_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(poll_timeout + Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
        })
    }

    async fn call<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                Error::Chat(format!("{} request failed: {}", method, e.without_url()))
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Chat(format!("{} read failed: {}", method, e.without_url())))?;

        decode_response(method, status.as_u16(), &text)
    }

    /// Identity of the bot; doubles as a token check at startup
    pub async fn get_me(&self) -> Result<BotUser> {
        self.call("getMe", &serde_json::json!({})).await
    }

    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            &GetUpdatesRequest {
                offset,
                timeout: timeout_secs,
                allowed_updates: &["message"],
            },
        )
        .await
    }

    pub async fn send_message(&self, chat_id: i64, reply: &Reply) -> Result<()> {
        let _: Message = self
            .call(
                "sendMessage",
                &SendMessageRequest {
                    chat_id,
                    text: &reply.text,
                    parse_mode: reply.markdown.then_some("Markdown"),
                },
            )
            .await?;
        Ok(())
    }
}

fn decode_response<T: for<'de> Deserialize<'de>>(
    method: &str,
    status: u16,
    body: &str,
) -> Result<T> {
    let envelope: ApiResponse<T> = serde_json::from_str(body).map_err(|e| {
        Error::Chat(format!(
            "{} returned HTTP {} with undecodable body: {}",
            method, status, e
        ))
    })?;

    if !envelope.ok {
        return Err(Error::Chat(format!(
            "{} rejected (HTTP {}): {}",
            method,
            status,
            envelope.description.unwrap_or_default()
        )));
    }

    envelope
        .result
        .ok_or_else(|| Error::Chat(format!("{} returned no result", method)))
}

/// Long-polling command dispatcher
pub struct TelegramBot {
    api: TelegramApi,
    surface: Arc<CommandSurface>,
    allowed_chats: HashSet<i64>,
    poll_timeout_secs: u64,
    shutdown_grace: Duration,
}

impl TelegramBot {
    pub fn new(
        api: TelegramApi,
        surface: Arc<CommandSurface>,
        allowed_chats: impl IntoIterator<Item = i64>,
        poll_timeout_secs: u64,
    ) -> Self {
        Self {
            api,
            surface,
            allowed_chats: allowed_chats.into_iter().collect(),
            poll_timeout_secs,
            shutdown_grace: SHUTDOWN_GRACE,
        }
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Empty allow-list admits every chat
    pub fn is_allowed(&self, chat_id: i64) -> bool {
        self.allowed_chats.is_empty() || self.allowed_chats.contains(&chat_id)
    }

    /// Poll until `shutdown` fires
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let me = self.api.get_me().await?;
        let username = me.username.clone();
        info!(
            "Telegram bot @{} ready (id {})",
            username.as_deref().unwrap_or("?"),
            me.id
        );

        let mut handlers = JoinSet::new();
        let mut offset = 0i64;
        loop {
            tokio::select! {
                polled = self.api.get_updates(offset, self.poll_timeout_secs) => {
                    match polled {
                        Ok(updates) => {
                            for update in updates {
                                offset = offset.max(update.update_id + 1);
                                self.dispatch(&mut handlers, update, username.as_deref());
                            }
                        }
                        Err(e) => {
                            warn!("Polling failed: {}", e);
                            if backoff_or_shutdown(POLL_ERROR_BACKOFF, &mut shutdown).await {
                                break;
                            }
                        }
                    }
                    reap_finished(&mut handlers);
                }
                _ = shutdown.recv() => break,
            }
        }

        info!("Telegram bot shutting down");
        drain_handlers(&mut handlers, self.shutdown_grace).await;
        Ok(())
    }

    /// Route one update to a handler task
    fn dispatch(&self, handlers: &mut JoinSet<()>, update: Update, username: Option<&str>) {
        let Some((chat_id, command)) = self.route(&update, username) else {
            return;
        };

        let api = self.api.clone();
        let surface = self.surface.clone();
        handlers.spawn(async move {
            debug!("Handling {:?} for chat {}", command, chat_id);
            let reply = surface.handle(command).await;
            if let Err(e) = api.send_message(chat_id, &reply).await {
                error!("Failed to reply to chat {}: {}", chat_id, e);
            }
        });
    }

    fn route(&self, update: &Update, username: Option<&str>) -> Option<(i64, Command)> {
        let message = update.message.as_ref()?;
        let command = Command::parse(message.text.as_deref()?, username)?;

        if !self.is_allowed(message.chat.id) {
            warn!(
                "Ignoring {:?} from unauthorised chat {}",
                command, message.chat.id
            );
            return None;
        }

        Some((message.chat.id, command))
    }
}

/// Sleep for `delay`; true if shutdown fired first
async fn backoff_or_shutdown(delay: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = shutdown.recv() => true,
    }
}

fn reap_finished(handlers: &mut JoinSet<()>) {
    while let Some(joined) = handlers.try_join_next() {
        if let Err(e) = joined {
            error!("Command handler crashed: {}", e);
        }
    }
}

/// Wait up to `grace` for running handlers; true if all of them finished
async fn drain_handlers(handlers: &mut JoinSet<()>, grace: Duration) -> bool {
    if handlers.is_empty() {
        return true;
    }

    info!("Waiting for {} in-flight command(s)", handlers.len());
    let drained = tokio::time::timeout(grace, async {
        while let Some(joined) = handlers.join_next().await {
            if let Err(e) = joined {
                error!("Command handler crashed: {}", e);
            }
        }
    })
    .await;

    if drained.is_err() {
        warn!(
            "{} command(s) still running after {:?}; their outcome will not be reported",
            handlers.len(),
            grace
        );
        handlers.abort_all();
        return false;
    }
    true
}
