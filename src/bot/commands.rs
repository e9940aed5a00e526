//! Chat commands
//!
//! Text in, text out. All decisions live in the sweep engine; this layer only
//! formats what the engine reports.

use std::sync::Arc;

use crate::sweep::{SweepEngine, NATIVE_SYMBOL};

/// Recognised chat commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Deposit address
    Wallet,
    /// Current valuation
    Status,
    /// Manual sweep
    Trigger,
    Start,
    Help,
}

impl Command {
    /// Parse a chat message such as `/status` or `/status@SweepBot`
    ///
    /// Returns `None` for plain text, unknown commands, and commands
    /// addressed to a different bot.
    pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Self> {
        let token = text.split_whitespace().next()?;
        let token = token.strip_prefix('/')?;

        let (name, addressee) = match token.split_once('@') {
            Some((name, who)) => (name, Some(who)),
            None => (token, None),
        };

        if let (Some(who), Some(me)) = (addressee, bot_username) {
            if !who.eq_ignore_ascii_case(me) {
                return None;
            }
        }

        match name.to_ascii_lowercase().as_str() {
            "wallet" => Some(Command::Wallet),
            "status" => Some(Command::Status),
            "trigger" => Some(Command::Trigger),
            "start" => Some(Command::Start),
            "help" => Some(Command::Help),
            _ => None,
        }
    }
}

/// A message to send back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    /// Render with Telegram Markdown; only for text we fully control
    pub markdown: bool,
}

impl Reply {
    fn plain(text: String) -> Self {
        Self {
            text,
            markdown: false,
        }
    }

    fn markdown(text: String) -> Self {
        Self {
            text,
            markdown: true,
        }
    }
}

/// Request/response handlers over the sweep engine
pub struct CommandSurface {
    engine: Arc<SweepEngine>,
}

impl CommandSurface {
    pub fn new(engine: Arc<SweepEngine>) -> Self {
        Self { engine }
    }

    pub async fn handle(&self, command: Command) -> Reply {
        match command {
            Command::Wallet => Reply::markdown(self.describe_address()),
            Command::Status => Reply::plain(self.describe_status().await),
            Command::Trigger => Reply::plain(self.invoke_sweep().await),
            Command::Start | Command::Help => Reply::markdown(self.help()),
        }
    }

    /// Deposit instructions
    pub fn describe_address(&self) -> String {
        format!(
            "Send {} to:\n`{}`",
            NATIVE_SYMBOL,
            self.engine.wallet().address()
        )
    }

    /// Current valuation or the reason it is unavailable
    pub async fn describe_status(&self) -> String {
        let policy = self.engine.policy();
        match self.engine.evaluate().await {
            Ok(valuation) => format!(
                "Current balance: {}\nSweep threshold: {:.2} {}",
                valuation,
                policy.threshold,
                self.engine.currency().to_uppercase()
            ),
            Err(e) => format!("Status unavailable: {}", e),
        }
    }

    /// Run `maybe_sweep` and render its outcome
    pub async fn invoke_sweep(&self) -> String {
        self.engine.maybe_sweep().await.to_string()
    }

    fn help(&self) -> String {
        let policy = self.engine.policy();
        format!(
            "Balance sweeper\n\n\
             /wallet - deposit address\n\
             /status - current balance and value\n\
             /trigger - sweep now if the balance is worth at least {:.2} {}\n\n\
             Swept funds go to `{}`",
            policy.threshold,
            self.engine.currency().to_uppercase(),
            policy.destination
        )
    }
}
