//! Chat command surface
//!
//! `/wallet`, `/status` and `/trigger` over Telegram.

pub mod commands;
pub mod telegram;

pub use commands::{Command, CommandSurface, Reply};
pub use telegram::{TelegramApi, TelegramBot};
