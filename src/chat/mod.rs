//! Chat application module for conversations with the LAVO assistant.
//!
//! This module provides the streaming chat session manager and the pieces of
//! the interactive REPL built on top of it:
//!
//! - Pull-based streaming of cumulative response buffers
//! - Partial responses committed even when the stream fails
//! - Slash commands for session control
//! - Configurable model, system prompt, and temperature
//!
//! # Architecture
//!
//! The module is organized into several components:
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: Conversation ownership and provider interaction
//! - [`commands`]: Slash command parsing

mod commands;
mod config;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{
    API_KEY_ENV, ChatArgs, ConfigFile, DEFAULT_SYSTEM_PROMPT, DEFAULT_TEMPERATURE, SessionConfig,
    validate_temperature,
};
pub use session::{ChatSession, SessionStats, TurnOutcome, TurnStream};
