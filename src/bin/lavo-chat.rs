//! Interactive chat application for conversing with LAVO.
//!
//! This binary provides a streaming REPL interface over any
//! OpenAI-compatible chat completion endpoint.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage with default settings (reads OPENAI_API_KEY, or a .env file)
//! lavo-chat
//!
//! # Specify a model
//! lavo-chat --model gpt-4.1-mini
//!
//! # Set a system prompt
//! lavo-chat --system "Responda sempre em inglês."
//!
//! # Load settings from YAML and log the wire traffic
//! lavo-chat --config lavo.yaml --log-file lavo.jsonl
//!
//! # Disable colors (useful for piping output)
//! lavo-chat --no-color
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/system [prompt]` - Set and apply, or show, the system prompt
//! - `/apply` - Re-apply the configured system prompt
//! - `/model <name>` - Change the model
//! - `/history` - Show the conversation so far
//! - `/stats` - Show session statistics
//! - `/quit` - Exit the application

use std::fs::OpenOptions;
use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use lavo::chat::{
    API_KEY_ENV, ChatArgs, ChatCommand, ChatSession, PlainTextRenderer, Renderer, SessionConfig,
    help_text, parse_command,
};
use lavo::{JsonLinesLogger, Model, OpenAi};

/// Main entry point for the lavo-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let (args, _) = ChatArgs::from_command_line_relaxed("lavo-chat [OPTIONS]");
    let log_file = args.log_file.clone();
    let config = SessionConfig::from_args(args)?;
    let use_color = config.use_color;

    let mut client = OpenAi::with_options(Some(&config.base_url), None)?;
    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        client = client.with_logger(Arc::new(JsonLinesLogger::new(file)));
    }
    let mut session = ChatSession::with_provider(client, config);
    let mut renderer = PlainTextRenderer::with_color(use_color);
    let mut rl = DefaultEditor::new()?;

    println!("LAVO Chat (model: {})", session.model());
    if session.config().has_api_key() {
        renderer.print_info(&format!("{API_KEY_ENV} loaded."));
    } else {
        renderer.print_error(&format!(
            "{API_KEY_ENV} not found. Set it in the environment or a .env file."
        ));
    }
    println!("Type /help for commands, /quit to exit\n");

    loop {
        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {line}");
                            }
                        }
                        ChatCommand::Model(model_name) => {
                            let model: Model = match model_name.parse() {
                                Ok(model) => model,
                                Err(never) => match never {},
                            };
                            session.set_model(model);
                            renderer.print_info(&format!("Model changed to: {model_name}"));
                        }
                        ChatCommand::SetSystem(prompt) => {
                            session.apply_system_prompt(prompt);
                            renderer.print_info("System prompt applied.");
                        }
                        ChatCommand::ShowSystem => match session.log().system_prompt() {
                            Some(prompt) => renderer.print_info(&format!("System prompt: {prompt}")),
                            None => renderer.print_info("System prompt: (none)"),
                        },
                        ChatCommand::Apply => {
                            session.reapply_system_prompt();
                            renderer.print_info("System prompt applied.");
                        }
                        ChatCommand::Temperature(value) => match session.set_temperature(value) {
                            Ok(()) => renderer.print_info(&format!("temperature set to {value:.2}")),
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        ChatCommand::History => {
                            let mut empty = true;
                            for turn in session.log().conversation() {
                                renderer.print_turn(turn);
                                empty = false;
                            }
                            if empty {
                                renderer.print_info("(no messages yet)");
                            }
                        }
                        ChatCommand::Stats => {
                            print_stats(&session);
                        }
                        ChatCommand::ShowConfig => {
                            print_config(&session);
                        }
                        ChatCommand::Invalid(message) => {
                            renderer.print_error(&message);
                        }
                    }
                    continue;
                }

                // Regular message - send to the provider
                println!("LAVO:");
                if let Err(e) = session.send_streaming(line, &mut renderer).await {
                    renderer.print_error(&e.to_string());
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {err}"));
                break;
            }
        }
    }

    Ok(())
}

fn print_stats(session: &ChatSession) {
    let stats = session.stats();
    println!("    Session Statistics:");
    println!("      Model: {}", stats.model);
    println!("      Messages: {}", stats.message_count);
    println!("      Temperature: {:.2}", stats.temperature);
    println!("      Submissions: {}", stats.submissions);
    println!("      Failed turns: {}", stats.failed_turns);
    println!("      Last response: {} chars", stats.last_response_chars);
}

fn print_config(session: &ChatSession) {
    let config = session.config();
    println!("    Current Configuration:");
    println!("      Model: {}", config.model);
    println!("      Temperature: {:.2}", config.temperature);
    println!("      Base URL: {}", session.provider().base_url());
    println!(
        "      {API_KEY_ENV}: {}",
        if config.has_api_key() { "set" } else { "missing" }
    );
    println!("      System prompt: {}", config.system_prompt);
}
