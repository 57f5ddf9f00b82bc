//! Application entry point: a plain-text terminal host for the chat widget.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run) and apply
//!    the `CHAT_WIDGET_API_URL` override.
//! 3. Build the durable [`FileStore`], the [`HttpBackend`] and the speech
//!    recognizer.
//! 4. Mount the [`ChatOrchestrator`] and print the restored conversation.
//! 5. Read stdin line by line until `/quit` or end of input.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use chat_widget::{
    config::AppConfig,
    conversation::{ChatOrchestrator, Message, Role, SendOutcome, VoiceToggle},
    session::HttpBackend,
    storage::FileStore,
    voice::UnsupportedRecognizer,
};

const HELP: &str = "\
Commands:
  /lang <code>  switch language (e.g. /lang hi)
  /clear        forget this conversation and start a new session
  /voice        start or stop voice input
  /help         show this help
  /quit         exit";

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn print_message(agent_name: &str, message: &Message) {
    let speaker = match message.role {
        Role::User => "you",
        Role::Agent => agent_name,
    };
    println!("[{}] {speaker}: {}", message.timestamp.format("%H:%M"), message.content);
}

/// Print every message after the first `from`.
fn print_since(orchestrator: &ChatOrchestrator, from: usize) -> usize {
    let state = orchestrator.snapshot();
    for message in state.log.messages().iter().skip(from) {
        print_message(&orchestrator.config().agent_name, message);
    }
    if let Some(error) = state.voice_error {
        println!("(voice) {error}");
        orchestrator.dismiss_voice_error();
    }
    state.log.len()
}

fn print_languages(orchestrator: &ChatOrchestrator) {
    let current = orchestrator.language();
    for language in orchestrator.languages().languages() {
        let marker = if language.code == current.code { "*" } else { " " };
        println!(" {marker} {:<4} {} ({})", language.code, language.name, language.native_name);
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("chat widget starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        let mut config = AppConfig::default();
        config.apply_env_overrides();
        config
    });

    // 3. Collaborators
    let data_dir = config.storage.resolved_data_dir();
    log::info!("storing widget data in {}", data_dir.display());
    let store = Arc::new(FileStore::new(data_dir));
    let backend = Arc::new(HttpBackend::from_config(&config.backend));
    log::info!("backend at {}", backend.base_url());

    let orchestrator = ChatOrchestrator::new(&config, store, backend, Arc::new(UnsupportedRecognizer));

    // 4. Mount; init runs in the background
    let _init = orchestrator.mount();
    let state = orchestrator.snapshot();
    if state.context_memory {
        println!("(restored previous conversation)");
    }
    println!("Language: {}. Type /help for commands.", orchestrator.language().native_name);
    let mut shown = print_since(&orchestrator, 0);

    // 5. Input loop
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut recognition = None;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, argument) = match line.split_once(' ') {
            Some((command, argument)) => (command, argument.trim()),
            None => (line, ""),
        };

        match command {
            "/quit" | "/exit" => break,
            "/help" => println!("{HELP}"),
            "/lang" if argument.is_empty() => print_languages(&orchestrator),
            "/lang" => {
                let language = orchestrator.change_language(argument);
                println!("Language: {} ({})", language.name, language.native_name);
            }
            "/clear" => {
                let _reset = orchestrator.clear_memory();
                println!("(memory cleared)");
                shown = 0;
            }
            "/voice" => match orchestrator.toggle_voice() {
                VoiceToggle::Started(handle) => {
                    // The previous attempt ended on its own; deliver what it heard.
                    if let Some(previous) = recognition.replace(handle) {
                        orchestrator.finish_voice(previous).await;
                    }
                    println!("(listening; /voice again to stop)");
                }
                VoiceToggle::Stopped => {
                    if let Some(handle) = recognition.take() {
                        orchestrator.finish_voice(handle).await;
                    }
                }
                VoiceToggle::Unavailable if !orchestrator.config().enable_voice => {
                    println!("(voice input is disabled)");
                }
                VoiceToggle::Unavailable => {}
            },
            _ => {
                orchestrator.set_input(line);
                match orchestrator.submit().await {
                    SendOutcome::Ignored(reason) => log::debug!("input ignored: {reason:?}"),
                    SendOutcome::Replied | SendOutcome::Failed => {}
                }
            }
        }

        shown = print_since(&orchestrator, shown);
    }

    log::info!("chat widget shutting down");
    Ok(())
}
