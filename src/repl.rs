use crate::api::ChatBackend;
use crate::attachments::Attachments;
use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::models::Session;
use crate::orchestrator::{HistorySettings, Orchestrator};
use crate::session::{create_new_session, SessionStore};
use crate::tools::ToolRegistry;
use crate::ui::{display_content, display_tool_list, TerminalObserver};
use chrono::Local;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::Path;
use tracing::warn;

const HELP: &str = "\
Commands:
  /attach <path>   attach a text file as context
  /files           list attached files
  /detach <name>   remove an attached file
  /tools           list available tools
  /reload          reload tool plugins from disk
  /new             start a new conversation
  /help            show this help
  /quit            exit";

#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Chat(String),
    Attach(String),
    Files,
    Detach(String),
    Tools,
    Reload,
    New,
    Help,
    Quit,
    Unknown(String),
}

/// None for blank input.
pub fn parse_command(input: &str) -> Option<ReplCommand> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if !input.starts_with('/') {
        return Some(ReplCommand::Chat(input.to_string()));
    }

    let (command, argument) = match input.split_once(char::is_whitespace) {
        Some((command, argument)) => (command, argument.trim()),
        None => (input, ""),
    };

    let parsed = match (command, argument) {
        ("/attach", arg) if !arg.is_empty() => ReplCommand::Attach(arg.to_string()),
        ("/files", _) => ReplCommand::Files,
        ("/detach", arg) if !arg.is_empty() => ReplCommand::Detach(arg.to_string()),
        ("/tools", _) => ReplCommand::Tools,
        ("/reload", _) => ReplCommand::Reload,
        ("/new", _) => ReplCommand::New,
        ("/help", _) => ReplCommand::Help,
        ("/quit", _) | ("/exit", _) => ReplCommand::Quit,
        _ => ReplCommand::Unknown(command.to_string()),
    };
    Some(parsed)
}

/// Interactive chat loop on the terminal.
pub struct Repl<'a> {
    config: &'a Config,
    backend: &'a dyn ChatBackend,
    registry: Option<ToolRegistry>,
    store: &'a dyn SessionStore,
    session: Session,
    attachments: Attachments,
}

impl<'a> Repl<'a> {
    pub fn new(
        config: &'a Config,
        backend: &'a dyn ChatBackend,
        registry: Option<ToolRegistry>,
        store: &'a dyn SessionStore,
        session: Session,
        attachments: Attachments,
    ) -> Self {
        Self {
            config,
            backend,
            registry,
            store,
            session,
            attachments,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut editor = DefaultEditor::new()
            .map_err(|e| ChatError::Other(format!("Failed to start line editor: {}", e)))?;

        println!(
            "{}",
            format!(
                "toolchat: {} ({}). Type /help for commands, /quit to exit.",
                self.config.api.model, self.config.api.api_type
            )
            .cyan()
        );

        loop {
            let line = tokio::task::block_in_place(|| editor.readline("> "));
            let line = match line {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => return Err(ChatError::Other(format!("Failed to read input: {}", e))),
            };

            let Some(command) = parse_command(&line) else {
                continue;
            };
            let _ = editor.add_history_entry(line.trim());

            if !self.handle(command).await {
                break;
            }
        }

        Ok(())
    }

    /// Returns false when the loop should stop.
    async fn handle(&mut self, command: ReplCommand) -> bool {
        match command {
            ReplCommand::Chat(prompt) => self.chat(&prompt).await,
            ReplCommand::Attach(path) => match self.attachments.attach_path(Path::new(&path)) {
                Ok(attachment) => println!("{}", format!("Attached {}", attachment.name).green()),
                Err(e) => eprintln!("{} {}", "Error:".red(), e),
            },
            ReplCommand::Files => {
                if self.attachments.is_empty() {
                    println!("{}", "No files attached.".yellow());
                } else {
                    for name in self.attachments.names() {
                        println!("  {}", name);
                    }
                }
            }
            ReplCommand::Detach(name) => {
                if self.attachments.detach(&name) {
                    println!("{}", format!("Detached {}", name).green());
                } else {
                    eprintln!("{} no attached file named {}", "Error:".red(), name);
                }
            }
            ReplCommand::Tools => match &self.registry {
                Some(registry) => display_tool_list(&registry.list()),
                None => println!("{}", "Tools are disabled.".yellow()),
            },
            ReplCommand::Reload => match &mut self.registry {
                Some(registry) => {
                    registry.reload();
                    println!("{}", format!("Loaded {} tools.", registry.len()).green());
                }
                None => println!("{}", "Tools are disabled.".yellow()),
            },
            ReplCommand::New => {
                self.session = create_new_session();
                self.attachments.clear();
                println!("{}", "Started a new conversation.".green());
            }
            ReplCommand::Help => println!("{}", HELP),
            ReplCommand::Quit => return false,
            ReplCommand::Unknown(command) => {
                eprintln!("{} unknown command {} (try /help)", "Error:".red(), command)
            }
        }
        true
    }

    async fn chat(&mut self, prompt: &str) {
        let orchestrator =
            Orchestrator::from_config(self.backend, self.registry.as_ref(), self.config);
        let history = HistorySettings::from_config(self.config);
        let mut observer = TerminalObserver::new(true);

        let result = orchestrator
            .run_session_turn(
                &mut self.session,
                prompt,
                &history,
                Some(&self.attachments),
                &mut observer,
            )
            .await;

        match result {
            Ok(outcome) => {
                if outcome.streamed {
                    observer.finish();
                } else {
                    display_content(&outcome.content);
                }
                println!("{}", format!("[{}]", Local::now().format("%H:%M:%S")).dimmed());

                if let Err(e) = self.store.save_session(&self.session) {
                    warn!("Failed to save session: {}", e);
                }
            }
            Err(e) => {
                observer.finish();
                eprintln!("{} {}", "Error:".red(), e);
            }
        }
    }
}
