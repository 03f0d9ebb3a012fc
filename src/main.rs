use clap::Parser;
use colored::*;
use std::path::Path;
use std::process;
use std::sync::Arc;
use tracing::{debug, warn};

use toolchat::api::ApiClient;
use toolchat::attachments::Attachments;
use toolchat::cli::Args;
use toolchat::config::{Config, FileConfig};
use toolchat::error::{ChatError, Result};
use toolchat::logging;
use toolchat::orchestrator::{HistorySettings, Orchestrator};
use toolchat::repl::Repl;
use toolchat::server::{self, AppState};
use toolchat::session::{create_new_session, FilesystemSessionStore, SessionStore};
use toolchat::tools::{ToolRegistry, ToolSettings};
use toolchat::ui::{display_content, display_tool_list, TerminalObserver};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("{} {}", "Error:".red(), e);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    if args.config_init {
        let path = FileConfig::user_config_dir()
            .ok_or_else(|| ChatError::Config("could not determine the home directory".to_string()))?
            .join("toolchat.yaml");
        FileConfig::write_default(&path)?;
        println!("{}", format!("Wrote default config to {}", path.display()).green());
        return Ok(());
    }

    let config = Config::from_env_and_args(&args)?;
    logging::init(config.verbose);

    let store = FilesystemSessionStore::new(config.expiry_minutes)?;

    if args.clear_history {
        let removed = store.clear_all_sessions()?;
        debug!("removed {} session files from {}", removed, store.dir().display());
        println!("{}", "All conversation history cleared.".green());
        return Ok(());
    }

    let mut registry = ToolRegistry::load(ToolSettings::from_config(&config.tools));

    if let Some(manifest) = args.install_tool.as_deref() {
        let name = registry
            .install(Path::new(manifest))
            .map_err(ChatError::Tool)?;
        println!("{}", format!("Installed tool '{}'", name).green());
        return Ok(());
    }

    if let Some(name) = args.remove_tool.as_deref() {
        let path = registry.remove(name).map_err(ChatError::Tool)?;
        println!(
            "{}",
            format!("Removed tool '{}' ({})", name, path.display()).green()
        );
        return Ok(());
    }

    if args.list_tools {
        display_tool_list(&registry.list());
        return Ok(());
    }

    let backend = ApiClient::new(&config.api)?;
    debug!(
        "[AI] {} endpoint {} (model {})",
        config.api.api_type,
        backend.endpoint(),
        config.api.model
    );

    if args.serve {
        return server::serve(AppState::new(config, Arc::new(backend), registry)).await;
    }

    let mut attachments =
        Attachments::new(config.tools.max_file_size_mb.saturating_mul(1024 * 1024));
    for path in &args.attach {
        let attachment = attachments.attach_path(Path::new(path))?;
        debug!("attached {}", attachment.name);
    }

    let mut session = if args.new_conversation {
        create_new_session()
    } else if args.force_continue {
        store.find_latest_session().unwrap_or_else(create_new_session)
    } else {
        store.find_recent_session().unwrap_or_else(create_new_session)
    };

    let tools = if config.tools_enabled {
        Some(registry)
    } else {
        None
    };

    if args.interactive {
        let mut repl = Repl::new(&config, &backend, tools, &store, session, attachments);
        return repl.run().await;
    }

    if args.prompt.is_empty() {
        return Err(ChatError::Other(
            "no prompt given. Usage: toolchat [OPTIONS] <prompt>... (or -i for an interactive session)"
                .to_string(),
        ));
    }
    let prompt = args.prompt.join(" ");

    if let Some(registry) = tools.as_ref() {
        debug!(
            "[tools] available: {}",
            registry
                .list()
                .iter()
                .map(|t| t.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let orchestrator = Orchestrator::from_config(&backend, tools.as_ref(), &config);
    let history = HistorySettings::from_config(&config);
    let mut observer = TerminalObserver::new(true);

    let result = orchestrator
        .run_session_turn(
            &mut session,
            &prompt,
            &history,
            Some(&attachments),
            &mut observer,
        )
        .await;
    observer.finish();
    let outcome = result?;

    if !outcome.streamed {
        display_content(&outcome.content);
    }

    if let Err(e) = store.save_session(&session) {
        warn!("Failed to save session: {}", e);
    }

    Ok(())
}
