//! Quill bot binary: configuration, wiring, and the console channel.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quill_common::config::Config;
use quill_common::logging::init_logging;
use quill_profiles::profile::Profile;
use quill_profiles::store::ProfileStore;
use quill_session::artifacts::ArtifactStore;
use quill_session::session::SessionDeps;
use quill_session::{SessionEngine, SessionRegistry};
use std::path::PathBuf;
use std::sync::Arc;

mod console;

/// Quill - a conversational AI assistant for chat platforms.
#[derive(Parser, Debug)]
#[command(name = "quill")]
#[command(version = "0.1.0")]
#[command(about = "Session-based AI assistant bot", long_about = None)]
struct Cli {
    /// Path to config file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a local console conversation
    Chat,

    /// Manage per-user assistant profiles
    Profile {
        #[command(subcommand)]
        profile_command: ProfileCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ProfileCommands {
    /// List a user's profiles
    List {
        /// User id (default: the console user)
        #[arg(long, default_value = console::CONSOLE_USER)]
        user: String,
    },
    /// Create a profile
    Add {
        /// Display name; also the source of the run trigger phrase
        name: String,

        /// User id the profile belongs to
        #[arg(long, default_value = console::CONSOLE_USER)]
        user: String,

        /// System prompt
        #[arg(long, default_value = "")]
        system_prompt: String,

        /// Model identifier
        #[arg(long)]
        model: Option<String>,

        /// Assistant resource id for async runs
        #[arg(long)]
        assistant_id: Option<String>,

        /// Thread resource id for async runs
        #[arg(long)]
        thread_id: Option<String>,

        /// Require JSON object responses
        #[arg(long)]
        structured_output: bool,

        /// Idle timeout in ms (0 = use the global default)
        #[arg(long, default_value = "0")]
        idle_timeout_ms: u64,

        /// Keep transcript context across sessions
        #[arg(long)]
        retention: bool,

        /// Turns to keep (0 = condense into a summary)
        #[arg(long, default_value = "20")]
        retention_size: usize,

        /// Make this the user's active profile
        #[arg(long)]
        select: bool,
    },
    /// Make a profile the user's active one
    Select {
        /// Profile id
        id: String,
    },
    /// Delete a profile
    Delete {
        /// Profile id
        id: String,
    },
    /// Show one profile in full
    Show {
        /// Profile id
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(cli.config.as_deref())?;
    init_logging(&config.logging.level, &config.logging.format);

    if config.provider.api_key.is_empty() {
        let var = match config.provider.kind.as_str() {
            "anthropic" => "ANTHROPIC_API_KEY",
            _ => "OPENAI_API_KEY",
        };
        if let Ok(key) = std::env::var(var) {
            config.provider.api_key = key;
        }
    }

    let store = Arc::new(
        ProfileStore::new(&config.storage.db_path).context("opening profile store")?,
    );

    match cli.command {
        Commands::Chat => {
            let provider = quill_providers::build_provider(&config.provider)?;
            let registry = Arc::new(SessionRegistry::new(config.session.max_sessions));
            let artifacts = Arc::new(ArtifactStore::new(config.storage.artifact_dir.clone()));
            let termination_phrase = config.session.termination_phrase.clone();

            let engine = SessionEngine::new(SessionDeps {
                provider,
                outbound: Arc::new(console::ConsoleOutbound),
                store,
                artifacts,
                registry,
                config: Arc::new(config),
            });
            console::chat_loop(&engine, &termination_phrase).await
        }
        Commands::Profile { profile_command } => run_profile_command(&store, profile_command),
    }
}

fn run_profile_command(store: &ProfileStore, command: ProfileCommands) -> Result<()> {
    match command {
        ProfileCommands::List { user } => {
            let profiles = store.list_profiles(&user)?;
            if profiles.is_empty() {
                println!("No profiles for {user}.");
                return Ok(());
            }
            for profile in profiles {
                let marker = if profile.selected { "*" } else { " " };
                println!(
                    "{marker} {}  {}  model={}  runs={}",
                    profile.id,
                    profile.name,
                    profile.model,
                    profile.supports_runs()
                );
            }
            Ok(())
        }
        ProfileCommands::Add {
            name,
            user,
            system_prompt,
            model,
            assistant_id,
            thread_id,
            structured_output,
            idle_timeout_ms,
            retention,
            retention_size,
            select,
        } => {
            let profile = Profile {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: user,
                name,
                system_prompt,
                model: model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
                assistant_id,
                thread_id,
                structured_output,
                idle_timeout_ms,
                retention,
                retention_size,
                retention_data: Vec::new(),
                condensed_retention_data: String::new(),
                selected: select,
            };
            store.insert_profile(&profile)?;
            println!("Created profile {} ({})", profile.id, profile.name);
            println!("Run trigger phrase: \"{}\"", profile.run_key());
            Ok(())
        }
        ProfileCommands::Select { id } => {
            let profile = store
                .get_profile(&id)?
                .with_context(|| format!("no profile with id {id}"))?;
            store.select_profile(&profile.user_id, &id)?;
            println!("Selected {} for {}", profile.name, profile.user_id);
            Ok(())
        }
        ProfileCommands::Delete { id } => {
            if store.delete_profile(&id)? {
                println!("Deleted profile {id}");
            } else {
                println!("No profile with id {id}");
            }
            Ok(())
        }
        ProfileCommands::Show { id } => {
            let profile = store
                .get_profile(&id)?
                .with_context(|| format!("no profile with id {id}"))?;
            println!("id:                {}", profile.id);
            println!("user:              {}", profile.user_id);
            println!("name:              {}", profile.name);
            println!("model:             {}", profile.model);
            println!("system prompt:     {}", profile.system_prompt);
            println!("structured output: {}", profile.structured_output);
            println!("assistant id:      {}", profile.assistant_id.as_deref().unwrap_or("-"));
            println!("thread id:         {}", profile.thread_id.as_deref().unwrap_or("-"));
            println!("idle timeout (ms): {}", profile.idle_timeout_ms);
            println!(
                "retention:         {} (size {})",
                profile.retention, profile.retention_size
            );
            println!("run trigger:       {}", profile.run_key());
            println!("selected:          {}", profile.selected);
            Ok(())
        }
    }
}
