//! Command line interface
//!
//! Parses arguments with clap, loads configuration and dispatches to the
//! interactive commands.

pub mod chat;
pub mod practice;
pub mod quiz;
pub mod terminal;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{debug, warn};

use crate::cli::practice::{run_practice, ProgressSink};
use crate::core::backend::BackendClient;
use crate::core::catalog::ExerciseCatalog;
use crate::core::chat_stream::ChatClient;
use crate::core::config::Config;
use crate::core::generator::TextGenerator;
use crate::core::storage::StorageClient;
use crate::utils::logging;

#[derive(Parser)]
#[command(name = "onboard")]
#[command(about = "Scenario practice and an AI mentor for new employees")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model to use for feedback and chat
    #[arg(short = 'm', long, global = true)]
    pub model: Option<String>,

    /// Write diagnostics to this file instead of stderr
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List practice categories and exercises
    List {
        /// Only show this category
        category: Option<String>,
    },
    /// Practice every exercise of a category
    Practice {
        category: String,
        /// Ask for one structured answer instead of a stream
        #[arg(long)]
        structured: bool,
    },
    /// Talk with the AI mentor (default)
    Chat,
    /// Take a quiz hosted by the backend
    Quiz { quiz_id: String },
    /// Show completed exercises recorded by the backend
    Progress,
    /// Print a time-limited download link for an onboarding document
    SignUrl { path: String },
    /// Show the current configuration
    Config,
    /// Set a configuration value
    Set { key: String, value: String },
    /// Unset a configuration value
    Unset { key: String },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    logging::init(args.verbose, args.log.as_deref())?;

    let mut config = Config::load()?;
    config.apply_env_overrides(|name| std::env::var(name).ok());
    if let Some(model) = args.model.filter(|m| !m.trim().is_empty()) {
        config.model = Some(model);
    }

    match args.command.unwrap_or(Commands::Chat) {
        Commands::List { category } => {
            let catalog = load_catalog(&config)?;
            list_exercises(&catalog, category.as_deref());
            Ok(())
        }
        Commands::Practice {
            category,
            structured,
        } => {
            let catalog = load_catalog(&config)?;
            let generator = build_generator(&config)?;
            let progress = progress_sink(&config).await;
            run_practice(generator, &catalog, &category, structured, progress).await
        }
        Commands::Chat => {
            let generator = build_generator(&config)?;
            chat::run_chat(generator, config.user_name.as_deref()).await
        }
        Commands::Quiz { quiz_id } => {
            let backend = BackendClient::new(reqwest::Client::new(), config.api_base_url()?);
            quiz::run_quiz(&backend, &quiz_id).await
        }
        Commands::Progress => {
            let backend = BackendClient::new(reqwest::Client::new(), config.api_base_url()?);
            let Some(user_name) = config.user_name.as_deref() else {
                eprintln!("⚠️  Set a user name first:");
                eprintln!("   onboard set user-name <name>");
                std::process::exit(1);
            };
            let catalog = load_catalog(&config)?;
            quiz::show_progress(&backend, &catalog, user_name).await
        }
        Commands::SignUrl { path } => {
            let storage = StorageClient::new(reqwest::Client::new(), config.storage.clone());
            println!("{}", storage.signed_url(&path).await?);
            Ok(())
        }
        Commands::Config => {
            config.print_all();
            Ok(())
        }
        Commands::Set { key, value } => {
            // Persist the file contents only; env overrides stay out of it.
            let mut stored = Config::load()?;
            stored.set(&key, &value)?;
            stored.save()?;
            println!("✅ Set {key} to: {value}");
            Ok(())
        }
        Commands::Unset { key } => {
            let mut stored = Config::load()?;
            stored.unset(&key)?;
            stored.save()?;
            println!("✅ Unset {key}");
            Ok(())
        }
    }
}

fn load_catalog(config: &Config) -> Result<ExerciseCatalog, Box<dyn Error>> {
    let catalog = match &config.catalog_path {
        Some(path) => ExerciseCatalog::load_from_path(path)?,
        None => ExerciseCatalog::builtin()?,
    };
    debug!(exercises = catalog.exercises().len(), "catalog loaded");
    Ok(catalog)
}

fn build_generator(config: &Config) -> Result<Arc<dyn TextGenerator>, Box<dyn Error>> {
    let api_key = Config::ai_api_key(|name| std::env::var(name).ok())?;
    Ok(Arc::new(ChatClient::new(
        reqwest::Client::new(),
        config.ai_base_url(),
        api_key,
        config.model(),
    )))
}

/// Completion reporting is optional: without a backend URL and user name
/// practice still runs, it just isn't recorded.
async fn progress_sink(config: &Config) -> Option<ProgressSink> {
    let base_url = config.api_base_url().ok()?;
    let user_name = config.user_name.as_deref()?.trim();
    if user_name.is_empty() {
        return None;
    }

    let backend = BackendClient::new(reqwest::Client::new(), base_url);
    match backend.create_session(user_name).await {
        Ok(session) => debug!(session = %session.id, "backend session opened"),
        Err(err) => {
            warn!(error = %err, "backend unavailable, progress will not be recorded");
            return None;
        }
    }
    Some(ProgressSink {
        backend,
        user_name: user_name.to_string(),
    })
}

fn list_exercises(catalog: &ExerciseCatalog, only: Option<&str>) {
    let categories: Vec<&str> = match only {
        Some(category) => vec![category],
        None => catalog.categories(),
    };

    for category in categories {
        let exercises = catalog.by_category(category);
        if exercises.is_empty() {
            println!("  No exercises in '{category}'.");
            continue;
        }
        println!("{category}:");
        for exercise in exercises {
            println!("  • {} ({})", exercise.title, exercise.id);
        }
        println!();
    }
    println!("💡 Start practicing with:");
    println!("   onboard practice <category>");
}
