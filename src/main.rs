//! Fetcher CLI - HTTP service and local administration for the URL registry

use clap::{Parser, Subcommand};
use fetcher::config::{self, FetcherConfig};
use fetcher::record::{parse_id, NewHistory, NewUrl};
use fetcher::storage::{SchemaStatus, SqliteStore};
use fetcher::ui::{self, Icons};
use fetcher::UrlRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "fetcher")]
#[command(version = "0.0.1")]
#[command(about = "Registry of monitored URLs with per-URL fetch history")]
#[command(long_about = r#"
Fetcher keeps a registry of URLs to poll at a fixed interval and the history
of fetch results recorded for each of them.

Example usage:
  fetcher serve --listen 0.0.0.0:3333
  fetcher add --url https://example.com --interval 30
  fetcher history --id 1
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file (defaults to ./fetcher.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Address to listen on
        #[arg(short, long)]
        listen: Option<String>,

        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Register a URL, or update its interval if already registered
    Add {
        #[arg(short, long)]
        url: String,

        /// Poll interval in seconds
        #[arg(short, long)]
        interval: i64,

        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Remove a URL by id
    Remove {
        #[arg(long)]
        id: String,

        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// List registered URLs
    List {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Show fetch history for a URL id
    History {
        #[arg(long)]
        id: String,

        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Record a fetch result for a URL id, stamped now
    Record {
        #[arg(long)]
        id: String,

        /// Response summary to store
        #[arg(short, long)]
        response: String,

        /// Fetch duration in seconds
        #[arg(long)]
        duration: f64,

        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Show statistics about the database
    Stats {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Write a default config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

fn open_store(cfg: &FetcherConfig, database: Option<PathBuf>) -> anyhow::Result<SqliteStore> {
    let path = database.unwrap_or_else(|| cfg.database_path());
    config::prepare_database_path(&path)?;
    Ok(SqliteStore::open(&path)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let cfg = FetcherConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { listen, database } => {
            let mut cfg = cfg;
            if listen.is_some() {
                cfg.listen = listen;
            }
            let database = database.unwrap_or_else(|| cfg.database_path());
            let addr = cfg.listen_addr()?;

            config::prepare_database_path(&database)?;
            let (store, status) = SqliteStore::connect(&database, cfg.busy_timeout())?;
            if let SchemaStatus::Degraded(reason) = &status {
                ui::warn(&format!("Database schema is not up to date: {}", reason));
            }

            ui::header(Icons::GLOBE, &format!("Serving on http://{}", addr));
            ui::info("Database", &database.display().to_string());
            fetcher::server::start_server(addr, Arc::new(store), cfg.request_timeout()).await?;
        }

        Commands::Add { url, interval, database } => {
            let store = open_store(&cfg, database)?;
            let previous = store.find_url(&url)?;
            let id = store.upsert(&NewUrl::new(url.clone(), interval))?;
            match previous {
                Some(old) => ui::success(&format!(
                    "Updated {} from every {}s to every {}s",
                    url, old.interval, interval
                )),
                None => ui::success(&format!("Registered {} every {}s", url, interval)),
            }
            println!("{}", id);
        }

        Commands::Remove { id, database } => {
            let id = parse_id(&id)?;
            let store = open_store(&cfg, database)?;
            if store.delete(id)? {
                ui::success(&format!("Removed id {}", id));
            } else {
                ui::warn(&format!("No url with id {}; nothing removed", id));
            }
        }

        Commands::List { database } => {
            let store = open_store(&cfg, database)?;
            let urls = store.list()?;
            if urls.is_empty() {
                ui::header(Icons::EMPTY, "No URLs registered.");
            } else {
                println!("{}", ui::url_table(&urls));
            }
        }

        Commands::History { id, database } => {
            let id = parse_id(&id)?;
            let store = open_store(&cfg, database)?;
            if store.get(id)?.is_none() {
                ui::warn(&format!("No url is currently registered with id {}", id));
            }
            let history = store.history(id)?;
            if history.is_empty() {
                ui::header(Icons::EMPTY, "No history recorded.");
            } else {
                println!("{}", ui::history_table(&history));
            }
        }

        Commands::Record { id, response, duration, database } => {
            let id = parse_id(&id)?;
            let store = open_store(&cfg, database)?;
            store.append_history(&NewHistory::now(id, response, duration))?;
            ui::success(&format!("Recorded fetch result for id {}", id));
        }

        Commands::Stats { database } => {
            let path = database.unwrap_or_else(|| cfg.database_path());
            let store = open_store(&cfg, Some(path.clone()))?;
            ui::header(Icons::DATABASE, &format!("Fetcher Statistics ({})", path.display()));
            println!("{}", store.stats()?);
        }

        Commands::Init { force } => {
            let path = cli.config.unwrap_or_else(config::default_config_path);
            FetcherConfig::with_defaults().save(&path, force)?;
            ui::success(&format!("Wrote {}", path.display()));
        }
    }

    Ok(())
}
