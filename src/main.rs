//! # ragbridge CLI
//!
//! ```bash
//! ragbridge --config ./config/ragbridge.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragbridge init` | Create the SQLite database and run schema migrations |
//! | `ragbridge datasource add\|list` | Register or list datasources |
//! | `ragbridge collect <id>` | Run one collection for a datasource |
//! | `ragbridge provider add\|list\|activate\|deactivate` | Manage embedding and LLM providers |
//! | `ragbridge embed pending` | Embed documents that have no content parts |
//! | `ragbridge search "<query>"` | Search stored documents |
//! | `ragbridge ask <interaction-id\|new> "<message>"` | Ask a question |
//! | `ragbridge serve` | Start the HTTP API |
//! | `ragbridge completions <shell>` | Print shell completions |
//!
//! ## Example
//!
//! ```bash
//! ragbridge init
//! ragbridge datasource add --name docs --settings '{"root": "./docs"}'
//! ragbridge collect <datasource-id>
//! ragbridge provider add embedding --name local --type noop --settings '{"vector": [0.1, 0.2]}' --activate
//! ragbridge provider add llm --name gpt --type openai --settings '{"model": "gpt-4o-mini", "api_key": "sk-..."}' --activate
//! ragbridge embed pending
//! ragbridge ask new "How do I deploy?"
//! ```

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use ragbridge::{
    admin, collector, config, db, embed_cmd, interaction, logging, migrate, search, server,
};
use ragbridge_core::models::{ProviderCategory, ProviderStatus};

/// ragbridge: collect documents, embed them, and answer questions over them.
#[derive(Parser)]
#[command(name = "ragbridge", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragbridge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Manage datasources.
    Datasource {
        #[command(subcommand)]
        action: DatasourceAction,
    },

    /// Run one collection for a datasource.
    Collect {
        /// Datasource id (see `ragbridge datasource list`).
        id: String,
    },

    /// Manage embedding and LLM providers.
    Provider {
        #[command(subcommand)]
        action: ProviderAction,
    },

    /// Embedding backfill.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Search stored documents.
    Search {
        query: String,

        /// Only search documents from this datasource id.
        #[arg(long)]
        datasource: Option<String>,

        /// Maximum number of results (defaults to `[retrieval] search_limit`).
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Ask a question in an interaction.
    Ask {
        /// Interaction id, or `new` to start one.
        interaction: String,
        message: String,
    },

    /// Start the HTTP API on `[server] bind`.
    Serve,

    /// Print shell completions to stdout.
    Completions { shell: Shell },
}

#[derive(Subcommand)]
enum DatasourceAction {
    /// Register a datasource.
    Add {
        #[arg(long)]
        name: String,

        /// Datasource type.
        #[arg(long = "type", default_value = "filesystem")]
        source_type: String,

        /// Type-specific settings as JSON.
        #[arg(long)]
        settings: String,
    },
    /// List registered datasources with their cursors.
    List,
}

#[derive(Subcommand)]
enum ProviderAction {
    /// Register a provider.
    Add {
        /// `embedding` or `llm`.
        category: ProviderCategory,

        #[arg(long)]
        name: String,

        /// Provider type: `noop` or `http` (embedding), `noop` or `openai` (llm).
        #[arg(long = "type")]
        provider_type: String,

        /// Type-specific settings as JSON.
        #[arg(long)]
        settings: String,

        /// Make this the active provider of its category.
        #[arg(long)]
        activate: bool,
    },
    /// List providers of a category.
    List {
        category: ProviderCategory,

        /// `active` or `inactive`.
        #[arg(long)]
        status: Option<ProviderStatus>,
    },
    /// Make a provider the active one of its category.
    Activate { category: ProviderCategory, id: String },
    /// Deactivate a provider.
    Deactivate { category: ProviderCategory, id: String },
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed documents that have no content parts yet.
    Pending {
        /// Maximum number of documents to embed.
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "ragbridge", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging.filter);

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Datasource { action } => match action {
            DatasourceAction::Add {
                name,
                source_type,
                settings,
            } => admin::run_datasource_add(&cfg, &name, &source_type, &settings).await?,
            DatasourceAction::List => admin::run_datasource_list(&cfg).await?,
        },
        Commands::Collect { id } => collector::run_collect(&cfg, &id).await?,
        Commands::Provider { action } => match action {
            ProviderAction::Add {
                category,
                name,
                provider_type,
                settings,
                activate,
            } => {
                admin::run_provider_add(&cfg, category, &name, &provider_type, &settings, activate)
                    .await?
            }
            ProviderAction::List { category, status } => {
                admin::run_provider_list(&cfg, category, status).await?
            }
            ProviderAction::Activate { category, id } => {
                admin::run_provider_set_status(&cfg, category, &id, true).await?
            }
            ProviderAction::Deactivate { category, id } => {
                admin::run_provider_set_status(&cfg, category, &id, false).await?
            }
        },
        Commands::Embed { action } => match action {
            EmbedAction::Pending { limit } => embed_cmd::run_embed_pending(&cfg, limit).await?,
        },
        Commands::Search {
            query,
            datasource,
            limit,
        } => search::run_search(&cfg, &query, datasource, limit).await?,
        Commands::Ask {
            interaction,
            message,
        } => interaction::run_ask(&cfg, &interaction, &message).await?,
        Commands::Serve => {
            let shutdown = CancellationToken::new();
            let on_signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("shutdown requested");
                    on_signal.cancel();
                }
            });
            server::run_server(&cfg, shutdown).await?;
        }
        // Printed above, before the config is loaded.
        Commands::Completions { .. } => {}
    }

    Ok(())
}
