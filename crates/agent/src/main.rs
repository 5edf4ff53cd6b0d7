use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use apex_agent::config::AgentConfig;
use apex_agent::store::{MemoryPatchStore, PatchStore, PgPatchStore};
use apex_agent::PatchService;

#[derive(Parser)]
#[command(name = "apex-agent", version, about = "AI admin patch pipeline")]
struct Cli {
    /// Persist patches here. Without it patches live only for this run.
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the codebase analysis
    Analyze,
    /// Generate a patch for a request, optionally applying it
    Generate {
        request: String,
        #[arg(long)]
        apply: bool,
    },
    /// Apply a stored patch
    Apply { id: String },
    /// Roll back an applied patch
    Rollback { id: String },
    /// Show one stored patch
    Show { id: String },
    /// List stored patches, newest first
    History {
        #[arg(long, default_value_t = 20)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
}

impl Commands {
    fn needs_persistence(&self) -> bool {
        !matches!(self, Commands::Analyze | Commands::Generate { .. })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "apex_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = AgentConfig::from_env()?;

    let store: Arc<dyn PatchStore> = match &cli.database_url {
        Some(url) => {
            let pool = apex_db::create_pool(url).await?;
            apex_db::run_migrations(&pool).await?;
            Arc::new(PgPatchStore::new(pool))
        }
        None if cli.command.needs_persistence() => {
            anyhow::bail!("this command needs stored patches; set DATABASE_URL or pass --database-url")
        }
        None => Arc::new(MemoryPatchStore::new()),
    };

    let service = PatchService::from_config(&config, store)?;

    match cli.command {
        Commands::Analyze => print_json(&service.analyze_codebase().await?),
        Commands::Generate { request, apply } => {
            print_json(&service.execute_command(&request, apply, None).await?)
        }
        Commands::Apply { id } => print_json(&service.apply_patch(&id).await?),
        Commands::Rollback { id } => print_json(&service.rollback_patch(&id).await?),
        Commands::Show { id } => print_json(&service.get_patch(&id).await?),
        Commands::History { limit, offset } => {
            print_json(&service.patch_history(limit, offset).await?)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
