use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sam_companion::daemon::open_store;
use sam_companion::{Config, Daemon};

/// Sam - memory-augmented companion gateway
#[derive(Parser)]
#[command(name = "sam", version, about)]
struct Cli {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Data directory holding the database (overrides config)
    #[arg(long, env = "SAM_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API server and background loops (default)
    Serve,
    /// Print global totals from the database
    Stats,
    /// Write the next weekly reflection for a session
    Reflect {
        /// Session identifier
        session_id: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,sam_companion=info",
        1 => "info,sam_companion=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(port) = cli.port {
        config.api_server.port = port;
    }
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    tracing::debug!(model = %config.model.name, embedding = config.embedding.is_some(), "loaded configuration");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Stats => stats(&config).await,
        Command::Reflect { session_id } => reflect(config, &session_id).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        port = config.api_server.port,
        data_dir = %config.data_dir.display(),
        "starting companion gateway"
    );

    let daemon = Daemon::new(config)?;
    daemon.run().await?;
    Ok(())
}

async fn stats(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let totals = store.stats().await?;

    println!("Messages: {}", totals.total_messages);
    println!("Memories: {}", totals.total_memories);
    println!("Sessions: {}", totals.total_sessions);
    Ok(())
}

async fn reflect(config: Config, session_id: &str) -> anyhow::Result<()> {
    let daemon = Daemon::new(config)?;
    let services = daemon.services()?;

    match services.reflection.reflect(session_id).await? {
        Some(record) => {
            println!("Week {}", record.week_number);
            println!();
            println!("{}", record.reflection_text);
            if !record.evolution_notes.is_empty() {
                println!();
                println!("Evolution: {}", record.evolution_notes);
            }
        }
        None => println!("This week's reflection was already written."),
    }
    Ok(())
}
