use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use swc_dispatch::config::{DispatchConfig, DEFAULT_COORDINATOR_ROLE};
use swc_dispatch::console::ConsoleMessenger;
use swc_dispatch::node::{Dispatcher, Event};
use swc_dispatch::scheduler::coordinator::{render_queue, tat_timer};
use swc_dispatch::scheduler::QueueStore;
use swc_dispatch::shutdown::install_shutdown_handler;
use swc_dispatch::storage::{GuildConfigStore, JsonFile};

#[derive(Parser, Debug)]
#[command(name = "swc-dispatch")]
#[command(version)]
#[command(about = "Queue, assign and track files for a pool of workers")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the dispatcher, reading JSON-lines events from stdin
    Serve(ServeArgs),

    /// Compute TAT budgets for a file
    Tat {
        /// File type name or code (e.g. "QB", "HP FILE")
        file_type: String,
        /// Audio length as HH:MM:SS or MM:SS
        duration: String,
        #[arg(long, short = 'o', default_value = "table")]
        output: OutputFormat,
    },

    /// Print the persisted queue
    Queue {
        #[arg(long, env = "SWC_DATA_DIR", default_value = "data")]
        data_dir: PathBuf,
        #[arg(long, default_value = "25")]
        limit: usize,
        #[arg(long, short = 'o', default_value = "table")]
        output: OutputFormat,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Directory for queue.json and guild_config.json
    #[arg(long, env = "SWC_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Role names that grant coordinator rights (comma-separated)
    #[arg(long, env = "SWC_COORDINATOR_ROLES", value_delimiter = ',', default_value = DEFAULT_COORDINATOR_ROLE)]
    coordinator_roles: Vec<String>,

    /// User or role ids that grant coordinator rights (comma-separated)
    #[arg(long, env = "SWC_COORDINATOR_IDS", value_delimiter = ',')]
    coordinator_ids: Vec<u64>,

    /// Seconds a worker must wait between availability requests
    #[arg(long, env = "SWC_AVAILABILITY_COOLDOWN", default_value = "600")]
    cooldown_secs: u64,

    /// Seconds a worker has to confirm an assignment
    #[arg(long, env = "SWC_CONFIRMATION_WINDOW", default_value = "300")]
    confirmation_secs: u64,

    /// Role pinged when a confirmation times out
    #[arg(long, env = "SWC_ESCALATION_ROLE")]
    escalation_role: Option<u64>,

    /// Our own user id; events from it are ignored
    #[arg(long, env = "SWC_BOT_USER_ID")]
    bot_user_id: Option<u64>,

    /// Users whose DMs should be treated as closed (comma-separated)
    #[arg(long, value_delimiter = ',')]
    closed_dms: Vec<u64>,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct TatOutput {
    file_type: String,
    duration: String,
    fr_tat: String,
    sv_tat: String,
    overall_tat: String,
}

#[derive(Serialize)]
struct QueueOutput {
    entries: Vec<swc_dispatch::scheduler::QueueEntry>,
    total: usize,
}

async fn run_server(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = DispatchConfig::new(args.data_dir)
        .with_availability_cooldown(Duration::from_secs(args.cooldown_secs))
        .with_confirmation_window(Duration::from_secs(args.confirmation_secs));
    config.coordinator_role_names = args
        .coordinator_roles
        .into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();
    config.coordinator_ids = args.coordinator_ids;
    config.escalation_role_id = args.escalation_role;

    tracing::info!(
        data_dir = %config.data_dir.display(),
        coordinator_roles = ?config.coordinator_role_names,
        cooldown_secs = config.availability_cooldown.as_secs(),
        confirmation_secs = config.confirmation_window.as_secs(),
        "Starting swc-dispatch"
    );

    let queue = QueueStore::open(Box::new(JsonFile::new(config.queue_path())))?;
    let guild_config = GuildConfigStore::open(Box::new(JsonFile::new(config.guild_config_path())))?;
    tracing::info!(queued = queue.len(), "State restored");

    let messenger = Arc::new(ConsoleMessenger::new(args.closed_dms));
    let dispatcher = Dispatcher::build(config, queue, guild_config, messenger, args.bot_user_id);

    let shutdown = install_shutdown_handler()?;
    let (tx, rx) = mpsc::channel::<Event>(256);

    let reader_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                _ = reader_shutdown.cancelled() => break,
                line = lines.next_line() => line,
            };
            match line {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match serde_json::from_str::<Event>(&line) {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Ignoring malformed event"),
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    });

    dispatcher.run(rx, shutdown).await;
    Ok(())
}

fn print_tat(file_type: &str, duration: &str, output: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let (file_type, budget) = tat_timer(file_type, duration)?;
    match output {
        OutputFormat::Json => {
            let out = TatOutput {
                file_type: file_type.to_string(),
                duration: duration.trim().to_string(),
                fr_tat: budget.fr(),
                sv_tat: budget.sv(),
                overall_tat: budget.overall(),
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Table => {
            println!("{:<12} {}", "FILE TYPE", file_type);
            println!("{:<12} {}", "FR TAT", budget.fr());
            println!("{:<12} {}", "SV TAT", budget.sv());
            println!("{:<12} {}", "OVERALL TAT", budget.overall());
        }
    }
    Ok(())
}

fn print_queue(data_dir: PathBuf, limit: usize, output: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let config = DispatchConfig::new(data_dir);
    let queue = QueueStore::open(Box::new(JsonFile::new(config.queue_path())))?;
    let snapshot = queue.snapshot(limit);
    match output {
        OutputFormat::Json => {
            let out = QueueOutput {
                total: snapshot.total,
                entries: snapshot.entries,
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Table => println!("{}", render_queue(&snapshot)),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Serve(server_args) => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
                )
                .init();
            run_server(server_args).await
        }
        Commands::Tat {
            file_type,
            duration,
            output,
        } => print_tat(&file_type, &duration, output),
        Commands::Queue {
            data_dir,
            limit,
            output,
        } => print_queue(data_dir, limit, output),
    }
}
