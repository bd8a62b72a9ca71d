use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};

use mulberry::api;
use mulberry::callback::{CastBroadcaster, CompletionBroadcaster, NativeBroadcaster};
use mulberry::config::{default_home, BroadcasterKind, Config};
use mulberry::destination::{JackalClient, TxQueue};
use mulberry::relay::Relay;
use mulberry::wallet::Wallet;
use mulberry::watchers::{AlloyConnector, WatcherManager};

#[derive(Debug, Parser)]
#[command(name = "mulberry", version, about = "Relay EVM storage-contract events to Jackal")]
struct Cli {
    /// Directory holding config.yaml and the seed file
    #[arg(long, env = "MULBERRY_HOME", global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the relay (default)
    Start,
    /// Print the relay's Jackal and EVM addresses
    Address,
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> eyre::Result<()> {
    init_logging();

    let home = cli.home.unwrap_or_else(default_home);
    let config = Config::load(&home)?;
    let wallet = Wallet::load_or_create(&config.seed_path(&home))?;

    match cli.command.unwrap_or(Command::Start) {
        Command::Address => {
            println!("jackal: {}", wallet.jackal.address);
            println!("evm:    {}", wallet.evm.address);
            Ok(())
        }
        Command::Start => run(config, wallet).await,
    }
}

async fn run(config: Config, wallet: Wallet) -> eyre::Result<()> {
    tracing::info!(
        networks = config.networks_config.len(),
        jackal_chain_id = %config.jackal_config.chain_id,
        "Starting mulberry"
    );

    let Wallet { jackal, evm } = wallet;

    let client = JackalClient::new(&config.jackal_config, jackal)?;
    let queue = TxQueue::new(client);
    let worker = queue.start().await?;

    let broadcaster: Arc<dyn CompletionBroadcaster> = match config.relay_config.callback_broadcaster {
        BroadcasterKind::Native => Arc::new(NativeBroadcaster),
        BroadcasterKind::Cast => Arc::new(CastBroadcaster::default()),
    };

    let relay = Arc::new(Relay::new(
        &config.jackal_config,
        Arc::new(queue),
        broadcaster,
        config.relay_config.callback_policy(),
        evm,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel();

    let manager = WatcherManager::new(&config, Arc::new(AlloyConnector), relay, fatal_tx)?;

    if config.relay_config.api_port != 0 {
        let api_addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.relay_config.api_port));
        let networks = config.networks_config.iter().map(|n| n.label()).collect();
        let api_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = api::start_api_server(api_addr, networks, api_shutdown).await {
                tracing::error!(error = %e, "API server error");
            }
        });
    }

    let mut watchers = tokio::spawn(manager.run(shutdown_rx));

    let outcome = tokio::select! {
        _ = wait_for_shutdown_signal() => Ok(()),
        Some(e) = fatal_rx.recv() => {
            tracing::error!(error = %e, "Fatal relay error, shutting down");
            Err(eyre::Report::new(e))
        }
        joined = &mut watchers => match joined {
            Ok(result) => result,
            Err(e) => Err(eyre::eyre!("watcher manager panicked: {}", e)),
        },
    };

    let _ = shutdown_tx.send(true);
    if !watchers.is_finished() {
        if let Err(e) = watchers.await {
            tracing::error!(error = %e, "Watcher manager panicked during shutdown");
        }
    }
    worker.abort();

    tracing::info!("Mulberry stopped");
    outcome
}

/// Initialize tracing/logging with structured output. `LOG_FORMAT=json`
/// switches to one JSON object per line.
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mulberry=debug"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
