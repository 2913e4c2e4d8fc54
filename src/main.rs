use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use galera_qa::file_io::open_file_for_append;
use galera_qa::run_scenario;
use galera_qa::Result;
use galera_qa::Scenario;
use galera_qa::ScenarioContext;
use galera_qa::Settings;
use galera_qa::SystemRunner;
use galera_qa::Tally;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

const HARNESS_LOG_FILE: &str = "galera-qa.log";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Include the encryption overlay and encrypt sysbench tables
    #[arg(long, default_value_t = false)]
    encryption_run: bool,

    /// Echo every external command line before running it
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// Settings file layered over config/qa.toml
    #[arg(long)]
    config: Option<String>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Commands {
    /// Flow control, IST and node join under sysbench load
    ClusterInteraction,
    /// Sysbench against every thread pool configuration
    ThreadPool,
    /// RQG data load and per-database consistency check
    RqgDataload,
}

impl From<Commands> for Scenario {
    fn from(c: Commands) -> Self {
        match c {
            Commands::ClusterInteraction => Scenario::ClusterInteraction,
            Commands::ThreadPool => Scenario::ThreadPool,
            Commands::RqgDataload => Scenario::RqgDataload,
        }
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(s) => s.with_flags(cli.encryption_run, cli.debug),
        Err(e) => {
            eprintln!("failed to load settings: {}", e);
            return ExitCode::from(2);
        }
    };

    // Initializing Logs
    let _guard = match init_observability(&settings.cluster.log_dir()) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("failed to initialize logging: {}", e);
            return ExitCode::from(2);
        }
    };

    // Initializing Shutdown Signal
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = graceful_shutdown(signal_token).await {
            error!("Failed to listen for shutdown signals: {:?}", e);
        }
    });

    let scenario = Scenario::from(cli.command);
    let runner = Arc::new(SystemRunner::new(settings.cluster.debug));
    let ctx = ScenarioContext::new(settings, runner, cancel);

    let mut tally = Tally::new();
    if let Err(e) = run_scenario(scenario, &ctx, &mut tally).await {
        error!("{} stopped early: {}", scenario, e);
    }

    println!("{}", tally.summary());
    info!("exiting with {}", tally.exit_code());
    ExitCode::from(tally.exit_code() as u8)
}

async fn graceful_shutdown(cancel: CancellationToken) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    cancel.cancel();
    info!("Cancellation requested, waiting for the current step to unwind");
    Ok(())
}

/// Console output plus a non-blocking file layer under the work log dir
pub fn init_observability(log_dir: &Path) -> Result<WorkerGuard> {
    let log_file = open_file_for_append(log_dir.join(HARNESS_LOG_FILE))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_filter(env_filter());
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_filter(env_filter());
    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .init();

    Ok(guard)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
