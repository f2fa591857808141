//! aptwatch - tracks pending apt updates for a configured set of packages.

mod wiring;

use std::path::PathBuf;
use std::process::ExitCode;

use aptwatch_core::config::DaemonConfig;
use aptwatch_core::logging;
use aptwatch_core::models::CoreError;
use aptwatch_core::ApiError;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "aptwatch")]
#[command(about = "Track and install pending apt package updates", long_about = None)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, short, default_value = "/etc/aptwatch/config.json")]
    config: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = logging::DEFAULT_LOG_FILTER)]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the refresh loop and stream status events as JSON lines
    Run,
    /// Query every tracked package once and print the partitioned list
    List,
    /// Install the named packages, or every updateable one with --all
    Install {
        #[arg(required_unless_present = "all")]
        packages: Vec<String>,
        #[arg(long, conflicts_with = "packages")]
        all: bool,
    },
    /// Report whether a package manager process is running
    Busy,
}

#[derive(Debug)]
enum CliError {
    Core(CoreError),
    Api(ApiError),
    Output(serde_json::Error),
}

impl From<CoreError> for CliError {
    fn from(error: CoreError) -> Self {
        Self::Core(error)
    }
}

impl From<ApiError> for CliError {
    fn from(error: ApiError) -> Self {
        Self::Api(error)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(error: serde_json::Error) -> Self {
        Self::Output(error)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&cli.log);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Core(error)) => {
            tracing::error!(kind = ?error.kind, message = %error.message, "aptwatch failed");
            ExitCode::FAILURE
        }
        Err(CliError::Api(error)) => {
            tracing::error!(
                status = error.class.status_code(),
                message = %error.message,
                "request refused"
            );
            if error.class.status_code() < 500 {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
        Err(CliError::Output(error)) => {
            tracing::error!(%error, "failed to encode output");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = DaemonConfig::load(&cli.config)?;
    let services = wiring::build(&config)?;

    match cli.command {
        Command::Run => serve(services).await,
        Command::List => {
            services
                .tracker
                .refresh(&services.tracker.tracked_names())
                .await;
            println!("{}", serde_json::to_string_pretty(&services.api.list()?)?);
            Ok(())
        }
        Command::Install { packages, all } => {
            services
                .tracker
                .refresh(&services.tracker.tracked_names())
                .await;
            if all {
                services.api.install_all().await?;
            } else {
                services.api.install(&packages).await?;
            }
            println!("{}", serde_json::to_string_pretty(&services.api.list()?)?);
            Ok(())
        }
        Command::Busy => {
            println!("{}", services.monitor.is_package_manager_busy()?);
            Ok(())
        }
    }
}

async fn serve(services: wiring::Services) -> Result<(), CliError> {
    tracing::info!(
        packages = services.tracker.tracked_names().len(),
        "starting aptwatch"
    );

    // first status before the initial idle delay
    services
        .tracker
        .refresh(&services.tracker.tracked_names())
        .await;

    let mut subscriber = services.api.subscribe();
    let mut handle = services.refresh_loop.clone().start();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            result = handle.finished() => break Some(result),
            _ = &mut shutdown => break None,
            event = subscriber.recv() => match event {
                Some(event) => println!("{}", serde_json::to_string(&event)?),
                None => {
                    tracing::warn!("event stream closed, resubscribing");
                    subscriber = services.api.subscribe();
                }
            },
        }
    };

    services.api.unsubscribe(subscriber.id());

    match outcome {
        Some(result) => result?,
        None => {
            tracing::info!("shutting down");
            handle.stop().await?;
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(error) => {
                tracing::warn!(%error, "cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
