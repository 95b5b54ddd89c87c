use anyhow::Result;
use clap::{Parser, ValueEnum};
use samlog::{CoordinatorConfig, LogCoordinator, Role, Severity};
use std::time::Duration;
use tokio::signal;
use tracing::info;

/// Shared single-file logging demo: the first instance with a given name
/// aggregates, later instances relay to it.
#[derive(Parser, Debug)]
#[command(name = "samlog", version)]
struct Args {
    /// Application family name; processes sharing it share one log file.
    instance: String,

    /// Lines to emit after startup (repeatable).
    #[arg(long = "text")]
    texts: Vec<String>,

    /// Severity for the emitted lines.
    #[arg(long, value_enum, default_value_t = SeverityArg::Debug)]
    severity: SeverityArg,

    /// Keep running until Ctrl+C so other invocations can relay here.
    #[arg(long)]
    hold: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SeverityArg {
    Debug,
    Warning,
    Critical,
    Fatal,
}

impl From<SeverityArg> for Severity {
    fn from(severity: SeverityArg) -> Self {
        match severity {
            SeverityArg::Debug => Severity::Debug,
            SeverityArg::Warning => Severity::Warning,
            SeverityArg::Critical => Severity::Critical,
            SeverityArg::Fatal => Severity::Fatal,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let coordinator = LogCoordinator::start(CoordinatorConfig::new(&args.instance)).await?;
    // Route every tracing event in this process through the shared log.
    samlog::install_global(&coordinator)?;

    println!(
        "samlog {}: role {:?}, log file {}",
        samlog::VERSION,
        coordinator.role(),
        coordinator.log_file_path().display()
    );

    for text in &args.texts {
        coordinator.log(args.severity.into(), text);
    }

    if args.hold {
        info!("holding the aggregator open, press Ctrl+C to stop");
        shutdown_signal().await;
    } else if coordinator.role() == Role::Follower {
        // Give queued records a moment to reach the aggregator.
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    samlog::release(&coordinator).await;
    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C) for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, initiating graceful shutdown"),
        () = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
