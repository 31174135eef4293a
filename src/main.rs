mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use cli::Command;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    let cli = cli::Cli::parse();

    // Initialize tracing
    let filter = cli
        .log_level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO);

    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let _ = dotenvy::dotenv(); // load .env if present

    let result = match &cli.command {
        Command::Decode(args) => commands::run_decode(args, cli.json),
        Command::Diff(args) => commands::run_diff(args, cli.json),
        Command::Previous(args) => commands::run_previous(args, cli.json).await,
        Command::Prefetch(args) => {
            let cancel = setup_signal_handlers();
            info!(page = %args.page.display(), "prefetch starting");
            commands::run_prefetch(args, cli.json, cancel).await
        }
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "holdbook failed");
        std::process::exit(1);
    }
}

/// Cancel the returned token on SIGINT, and on SIGTERM under unix.
fn setup_signal_handlers() -> CancellationToken {
    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received SIGINT, shutting down");
        cancel_clone.cancel();
    });

    #[cfg(unix)]
    {
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            let mut sig =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            sig.recv().await;
            info!("received SIGTERM, shutting down");
            cancel_clone.cancel();
        });
    }

    cancel
}
