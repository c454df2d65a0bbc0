//! skkserv launcher: flag parsing, logging, dictionary loading, and
//! signal wiring around the protocol server.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::fmt::writer::MakeWriterExt;

use skkserv::dict::Dictionary;
use skkserv::encoding::WireEncoding;
use skkserv::server::Server;

#[derive(Parser)]
#[command(name = "skkserv")]
#[command(about = "SKK dictionary protocol server")]
#[command(version)]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:1178")]
    addr: String,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Wire encoding for client connections: utf-8, euc-jp, sjis
    #[arg(long, default_value = "utf-8")]
    enc: WireEncoding,

    /// Dictionary files, loaded in order
    dicts: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Timestamped, level-prefixed lines; warnings and errors go to stderr,
/// everything else to stdout.
fn init_logging(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let writer = std::io::stderr
        .with_max_level(Level::WARN)
        .or_else(std::io::stdout);

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(writer)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let dict = Arc::new(Dictionary::new());
    for path in &cli.dicts {
        // A bad file is logged and skipped; the server starts with
        // whatever loaded.
        match dict.add(path) {
            Ok(()) => info!("loaded dictionary {}", path.display()),
            Err(e) => error!("{e}"),
        }
    }
    info!("{} keys indexed", dict.len());

    let server = Arc::new(Server::new(dict, cli.enc));

    let sig_server = server.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("interrupt received, shutting down");
        sig_server.shutdown();
    });

    server.listen(&cli.addr).await
}

/// Resolves on SIGINT, and on SIGTERM where that exists.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("failed to register SIGTERM handler: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
