//! Entry point binary: resolve configuration, start the daemon, and run it
//! to completion, plus a `smoke` subcommand for operational smoke-testing.

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::float_arithmetic,
    clippy::arithmetic_side_effects,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

use clap::{Parser, Subcommand};
use daemon::Config;
use protocol::{decode, encode, read_framed, write_framed, Request, Response};
use serde_json::Map;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::net::UnixStream;

/// brokerd: a local trading daemon speaking MessagePack over a Unix socket.
#[derive(Debug, Parser)]
#[command(name = "brokerd", about = "Run the brokerd trading daemon")]
struct Cli {
    /// Path to a TOML config file. Defaults to `~/.broker/config.toml`, and
    /// a missing file is not an error (built-in defaults apply).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Dial the running daemon's socket and issue `daemon.status`.
    Smoke {
        /// Override the socket path from the resolved config.
        #[arg(long)]
        socket: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Smoke { socket }) => {
            let socket_path = socket.unwrap_or(config.runtime.socket_path);
            runtime.block_on(smoke(&socket_path))
        }
        None => runtime.block_on(run_daemon(config)),
    }
}

async fn run_daemon(config: Config) -> ExitCode {
    init_tracing(&config.logging.level);

    let daemon = match daemon::Daemon::start(config).await {
        Ok(daemon) => daemon,
        Err(err) => {
            eprintln!("daemon failed to start: {err}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("brokerd started");

    tokio::select! {
        () = daemon.run() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                tracing::warn!(%err, "failed to install ctrl-c handler");
            }
            tracing::info!("shutdown requested");
        }
    }

    daemon.stop().await;
    ExitCode::SUCCESS
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Dial `socket_path`, issue `daemon.status`, and print the response.
/// Exits non-zero if the socket is unreachable or the daemon reports an error.
async fn smoke(socket_path: &PathBuf) -> ExitCode {
    let mut stream = match UnixStream::connect(socket_path).await {
        Ok(stream) => stream,
        Err(err) => {
            eprintln!("could not connect to {}: {err}", socket_path.display());
            return ExitCode::FAILURE;
        }
    };

    let request = Request::new("daemon.status", Map::new());
    let payload = match encode(&request) {
        Ok(payload) => payload,
        Err(err) => {
            eprintln!("failed to encode request: {err}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = write_framed(&mut stream, &payload).await {
        eprintln!("failed to send request: {err}");
        return ExitCode::FAILURE;
    }

    let response_bytes = match read_framed(&mut stream).await {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("failed to read response: {err}");
            return ExitCode::FAILURE;
        }
    };
    let response: Response = match decode(&response_bytes) {
        Ok(response) => response,
        Err(err) => {
            eprintln!("malformed response: {err}");
            return ExitCode::FAILURE;
        }
    };

    if response.ok {
        let data = response.data.unwrap_or(serde_json::Value::Null);
        println!("{data}");
        ExitCode::SUCCESS
    } else {
        let error = response.error;
        eprintln!("daemon reported an error: {error:?}");
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_accepts_the_smoke_subcommand_with_a_socket_override() {
        let cli = Cli::parse_from(["brokerd", "smoke", "--socket", "/tmp/custom.sock"]);
        match cli.command {
            Some(Command::Smoke { socket }) => {
                assert_eq!(socket, Some(PathBuf::from("/tmp/custom.sock")));
            }
            _ => panic!("expected the smoke subcommand"),
        }
    }

    #[test]
    fn cli_defaults_to_running_the_daemon() {
        let cli = Cli::parse_from(["brokerd"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn cli_accepts_a_config_override() {
        let cli = Cli::parse_from(["brokerd", "--config", "/etc/brokerd.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/brokerd.toml")));
    }
}
