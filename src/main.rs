//! bank-server: a multithreaded banking transaction server
//!
//! Accepts one HTTP GET request per connection and applies it to an
//! in-memory ledger:
//! - create, credit, debit, status and reset of accounts
//! - concurrent connections served by a Tokio worker pool
//! - configuration via CLI arguments or TOML file
//! - optional embedded test client driven by a script (`--test-file`)

use bank_server::config::{self, DriverConfig, ServerConfig, EXIT_INPUT, EXIT_USAGE};
use bank_server::driver::{script, Driver};
use bank_server::logging;
use bank_server::server::{bind_listener, Server};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{error, info};

/// Delay before the embedded client starts sending requests
const EMBEDDED_CLIENT_DELAY: Duration = Duration::from_millis(250);

fn main() -> ExitCode {
    let config = match ServerConfig::from_args(config::parse_args()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    logging::init(&config.log_level);

    info!(
        host = %config.host,
        port = config.port,
        workers = ?config.workers,
        max_connections = config.max_connections,
        read_timeout = ?config.read_timeout,
        "Starting bank-server"
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = match builder.enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(serve(config))
}

async fn serve(config: ServerConfig) -> ExitCode {
    let listener = match config.socket_addr().and_then(bind_listener) {
        Ok(listener) => listener,
        Err(e) => {
            error!(host = %config.host, port = config.port, error = %e, "Failed to bind listening port");
            return ExitCode::from(EXIT_USAGE);
        }
    };
    let port = match listener.local_addr() {
        Ok(addr) => addr.port(),
        Err(e) => {
            error!(error = %e, "Failed to read listening address");
            return ExitCode::FAILURE;
        }
    };

    println!("Listening for commands on port {port}");

    let (done_tx, done_rx) = oneshot::channel();
    if let Some(path) = config.test_file.clone() {
        tokio::spawn(async move {
            let code = run_embedded_client(path, port).await;
            let _ = done_tx.send(code);
        });
    }

    let server = Server::new(config);
    server.run_until(listener, shutdown_signal(done_rx)).await
}

/// Resolves on Ctrl-C, or when the embedded client finishes.
async fn shutdown_signal(embedded: oneshot::Receiver<ExitCode>) -> ExitCode {
    tokio::select! {
        _ = ctrl_c() => {
            info!("Received Ctrl-C");
            ExitCode::SUCCESS
        }
        Ok(code) = embedded => code,
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

async fn run_embedded_client(path: PathBuf, port: u16) -> ExitCode {
    let script = match script::load(&path).await {
        Ok(script) => script,
        Err(e) => {
            error!(error = %e, "Embedded client cannot run");
            return ExitCode::from(EXIT_INPUT);
        }
    };

    tokio::time::sleep(EMBEDDED_CLIENT_DELAY).await;
    let report = Driver::new(DriverConfig::new("localhost", port))
        .run_script(&script)
        .await;
    info!(
        passed = report.passed,
        failed = report.failed(),
        "Embedded client finished"
    );
    ExitCode::SUCCESS
}
