//! bank-client: batched load-testing client for bank-server
//!
//! Usage: `bank-client <INPUT> <PORT>`
//!
//! Reads request/expected-response pairs from INPUT and replays them against
//! the server in concurrent batches, reporting every mismatch.

use bank_server::config::{self, ClientArgs, DriverConfig, EXIT_INPUT};
use bank_server::driver::{script, Driver};
use bank_server::logging;
use std::process::ExitCode;
use tracing::error;

fn main() -> ExitCode {
    let args: ClientArgs = config::parse_args();
    logging::init(&args.log_level);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async {
        let script = match script::load(&args.input).await {
            Ok(script) => script,
            Err(e) => {
                error!("{e}");
                return ExitCode::from(EXIT_INPUT);
            }
        };

        let driver = Driver::new(DriverConfig::from(&args));
        driver.run_script(&script).await;
        ExitCode::SUCCESS
    })
}
