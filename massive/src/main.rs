//! Massive order runner.
//!
//! Reads newline-delimited JSON orders, processes them with the selected
//! command and writes the results as newline-delimited JSON. Logs go to
//! stderr.
//!
//! # Usage
//!
//! ```bash
//! # Ensure unlimited maker allowances through a local node
//! MASSIVE_COMMAND=set-allowance MASSIVE_UNLIMITED=true \
//!   MASSIVE_RPC_URL=http://localhost:8545 MASSIVE_KEY_FILE=key.hex \
//!   massive < orders.jsonl > ready.jsonl
//!
//! # Point every order at the kovan exchange
//! MASSIVE_COMMAND=set-exchange MASSIVE_EXCHANGE=kovan massive < orders.jsonl
//! ```
//!
//! # Environment Variables
//!
//! - `MASSIVE_COMMAND`: set-allowance, set-salt, set-expiration, set-exchange, sign
//! - `MASSIVE_INPUT` / `MASSIVE_OUTPUT`: file paths (default: stdin / stdout)
//! - `MASSIVE_CHANNEL_CAPACITY`: records buffered between stages (default: 1)
//! - `MASSIVE_RPC_URL`, `MASSIVE_KEY_FILE`: ledger access for set-allowance (key also for sign)
//! - `MASSIVE_UNLIMITED`: enable unlimited approvals (default: false)
//! - `MASSIVE_FEE_TOKEN` / `MASSIVE_TOKEN_PROXY`: fixed exchange contracts
//! - `MASSIVE_RETRY_ATTEMPTS` / `MASSIVE_RETRY_BACKOFF_MS`: (default: 3 / 500)
//! - `MASSIVE_QUERY_TIMEOUT_SECS` / `MASSIVE_MINED_TIMEOUT_SECS`: (default: 30 / 600)
//! - `MASSIVE_SALT`: timestamp, random or an integer (default: timestamp)
//! - `MASSIVE_EXPIRATION`, `MASSIVE_EXPIRATION_DURATION`: new expiration
//! - `MASSIVE_EXCHANGE`: network name or exchange address
//! - `MASSIVE_SIGN_MISMATCH`: pass, fail or replace orders made by another account (default: pass)

use std::process::ExitCode;

use massive::Config;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing (stdout carries records)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("massive=info")))
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return e.exit_status().into();
        }
    };

    let status = match massive::run(&config).await {
        Ok(report) => {
            let status = report.status();
            info!(
                read = report.read,
                forwarded = report.forwarded,
                failed = report.failed,
                %status,
                "Run complete"
            );
            status
        }
        Err(e) => {
            error!(error = %e, command = %config.command, "Run failed");
            e.exit_status()
        }
    };

    ExitCode::from(status)
}
