//! Command runner.
//!
//! Opens the configured streams, builds the collaborators a command needs and
//! runs it to completion.

use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

use massive_connectors::{OrderSigner, RpcLedger};
use massive_domain::{ExpirationMode, MakerMismatch, OrderTransform};
use massive_exec::StaticExchangeConfig;

use crate::config::{Command, Config};
use crate::error::{AppError, AppResult};
use crate::pipeline::{AllowancePipeline, PipelineReport};
use crate::transform::{run_ordered, RecordRewrite};

type Input = Box<dyn AsyncRead + Unpin + Send>;
type Output = Box<dyn AsyncWrite + Unpin + Send>;

/// Run the configured command.
pub async fn run(config: &Config) -> AppResult<PipelineReport> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        command = %config.command,
        "Massive order runner"
    );

    match config.command {
        Command::SetAllowance => run_allowance(config).await,
        Command::SetSalt(mode) => run_transform(config, OrderTransform::Salt(mode)).await,
        Command::SetExpiration(mode) => {
            if let ExpirationMode::AfterSeconds(seconds) = mode {
                info!(%seconds, "Expiration relative to processing time");
            }
            run_transform(config, OrderTransform::Expiration(mode)).await
        }
        Command::SetExchange(exchange) => {
            run_transform(config, OrderTransform::Exchange(exchange)).await
        }
        Command::Sign(on_mismatch) => run_sign(config, on_mismatch).await,
    }
}

async fn run_sign(config: &Config, on_mismatch: MakerMismatch) -> AppResult<PipelineReport> {
    let key = read_key(config, "sign").await?;
    let signer = OrderSigner::new(&key, on_mismatch)?;
    info!(signer = ?signer.address(), %on_mismatch, "Signing orders");

    run_transform(config, signer).await
}

async fn run_transform<T: RecordRewrite>(config: &Config, transform: T) -> AppResult<PipelineReport> {
    let input = open_input(config.io.input.as_deref()).await?;
    let output = open_output(config.io.output.as_deref()).await?;

    run_ordered(transform, input, output, config.io.channel_capacity).await
}

async fn run_allowance(config: &Config) -> AppResult<PipelineReport> {
    if !config.ledger.unlimited {
        return Err(AppError::UnlimitedRequired);
    }

    let ledger = Arc::new(connect_ledger(config).await?);
    let input = open_input(config.io.input.as_deref()).await?;
    let output = open_output(config.io.output.as_deref()).await?;
    let capacity = config.io.channel_capacity;
    let policy = config.resolver.policy();

    match (config.ledger.fee_token, config.ledger.token_proxy) {
        (Some(fee_token), Some(token_proxy)) => {
            info!(
                fee_token = ?fee_token,
                token_proxy = ?token_proxy,
                "Using fixed exchange contracts"
            );
            let exchanges = Arc::new(StaticExchangeConfig::new(fee_token, token_proxy));
            AllowancePipeline::new(ledger, exchanges, policy)
                .run(input, output, capacity)
                .await
        }
        (None, None) => {
            AllowancePipeline::new(ledger.clone(), ledger, policy)
                .run(input, output, capacity)
                .await
        }
        _ => Err(AppError::Config(
            "MASSIVE_FEE_TOKEN and MASSIVE_TOKEN_PROXY must be set together".to_string(),
        )),
    }
}

async fn connect_ledger(config: &Config) -> AppResult<RpcLedger> {
    let rpc_url = config.ledger.rpc_url.as_deref().ok_or_else(|| {
        AppError::Config("MASSIVE_RPC_URL is required for set-allowance".to_string())
    })?;
    let key = read_key(config, "set-allowance").await?;

    Ok(RpcLedger::connect(rpc_url, &key).await?)
}

async fn read_key(config: &Config, command: &str) -> AppResult<String> {
    let key_file = config.ledger.key_file.as_deref().ok_or_else(|| {
        AppError::Config(format!("MASSIVE_KEY_FILE is required for {}", command))
    })?;

    tokio::fs::read_to_string(key_file)
        .await
        .map_err(|source| AppError::Io {
            path: key_file.to_path_buf(),
            source,
        })
}

async fn open_input(path: Option<&Path>) -> AppResult<Input> {
    match path {
        Some(path) => {
            let file = File::open(path).await.map_err(|source| AppError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdin())),
    }
}

async fn open_output(path: Option<&Path>) -> AppResult<Output> {
    match path {
        Some(path) => {
            let file = File::create(path).await.map_err(|source| AppError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdout())),
    }
}
