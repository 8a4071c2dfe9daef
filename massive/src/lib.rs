//! Massive Order Runner
//!
//! Streaming tools for newline-delimited signed 0x orders.
//!
//! # Architecture
//!
//! ```text
//! input → RecordSource → AllowancePipeline → RecordSink → output
//!                              ↓ per (owner, token) key, once
//!                        AllowanceResolver → LedgerPort (query → approve → mined)
//!
//! input → RecordSource → RecordRewrite (salt, expiration, exchange, sign) → output
//! ```
//!
//! # Components
//!
//! - **App**: Opens streams, builds collaborators, runs the selected command
//! - **Pipeline**: Concurrent allowance orchestrator (completion order)
//! - **Transform**: Ordered per-record rewrites (input order)
//! - **Config**: Environment-based configuration
//! - **Exit**: Process exit status
//!
//! # Example
//!
//! ```rust,ignore
//! use massive::AllowancePipeline;
//! use massive_exec::{ResolverPolicy, StaticExchangeConfig, StubLedger};
//! use std::sync::Arc;
//!
//! let pipeline = AllowancePipeline::new(
//!     Arc::new(StubLedger::new()),
//!     Arc::new(StaticExchangeConfig::new(fee_token, token_proxy)),
//!     ResolverPolicy::default(),
//! );
//! let report = pipeline.run(tokio::io::stdin(), tokio::io::stdout(), 1).await?;
//! ```

#![warn(clippy::all)]

pub mod app;
pub mod config;
pub mod error;
pub mod exit;
pub mod pipeline;
pub mod transform;

// Re-exports for convenience
pub use app::run;
pub use config::{Command, Config, IoConfig, LedgerConfig, ResolverConfig};
pub use error::{AppError, AppResult};
pub use exit::ExitStatus;
pub use pipeline::{AllowancePipeline, PipelineReport};
pub use transform::{run_ordered, RecordRewrite};
