//! Runner configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use massive_domain::{
    parse_address, Address, ExchangeNetwork, ExpirationMode, MakerMismatch, SaltMode, U256,
};
use massive_exec::{ResolverPolicy, RetryPolicy};

use crate::error::{AppError, AppResult};

// =============================================================================
// Configuration
// =============================================================================

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Command to run
    pub command: Command,

    /// Input and output streams
    pub io: IoConfig,

    /// Ledger connection and exchange lookups
    pub ledger: LedgerConfig,

    /// Retry and timeouts for ledger calls
    pub resolver: ResolverConfig,
}

/// Command selected with `MASSIVE_COMMAND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Ensure maker allowances, forwarding orders whose allowances are set
    SetAllowance,
    /// Rewrite the salt of every order
    SetSalt(SaltMode),
    /// Rewrite the expiration of every order
    SetExpiration(ExpirationMode),
    /// Rewrite the exchange contract address of every order
    SetExchange(Address),
    /// Sign every order with the key in `MASSIVE_KEY_FILE`
    Sign(MakerMismatch),
}

/// Input and output configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoConfig {
    /// Input file (stdin when unset)
    pub input: Option<PathBuf>,
    /// Output file (stdout when unset)
    pub output: Option<PathBuf>,
    /// Records buffered between stages
    pub channel_capacity: usize,
}

/// Ledger configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint
    pub rpc_url: Option<String>,
    /// File holding the hex private key (approvals and signing)
    pub key_file: Option<PathBuf>,
    /// Unlimited approvals enabled
    pub unlimited: bool,
    /// Fee token for every exchange (skips the exchange lookup)
    pub fee_token: Option<Address>,
    /// Token proxy for every exchange (skips the exchange lookup)
    pub token_proxy: Option<Address>,
}

/// Retry and timeout configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Attempts per remote call, including the first
    pub retry_attempts: u32,
    /// Delay before the first retry
    pub retry_backoff: Duration,
    /// Bound on each allowance query and approval submission
    pub query_timeout: Duration,
    /// Bound on waiting for an approval to be mined
    pub mined_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> AppResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let command = Self::load_command(&lookup)?;
        let io = Self::load_io_config(&lookup)?;
        let ledger = Self::load_ledger_config(&lookup)?;
        let resolver = Self::load_resolver_config(&lookup)?;

        Ok(Self {
            command,
            io,
            ledger,
            resolver,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            command: Command::SetAllowance,
            io: IoConfig::default(),
            ledger: LedgerConfig {
                rpc_url: None,
                key_file: None,
                unlimited: true,
                fee_token: Some(Address::from_low_u64_be(0xfee)),
                token_proxy: Some(Address::from_low_u64_be(0x9)),
            },
            resolver: ResolverConfig {
                retry_attempts: 1,
                retry_backoff: Duration::ZERO,
                query_timeout: Duration::from_secs(5),
                mined_timeout: Duration::from_secs(5),
            },
        }
    }

    fn load_command<F>(lookup: &F) -> AppResult<Command>
    where
        F: Fn(&str) -> Option<String>,
    {
        let name = lookup("MASSIVE_COMMAND").ok_or_else(|| {
            AppError::Config(
                "MASSIVE_COMMAND is required. Expected: set-allowance, set-salt, set-expiration, set-exchange, sign"
                    .to_string(),
            )
        })?;

        match name.to_lowercase().as_str() {
            "set-allowance" | "allowance" => Ok(Command::SetAllowance),
            "set-salt" | "salt" => {
                let salt = lookup("MASSIVE_SALT").unwrap_or_else(|| "timestamp".to_string());
                let mode = SaltMode::from_str(&salt)
                    .map_err(|e| AppError::Config(format!("Invalid MASSIVE_SALT: {}", e)))?;
                Ok(Command::SetSalt(mode))
            }
            "set-expiration" | "expiration" => {
                let raw = lookup("MASSIVE_EXPIRATION").ok_or_else(|| {
                    AppError::Config("MASSIVE_EXPIRATION is required for set-expiration".to_string())
                })?;
                let value = U256::from_dec_str(raw.trim()).map_err(|_| {
                    AppError::Config(format!("Invalid MASSIVE_EXPIRATION: {}", raw))
                })?;
                let mode = if load_bool(lookup, "MASSIVE_EXPIRATION_DURATION", false)? {
                    ExpirationMode::AfterSeconds(value)
                } else {
                    ExpirationMode::At(value)
                };
                Ok(Command::SetExpiration(mode))
            }
            "set-exchange" | "exchange" => {
                let raw = lookup("MASSIVE_EXCHANGE").ok_or_else(|| {
                    AppError::Config("MASSIVE_EXCHANGE is required for set-exchange".to_string())
                })?;
                Ok(Command::SetExchange(parse_exchange(&raw)?))
            }
            "sign" | "set-sign" => {
                let mismatch = match lookup("MASSIVE_SIGN_MISMATCH").filter(|s| !s.is_empty()) {
                    Some(raw) => MakerMismatch::from_str(&raw).map_err(|e| {
                        AppError::Config(format!("Invalid MASSIVE_SIGN_MISMATCH: {}", e))
                    })?,
                    None => MakerMismatch::default(),
                };
                Ok(Command::Sign(mismatch))
            }
            other => Err(AppError::Config(format!(
                "Invalid MASSIVE_COMMAND: {}. Expected: set-allowance, set-salt, set-expiration, set-exchange, sign",
                other
            ))),
        }
    }

    fn load_io_config<F>(lookup: &F) -> AppResult<IoConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let channel_capacity = load_number(lookup, "MASSIVE_CHANNEL_CAPACITY", 1usize)?;
        if channel_capacity == 0 {
            return Err(AppError::Config(
                "Invalid MASSIVE_CHANNEL_CAPACITY: must be at least 1".to_string(),
            ));
        }

        Ok(IoConfig {
            input: lookup("MASSIVE_INPUT").filter(|s| !s.is_empty()).map(PathBuf::from),
            output: lookup("MASSIVE_OUTPUT").filter(|s| !s.is_empty()).map(PathBuf::from),
            channel_capacity,
        })
    }

    fn load_ledger_config<F>(lookup: &F) -> AppResult<LedgerConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(LedgerConfig {
            rpc_url: lookup("MASSIVE_RPC_URL").filter(|s| !s.is_empty()),
            key_file: lookup("MASSIVE_KEY_FILE").filter(|s| !s.is_empty()).map(PathBuf::from),
            unlimited: load_bool(lookup, "MASSIVE_UNLIMITED", false)?,
            fee_token: load_address(lookup, "MASSIVE_FEE_TOKEN")?,
            token_proxy: load_address(lookup, "MASSIVE_TOKEN_PROXY")?,
        })
    }

    fn load_resolver_config<F>(lookup: &F) -> AppResult<ResolverConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ResolverConfig::default();

        Ok(ResolverConfig {
            retry_attempts: load_number(lookup, "MASSIVE_RETRY_ATTEMPTS", defaults.retry_attempts)?,
            retry_backoff: Duration::from_millis(load_number(
                lookup,
                "MASSIVE_RETRY_BACKOFF_MS",
                defaults.retry_backoff.as_millis() as u64,
            )?),
            query_timeout: Duration::from_secs(load_number(
                lookup,
                "MASSIVE_QUERY_TIMEOUT_SECS",
                defaults.query_timeout.as_secs(),
            )?),
            mined_timeout: Duration::from_secs(load_number(
                lookup,
                "MASSIVE_MINED_TIMEOUT_SECS",
                defaults.mined_timeout.as_secs(),
            )?),
        })
    }
}

impl ResolverConfig {
    /// Resolver policy with unlimited approvals.
    pub fn policy(&self) -> ResolverPolicy {
        ResolverPolicy::unlimited(
            RetryPolicy::new(self.retry_attempts, self.retry_backoff),
            self.query_timeout,
            self.mined_timeout,
        )
    }
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            channel_capacity: 1,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(500),
            query_timeout: Duration::from_secs(30),
            mined_timeout: Duration::from_secs(600),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetAllowance => write!(f, "set-allowance"),
            Command::SetSalt(_) => write!(f, "set-salt"),
            Command::SetExpiration(_) => write!(f, "set-expiration"),
            Command::SetExchange(_) => write!(f, "set-exchange"),
            Command::Sign(_) => write!(f, "sign"),
        }
    }
}

/// Parse a network name or an exchange contract address.
fn parse_exchange(raw: &str) -> AppResult<Address> {
    if let Ok(network) = ExchangeNetwork::from_str(raw.trim()) {
        return Ok(network.exchange_address());
    }
    parse_address(raw.trim()).map_err(|e| {
        AppError::Config(format!(
            "Invalid MASSIVE_EXCHANGE: {}. Expected a network (mainnet, ropsten, kovan, rinkeby, testrpc) or an address",
            e
        ))
    })
}

fn load_address<F>(lookup: &F, key: &str) -> AppResult<Option<Address>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).filter(|s| !s.is_empty()) {
        Some(val) => parse_address(&val)
            .map(Some)
            .map_err(|e| AppError::Config(format!("Invalid {}: {}", key, e))),
        None => Ok(None),
    }
}

fn load_bool<F>(lookup: &F, key: &str, default: bool) -> AppResult<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(val) => match val.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(AppError::Config(format!("Invalid {} value: {}", key, val))),
        },
        None => Ok(default),
    }
}

fn load_number<F, T>(lookup: &F, key: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(val) => val
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("Invalid {} value: {}", key, val))),
        None => Ok(default),
    }
}

// =============================================================================
// Tests
// =============================================================================
