use std::str::FromStr;
use std::time::Duration;

use solana_program::pubkey::Pubkey;

pub const TELEGRAM_BOT_TOKEN_KEY: &str = "telegram_bot_token";

const RPC_ENDPOINT: &str = "https://api.mainnet-beta.solana.com";
const WS_ENDPOINT: &str = "wss://api.mainnet-beta.solana.com";
const TOKEN_ADDRESS: &str = "7TTcLchHbXz5fQqbBcoWi1Zen87AiziaqFCrf9Enpump";

/// Fees above this many lamports are reported as MEV activity.
pub const DEFAULT_FEE_THRESHOLD: u64 = 1_000_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_bot_token: String,
    pub rpc_endpoint: String,
    pub ws_endpoint: String,
    pub token_address: Pubkey,
    pub fee_threshold: u64,
    pub rpc_timeout_sec: u64,
    pub poll_interval_sec: u64,
    pub monitor_max_retries: u32,
    pub monitor_backoff_ms: u64,
    pub monitor_max_backoff_sec: u64,
}

impl Config {
    /// Builds the config around `telegram_bot_token`; every other value is compiled in.
    pub fn new(telegram_bot_token: impl Into<String>) -> Result<Self, SettingsError> {
        let token_address = Pubkey::from_str(TOKEN_ADDRESS)
            .map_err(|_| SettingsError::InvalidAddress(TOKEN_ADDRESS.to_string()))?;

        Ok(Self {
            telegram_bot_token: telegram_bot_token.into(),
            rpc_endpoint: RPC_ENDPOINT.to_string(),
            ws_endpoint: WS_ENDPOINT.to_string(),
            token_address,
            fee_threshold: DEFAULT_FEE_THRESHOLD,
            rpc_timeout_sec: 60,
            poll_interval_sec: 1,
            monitor_max_retries: 5,
            monitor_backoff_ms: 500,
            monitor_max_backoff_sec: 30,
        })
    }

    /// Reads `TELEGRAM_BOT_TOKEN` from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        let env = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;

        let token = env
            .get_string(TELEGRAM_BOT_TOKEN_KEY)
            .ok()
            .filter(|token| !token.trim().is_empty())
            .ok_or(SettingsError::MissingToken)?;

        Self::new(token)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_sec)
    }

    pub fn monitor_backoff(&self) -> Duration {
        Duration::from_millis(self.monitor_backoff_ms)
    }

    pub fn monitor_max_backoff(&self) -> Duration {
        Duration::from_secs(self.monitor_max_backoff_sec)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("TELEGRAM_BOT_TOKEN environment variable is not set")]
    MissingToken,
    #[error("Invalid token address `{0}`")]
    InvalidAddress(String),
    #[error("Failed to read environment: {0}")]
    Config(#[from] config::ConfigError),
}
