use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::Bot;

use crate::bot::MevBot;
use crate::detector::MevScanner;
use crate::fetcher::{RpcSignatureSource, TransactionFetcher};
use crate::monitor::{Monitor, PubsubLogSubscriber};
use crate::settings::Config;

mod alert;
mod bot;
mod detector;
mod fetcher;
mod models;
mod monitor;
mod settings;

pub async fn start_service() -> Result<()> {
    let config = Config::from_env().context("Failed to load config")?;

    let source = Arc::new(RpcSignatureSource::new(&config));
    let fetcher = TransactionFetcher::new(source, config.token_address);
    let scanner = Arc::new(MevScanner::new(fetcher, config.fee_threshold));

    let subscriber = Arc::new(PubsubLogSubscriber::new(config.ws_endpoint.clone()));
    let monitor = Arc::new(Monitor::new(Arc::clone(&scanner), subscriber, &config));

    tracing::info!(
        "watching token {} via {} (fee threshold {} lamports)",
        config.token_address,
        config.rpc_endpoint,
        config.fee_threshold
    );

    let bot = Bot::new(&config.telegram_bot_token);
    Arc::new(MevBot::new(scanner, monitor)).run(bot).await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingsError;

    #[test]
    fn test_missing_token_prevents_startup() {
        temp_env::with_var_unset("TELEGRAM_BOT_TOKEN", || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            let err = runtime.block_on(start_service()).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<SettingsError>(),
                Some(SettingsError::MissingToken)
            ));
        });
    }
}
