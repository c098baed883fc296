use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::rpc_config::{RpcTransactionLogsConfig, RpcTransactionLogsFilter};
use solana_program::pubkey::Pubkey;
use tokio::sync::{mpsc, oneshot};

use crate::alert::format_mev_message;
use crate::bot::Replier;
use crate::detector::MevScanner;
use crate::models::LogNotification;
use crate::settings;

pub const MONITOR_ERROR: &str = "An error occurred while monitoring transactions.";

const NOTIFICATION_BUFFER: usize = 64;

/// Source of log notifications for an address. The receiver closes when the upstream stream ends.
#[async_trait]
pub trait LogSubscriber: Send + Sync {
    async fn subscribe(&self, address: &Pubkey) -> Result<mpsc::Receiver<LogNotification>>;
}

pub struct PubsubLogSubscriber {
    ws_endpoint: String,
}

impl PubsubLogSubscriber {
    pub fn new(ws_endpoint: String) -> Self {
        Self { ws_endpoint }
    }
}

#[async_trait]
impl LogSubscriber for PubsubLogSubscriber {
    async fn subscribe(&self, address: &Pubkey) -> Result<mpsc::Receiver<LogNotification>> {
        let client = PubsubClient::new(&self.ws_endpoint)
            .await
            .with_context(|| format!("Failed to connect to `{}`", self.ws_endpoint))?;

        let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);
        let (ready_tx, ready_rx) = oneshot::channel();
        let filter = RpcTransactionLogsFilter::Mentions(vec![address.to_string()]);

        tokio::spawn(async move {
            let config = RpcTransactionLogsConfig { commitment: None };
            let (mut stream, unsubscribe) = match client.logs_subscribe(filter, config).await {
                Ok(subscription) => subscription,
                Err(e) => {
                    let _ = ready_tx.send(Err(anyhow::Error::new(e)));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));

            while let Some(notification) = stream.next().await {
                let notification = LogNotification {
                    signature: notification.value.signature,
                };
                if tx.send(notification).await.is_err() {
                    break;
                }
            }

            drop(stream);
            unsubscribe().await;
            if let Err(e) = client.shutdown().await {
                tracing::debug!("pubsub client shutdown failed: {e:?}");
            }
        });

        ready_rx
            .await
            .context("Log subscription task exited")?
            .context("Failed to subscribe to logs")?;

        Ok(rx)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum MonitorError {
    #[error("Log subscription closed")]
    SubscriptionClosed,
}

/// Alerts a chat whenever a log notification arrives and the rescan flags transactions.
pub struct Monitor {
    scanner: Arc<MevScanner>,
    subscriber: Arc<dyn LogSubscriber>,
    poll_interval: Duration,
    max_retries: u32,
    backoff: Duration,
    max_backoff: Duration,
}

impl Monitor {
    pub fn new(
        scanner: Arc<MevScanner>,
        subscriber: Arc<dyn LogSubscriber>,
        config: &settings::Config,
    ) -> Self {
        Self {
            scanner,
            subscriber,
            poll_interval: config.poll_interval(),
            max_retries: config.monitor_max_retries,
            backoff: config.monitor_backoff(),
            max_backoff: config.monitor_max_backoff(),
        }
    }

    /// Runs monitoring sessions until consecutive failures use up the retries, then tells
    /// the chat monitoring has stopped. A session that handled notifications before its
    /// subscription closed is resubscribed with a fresh retry budget.
    pub async fn run(&self, replier: &dyn Replier) {
        loop {
            let result = tryhard::retry_fn(|| self.run_session(replier))
                .retries(self.max_retries)
                .exponential_backoff(self.backoff)
                .max_delay(self.max_backoff)
                .on_retry(
                    |attempt: u32, next_delay: Option<Duration>, error: &anyhow::Error| {
                        let error = format!("{error:#}");
                        async move {
                            tracing::warn!(
                                "monitor session {attempt} failed: {error}, retrying in {next_delay:?}"
                            );
                        }
                    },
                )
                .await;

            match result {
                Ok(handled) => {
                    tracing::info!(
                        "log subscription for {} closed after {handled} notifications, resubscribing",
                        replier.context()
                    );
                }
                Err(e) => {
                    tracing::error!("monitor for {} stopped: {e:?}", replier.context());
                    if let Err(e) = replier.reply(MONITOR_ERROR).await {
                        tracing::error!("failed to report monitor failure: {e:?}");
                    }
                    return;
                }
            }
        }
    }

    /// Returns the number of notifications handled once the subscription closes.
    /// A subscription that closes before delivering anything counts as a failure.
    async fn run_session(&self, replier: &dyn Replier) -> Result<usize> {
        let address = self.scanner.fetcher().token_address();
        let mut notifications = self.subscriber.subscribe(address).await?;
        tracing::info!("log subscription for {address} opened ({})", replier.context());

        let mut handled = 0;
        while let Some(notification) = notifications.recv().await {
            tracing::debug!("log notification {}", notification.signature);

            let flagged = self.scanner.scan().await;
            if !flagged.is_empty() {
                replier.reply(&format_mev_message(&flagged)).await?;
            }
            handled += 1;

            tokio::time::sleep(self.poll_interval).await;
        }

        if handled == 0 {
            return Err(MonitorError::SubscriptionClosed.into());
        }
        Ok(handled)
    }
}
