use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::RpcRequest;
use solana_program::pubkey::Pubkey;

use crate::models::TransactionRecord;
use crate::settings;

#[async_trait]
pub trait SignatureSource: Send + Sync {
    async fn get_signatures_for_address(&self, address: &Pubkey)
        -> Result<Vec<TransactionRecord>>;
}

pub struct RpcSignatureSource {
    rpc_client: RpcClient,
}

impl RpcSignatureSource {
    pub fn new(config: &settings::Config) -> Self {
        let rpc_client = RpcClient::new_with_timeout(
            config.rpc_endpoint.clone(),
            Duration::from_secs(config.rpc_timeout_sec),
        );

        Self::with_client(rpc_client)
    }

    pub fn with_client(rpc_client: RpcClient) -> Self {
        Self { rpc_client }
    }
}

#[async_trait]
impl SignatureSource for RpcSignatureSource {
    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
    ) -> Result<Vec<TransactionRecord>> {
        // Entries are decoded one by one so a malformed entry cannot drop the others.
        let result: Option<Vec<Value>> = self
            .rpc_client
            .send(
                RpcRequest::GetSignaturesForAddress,
                json!([address.to_string()]),
            )
            .await
            .with_context(|| format!("Failed to get signatures for `{address}`"))?;

        Ok(result
            .unwrap_or_default()
            .into_iter()
            .map(TransactionRecord::from_value)
            .collect())
    }
}

pub struct TransactionFetcher {
    source: Arc<dyn SignatureSource>,
    token_address: Pubkey,
}

impl TransactionFetcher {
    pub fn new(source: Arc<dyn SignatureSource>, token_address: Pubkey) -> Self {
        Self {
            source,
            token_address,
        }
    }

    pub fn token_address(&self) -> &Pubkey {
        &self.token_address
    }

    pub async fn fetch(&self) -> Result<Vec<TransactionRecord>> {
        let transactions = self
            .source
            .get_signatures_for_address(&self.token_address)
            .await?;

        tracing::debug!(
            "fetched {} transactions for {}",
            transactions.len(),
            self.token_address
        );

        Ok(transactions)
    }

    /// Same as [`fetch`](Self::fetch), but a failure is logged and reported as no transactions.
    pub async fn fetch_or_empty(&self) -> Vec<TransactionRecord> {
        match self.fetch().await {
            Ok(transactions) => transactions,
            Err(e) => {
                tracing::error!("error fetching transactions: {e:?}");
                Vec::new()
            }
        }
    }
}
