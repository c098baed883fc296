use crate::fetcher::TransactionFetcher;
use crate::models::TransactionRecord;

/// Keeps the transactions whose fee is strictly above `fee_threshold`, in input order.
pub fn detect_mev(
    transactions: Vec<TransactionRecord>,
    fee_threshold: u64,
) -> Vec<TransactionRecord> {
    let threshold = fee_threshold as f64;
    transactions
        .into_iter()
        .filter(|tx| tx.fee > threshold)
        .collect()
}

pub struct MevScanner {
    fetcher: TransactionFetcher,
    fee_threshold: u64,
}

impl MevScanner {
    pub fn new(fetcher: TransactionFetcher, fee_threshold: u64) -> Self {
        Self {
            fetcher,
            fee_threshold,
        }
    }

    pub fn fetcher(&self) -> &TransactionFetcher {
        &self.fetcher
    }

    /// Fetches the token's transactions and returns the flagged ones. Fetch failures yield none.
    pub async fn scan(&self) -> Vec<TransactionRecord> {
        let transactions = self.fetcher.fetch_or_empty().await;
        let total = transactions.len();
        let flagged = detect_mev(transactions, self.fee_threshold);

        tracing::debug!("{} of {total} transactions flagged", flagged.len());
        flagged
    }
}
