use itertools::Itertools;

use crate::models::TransactionRecord;

pub const MEV_ALERT_HEADER: &str = "🚨 MEV Activity Detected 🚨\n\n";

pub fn format_mev_message(transactions: &[TransactionRecord]) -> String {
    let blocks = transactions
        .iter()
        .map(|tx| {
            let parsed = tx.parse();
            format!(
                "Transaction ID: {}\nWallet: {}\nAmount: {} SOL\nTimestamp: {}\n\n",
                parsed.signature, parsed.owner, parsed.amount, parsed.block_time
            )
        })
        .join("");

    format!("{MEV_ALERT_HEADER}{blocks}")
}
