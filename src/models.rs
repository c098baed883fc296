use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub const UNKNOWN: &str = "Unknown";

/// One entry of a `getSignaturesForAddress` result. Missing, null or mistyped fields
/// fall back to sentinels.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub signature: Option<String>,
    #[serde(default, deserialize_with = "lenient_integer")]
    pub block_time: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub owner: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub amount: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub fee: f64,
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn lenient_integer<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(Value::deserialize(deserializer)?.as_i64())
}

fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Value::deserialize(deserializer)?
        .as_f64()
        .unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTransaction {
    pub signature: String,
    pub block_time: String,
    pub owner: String,
    pub amount: f64,
}

impl TransactionRecord {
    /// Decodes one result entry on its own. An entry that is not an object becomes a
    /// record of sentinels.
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_else(|e| {
            tracing::warn!("malformed transaction entry: {e}");
            Self::default()
        })
    }

    pub fn parse(&self) -> ParsedTransaction {
        ParsedTransaction {
            signature: self
                .signature
                .clone()
                .unwrap_or_else(|| UNKNOWN.to_string()),
            block_time: self
                .block_time
                .map(|t| t.to_string())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            owner: self.owner.clone().unwrap_or_else(|| UNKNOWN.to_string()),
            amount: self.amount,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogNotification {
    pub signature: String,
}
