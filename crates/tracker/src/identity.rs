//! Deduplication keys for raw explorer items.
//!
//! Transfers carry `tx_hash` + `log_index`; logs carry `transaction_hash` +
//! `index`. The key is the only dedup mechanism: items with equal keys are the
//! same event, and content is never compared.

use common::types::{RawItem, RecordKey};
use serde_json::Value;

const TRANSACTION_FIELDS: [&str; 3] = ["tx_hash", "transaction_hash", "hash"];
const INDEX_FIELDS: [&str; 2] = ["index", "log_index"];

/// `{transaction}_{index}`. Total over any item: a missing transaction renders
/// as `None` and a missing index as `0`.
pub fn identify(item: &RawItem) -> RecordKey {
    let transaction = first_present(item, &TRANSACTION_FIELDS).unwrap_or_else(|| "None".into());
    let index = first_present(item, &INDEX_FIELDS).unwrap_or_else(|| "0".into());
    RecordKey::new(&transaction, &index)
}

fn first_present(item: &RawItem, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|f| item.get(f).and_then(as_key_part))
}

fn as_key_part(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
