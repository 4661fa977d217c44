//! Raw explorer items → typed lock and vote records.
//!
//! Every item yields either a record or a [`SkipReason`]; one bad item never
//! aborts a batch.

mod locks;
mod votes;

pub use locks::{LockNormalizer, LockRecord, SizeBucket};
pub use votes::{VoteNormalizer, VoteRecord};

use chrono::{DateTime, NaiveDateTime, Utc};
use common::types::RawItem;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Both the lock token and voting weights use 18 decimals.
pub const TOKEN_DECIMALS: u32 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, thiserror::Error)]
pub enum SkipReason {
    #[error("item does not have the expected shape")]
    Malformed,
    #[error("item is the other event shape")]
    WrongShape,
    #[error("no timestamp")]
    MissingTimestamp,
    #[error("unparseable timestamp")]
    BadTimestamp,
    #[error("no amount")]
    MissingAmount,
    #[error("unparseable amount")]
    BadAmount,
    #[error("transfer from the contract to itself")]
    SelfTransfer,
    #[error("first topic is not the Voted signature")]
    WrongTopic,
    #[error("no decoder found a weight")]
    NoWeight,
    #[error("weight is not positive")]
    NonPositiveWeight,
    #[error("log data is not valid hex words")]
    MalformedData,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::WrongShape => "wrong_shape",
            Self::MissingTimestamp => "missing_timestamp",
            Self::BadTimestamp => "bad_timestamp",
            Self::MissingAmount => "missing_amount",
            Self::BadAmount => "bad_amount",
            Self::SelfTransfer => "self_transfer",
            Self::WrongTopic => "wrong_topic",
            Self::NoWeight => "no_weight",
            Self::NonPositiveWeight => "non_positive_weight",
            Self::MalformedData => "malformed_data",
        }
    }
}

/// Records kept from a batch, in input order, plus how many were skipped and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized<T> {
    pub records: Vec<T>,
    pub skipped: BTreeMap<SkipReason, usize>,
}

impl<T> Normalized<T> {
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }

    pub fn skipped_for(&self, reason: SkipReason) -> usize {
        self.skipped.get(&reason).copied().unwrap_or(0)
    }
}

fn normalize_batch<T>(
    kind: &'static str,
    items: &[RawItem],
    mut one: impl FnMut(&RawItem) -> Result<T, SkipReason>,
) -> Normalized<T> {
    let mut records = Vec::with_capacity(items.len());
    let mut skipped = BTreeMap::new();
    for item in items {
        match one(item) {
            Ok(r) => records.push(r),
            Err(reason) => {
                tracing::debug!(kind, reason = reason.as_str(), "skipping record");
                *skipped.entry(reason).or_insert(0) += 1;
            }
        }
    }
    for (reason, count) in &skipped {
        metrics::counter!(
            "tracker_records_skipped_total",
            "kind" => kind,
            "reason" => reason.as_str()
        )
        .increment(*count as u64);
    }
    let batch = Normalized { records, skipped };
    tracing::info!(
        kind,
        parsed = batch.records.len(),
        skipped = batch.skipped_total(),
        "normalized batch"
    );
    batch
}

/// Explorer timestamps: `2024-05-01T10:00:00.123456Z`. Fractional seconds and
/// the trailing `Z` are dropped; the rest is read as UTC.
pub fn parse_explorer_timestamp(raw: &str) -> Result<DateTime<Utc>, SkipReason> {
    let head = raw.split_once('.').map_or(raw, |(head, _)| head);
    let head = head.replace('Z', "");
    NaiveDateTime::parse_from_str(&head, "%Y-%m-%dT%H:%M:%S")
        .map(|n| n.and_utc())
        .ok()
        .ok_or(SkipReason::BadTimestamp)
}

/// Integer base units (decimal or scientific text) → token units.
pub fn scale_token_amount(raw: &str) -> Result<Decimal, SkipReason> {
    let raw = raw.trim();
    let mut value = Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
        .ok_or(SkipReason::BadAmount)?;
    value
        .set_scale(value.scale() + TOKEN_DECIMALS)
        .ok()
        .ok_or(SkipReason::BadAmount)?;
    Ok(value.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_explorer_timestamp_strips_fraction_and_zone() {
        let t = parse_explorer_timestamp("2024-05-01T10:20:30.123456Z").unwrap();
        assert_eq!((t.year(), t.month(), t.day()), (2024, 5, 1));
        assert_eq!((t.hour(), t.minute(), t.second()), (10, 20, 30));

        let t = parse_explorer_timestamp("2024-05-01T10:20:30Z").unwrap();
        assert_eq!(t.second(), 30);
    }

    #[test]
    fn test_parse_explorer_timestamp_rejects_garbage() {
        assert_eq!(
            parse_explorer_timestamp("yesterday"),
            Err(SkipReason::BadTimestamp)
        );
        assert_eq!(
            parse_explorer_timestamp("2024-05-01"),
            Err(SkipReason::BadTimestamp)
        );
    }

    #[test]
    fn test_scale_token_amount() {
        assert_eq!(
            scale_token_amount("1500000000000000000").unwrap(),
            Decimal::new(15, 1)
        );
        assert_eq!(scale_token_amount("1").unwrap(), Decimal::new(1, 18));
        assert_eq!(scale_token_amount("0").unwrap(), Decimal::ZERO);
        assert_eq!(
            scale_token_amount("2.5e18").unwrap(),
            Decimal::new(25, 1)
        );
        assert_eq!(scale_token_amount("12abc"), Err(SkipReason::BadAmount));
        assert_eq!(scale_token_amount(""), Err(SkipReason::BadAmount));
    }

    #[test]
    fn test_skip_reason_labels_are_distinct() {
        let all = [
            SkipReason::Malformed,
            SkipReason::WrongShape,
            SkipReason::MissingTimestamp,
            SkipReason::BadTimestamp,
            SkipReason::MissingAmount,
            SkipReason::BadAmount,
            SkipReason::SelfTransfer,
            SkipReason::WrongTopic,
            SkipReason::NoWeight,
            SkipReason::NonPositiveWeight,
            SkipReason::MalformedData,
        ];
        let labels: std::collections::HashSet<_> = all.iter().map(SkipReason::as_str).collect();
        assert_eq!(labels.len(), all.len());
    }
}
