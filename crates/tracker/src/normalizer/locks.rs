use chrono::{DateTime, NaiveDate, Utc};
use common::types::{RawEvent, RawItem, TokenTransfer};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};

use super::{normalize_batch, parse_explorer_timestamp, scale_token_amount, Normalized, SkipReason};

/// Lock size categories. Each lower bound belongs to its own bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SizeBucket {
    /// `< 0.001`
    Dust,
    /// `[0.001, 0.01)`
    Small,
    /// `[0.01, 0.1)`
    Medium,
    /// `[0.1, 1)`
    Large,
    /// `>= 1`
    Whole,
}

impl SizeBucket {
    #[cfg(test)]
    pub const ALL: [SizeBucket; 5] = [
        Self::Dust,
        Self::Small,
        Self::Medium,
        Self::Large,
        Self::Whole,
    ];

    pub fn for_amount(amount: Decimal) -> Self {
        if amount < Decimal::new(1, 3) {
            Self::Dust
        } else if amount < Decimal::new(1, 2) {
            Self::Small
        } else if amount < Decimal::new(1, 1) {
            Self::Medium
        } else if amount < Decimal::ONE {
            Self::Large
        } else {
            Self::Whole
        }
    }

    pub fn order(&self) -> u8 {
        match self {
            Self::Dust => 1,
            Self::Small => 2,
            Self::Medium => 3,
            Self::Large => 4,
            Self::Whole => 5,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Dust => "< 0.001",
            Self::Small => "0.001 - 0.01",
            Self::Medium => "0.01 - 0.1",
            Self::Large => "0.1 - 1",
            Self::Whole => "1 and above",
        }
    }
}

impl Serialize for SizeBucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockRecord {
    pub date: NaiveDate,
    pub timestamp: DateTime<Utc>,
    pub amount: Decimal,
    pub sender: String,
    pub size_bucket: SizeBucket,
    pub bucket_order: u8,
}

/// Turns token transfers into the escrow into [`LockRecord`]s.
pub struct LockNormalizer {
    contract_address: String,
}

impl LockNormalizer {
    pub fn new(contract_address: &str) -> Self {
        Self {
            contract_address: contract_address.to_lowercase(),
        }
    }

    pub fn normalize(&self, item: &RawItem) -> Result<LockRecord, SkipReason> {
        match RawEvent::classify(item).ok().ok_or(SkipReason::Malformed)? {
            RawEvent::Transfer(t) => self.from_transfer(&t),
            RawEvent::Log(_) => Err(SkipReason::WrongShape),
        }
    }

    pub fn normalize_all(&self, items: &[RawItem]) -> Normalized<LockRecord> {
        normalize_batch("lock", items, |item| self.normalize(item))
    }

    /// A transfer without a readable `total` is skipped rather than counted as a zero lock.
    fn from_transfer(&self, t: &TokenTransfer) -> Result<LockRecord, SkipReason> {
        let raw_ts = t
            .timestamp
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(SkipReason::MissingTimestamp)?;
        let timestamp = parse_explorer_timestamp(raw_ts)?;

        let raw_amount = t
            .total
            .as_ref()
            .and_then(|total| total.raw_value())
            .ok_or(SkipReason::MissingAmount)?;
        let amount = scale_token_amount(raw_amount)?;

        let sender = t
            .from
            .as_ref()
            .and_then(|from| from.hash())
            .unwrap_or("Unknown")
            .to_string();
        if sender.to_lowercase() == self.contract_address {
            return Err(SkipReason::SelfTransfer);
        }

        let size_bucket = SizeBucket::for_amount(amount);
        Ok(LockRecord {
            date: timestamp.date_naive(),
            timestamp,
            amount,
            sender,
            size_bucket,
            bucket_order: size_bucket.order(),
        })
    }
}
