//! The report document handed to presentation layers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregation::{self, round_2dp, DailyAggregate, DistributionBucket, Summary};
use crate::normalizer::{scale_token_amount, LockRecord, VoteRecord};

/// Shown in place of the balance when it could not be fetched or parsed.
pub const BALANCE_UNAVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub current_balance: String,
    pub daily: Vec<DailyAggregate>,
    pub distribution: Vec<DistributionBucket>,
    pub locks: Vec<LockRecord>,
    pub votes: Vec<VoteRecord>,
    pub summary: Summary,
}

impl Report {
    pub fn build(
        locks: &[LockRecord],
        votes: &[VoteRecord],
        current_balance: String,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            generated_at,
            current_balance,
            daily: aggregation::daily_series(locks, votes),
            distribution: aggregation::distribution(locks),
            locks: aggregation::locks_newest_first(locks),
            votes: aggregation::votes_newest_first(votes),
            summary: aggregation::summarize(locks, votes),
        }
    }
}

/// Raw base-unit balance → `1,234,567.89`. `None` when the input is not a number.
pub fn format_balance(raw: &str) -> Option<String> {
    let amount = round_2dp(scale_token_amount(raw).ok()?);
    let text = format!("{amount:.2}");
    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, "00"));
    Some(format!("{sign}{}.{frac_part}", group_thousands(int_part)))
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
