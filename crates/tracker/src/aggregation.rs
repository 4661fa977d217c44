//! Derived views over the full normalized history. Everything here is pure and
//! recomputed from scratch on every run.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::normalizer::{LockRecord, SizeBucket, VoteRecord};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub locked_amount: Decimal,
    pub lock_count: usize,
    pub voting_power: Decimal,
    pub vote_count: usize,
    pub cumulative_locked: Decimal,
    pub cumulative_voting_power: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistributionBucket {
    pub category: SizeBucket,
    pub order: u8,
    pub tx_count: usize,
    pub total_amount: Decimal,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Summary {
    pub total_locked: Decimal,
    pub lock_count: usize,
    pub total_voting_power: Decimal,
    pub vote_count: usize,
    pub unique_lockers: usize,
    pub unique_voters: usize,
}

#[derive(Default)]
struct DayTotals {
    locked: Decimal,
    locks: usize,
    power: Decimal,
    votes: usize,
}

/// One row per calendar day seen in either collection, ascending, with running
/// totals. A day with only locks has zero voting power and vice versa.
pub fn daily_series(locks: &[LockRecord], votes: &[VoteRecord]) -> Vec<DailyAggregate> {
    let mut days: BTreeMap<NaiveDate, DayTotals> = BTreeMap::new();
    for lock in locks {
        let day = days.entry(lock.date).or_default();
        day.locked += lock.amount;
        day.locks += 1;
    }
    for vote in votes {
        let day = days.entry(vote.date).or_default();
        day.power += vote.voting_power;
        day.votes += 1;
    }

    let mut cumulative_locked = Decimal::ZERO;
    let mut cumulative_voting_power = Decimal::ZERO;
    days.into_iter()
        .map(|(date, t)| {
            cumulative_locked += t.locked;
            cumulative_voting_power += t.power;
            DailyAggregate {
                date,
                locked_amount: t.locked,
                lock_count: t.locks,
                voting_power: t.power,
                vote_count: t.votes,
                cumulative_locked,
                cumulative_voting_power,
            }
        })
        .collect()
}

/// Lock counts and totals per size bucket. Empty buckets are left out.
pub fn distribution(locks: &[LockRecord]) -> Vec<DistributionBucket> {
    let mut by_bucket: BTreeMap<SizeBucket, (usize, Decimal)> = BTreeMap::new();
    for lock in locks {
        let entry = by_bucket.entry(lock.size_bucket).or_default();
        entry.0 += 1;
        entry.1 += lock.amount;
    }

    let mut rows: Vec<DistributionBucket> = by_bucket
        .into_iter()
        .map(|(category, (tx_count, total_amount))| DistributionBucket {
            category,
            order: category.order(),
            tx_count,
            total_amount,
            label: bucket_label(category, tx_count, total_amount),
        })
        .collect();
    rows.sort_by_key(|r| r.order);
    rows
}

fn bucket_label(category: SizeBucket, tx_count: usize, total: Decimal) -> String {
    format!(
        "{} (Txs: {tx_count}, Total: {:.2})",
        category.label(),
        round_2dp(total)
    )
}

pub(crate) fn round_2dp(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Newest first. Records sharing a timestamp keep their input order.
pub fn locks_newest_first(locks: &[LockRecord]) -> Vec<LockRecord> {
    let mut sorted = locks.to_vec();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    sorted
}

pub fn votes_newest_first(votes: &[VoteRecord]) -> Vec<VoteRecord> {
    let mut sorted = votes.to_vec();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    sorted
}

pub fn summarize(locks: &[LockRecord], votes: &[VoteRecord]) -> Summary {
    let lockers: HashSet<&str> = locks.iter().map(|l| l.sender.as_str()).collect();
    let voters: HashSet<&str> = votes.iter().map(|v| v.voter.as_str()).collect();
    Summary {
        total_locked: locks.iter().map(|l| l.amount).sum(),
        lock_count: locks.len(),
        total_voting_power: votes.iter().map(|v| v.voting_power).sum(),
        vote_count: votes.len(),
        unique_lockers: lockers.len(),
        unique_voters: voters.len(),
    }
}
