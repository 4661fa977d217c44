//! One end-to-end sync: load → fetch new (concurrently) → merge → save →
//! normalize → aggregate → write the report.

use chrono::{DateTime, Utc};
use common::config::Config;
use common::store::{write_json_atomic, JsonStore, StoredData};
use common::types::RawItem;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;

use crate::fetcher::{fetch_new, keys_of, FetchOutcome, FetchSettings};
use crate::normalizer::{LockNormalizer, SkipReason, VoteNormalizer};
use crate::report::{format_balance, Report, BALANCE_UNAVAILABLE};
use crate::sources::{BalanceSource, PageSource};

/// Everything a sync needs besides the remote sources.
pub struct Pipeline {
    store: JsonStore,
    report_path: PathBuf,
    lock_params: Map<String, Value>,
    fetch: FetchSettings,
    locks: LockNormalizer,
    votes: VoteNormalizer,
}

#[derive(Debug)]
pub struct SyncOutcome {
    pub new_locks: usize,
    pub new_votes: usize,
    pub saved: bool,
    /// Fetch errors by source; the run still completes with partial data.
    pub fetch_errors: Vec<(&'static str, String)>,
    pub report: Report,
}

impl SyncOutcome {
    /// True when at least one source stopped on an error.
    pub fn is_partial(&self) -> bool {
        !self.fetch_errors.is_empty()
    }

    /// One-line digest for the operator.
    pub fn digest(&self) -> String {
        let mut line = format!(
            "{} new locks, {} new votes, store {}, {} locks and {} votes total, balance {}",
            self.new_locks,
            self.new_votes,
            if self.saved { "saved" } else { "unchanged" },
            self.report.summary.lock_count,
            self.report.summary.vote_count,
            self.report.current_balance,
        );
        for (source, error) in &self.fetch_errors {
            line.push_str(&format!("; {source} fetch failed: {error}"));
        }
        line
    }
}

impl Pipeline {
    pub fn from_config(cfg: &Config) -> Self {
        let mut lock_params = Map::new();
        lock_params.insert("filter".to_string(), Value::from("to"));
        lock_params.insert("token".to_string(), Value::from(cfg.explorer.lock_token.clone()));

        Self {
            store: JsonStore::new(&cfg.store.path),
            report_path: PathBuf::from(&cfg.report.path),
            lock_params,
            fetch: FetchSettings {
                page_delay: Duration::from_millis(cfg.explorer.page_delay_ms),
                max_pages: cfg.explorer.max_pages,
            },
            locks: LockNormalizer::new(&cfg.explorer.contract_address),
            votes: VoteNormalizer::new(&cfg.explorer.voted_topic),
        }
    }

    pub fn store(&self) -> &JsonStore {
        &self.store
    }

    /// Runs one sync. Never fails: remote, store and report errors are logged
    /// and the run continues with whatever it has.
    pub async fn run_once<L, V, B>(
        &self,
        lock_source: &L,
        vote_source: &V,
        balance: &B,
    ) -> SyncOutcome
    where
        L: PageSource + Sync,
        V: PageSource + Sync,
        B: BalanceSource + Sync,
    {
        metrics::counter!("tracker_sync_runs_total").increment(1);
        let existing = self.store.load_or_default();

        let (lock_out, vote_out, balance_raw) = tokio::join!(
            fetch_new(
                lock_source,
                self.lock_params.clone(),
                keys_of(&existing.locks),
                &self.fetch
            ),
            fetch_new(vote_source, Map::new(), keys_of(&existing.votes), &self.fetch),
            balance.fetch_balance_raw(),
        );

        let mut fetch_errors = Vec::new();
        for (name, out) in [("locks", &lock_out), ("votes", &vote_out)] {
            if let Some(e) = &out.error {
                fetch_errors.push((name, format!("{e:#}")));
            }
        }

        tracing::debug!(
            locks_caught_up = lock_out.caught_up(),
            locks_pages = lock_out.pages,
            locks_known = lock_out.known_keys.len(),
            votes_caught_up = vote_out.caught_up(),
            votes_pages = vote_out.pages,
            votes_known = vote_out.known_keys.len(),
            "fetches joined"
        );
        let new_locks = lock_out.items.len();
        let new_votes = vote_out.items.len();
        let data = StoredData {
            locks: merge(lock_out, existing.locks),
            votes: merge(vote_out, existing.votes),
        };

        let saved = if new_locks > 0 || new_votes > 0 {
            self.save(&data)
        } else {
            tracing::info!("no new items; store left as is");
            false
        };

        let current_balance = match balance_raw {
            Ok(raw) => format_balance(&raw).unwrap_or_else(|| {
                tracing::warn!(raw = %raw, "balance is not a number");
                BALANCE_UNAVAILABLE.to_string()
            }),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "balance fetch failed");
                BALANCE_UNAVAILABLE.to_string()
            }
        };

        let report = self.analyze(&data, current_balance, Utc::now());
        if let Err(e) = write_json_atomic(&self.report_path, &report) {
            tracing::error!(
                path = %self.report_path.display(),
                error = %format!("{e:#}"),
                "failed to write report"
            );
        }

        tracing::info!(
            new_locks,
            new_votes,
            saved,
            locks = report.locks.len(),
            votes = report.votes.len(),
            balance = %report.current_balance,
            "sync finished"
        );

        SyncOutcome {
            new_locks,
            new_votes,
            saved,
            fetch_errors,
            report,
        }
    }

    /// Normalize the full history and build the report from it.
    pub fn analyze(
        &self,
        data: &StoredData,
        current_balance: String,
        now: DateTime<Utc>,
    ) -> Report {
        let locks = self.locks.normalize_all(&data.locks);
        let votes = self.votes.normalize_all(&data.votes);

        let self_transfers = locks.skipped_for(SkipReason::SelfTransfer);
        if self_transfers > 0 {
            tracing::debug!(self_transfers, "ignored transfers sent by the contract itself");
        }

        metrics::gauge!("tracker_lock_records").set(locks.records.len() as f64);
        metrics::gauge!("tracker_vote_records").set(votes.records.len() as f64);

        Report::build(&locks.records, &votes.records, current_balance, now)
    }

    fn save(&self, data: &StoredData) -> bool {
        match self.store.save(data) {
            Ok(()) => {
                metrics::counter!("tracker_store_saves_total", "status" => "ok").increment(1);
                tracing::info!(
                    path = %self.store.path().display(),
                    locks = data.locks.len(),
                    votes = data.votes.len(),
                    "store saved"
                );
                true
            }
            Err(e) => {
                metrics::counter!("tracker_store_saves_total", "status" => "error").increment(1);
                tracing::error!(
                    path = %self.store.path().display(),
                    error = %format!("{e:#}"),
                    "failed to save store; previous file kept"
                );
                false
            }
        }
    }
}

/// New items go in front so the collection stays newest-first.
fn merge(outcome: FetchOutcome, existing: Vec<RawItem>) -> Vec<RawItem> {
    let mut merged = outcome.items;
    merged.extend(existing);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::testing::FakePageSource;
    use anyhow::Result;
    use rust_decimal::Decimal;
    use serde_json::json;

    const CONTRACT: &str = "0x3D4b1b884A7a1E59fE8589a3296EC8f8cBB6f279";
    const TOPIC: &str = "0x452d440efc30dfa14a0ef803ccb55936af860ec6a6960ed27f129bef913f296a";

    struct FakeBalance(Option<&'static str>);

    impl BalanceSource for FakeBalance {
        async fn fetch_balance_raw(&self) -> Result<String> {
            match self.0 {
                Some(raw) => Ok(raw.to_string()),
                None => anyhow::bail!("explorer returned HTTP 503: unavailable"),
            }
        }
    }

    fn config(dir: &std::path::Path) -> Config {
        let mut cfg = Config::from_toml_str(include_str!("../../../config/default.toml")).unwrap();
        cfg.store.path = dir.join("store.json").display().to_string();
        cfg.report.path = dir.join("out/report.json").display().to_string();
        cfg
    }

    fn lock_item(tx: &str, day: u32, value: &str) -> RawItem {
        serde_json::from_value(json!({
            "tx_hash": tx,
            "log_index": 0,
            "timestamp": format!("2024-06-{day:02}T12:00:00.000000Z"),
            "total": {"decimals": "18", "value": value},
            "from": {"hash": format!("0xsender{tx}")},
            "to": {"hash": CONTRACT},
        }))
        .unwrap()
    }

    fn vote_item(tx: &str, weight: &str) -> RawItem {
        serde_json::from_value(json!({
            "transaction_hash": tx,
            "index": 3,
            "topics": [TOPIC, null],
            "data": "0x",
            "timestamp": "2024-06-02T08:00:00Z",
            "decoded": {
                "method_call": "Voted(address voter, uint256 weight, uint256 totalWeight, uint256 timestamp)",
                "parameters": [
                    {"name": "voter", "type": "address", "value": "0xvoter"},
                    {"name": "weight", "type": "uint256", "value": weight},
                    {"name": "totalWeight", "type": "uint256", "value": weight},
                    {"name": "timestamp", "type": "uint256", "value": "0"}
                ]
            }
        }))
        .unwrap()
    }

    fn read_json(path: &str) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_run_saves_and_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let pipeline = Pipeline::from_config(&cfg);

        let locks = FakePageSource::new(
            "locks",
            vec![
                vec![
                    lock_item("0x3", 3, "2000000000000000000"),
                    lock_item("0x2", 2, "500000000000000000"),
                ],
                vec![lock_item("0x1", 1, "1000000000000000")],
            ],
        );
        let votes = FakePageSource::new("votes", vec![vec![vote_item("0xv1", "4000000000000000000")]]);

        let out = pipeline
            .run_once(&locks, &votes, &FakeBalance(Some("1234567891000000000000000")))
            .await;

        assert_eq!((out.new_locks, out.new_votes), (3, 1));
        assert!(out.saved);
        assert!(out.fetch_errors.is_empty());
        assert_eq!(out.report.current_balance, "1,234,567.89");
        assert_eq!(out.report.summary.total_locked, "2.501".parse::<Decimal>().unwrap());
        assert_eq!(out.report.summary.vote_count, 1);

        let lock_calls = locks.calls.lock().unwrap();
        assert_eq!(lock_calls[0].get("filter"), Some(&Value::from("to")));
        assert_eq!(
            lock_calls[0].get("token"),
            Some(&Value::from(cfg.explorer.lock_token.clone()))
        );
        assert!(votes.calls.lock().unwrap()[0].is_empty());

        let stored = read_json(&cfg.store.path);
        assert_eq!(stored["locks"].as_array().unwrap().len(), 3);
        assert_eq!(stored["locks"][0]["tx_hash"], "0x3");
        assert_eq!(stored["votes"].as_array().unwrap().len(), 1);

        let report = read_json(&cfg.report.path);
        assert_eq!(report["current_balance"], "1,234,567.89");
        assert_eq!(report["daily"].as_array().unwrap().len(), 3);

        assert!(!out.is_partial());
        assert_eq!(
            out.digest(),
            "3 new locks, 1 new votes, store saved, 3 locks and 1 votes total, balance 1,234,567.89"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_with_nothing_new_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let pipeline = Pipeline::from_config(&cfg);
        let pages = vec![vec![
            lock_item("0x2", 2, "1000000000000000000"),
            lock_item("0x1", 1, "1000000000000000000"),
        ]];
        let balance = FakeBalance(Some("0"));

        let first = pipeline
            .run_once(
                &FakePageSource::new("locks", pages.clone()),
                &FakePageSource::new("votes", vec![vec![]]),
                &balance,
            )
            .await;
        let before = std::fs::read(&cfg.store.path).unwrap();

        let locks = FakePageSource::new("locks", pages);
        let second = pipeline
            .run_once(&locks, &FakePageSource::new("votes", vec![vec![]]), &balance)
            .await;

        assert_eq!((second.new_locks, second.new_votes), (0, 0));
        assert!(!second.saved);
        assert_eq!(locks.call_count(), 1);
        assert_eq!(std::fs::read(&cfg.store.path).unwrap(), before);
        assert_eq!(first.report.locks, second.report.locks);
        assert_eq!(first.report.daily, second.report.daily);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_items_are_prepended() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let pipeline = Pipeline::from_config(&cfg);
        let empty_votes = FakePageSource::new("votes", vec![vec![]]);
        let balance = FakeBalance(Some("0"));

        let old = vec![vec![lock_item("0x1", 1, "1000000000000000000")]];
        pipeline
            .run_once(&FakePageSource::new("locks", old), &empty_votes, &balance)
            .await;

        let newer = vec![vec![
            lock_item("0x3", 3, "1000000000000000000"),
            lock_item("0x2", 2, "1000000000000000000"),
            lock_item("0x1", 1, "1000000000000000000"),
        ]];
        let out = pipeline
            .run_once(&FakePageSource::new("locks", newer), &empty_votes, &balance)
            .await;

        assert_eq!(out.new_locks, 2);
        let stored = read_json(&cfg.store.path);
        let order: Vec<&str> = stored["locks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["tx_hash"].as_str().unwrap())
            .collect();
        assert_eq!(order, vec!["0x3", "0x2", "0x1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reloaded_store_normalizes_identically() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let pipeline = Pipeline::from_config(&cfg);

        let out = pipeline
            .run_once(
                &FakePageSource::new("locks", vec![vec![lock_item("0x1", 1, "300000000000000000")]]),
                &FakePageSource::new("votes", vec![vec![vote_item("0xv", "1500000000000000000")]]),
                &FakeBalance(Some("0")),
            )
            .await;

        let reloaded = pipeline.store().load().unwrap();
        let again = pipeline.analyze(
            &reloaded,
            out.report.current_balance.clone(),
            out.report.generated_at,
        );
        assert_eq!(again, out.report);
    }

    #[tokio::test(start_paused = true)]
    async fn test_balance_failure_reports_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let pipeline = Pipeline::from_config(&cfg);

        let out = pipeline
            .run_once(
                &FakePageSource::new("locks", vec![vec![lock_item("0x1", 1, "1000000000000000000")]]),
                &FakePageSource::new("votes", vec![vec![]]),
                &FakeBalance(None),
            )
            .await;

        assert_eq!(out.report.current_balance, "N/A");
        assert_eq!(out.report.locks.len(), 1);
        assert!(out.saved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_vote_fetch_error_keeps_lock_progress() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let pipeline = Pipeline::from_config(&cfg);

        let votes = FakePageSource::new("votes", vec![vec![vote_item("0xv", "1")]]).failing_at(0);
        let out = pipeline
            .run_once(
                &FakePageSource::new("locks", vec![vec![lock_item("0x1", 1, "1000000000000000000")]]),
                &votes,
                &FakeBalance(Some("0")),
            )
            .await;

        assert_eq!(out.new_locks, 1);
        assert_eq!(out.new_votes, 0);
        assert!(out.saved);
        assert_eq!(out.fetch_errors.len(), 1);
        assert_eq!(out.fetch_errors[0].0, "votes");
        assert!(out.fetch_errors[0].1.contains("502"));
        assert!(out.is_partial());
        assert!(out.digest().contains("; votes fetch failed: "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_store_restarts_from_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        std::fs::write(&cfg.store.path, "{ not json").unwrap();
        let pipeline = Pipeline::from_config(&cfg);

        let out = pipeline
            .run_once(
                &FakePageSource::new("locks", vec![vec![lock_item("0x1", 1, "1000000000000000000")]]),
                &FakePageSource::new("votes", vec![vec![]]),
                &FakeBalance(Some("0")),
            )
            .await;

        assert_eq!(out.new_locks, 1);
        let stored = pipeline.store().load().unwrap();
        assert_eq!(stored.locks.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_items_are_kept_raw_but_left_out_of_report() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let pipeline = Pipeline::from_config(&cfg);

        let self_transfer: RawItem = serde_json::from_value(json!({
            "tx_hash": "0xself",
            "log_index": 0,
            "timestamp": "2024-06-01T00:00:00Z",
            "total": {"value": "1000000000000000000"},
            "from": {"hash": CONTRACT.to_lowercase()},
        }))
        .unwrap();
        let out = pipeline
            .run_once(
                &FakePageSource::new(
                    "locks",
                    vec![vec![self_transfer, lock_item("0x1", 1, "1000000000000000000")]],
                ),
                &FakePageSource::new("votes", vec![vec![vote_item("0xv", "0")]]),
                &FakeBalance(Some("0")),
            )
            .await;

        assert_eq!(out.new_locks, 2);
        assert_eq!(out.report.locks.len(), 1);
        assert!(out.report.votes.is_empty());
        let stored = pipeline.store().load().unwrap();
        assert_eq!(stored.locks.len(), 2);
        assert_eq!(stored.votes.len(), 1);
    }
}
