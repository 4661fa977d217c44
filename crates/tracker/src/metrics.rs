use anyhow::Result;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

pub fn describe() {
    describe_counter!(
        "tracker_api_requests_total",
        "Explorer API requests, by endpoint and outcome."
    );
    describe_histogram!(
        "tracker_api_latency_ms",
        "Explorer API request latency in milliseconds."
    );
    describe_counter!(
        "tracker_api_errors_total",
        "Explorer API failures, by endpoint and error kind."
    );
    describe_counter!(
        "tracker_items_fetched_total",
        "New raw items fetched, by source."
    );
    describe_counter!(
        "tracker_records_skipped_total",
        "Raw items dropped during normalization, by kind and reason."
    );
    describe_counter!(
        "tracker_store_saves_total",
        "Store save attempts, by outcome."
    );
    describe_counter!("tracker_sync_runs_total", "Completed sync runs.");
    describe_gauge!(
        "tracker_lock_records",
        "Lock records in the latest report."
    );
    describe_gauge!(
        "tracker_vote_records",
        "Vote records in the latest report."
    );
}

pub fn install_prometheus(port: u16) -> Result<PrometheusHandle> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    Ok(PrometheusBuilder::new()
        .with_http_listener(addr)
        .install_recorder()?)
}
