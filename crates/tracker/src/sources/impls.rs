use anyhow::{Context, Result};
use common::explorer::{classify_anyhow_api_error, ExplorerClient};
use common::types::Page;
use serde_json::{Map, Value};
use std::time::Instant;

use super::traits::{BalanceSource, PageSource};

/// One paginated explorer endpoint (token transfers or logs of an address).
pub struct ExplorerListing<'a> {
    client: &'a ExplorerClient,
    name: &'static str,
    url: String,
}

impl<'a> ExplorerListing<'a> {
    pub fn token_transfers(client: &'a ExplorerClient, address: &str) -> Self {
        Self {
            client,
            name: "locks",
            url: client.token_transfers_url(address),
        }
    }

    pub fn logs(client: &'a ExplorerClient, address: &str) -> Self {
        Self {
            client,
            name: "votes",
            url: client.logs_url(address),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl PageSource for ExplorerListing<'_> {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch_page(&self, params: &Map<String, Value>) -> Result<Page> {
        let start = Instant::now();
        let res = self.client.fetch_page(&self.url, params).await;
        observe(self.name, start, &res);
        res
    }
}

pub struct AddressBalance<'a> {
    client: &'a ExplorerClient,
    address: String,
}

impl<'a> AddressBalance<'a> {
    pub fn new(client: &'a ExplorerClient, address: &str) -> Self {
        Self {
            client,
            address: address.to_string(),
        }
    }
}

impl BalanceSource for AddressBalance<'_> {
    async fn fetch_balance_raw(&self) -> Result<String> {
        let start = Instant::now();
        let res = self.client.fetch_address(&self.address).await;
        observe("balance", start, &res);
        res?.coin_balance.context("address response has no coin_balance")
    }
}

fn observe<T>(endpoint: &'static str, start: Instant, res: &Result<T>) {
    let ms = start.elapsed().as_secs_f64() * 1000.0;
    metrics::histogram!("tracker_api_latency_ms", "endpoint" => endpoint).record(ms);
    match res {
        Ok(_) => {
            metrics::counter!("tracker_api_requests_total", "endpoint" => endpoint, "status" => "ok").increment(1);
        }
        Err(e) => {
            metrics::counter!("tracker_api_requests_total", "endpoint" => endpoint, "status" => "error").increment(1);
            metrics::counter!(
                "tracker_api_errors_total",
                "endpoint" => endpoint,
                "kind" => classify_anyhow_api_error(e).as_str()
            )
            .increment(1);
        }
    }
}
