use anyhow::Result;
use common::types::Page;
use serde_json::{Map, Value};

/// A paginated, newest-first listing.
pub trait PageSource {
    /// Short label used in logs and metrics (`locks`, `votes`).
    fn name(&self) -> &str;

    fn fetch_page(
        &self,
        params: &Map<String, Value>,
    ) -> impl std::future::Future<Output = Result<Page>> + Send;
}

/// Raw native-coin balance of the tracked contract (integer string, 18 decimals).
pub trait BalanceSource {
    fn fetch_balance_raw(&self) -> impl std::future::Future<Output = Result<String>> + Send;
}
