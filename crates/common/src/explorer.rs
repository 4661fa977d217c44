use crate::types::{AddressDetails, Page};
use anyhow::{Context, Result};
use reqwest::Url;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

/// Minimal client for a Blockscout-style explorer API (`/api/v2`).
pub struct ExplorerClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum ExplorerError {
    #[error("explorer returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Coarse error classes used as a metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    Timeout,
    Connect,
    RateLimited,
    Status4xx,
    Status5xx,
    Decode,
    Other,
}

impl ApiErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::RateLimited => "rate_limited",
            Self::Status4xx => "status_4xx",
            Self::Status5xx => "status_5xx",
            Self::Decode => "decode",
            Self::Other => "other",
        }
    }
}

pub fn classify_anyhow_api_error(err: &anyhow::Error) -> ApiErrorKind {
    for cause in err.chain() {
        if let Some(ExplorerError::Status { status, .. }) = cause.downcast_ref::<ExplorerError>() {
            return match *status {
                429 => ApiErrorKind::RateLimited,
                400..=499 => ApiErrorKind::Status4xx,
                500..=599 => ApiErrorKind::Status5xx,
                _ => ApiErrorKind::Other,
            };
        }
        if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
            if e.is_timeout() {
                return ApiErrorKind::Timeout;
            }
            if e.is_connect() {
                return ApiErrorKind::Connect;
            }
            if e.is_decode() {
                return ApiErrorKind::Decode;
            }
        }
        if cause.downcast_ref::<serde_json::Error>().is_some() {
            return ApiErrorKind::Decode;
        }
    }
    ApiErrorKind::Other
}

impl ExplorerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token_transfers_url(&self, address: &str) -> String {
        format!("{}/addresses/{address}/token-transfers", self.base_url)
    }

    pub fn logs_url(&self, address: &str) -> String {
        format!("{}/addresses/{address}/logs", self.base_url)
    }

    pub fn address_url(&self, address: &str) -> String {
        format!("{}/addresses/{address}", self.base_url)
    }

    /// Attach `params` as query pairs. Nulls are omitted; strings go in verbatim.
    pub fn with_query(url: &str, params: &Map<String, Value>) -> Result<Url> {
        let mut url = Url::parse(url).with_context(|| format!("invalid explorer url: {url}"))?;
        {
            let mut qp = url.query_pairs_mut();
            for (key, value) in params {
                match value {
                    Value::Null => {}
                    Value::String(s) => {
                        qp.append_pair(key, s);
                    }
                    other => {
                        qp.append_pair(key, &other.to_string());
                    }
                }
            }
        }
        Ok(url)
    }

    /// Fetch one page of a paginated listing.
    pub async fn fetch_page(&self, url: &str, params: &Map<String, Value>) -> Result<Page> {
        let url = Self::with_query(url, params)?;
        debug!(url = %url, "fetching page");
        let body = self.get_text(url).await?;
        serde_json::from_str(&body).context("failed to deserialize page response")
    }

    pub async fn fetch_address(&self, address: &str) -> Result<AddressDetails> {
        let url = Url::parse(&self.address_url(address))?;
        let body = self.get_text(url).await?;
        serde_json::from_str(&body).context("failed to deserialize address response")
    }

    async fn get_text(&self, url: Url) -> Result<String> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExplorerError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        resp.text().await.context("failed to read response body")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ExplorerClient {
        ExplorerClient::new("https://api.explorer.mezo.org/api/v2/", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_client_builds_endpoint_urls() {
        let c = client();
        assert_eq!(c.base_url(), "https://api.explorer.mezo.org/api/v2");
        assert_eq!(
            c.token_transfers_url("0xabc"),
            "https://api.explorer.mezo.org/api/v2/addresses/0xabc/token-transfers"
        );
        assert_eq!(
            c.logs_url("0xdef"),
            "https://api.explorer.mezo.org/api/v2/addresses/0xdef/logs"
        );
        assert_eq!(
            c.address_url("0xabc"),
            "https://api.explorer.mezo.org/api/v2/addresses/0xabc"
        );
    }

    #[test]
    fn test_with_query_renders_param_types() {
        let params: Map<String, Value> = serde_json::from_str(
            r#"{"filter":"to","block_number":123,"index":4,"items_count":50,"skip":null}"#,
        )
        .unwrap();
        let url = ExplorerClient::with_query("https://x.test/api/v2/addresses/0x1/logs", &params)
            .unwrap()
            .to_string();
        assert!(url.contains("filter=to"));
        assert!(url.contains("block_number=123"));
        assert!(url.contains("items_count=50"));
        assert!(!url.contains("skip"));
    }

    #[test]
    fn test_with_query_rejects_relative_url() {
        assert!(ExplorerClient::with_query("not a url", &Map::new()).is_err());
    }

    #[test]
    fn test_classify_status_errors() {
        let e: anyhow::Error = ExplorerError::Status {
            status: 429,
            body: String::new(),
        }
        .into();
        assert_eq!(classify_anyhow_api_error(&e), ApiErrorKind::RateLimited);

        let e: anyhow::Error = ExplorerError::Status {
            status: 503,
            body: "busy".to_string(),
        }
        .into();
        let e = e.context("fetching logs");
        assert_eq!(classify_anyhow_api_error(&e), ApiErrorKind::Status5xx);
    }

    #[test]
    fn test_classify_decode_error() {
        let err = serde_json::from_str::<Page>("{not json").unwrap_err();
        let e = anyhow::Error::from(err).context("failed to deserialize page response");
        assert_eq!(classify_anyhow_api_error(&e), ApiErrorKind::Decode);
        assert_eq!(ApiErrorKind::Decode.as_str(), "decode");
    }
}
