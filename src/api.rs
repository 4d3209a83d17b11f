use std::collections::HashMap;

use anyhow::{Context, anyhow};
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use tokio::time::Duration;

use crate::history::{HistoryDataset, HistoryError, HistoryQuery};
use crate::row::Row;

const PASSWORD_HASH_PATH: &str = "/api/password_hash";
const REALTIME_PATH: &str = "/api/realtime_limit";
const BIDDING_PATH: &str = "/api/bidding";

#[derive(Debug, Deserialize)]
struct PasswordHashResponse {
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RealtimeResponse {
    #[serde(default)]
    info: Option<Vec<Row>>,
}

#[derive(Debug, Deserialize)]
struct BiddingResponse {
    #[serde(default)]
    data: Option<HashMap<String, Vec<Row>>>,
    #[serde(default)]
    timestamps: Option<Vec<String>>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the bidding data service.
#[derive(Debug, Clone)]
pub struct BiddingApi {
    client: Client,
    base_url: String,
}

impl BiddingApi {
    pub fn new(base_url: &str) -> Result<BiddingApi, anyhow::Error> {
        let base_url = normalize_base_url(base_url);
        if base_url.is_empty() {
            return Err(anyhow!("api base url cannot be empty"));
        }
        Ok(BiddingApi {
            client: build_http_client()?,
            base_url,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Fetches the password hash used by the login gate. `Ok(None)` means the
    /// server answered but has no hash configured.
    pub async fn fetch_password_hash(&self) -> Result<Option<String>, anyhow::Error> {
        let response = self
            .client
            .get(self.endpoint(PASSWORD_HASH_PATH))
            .send()
            .await
            .context("requesting password hash")?
            .json::<PasswordHashResponse>()
            .await
            .context("decoding password hash")?;
        if let Some(err) = response.error.filter(|e| !e.is_empty()) {
            tracing::warn!(error = %err, "server reported no password hash");
        }
        Ok(response
            .hash
            .map(|hash| hash.trim().to_string())
            .filter(|hash| !hash.is_empty()))
    }

    /// Latest realtime auction rows. A body without `info` yields no rows.
    pub async fn fetch_realtime(&self) -> Result<Vec<Row>, anyhow::Error> {
        let response = self
            .client
            .get(self.endpoint(REALTIME_PATH))
            .send()
            .await
            .context("requesting realtime rows")?
            .json::<RealtimeResponse>()
            .await
            .context("decoding realtime rows")?;
        Ok(response.info.unwrap_or_default())
    }

    /// Loads one historical window. The body is decoded whatever the HTTP
    /// status, because the server reports missing data as a 4xx with an
    /// `error` field.
    pub async fn fetch_history(&self, query: &HistoryQuery) -> Result<HistoryDataset, HistoryError> {
        let response = self
            .client
            .get(self.endpoint(BIDDING_PATH))
            .query(&query.params())
            .send()
            .await
            .map_err(|err| HistoryError::Transport(format!("requesting history: {err}")))?;
        let status = response.status();
        let body = response
            .json::<BiddingResponse>()
            .await
            .map_err(|err| {
                HistoryError::Transport(format!("decoding history (status {status}): {err}"))
            })?;
        if let Some(message) = body.error.filter(|e| !e.is_empty()) {
            return Err(HistoryError::Server(message));
        }
        Ok(HistoryDataset::new(
            body.data.unwrap_or_default(),
            body.timestamps.unwrap_or_default(),
        ))
    }
}

fn normalize_base_url(value: &str) -> String {
    value.trim().trim_end_matches('/').to_string()
}

fn build_http_client() -> Result<Client, anyhow::Error> {
    Ok(ClientBuilder::new()
        .connect_timeout(Duration::from_secs(5))
        .read_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(20))
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_trimmed() {
        let api = BiddingApi::new(" http://localhost:5000/ ").unwrap();
        assert_eq!(
            api.endpoint(BIDDING_PATH),
            "http://localhost:5000/api/bidding"
        );
        assert!(BiddingApi::new("  / ").is_err());
    }

    #[test]
    fn bidding_body_without_data_decodes() {
        let body: BiddingResponse = serde_json::from_str(r#"{"error":"no data"}"#).unwrap();
        assert_eq!(body.error.as_deref(), Some("no data"));
        assert!(body.data.is_none());

        let body: BiddingResponse = serde_json::from_str(
            r#"{"timestamps":["091500"],"data":{"091500":[["600000","浦发银行"]]}}"#,
        )
        .unwrap();
        let data = body.data.unwrap();
        assert_eq!(data["091500"][0].display_name(), "浦发银行");
    }

    #[test]
    fn realtime_body_without_info_is_empty() {
        let body: RealtimeResponse =
            serde_json::from_str(r#"{"error":"实时数据获取失败","data":[]}"#).unwrap();
        assert!(body.info.is_none());
    }
}
