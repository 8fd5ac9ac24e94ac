use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("gatekeeper returned status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// Outcome of a decision request.
#[derive(Debug)]
pub struct Decision {
    pub status: StatusCode,
    /// On a grant, the headers to forward upstream.
    pub headers: HeaderMap,
    pub body: String,
}

impl Decision {
    pub fn is_granted(&self) -> bool {
        self.status == StatusCode::OK
    }
}

pub struct GatekeeperClient {
    client: Client,
    api_url: String,
}

impl GatekeeperClient {
    pub fn new(api_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    /// Ask whether `method path` is allowed, sending `headers` along.
    /// Denials are a [`Decision`] too, not an error.
    pub async fn decide(&self, method: Method, path: &str, headers: HeaderMap) -> Result<Decision, SdkError> {
        let path = if path.starts_with('/') { path.to_string() } else { format!("/{}", path) };
        let resp = self
            .client
            .request(method, format!("{}/decisions{}", self.api_url, path))
            .headers(headers)
            .send()
            .await?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.text().await?;
        Ok(Decision { status, headers, body })
    }

    pub async fn list_rules(&self, limit: usize, offset: usize) -> Result<Vec<Value>, SdkError> {
        let resp = self
            .client
            .get(format!("{}/rules", self.api_url))
            .query(&[("limit", limit), ("offset", offset)])
            .send()
            .await?;
        Ok(json_or_status(resp).await?)
    }

    /// `None` when no rule has this id.
    pub async fn get_rule(&self, id: &str) -> Result<Option<Value>, SdkError> {
        let resp = self.client.get(format!("{}/rules/{}", self.api_url, id)).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(json_or_status(resp).await?))
    }

    pub async fn is_alive(&self) -> Result<bool, SdkError> {
        let resp = self.client.get(format!("{}/health/alive", self.api_url)).send().await?;
        Ok(resp.status().is_success())
    }

    pub async fn is_ready(&self) -> Result<bool, SdkError> {
        let resp = self.client.get(format!("{}/health/ready", self.api_url)).send().await?;
        Ok(resp.status().is_success())
    }

    pub async fn version(&self) -> Result<String, SdkError> {
        let resp = self.client.get(format!("{}/version", self.api_url)).send().await?;
        let body: Value = json_or_status(resp).await?;
        Ok(body["version"].as_str().unwrap_or_default().to_string())
    }
}

async fn json_or_status<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, SdkError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(SdkError::Status { status, body });
    }
    Ok(resp.json().await?)
}
