use crate::config::AppConfig;
use crate::http::build_client;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use thiserror::Error;

const ACCESS_TOKEN_HEADER: &str = "X-Service-Point-Access-Token";

#[derive(Debug, Error)]
pub enum MarketplaceError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid response: {0}")]
    Deserialize(String),
    #[error("marketplace rejected request: {0}")]
    Rejected(String),
}

/// Client for the marketplace's product-quotation API. The access
/// token is a static credential assumed valid for the process lifetime.
#[derive(Debug, Clone)]
pub struct MarketplaceClient {
    base_url: String,
    api_key: String,
    http: Client,
}

impl MarketplaceClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            base_url: config.sp_base_url.clone(),
            api_key: config.sp_api_key.clone(),
            http: build_client(),
        }
    }

    pub(super) fn post(&self, path: &str) -> RequestBuilder {
        self.http
            .post(format!("{}/{}", self.base_url, path))
            .header(ACCESS_TOKEN_HEADER, &self.api_key)
    }

    /// Send a request and decode the response body, without judging the
    /// embedded `success` flag; callers that care inspect it.
    pub(super) async fn send(&self, request: RequestBuilder) -> Result<Value, MarketplaceError> {
        let response = request
            .send()
            .await
            .map_err(|err| MarketplaceError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(MarketplaceError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|err| MarketplaceError::Deserialize(err.to_string()))
    }
}

pub(super) fn envelope_success(body: &Value) -> bool {
    body.get("success").and_then(Value::as_bool).unwrap_or(false)
}

pub(super) fn envelope_message(body: &Value) -> String {
    body.get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string()
}
