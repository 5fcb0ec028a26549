use crate::spotify::{build_http, send};
use crate::wire::decode_grant;
use crate::{ApiError, TokenEndpoint, TokenGrant};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

/// Client for the local proxy handlers that hold the client secret.
pub struct TokenProxyClient {
    http: Client,
    refresh_url: String,
    exchange_url: String,
}

impl TokenProxyClient {
    pub fn new(
        refresh_url: impl Into<String>,
        exchange_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            http: build_http(timeout)?,
            refresh_url: refresh_url.into(),
            exchange_url: exchange_url.into(),
        })
    }
}

#[async_trait]
impl TokenEndpoint for TokenProxyClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ApiError> {
        let req = self
            .http
            .post(&self.refresh_url)
            .json(&json!({ "refresh_token": refresh_token }));
        let (status, body) = send(req).await?;
        decode_grant(status, &body)
    }

    async fn exchange(&self, code: &str) -> Result<TokenGrant, ApiError> {
        let req = self
            .http
            .post(&self.exchange_url)
            .json(&json!({ "code": code }));
        let (status, body) = send(req).await?;
        decode_grant(status, &body)
    }
}
