//! `reqwest` implementation of [`RemoteApi`].

use super::RemoteApi;
use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde_json::Value;
use std::time::Duration;
use stockline_engine::{Method, RemoteRequest, Table, Timestamp};

/// REST client for `/api/{table}` endpoints with bearer authentication.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpRemote {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.api_url, &config.api_token, config.http_timeout)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a response into its JSON body, or a status error for non-2xx.
    async fn read_body(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| Error::MalformedResponse(e.to_string()))
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn send(&self, request: RemoteRequest) -> Result<Value> {
        let mut builder = self
            .client
            .request(to_reqwest(request.method), self.url(&request.path()))
            .bearer_auth(&self.token);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        tracing::debug!(%request, status = response.status().as_u16(), "Remote responded");
        Self::read_body(response).await
    }

    async fn fetch(&self, table: Table, since: Option<Timestamp>) -> Result<Vec<Value>> {
        let mut builder = self
            .client
            .get(self.url(&format!("/api/{table}")))
            .bearer_auth(&self.token);
        if let Some(since) = since {
            builder = builder.query(&[(
                "updated_since",
                since.to_rfc3339_opts(SecondsFormat::Micros, true),
            )]);
        }

        match Self::read_body(builder.send().await?).await? {
            Value::Array(items) => Ok(items),
            other => Err(Error::MalformedResponse(format!(
                "expected an array from GET /api/{table}, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
