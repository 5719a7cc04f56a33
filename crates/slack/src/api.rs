//! Call/response access to the platform's Web API.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RemoteApiError {
    #[error("remote api request for `{method}` failed: {message}")]
    Transport { method: String, message: String },
    #[error("remote api response for `{method}` could not be decoded: {message}")]
    Decode { method: String, message: String },
    #[error("remote api `{method}` returned error `{error}`")]
    Api { method: String, error: String },
}

#[async_trait]
pub trait RemoteApiGateway: Send + Sync {
    async fn call(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<Map<String, Value>, RemoteApiError>;
}

/// Interprets a decoded response body; a truthy `error` or `ok: false` is a failure.
pub fn check_response(method: &str, body: Value) -> Result<Map<String, Value>, RemoteApiError> {
    let Value::Object(body) = body else {
        return Err(RemoteApiError::Decode {
            method: method.to_owned(),
            message: "response body is not a JSON object".to_owned(),
        });
    };

    let error = body.get("error").and_then(Value::as_str).filter(|error| !error.is_empty());
    let not_ok = matches!(body.get("ok"), Some(Value::Bool(false)));
    if error.is_some() || not_ok {
        return Err(RemoteApiError::Api {
            method: method.to_owned(),
            error: error.unwrap_or("unknown_error").to_owned(),
        });
    }

    Ok(body)
}

#[derive(Clone)]
pub struct SlackApiClient {
    client: Client,
    base_url: String,
    bot_token: SecretString,
}

impl fmt::Debug for SlackApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackApiClient")
            .field("base_url", &self.base_url)
            .field("bot_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl SlackApiClient {
    pub fn new(client: Client, base_url: impl Into<String>, bot_token: SecretString) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { client, base_url, bot_token }
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        bot_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, RemoteApiError> {
        let client = Client::builder().timeout(timeout).build().map_err(|error| {
            RemoteApiError::Transport {
                method: "client.build".to_owned(),
                message: error.to_string(),
            }
        })?;
        Ok(Self::new(client, base_url, bot_token))
    }

    pub fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }
}

#[async_trait]
impl RemoteApiGateway for SlackApiClient {
    async fn call(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<Map<String, Value>, RemoteApiError> {
        let response = self
            .client
            .post(self.method_url(method))
            .bearer_auth(self.bot_token.expose_secret())
            .form(params)
            .send()
            .await
            .map_err(|error| RemoteApiError::Transport {
                method: method.to_owned(),
                message: error.to_string(),
            })?;

        let status = response.status();
        let body: Value = response.json().await.map_err(|error| RemoteApiError::Decode {
            method: method.to_owned(),
            message: format!("status {status}: {error}"),
        })?;

        match check_response(method, body) {
            Ok(body) => {
                debug!(event_name = "egress.slack_api.ok", method, "remote api call succeeded");
                Ok(body)
            }
            Err(error) => {
                warn!(
                    event_name = "egress.slack_api.error",
                    method,
                    error = %error,
                    "remote api call returned an error"
                );
                Err(error)
            }
        }
    }
}
