//! Inbound webhook request model and callback-target extraction.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;

pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const SIGNATURE_HEADER: &str = "x-slack-signature";

/// A request exactly as the HTTP layer received it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InboundRequest {
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
}

impl InboundRequest {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self { headers: BTreeMap::new(), body: body.into() }
    }

    /// Header names are matched case-insensitively.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.header(TIMESTAMP_HEADER)
    }

    pub fn signature(&self) -> Option<&str> {
        self.header(SIGNATURE_HEADER)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Form fields of the body; repeated keys collapse into an array.
    pub fn form_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        for (key, value) in url::form_urlencoded::parse(&self.body) {
            let value = Value::String(value.into_owned());
            match fields.get_mut(&*key) {
                Some(Value::Array(values)) => values.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    fields.insert(key.into_owned(), value);
                }
            }
        }
        fields
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("request carries neither `response_url` nor a `payload` field")]
    MissingCallback,
    #[error("`payload` field is not a JSON object: {0}")]
    InvalidPayload(String),
    #[error("`payload` field does not contain a `response_url`")]
    MissingPayloadCallback,
}

/// Handler input: the interactive payload when present, otherwise the form fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandContent {
    fields: Map<String, Value>,
}

impl CommandContent {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        match self.fields.get(key)? {
            Value::String(value) => Some(value.as_str()),
            Value::Array(values) => values.first().and_then(Value::as_str),
            _ => None,
        }
    }

    /// Free-form arguments typed after a slash command.
    pub fn text(&self) -> &str {
        self.str_field("text").unwrap_or_default()
    }

    pub fn channel_id(&self) -> Option<&str> {
        self.str_field("channel_id").or_else(|| {
            self.fields.get("channel").and_then(|channel| channel.get("id")).and_then(Value::as_str)
        })
    }

    /// `value` of the first clicked action of an interactive callback.
    pub fn first_action_value(&self) -> Option<&str> {
        self.fields
            .get("actions")
            .and_then(Value::as_array)
            .and_then(|actions| actions.first())
            .and_then(|action| action.get("value"))
            .and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// Where the deferred outcome gets posted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackTarget(String);

impl CallbackTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallbackTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves the handler content and callback target from form fields.
///
/// A top-level `response_url` wins. Otherwise the JSON-encoded `payload` field of an
/// interactive-component callback is decoded, becomes the handler content, and must
/// itself carry `response_url`.
pub fn extract(
    fields: Map<String, Value>,
) -> Result<(CommandContent, CallbackTarget), ExtractError> {
    if let Some(url) = non_empty_str(fields.get("response_url")) {
        let target = CallbackTarget::new(url);
        return Ok((CommandContent::new(fields), target));
    }

    let raw_payload = non_empty_str(fields.get("payload")).ok_or(ExtractError::MissingCallback)?;
    let payload = match serde_json::from_str::<Value>(raw_payload) {
        Ok(Value::Object(payload)) => payload,
        Ok(other) => return Err(ExtractError::InvalidPayload(format!("found {other}"))),
        Err(error) => return Err(ExtractError::InvalidPayload(error.to_string())),
    };

    let url = non_empty_str(payload.get("response_url"))
        .ok_or(ExtractError::MissingPayloadCallback)?
        .to_owned();
    Ok((CommandContent::new(payload), CallbackTarget::new(url)))
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).map(str::trim).filter(|value| !value.is_empty())
}
