use serde::{Deserialize, Serialize};
use slashbot_core::GENERIC_ERROR_TEXT;

/// Visibility of the final message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    InChannel,
    Ephemeral,
}

impl ResponseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InChannel => "in_channel",
            Self::Ephemeral => "ephemeral",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionButton {
    pub name: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionButton>,
}

/// Body posted to a response URL.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<ResponseKind>,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_original: Option<bool>,
}

impl MessagePayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }

    pub fn replace_original(mut self, replace: bool) -> Self {
        self.replace_original = Some(replace);
        self
    }

    pub fn tagged(mut self, kind: ResponseKind) -> Self {
        self.response_type = Some(kind);
        self
    }

    /// The fixed message delivered when deferred work fails.
    pub fn internal_error() -> Self {
        Self::text(GENERIC_ERROR_TEXT).tagged(ResponseKind::Ephemeral)
    }
}

/// What the platform receives synchronously.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckResponse {
    Empty,
    Declared(ResponseKind),
}

#[derive(Serialize)]
struct AckBody {
    response_type: ResponseKind,
}

impl AckResponse {
    /// Body of the 200 response; empty for [`AckResponse::Empty`].
    pub fn body(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Declared(kind) => serde_json::to_string(&AckBody { response_type: *kind })
                .unwrap_or_else(|_| format!("{{\"response_type\":\"{}\"}}", kind.as_str())),
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, Self::Declared(_))
    }
}
