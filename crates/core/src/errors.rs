use thiserror::Error;

use crate::signature::VerificationError;

/// Text delivered to the requester whenever deferred work fails for any reason.
pub const GENERIC_ERROR_TEXT: &str =
    "Sorry, something went wrong while handling that command. Please try again.";

/// Errors that end a request before it is acknowledged.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("no route registered for `{0}`")]
    UnknownRoute(String),
}

/// Errors raised after a request was acknowledged.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("handler failure: {0}")]
    Handler(String),
    #[error("remote api failure: {0}")]
    RemoteApi(String),
    #[error("callback delivery failure: {0}")]
    Delivery(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "The request could not be verified or was incomplete.",
            Self::NotFound { .. } => "No command is registered at this address.",
            Self::Internal { .. } => GENERIC_ERROR_TEXT,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    fn with_correlation_id(mut self, correlation_id: String) -> Self {
        match &mut self {
            Self::BadRequest { correlation_id: id, .. }
            | Self::NotFound { correlation_id: id, .. }
            | Self::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        self
    }
}

impl RequestError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        InterfaceError::from(self).with_correlation_id(correlation_id.into())
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        InterfaceError::from(self).with_correlation_id(correlation_id.into())
    }
}

impl From<RequestError> for InterfaceError {
    fn from(value: RequestError) -> Self {
        match value {
            RequestError::Verification(error) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            RequestError::Malformed(message) => {
                Self::BadRequest { message, correlation_id: "unassigned".to_owned() }
            }
            RequestError::UnknownRoute(path) => Self::NotFound {
                message: format!("no route registered for `{path}`"),
                correlation_id: "unassigned".to_owned(),
            },
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Handler(message)
            | ApplicationError::RemoteApi(message)
            | ApplicationError::Delivery(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}
