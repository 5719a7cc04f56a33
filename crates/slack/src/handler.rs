use async_trait::async_trait;
use thiserror::Error;

use crate::{api::RemoteApiError, inbound::CommandContent, message::MessagePayload};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("required field `{0}` is missing from the request")]
    MissingField(&'static str),
    #[error(transparent)]
    RemoteApi(#[from] RemoteApiError),
    #[error("handler failure: {0}")]
    Failed(String),
}

/// Business logic behind one route. Runs off the acknowledgment path.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, content: &CommandContent) -> Result<MessagePayload, HandlerError>;
}

/// Adapts an async closure into a [`CommandHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> CommandHandler for FnHandler<F>
where
    F: Fn(CommandContent) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<MessagePayload, HandlerError>> + Send,
{
    async fn handle(&self, content: &CommandContent) -> Result<MessagePayload, HandlerError> {
        (self.0)(content.clone()).await
    }
}
