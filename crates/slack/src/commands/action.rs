use async_trait::async_trait;

use crate::{
    handler::{CommandHandler, HandlerError},
    inbound::CommandContent,
    message::MessagePayload,
};

/// Answers a button click with the clicked button's value, leaving the original message.
#[derive(Clone, Copy, Debug, Default)]
pub struct ActionEchoHandler;

#[async_trait]
impl CommandHandler for ActionEchoHandler {
    async fn handle(&self, content: &CommandContent) -> Result<MessagePayload, HandlerError> {
        let value = content.first_action_value().ok_or(HandlerError::MissingField("actions"))?;
        Ok(MessagePayload::text(value).replace_original(false))
    }
}
