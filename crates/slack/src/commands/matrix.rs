use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::{
    api::RemoteApiGateway,
    handler::{CommandHandler, HandlerError},
    inbound::CommandContent,
    message::MessagePayload,
};

/// Pairs every channel member with the next one, wrapping around, and renders the
/// pairs as a fixed-width table.
#[derive(Clone)]
pub struct ChannelMatrixHandler {
    gateway: Arc<dyn RemoteApiGateway>,
}

impl ChannelMatrixHandler {
    pub fn new(gateway: Arc<dyn RemoteApiGateway>) -> Self {
        Self { gateway }
    }

    async fn member_ids(&self, channel_id: &str) -> Result<Vec<String>, HandlerError> {
        let response =
            self.gateway.call("conversations.members", &[("channel", channel_id)]).await?;
        let members = response
            .get("members")
            .and_then(Value::as_array)
            .ok_or(HandlerError::MissingField("members"))?;
        Ok(members.iter().filter_map(Value::as_str).map(str::to_owned).collect())
    }

    async fn real_name(&self, user_id: &str) -> Result<String, HandlerError> {
        let response = self.gateway.call("users.info", &[("user", user_id)]).await?;
        response
            .get("user")
            .and_then(|user| user.get("real_name"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or(HandlerError::MissingField("user.real_name"))
    }
}

#[async_trait]
impl CommandHandler for ChannelMatrixHandler {
    async fn handle(&self, content: &CommandContent) -> Result<MessagePayload, HandlerError> {
        let channel_id = content.channel_id().ok_or(HandlerError::MissingField("channel_id"))?;

        let mut names = Vec::new();
        for user_id in self.member_ids(channel_id).await? {
            names.push(self.real_name(&user_id).await?);
        }
        debug!(
            event_name = "command.matrix.members_resolved",
            channel_id,
            member_count = names.len(),
            "resolved channel member names"
        );

        let pairs: Vec<(&str, &str)> = names
            .iter()
            .enumerate()
            .map(|(index, name)| (name.as_str(), names[(index + 1) % names.len()].as_str()))
            .collect();
        Ok(MessagePayload::text(render_pairs(&pairs)))
    }
}

pub fn render_pairs(pairs: &[(&str, &str)]) -> String {
    let mut lines = vec!["```".to_owned()];
    lines.extend(pairs.iter().map(|(left, right)| format!("{left:30} | {right:30}")));
    lines.push("```".to_owned());
    lines.join("\n")
}
