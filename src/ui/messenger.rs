use async_trait::async_trait;
use serenity::{builder::CreateMessage, http::Http, model::id::ChannelId};
use std::sync::Arc;
use tracing::debug;

use super::{embeds, Card, ChatGateway, MessageHandle};

/// Publica tarjetas en Discord como embeds
pub struct DiscordMessenger {
    http: Arc<Http>,
}

impl DiscordMessenger {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChatGateway for DiscordMessenger {
    async fn send(&self, channel_id: ChannelId, card: Card) -> anyhow::Result<MessageHandle> {
        let kind = card.kind();
        let message = CreateMessage::new().embed(embeds::render(&card));
        let sent = channel_id.send_message(&self.http, message).await?;
        debug!("💬 Tarjeta {} enviada a {} ({})", kind, channel_id, sent.id);
        Ok(MessageHandle {
            channel_id,
            message_id: sent.id,
        })
    }

    async fn delete(&self, handle: MessageHandle) -> anyhow::Result<()> {
        handle
            .channel_id
            .delete_message(&self.http, handle.message_id)
            .await?;
        Ok(())
    }
}
