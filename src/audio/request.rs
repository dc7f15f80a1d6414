use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::{
    sources::TrackRef,
    ui::{Card, ChatGateway, MessageHandle},
};

/// Usuario que pidió una canción
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub user_id: UserId,
    pub name: String,
}

/// Un pedido de reproducción: la canción, quién la pidió y desde qué canal
#[derive(Debug, Clone)]
pub struct Request {
    pub track: TrackRef,
    pub requester: Requester,
    pub text_channel: ChannelId,
    enqueued_msgs: Vec<MessageHandle>,
}

impl Request {
    pub fn new(track: TrackRef, requester: Requester, text_channel: ChannelId) -> Self {
        Self {
            track,
            requester,
            text_channel,
            enqueued_msgs: Vec::new(),
        }
    }

    /// Mensajes "agregada a la cola" todavía visibles
    pub fn enqueued_messages(&self) -> &[MessageHandle] {
        &self.enqueued_msgs
    }

    fn take_enqueued_messages(&mut self) -> Vec<MessageHandle> {
        std::mem::take(&mut self.enqueued_msgs)
    }
}

/// Publica las tarjetas de la cola en el chat y recuerda cuáles borrar después.
///
/// Nada de esto puede fallar hacia afuera: cada envío y cada borrado tiene
/// su propio límite de tiempo y los errores solo se registran.
pub struct Announcer {
    guild_id: GuildId,
    chat: Arc<dyn ChatGateway>,
    now_playing: Option<MessageHandle>,
    timeout: Duration,
}

impl Announcer {
    pub fn new(guild_id: GuildId, chat: Arc<dyn ChatGateway>, timeout: Duration) -> Self {
        Self {
            guild_id,
            chat,
            now_playing: None,
            timeout,
        }
    }

    pub fn now_playing(&self) -> Option<&MessageHandle> {
        self.now_playing.as_ref()
    }

    pub async fn announce_enqueued(&self, request: &mut Request, position: usize) {
        let card = Card::Enqueued {
            track: request.track.clone(),
            requester: request.requester.clone(),
            position,
        };
        if let Some(handle) = self.send(request.text_channel, card).await {
            request.enqueued_msgs.push(handle);
        }
    }

    /// Anuncia la canción actual, retira el anuncio anterior y los avisos de cola de esta canción
    pub async fn announce_now_playing(&mut self, request: &mut Request) {
        let card = Card::NowPlaying {
            track: request.track.clone(),
            requester: request.requester.clone(),
        };
        let sent = self.send(request.text_channel, card).await;

        if let Some(previous) = std::mem::replace(&mut self.now_playing, sent) {
            self.delete(previous).await;
        }
        self.retract(request).await;
    }

    /// Borra los avisos de cola de una canción que ya no va a sonar
    pub async fn retract(&self, request: &mut Request) {
        for handle in request.take_enqueued_messages() {
            self.delete(handle).await;
        }
    }

    /// Borra el anuncio de la canción actual, si lo hay
    pub async fn retire_now_playing(&mut self) {
        if let Some(previous) = self.now_playing.take() {
            self.delete(previous).await;
        }
    }

    async fn send(&self, channel_id: ChannelId, card: Card) -> Option<MessageHandle> {
        match self.bounded(self.chat.send(channel_id, card)).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("💬 [{}] No se pudo enviar la tarjeta: {}", self.guild_id, e);
                None
            }
        }
    }

    async fn delete(&self, handle: MessageHandle) {
        match self.bounded(self.chat.delete(handle)).await {
            Ok(()) => debug!("🗑️ [{}] Mensaje {} borrado", self.guild_id, handle.message_id),
            Err(e) => warn!(
                "💬 [{}] No se pudo borrar el mensaje {}: {}",
                self.guild_id, handle.message_id, e
            ),
        }
    }

    async fn bounded<T>(&self, call: impl Future<Output = anyhow::Result<T>>) -> anyhow::Result<T> {
        timeout(self.timeout, call)
            .await
            .map_err(|_| anyhow::anyhow!("tiempo agotado ({:?})", self.timeout))?
    }
}
