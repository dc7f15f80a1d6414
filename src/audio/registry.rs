use dashmap::{mapref::entry::Entry, DashMap};
use futures::future::join_all;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    queue::{EnqueueOutcome, Volume},
    request::Request,
    session::{nothing_playing, Session, SessionHandle, SessionSettings, SessionSnapshot},
    voice::VoiceGateway,
};
use crate::{
    error::{ConnectionError, MusicResult},
    ui::ChatGateway,
};

/// Sesiones activas, una por servidor
pub struct SessionRegistry {
    sessions: DashMap<GuildId, SessionHandle>,
    voice: Arc<dyn VoiceGateway>,
    chat: Arc<dyn ChatGateway>,
    settings: SessionSettings,
}

impl SessionRegistry {
    pub fn new(
        voice: Arc<dyn VoiceGateway>,
        chat: Arc<dyn ChatGateway>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            voice,
            chat,
            settings,
        }
    }

    fn spawn(&self, guild_id: GuildId) -> SessionHandle {
        info!("🆕 [{}] Creando sesión", guild_id);
        Session::spawn(guild_id, self.voice.clone(), self.chat.clone(), &self.settings)
    }

    /// Devuelve la sesión del servidor, creándola si no existe.
    ///
    /// La entrada del mapa queda bloqueada mientras se decide, así que dos
    /// llamadas simultáneas nunca crean dos sesiones.
    pub fn get_or_create(&self, guild_id: GuildId) -> SessionHandle {
        match self.sessions.entry(guild_id) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_closed() {
                    warn!("♻️ [{}] La sesión anterior había terminado, se reemplaza", guild_id);
                    occupied.insert(self.spawn(guild_id));
                }
                occupied.get().clone()
            }
            Entry::Vacant(vacant) => vacant.insert(self.spawn(guild_id)).clone(),
        }
    }

    pub fn get(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions.get(&guild_id).map(|handle| handle.clone())
    }

    pub fn guilds(&self) -> Vec<GuildId> {
        let mut guilds: Vec<_> = self.sessions.iter().map(|entry| *entry.key()).collect();
        guilds.sort();
        guilds
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Desconecta y descarta la sesión del servidor
    pub async fn destroy(&self, guild_id: GuildId) {
        let Some((_, handle)) = self.sessions.remove(&guild_id) else {
            return;
        };
        if let Err(e) = handle.shutdown().await {
            warn!("⚠️ [{}] Error cerrando la sesión: {}", guild_id, e);
        }
    }

    /// Cierra todas las sesiones en paralelo
    pub async fn destroy_all(&self) {
        let handles: Vec<SessionHandle> = self
            .guilds()
            .into_iter()
            .filter_map(|guild_id| self.sessions.remove(&guild_id))
            .map(|(_, handle)| handle)
            .collect();
        info!("🧹 Cerrando {} sesiones", handles.len());

        let results = join_all(handles.iter().map(|handle| handle.shutdown())).await;
        for (handle, result) in handles.iter().zip(results) {
            if let Err(e) = result {
                warn!("⚠️ [{}] Error cerrando la sesión: {}", handle.guild_id(), e);
            }
        }
    }

    pub async fn enqueue(
        &self,
        guild_id: GuildId,
        voice_channel: ChannelId,
        request: Request,
    ) -> MusicResult<EnqueueOutcome> {
        self.get_or_create(guild_id)
            .enqueue(voice_channel, request)
            .await
    }

    pub async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<ChannelId> {
        self.get_or_create(guild_id).join(channel_id).await
    }

    pub async fn leave(&self, guild_id: GuildId) -> MusicResult<()> {
        match self.get(guild_id) {
            Some(session) => session.leave().await,
            None => Err(ConnectionError::NotConnected.into()),
        }
    }

    pub async fn skip(&self, guild_id: GuildId) -> MusicResult<()> {
        self.existing(guild_id)?.skip().await
    }

    pub async fn stop(&self, guild_id: GuildId) -> MusicResult<()> {
        self.existing(guild_id)?.stop().await
    }

    pub async fn pause(&self, guild_id: GuildId) -> MusicResult<()> {
        self.existing(guild_id)?.pause().await
    }

    pub async fn resume(&self, guild_id: GuildId) -> MusicResult<()> {
        self.existing(guild_id)?.resume().await
    }

    pub async fn clear(&self, guild_id: GuildId) -> MusicResult<()> {
        match self.get(guild_id) {
            Some(session) => session.clear().await,
            None => Ok(()),
        }
    }

    pub async fn set_volume(&self, guild_id: GuildId, input: &str) -> MusicResult<Volume> {
        self.get_or_create(guild_id).set_volume(input).await
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> MusicResult<SessionSnapshot> {
        match self.get(guild_id) {
            Some(session) => session.snapshot().await,
            None => Ok(SessionSnapshot::empty(guild_id)),
        }
    }

    /// El gateway avisó que el bot ya no está en `channel_id`
    pub fn voice_lost(&self, guild_id: GuildId, channel_id: Option<ChannelId>) {
        if let Some(session) = self.get(guild_id) {
            session.voice_lost(channel_id);
        }
    }

    fn existing(&self, guild_id: GuildId) -> MusicResult<SessionHandle> {
        self.get(guild_id).ok_or_else(nothing_playing)
    }
}
