use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{
        mpsc::{self, UnboundedReceiver, UnboundedSender},
        oneshot,
    },
    time::timeout,
};
use tracing::{debug, error, info, warn};

use super::{
    queue::{EnqueueOutcome, PlaybackQueue, QueueSnapshot, Volume},
    request::Request,
    voice::{SinkEvent, SinkId, VoiceConnection, VoiceGateway},
};
use crate::{
    error::{ConnectionError, MusicError, MusicResult, PlaybackError},
    ui::ChatGateway,
};

/// Parámetros de cada sesión, derivados de la configuración
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub default_volume: Volume,
    pub max_queue_size: usize,
    pub join_timeout: Duration,
    pub stream_open_timeout: Duration,
    pub notification_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_volume: Volume::default(),
            max_queue_size: 1000,
            join_timeout: Duration::from_secs(10),
            stream_open_timeout: Duration::from_secs(20),
            notification_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected(ChannelId),
}

/// Estado visible de una sesión
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub guild_id: GuildId,
    pub connection: ConnectionState,
    pub queue: QueueSnapshot,
}

impl SessionSnapshot {
    pub fn empty(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            connection: ConnectionState::Disconnected,
            queue: QueueSnapshot::default(),
        }
    }
}

type Reply<T> = oneshot::Sender<MusicResult<T>>;

/// Buzón del actor de la sesión
pub(crate) enum SessionMessage {
    Enqueue {
        voice_channel: ChannelId,
        request: Box<Request>,
        reply: Reply<EnqueueOutcome>,
    },
    Join {
        channel_id: ChannelId,
        reply: Reply<ChannelId>,
    },
    Leave {
        reply: Reply<()>,
    },
    Skip {
        reply: Reply<()>,
    },
    Stop {
        reply: Reply<()>,
    },
    Pause {
        reply: Reply<()>,
    },
    Resume {
        reply: Reply<()>,
    },
    Clear {
        reply: oneshot::Sender<()>,
    },
    SetVolume {
        input: String,
        reply: oneshot::Sender<Volume>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    /// El gateway sacó al bot del canal
    VoiceLost {
        channel_id: Option<ChannelId>,
    },
    Sink {
        sink_id: SinkId,
        event: SinkEvent,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Estado de reproducción de un servidor.
///
/// Corre como una tarea propia y procesa su buzón de a un mensaje por vez:
/// comandos, eventos de fin de stream y cambios de conexión nunca se pisan.
pub struct Session {
    guild_id: GuildId,
    voice: Arc<dyn VoiceGateway>,
    connection: Option<Arc<dyn VoiceConnection>>,
    queue: PlaybackQueue,
    join_timeout: Duration,
}

impl Session {
    fn new(
        guild_id: GuildId,
        voice: Arc<dyn VoiceGateway>,
        chat: Arc<dyn ChatGateway>,
        settings: &SessionSettings,
        events: UnboundedSender<SessionMessage>,
    ) -> Self {
        Self {
            guild_id,
            voice,
            connection: None,
            queue: PlaybackQueue::new(guild_id, chat, events, settings),
            join_timeout: settings.join_timeout,
        }
    }

    /// Arranca el actor de un servidor y devuelve su handle
    pub fn spawn(
        guild_id: GuildId,
        voice: Arc<dyn VoiceGateway>,
        chat: Arc<dyn ChatGateway>,
        settings: &SessionSettings,
    ) -> SessionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Self::new(guild_id, voice, chat, settings, tx.clone());
        tokio::spawn(session.run(rx));
        SessionHandle { guild_id, tx }
    }

    async fn run(mut self, mut mailbox: UnboundedReceiver<SessionMessage>) {
        info!("🎛️ [{}] Sesión iniciada", self.guild_id);
        while let Some(message) = mailbox.recv().await {
            if !self.handle(message).await {
                break;
            }
        }
        info!("🛑 [{}] Sesión terminada", self.guild_id);
    }

    /// Procesa un mensaje; devuelve `false` cuando la sesión debe terminar
    async fn handle(&mut self, message: SessionMessage) -> bool {
        match message {
            SessionMessage::Enqueue {
                voice_channel,
                request,
                reply,
            } => {
                let result = self.enqueue(voice_channel, *request).await;
                let _ = reply.send(result);
            }
            SessionMessage::Join { channel_id, reply } => {
                let result = self.swap(channel_id).await.map_err(MusicError::from);
                let _ = reply.send(result);
            }
            SessionMessage::Leave { reply } => {
                let _ = reply.send(self.disconnect().await.map_err(MusicError::from));
            }
            SessionMessage::Skip { reply } => {
                let _ = reply.send(self.queue.skip().await.map_err(MusicError::from));
            }
            SessionMessage::Stop { reply } => {
                let _ = reply.send(self.queue.stop().await.map_err(MusicError::from));
            }
            SessionMessage::Pause { reply } => {
                let _ = reply.send(self.queue.pause().map_err(MusicError::from));
            }
            SessionMessage::Resume { reply } => {
                let _ = reply.send(self.queue.resume().map_err(MusicError::from));
            }
            SessionMessage::Clear { reply } => {
                self.queue.clear().await;
                let _ = reply.send(());
            }
            SessionMessage::SetVolume { input, reply } => {
                let _ = reply.send(self.queue.set_volume(&input));
            }
            SessionMessage::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            SessionMessage::VoiceLost { channel_id } => self.voice_lost(channel_id),
            SessionMessage::Sink { sink_id, event } => {
                self.queue.on_sink_event(sink_id, event).await;
            }
            SessionMessage::Shutdown { reply } => {
                if self.connection.is_some() {
                    if let Err(e) = self.disconnect().await {
                        warn!("⚠️ [{}] Error al desconectar durante el cierre: {}", self.guild_id, e);
                    }
                }
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    pub fn connection_state(&self) -> ConnectionState {
        match &self.connection {
            Some(connection) => ConnectionState::Connected(connection.channel_id()),
            None => ConnectionState::Disconnected,
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            guild_id: self.guild_id,
            connection: self.connection_state(),
            queue: self.queue.snapshot(),
        }
    }

    async fn enqueue(
        &mut self,
        voice_channel: ChannelId,
        request: Request,
    ) -> MusicResult<EnqueueOutcome> {
        self.swap(voice_channel).await?;
        self.queue.enqueue(request).await
    }

    pub async fn connect(&mut self, channel_id: ChannelId) -> Result<ChannelId, ConnectionError> {
        if let Some(connection) = &self.connection {
            return Err(ConnectionError::AlreadyConnected(connection.channel_id()));
        }

        info!("🔊 [{}] Conectando al canal {}", self.guild_id, channel_id);
        let connection = match timeout(self.join_timeout, self.voice.join(self.guild_id, channel_id)).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                error!("❌ [{}] No se pudo conectar a {}: {}", self.guild_id, channel_id, e);
                return Err(e);
            }
            Err(_) => {
                error!("⏰ [{}] Timeout conectando a {}", self.guild_id, channel_id);
                return Err(ConnectionError::Timeout(self.join_timeout));
            }
        };

        self.queue.bind(connection.clone());
        self.connection = Some(connection);
        info!("✅ [{}] Conectado al canal {}", self.guild_id, channel_id);
        Ok(channel_id)
    }

    /// Conecta al canal pedido, moviéndose si hace falta
    pub async fn swap(&mut self, channel_id: ChannelId) -> Result<ChannelId, ConnectionError> {
        if let ConnectionState::Connected(current) = self.connection_state() {
            if current == channel_id {
                return Ok(channel_id);
            }
            debug!("🔀 [{}] Cambiando de {} a {}", self.guild_id, current, channel_id);
            if let Err(e) = self.disconnect().await {
                warn!("⚠️ [{}] Error al salir de {}: {}", self.guild_id, current, e);
            }
        }
        self.connect(channel_id).await
    }

    /// Sale del canal; la conexión se descarta aunque la salida falle
    pub async fn disconnect(&mut self) -> Result<(), ConnectionError> {
        let connection = self.connection.take().ok_or(ConnectionError::NotConnected)?;
        self.queue.unbind();
        connection.leave().await?;
        info!("👋 [{}] Desconectado del canal {}", self.guild_id, connection.channel_id());
        Ok(())
    }

    fn voice_lost(&mut self, channel_id: Option<ChannelId>) {
        let Some(connection) = &self.connection else {
            return;
        };
        if channel_id.is_some_and(|lost| lost != connection.channel_id()) {
            debug!("[{}] Aviso de salida de un canal anterior, ignorado", self.guild_id);
            return;
        }
        warn!("🔌 [{}] El bot fue desconectado del canal de voz", self.guild_id);
        self.connection = None;
        self.queue.unbind();
    }
}

/// Handle clonable para hablar con el actor de una sesión
#[derive(Clone)]
pub struct SessionHandle {
    guild_id: GuildId,
    tx: UnboundedSender<SessionMessage>,
}

impl SessionHandle {
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// `true` cuando el actor ya no existe
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionMessage,
    ) -> MusicResult<T> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| MusicError::SessionClosed)?;
        response.await.map_err(|_| MusicError::SessionClosed)
    }

    pub async fn enqueue(
        &self,
        voice_channel: ChannelId,
        request: Request,
    ) -> MusicResult<EnqueueOutcome> {
        self.call(|reply| SessionMessage::Enqueue {
            voice_channel,
            request: Box::new(request),
            reply,
        })
        .await?
    }

    pub async fn join(&self, channel_id: ChannelId) -> MusicResult<ChannelId> {
        self.call(|reply| SessionMessage::Join { channel_id, reply })
            .await?
    }

    pub async fn leave(&self) -> MusicResult<()> {
        self.call(|reply| SessionMessage::Leave { reply }).await?
    }

    pub async fn skip(&self) -> MusicResult<()> {
        self.call(|reply| SessionMessage::Skip { reply }).await?
    }

    pub async fn stop(&self) -> MusicResult<()> {
        self.call(|reply| SessionMessage::Stop { reply }).await?
    }

    pub async fn pause(&self) -> MusicResult<()> {
        self.call(|reply| SessionMessage::Pause { reply }).await?
    }

    pub async fn resume(&self) -> MusicResult<()> {
        self.call(|reply| SessionMessage::Resume { reply }).await?
    }

    pub async fn clear(&self) -> MusicResult<()> {
        self.call(|reply| SessionMessage::Clear { reply }).await
    }

    pub async fn set_volume(&self, input: impl Into<String>) -> MusicResult<Volume> {
        let input = input.into();
        self.call(|reply| SessionMessage::SetVolume { input, reply })
            .await
    }

    pub async fn snapshot(&self) -> MusicResult<SessionSnapshot> {
        self.call(|reply| SessionMessage::Snapshot { reply }).await
    }

    pub fn voice_lost(&self, channel_id: Option<ChannelId>) {
        let _ = self.tx.send(SessionMessage::VoiceLost { channel_id });
    }

    /// Desconecta y termina el actor
    pub async fn shutdown(&self) -> MusicResult<()> {
        self.call(|reply| SessionMessage::Shutdown { reply }).await
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("guild_id", &self.guild_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Sesión de un servidor que no tiene nada que controlar
pub(crate) fn nothing_playing() -> MusicError {
    PlaybackError::NotPlaying.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        queue::PlayerState,
        testing::{guild, request, voice_channel, FakeVoice, RecordingChat},
    };
    use pretty_assertions::assert_eq;

    fn spawn_with(settings: SessionSettings) -> (SessionHandle, FakeVoice, RecordingChat) {
        let voice = FakeVoice::default();
        let chat = RecordingChat::default();
        let handle = Session::spawn(
            guild(),
            Arc::new(voice.clone()),
            Arc::new(chat.clone()),
            &settings,
        );
        (handle, voice, chat)
    }

    fn spawn() -> (SessionHandle, FakeVoice, RecordingChat) {
        spawn_with(SessionSettings::default())
    }

    fn other_channel() -> ChannelId {
        ChannelId::new(51)
    }

    #[tokio::test]
    async fn test_enqueue_connects_and_plays() {
        let (session, voice, _chat) = spawn();

        let outcome = session.enqueue(voice_channel(), request("a")).await.unwrap();

        assert_eq!(outcome, EnqueueOutcome::Started { position: 1 });
        assert_eq!(voice.journal(), vec!["join:50", "open:a"]);
        let snapshot = session.snapshot().await.unwrap();
        assert_eq!(snapshot.connection, ConnectionState::Connected(voice_channel()));
        assert_eq!(snapshot.queue.state, PlayerState::Playing);
    }

    #[tokio::test]
    async fn test_join_same_channel_is_noop() {
        let (session, voice, _chat) = spawn();
        session.join(voice_channel()).await.unwrap();
        session.join(voice_channel()).await.unwrap();
        assert_eq!(voice.journal(), vec!["join:50"]);
    }

    #[tokio::test]
    async fn test_swap_leaves_then_joins() {
        let (session, voice, _chat) = spawn();
        session.enqueue(voice_channel(), request("a")).await.unwrap();

        session.join(other_channel()).await.unwrap();

        assert_eq!(
            voice.journal(),
            vec!["join:50", "open:a", "close:a", "leave:50", "join:51"]
        );
        let snapshot = session.snapshot().await.unwrap();
        assert_eq!(snapshot.connection, ConnectionState::Connected(other_channel()));
        assert_eq!(snapshot.queue.state, PlayerState::Idle);
    }

    #[tokio::test]
    async fn test_swap_survives_failed_leave() {
        let (session, voice, _chat) = spawn();
        session.join(voice_channel()).await.unwrap();
        voice.fail_leave();

        session.join(other_channel()).await.unwrap();

        let snapshot = session.snapshot().await.unwrap();
        assert_eq!(snapshot.connection, ConnectionState::Connected(other_channel()));
    }

    #[tokio::test]
    async fn test_leave_when_disconnected_fails() {
        let (session, _voice, _chat) = spawn();
        assert_eq!(
            session.leave().await,
            Err(MusicError::Connection(ConnectionError::NotConnected))
        );
    }

    #[tokio::test]
    async fn test_failed_leave_still_disconnects() {
        let (session, voice, _chat) = spawn();
        session.join(voice_channel()).await.unwrap();
        voice.fail_leave();

        let err = session.leave().await.unwrap_err();

        assert!(matches!(err, MusicError::Connection(ConnectionError::LeaveFailed(_))));
        let snapshot = session.snapshot().await.unwrap();
        assert_eq!(snapshot.connection, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_join_failure_leaves_session_disconnected() {
        let (session, voice, _chat) = spawn();
        voice.fail_join();

        let err = session.enqueue(voice_channel(), request("a")).await.unwrap_err();

        assert!(matches!(err, MusicError::Connection(ConnectionError::JoinFailed(_))));
        let snapshot = session.snapshot().await.unwrap();
        assert_eq!(snapshot.connection, ConnectionState::Disconnected);
        assert!(snapshot.queue.items.is_empty());
    }

    #[tokio::test]
    async fn test_join_timeout() {
        let (session, voice, _chat) = spawn_with(SessionSettings {
            join_timeout: Duration::from_millis(20),
            ..SessionSettings::default()
        });
        voice.delay_join(Duration::from_secs(5));

        let err = session.join(voice_channel()).await.unwrap_err();

        assert_eq!(
            err,
            MusicError::Connection(ConnectionError::Timeout(Duration::from_millis(20)))
        );
    }

    #[tokio::test]
    async fn test_skip_sequence_through_actor() {
        let (session, voice, _chat) = spawn();
        for id in ["a", "b", "c"] {
            session.enqueue(voice_channel(), request(id)).await.unwrap();
        }

        session.skip().await.unwrap();
        session.skip().await.unwrap();
        session.skip().await.unwrap();

        assert_eq!(voice.opened(), vec!["a", "b", "c"]);
        let snapshot = session.snapshot().await.unwrap();
        assert_eq!(snapshot.queue.state, PlayerState::Idle);
        assert_eq!(
            session.skip().await,
            Err(MusicError::Playback(PlaybackError::NotPlaying))
        );
    }

    #[tokio::test]
    async fn test_natural_end_is_processed_in_order() {
        let (session, voice, _chat) = spawn();
        session.enqueue(voice_channel(), request("a")).await.unwrap();
        session.enqueue(voice_channel(), request("b")).await.unwrap();

        voice.finish("a");
        let snapshot = session.snapshot().await.unwrap();

        let current: Vec<_> = snapshot
            .queue
            .items
            .iter()
            .filter(|item| item.is_current)
            .map(|item| item.position)
            .collect();
        assert_eq!(current, vec![2]);
    }

    #[tokio::test]
    async fn test_voice_lost_drops_connection_without_leave() {
        let (session, voice, _chat) = spawn();
        session.enqueue(voice_channel(), request("a")).await.unwrap();

        session.voice_lost(Some(voice_channel()));
        let snapshot = session.snapshot().await.unwrap();

        assert_eq!(snapshot.connection, ConnectionState::Disconnected);
        assert_eq!(snapshot.queue.state, PlayerState::Idle);
        assert!(!voice.journal().iter().any(|entry| entry.starts_with("leave")));
    }

    #[tokio::test]
    async fn test_voice_lost_for_previous_channel_is_ignored() {
        let (session, _voice, _chat) = spawn();
        session.join(other_channel()).await.unwrap();

        session.voice_lost(Some(voice_channel()));
        let snapshot = session.snapshot().await.unwrap();

        assert_eq!(snapshot.connection, ConnectionState::Connected(other_channel()));
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_and_closes_mailbox() {
        let (session, voice, _chat) = spawn();
        session.enqueue(voice_channel(), request("a")).await.unwrap();

        session.shutdown().await.unwrap();

        assert_eq!(voice.journal(), vec!["join:50", "open:a", "close:a", "leave:50"]);
        assert_eq!(session.snapshot().await, Err(MusicError::SessionClosed));
    }

    #[tokio::test]
    async fn test_slow_chat_does_not_block_playback() {
        let (session, voice, chat) = spawn_with(SessionSettings {
            notification_timeout: Duration::from_millis(20),
            ..SessionSettings::default()
        });
        chat.delay_sends(Duration::from_secs(5));

        session.enqueue(voice_channel(), request("a")).await.unwrap();
        session.enqueue(voice_channel(), request("b")).await.unwrap();
        session.skip().await.unwrap();
        session.snapshot().await.unwrap();

        assert_eq!(voice.opened(), vec!["a", "b"]);
        assert!(chat.sent().is_empty());
    }

    #[tokio::test]
    async fn test_volume_persists_for_session() {
        let (session, _voice, _chat) = spawn();
        assert_eq!(session.set_volume("0.5").await.unwrap().get(), 0.5);
        assert_eq!(session.snapshot().await.unwrap().queue.volume.get(), 0.5);
        assert_eq!(session.set_volume("loud").await.unwrap(), Volume::default());
    }
}
