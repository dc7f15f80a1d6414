//! Contracts between a guild session and the voice pipeline.
//!
//! A [`VoiceGateway`] joins channels and hands back a [`VoiceConnection`];
//! the connection opens one [`StreamSink`] per track. Every sink reports the
//! end of its life exactly once through the [`CompletionNotifier`] it was
//! opened with: the notifier is consumed on delivery, so a second report is
//! impossible by construction.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::{fmt, sync::Arc};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use super::{queue::Volume, session::SessionMessage};
use crate::{
    error::{ConnectionError, PlaybackError},
    sources::TrackRef,
};

/// Identifica un stream dentro de su sesión; nunca se reutiliza
pub type SinkId = u64;

/// Motivo por el que terminó un stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// La canción llegó a su fin
    Finished,
    /// Terminada a pedido para pasar a la siguiente
    Skip,
    /// Terminada a pedido sin avanzar la cola
    Stop,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finished => write!(f, "finished"),
            Self::Skip => write!(f, "skip"),
            Self::Stop => write!(f, "stop"),
        }
    }
}

/// La única notificación que emite un stream en su vida
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Ended(EndReason),
    Errored(String),
}

/// Opciones con las que se abre un stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamOptions {
    pub volume: Volume,
}

/// Entrega la notificación de fin de un stream al actor de su sesión
pub struct CompletionNotifier {
    sink_id: SinkId,
    events: UnboundedSender<SessionMessage>,
}

impl CompletionNotifier {
    pub(crate) fn new(sink_id: SinkId, events: UnboundedSender<SessionMessage>) -> Self {
        Self { sink_id, events }
    }

    pub fn sink_id(&self) -> SinkId {
        self.sink_id
    }

    pub fn ended(self, reason: EndReason) {
        self.deliver(SinkEvent::Ended(reason));
    }

    pub fn errored(self, error: impl fmt::Display) {
        self.deliver(SinkEvent::Errored(error.to_string()));
    }

    fn deliver(self, event: SinkEvent) {
        let message = SessionMessage::Sink {
            sink_id: self.sink_id,
            event,
        };
        if self.events.send(message).is_err() {
            debug!("Sesión cerrada, evento del stream {} descartado", self.sink_id);
        }
    }
}

impl fmt::Debug for CompletionNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionNotifier")
            .field("sink_id", &self.sink_id)
            .finish()
    }
}

/// Un stream de audio abierto sobre una conexión de voz
pub trait StreamSink: Send + Sync {
    fn pause(&self) -> Result<(), PlaybackError>;

    fn resume(&self) -> Result<(), PlaybackError>;

    fn set_volume(&self, volume: Volume) -> Result<(), PlaybackError>;

    /// Pide terminar el stream; la notificación llega después con `reason`
    fn end(&self, reason: EndReason) -> Result<(), PlaybackError>;

    /// Libera el stream sin notificar
    fn close(&self);
}

/// Une el bot a canales de voz
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, ConnectionError>;
}

/// Conexión activa a un canal de voz
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    fn channel_id(&self) -> ChannelId;

    async fn leave(&self) -> Result<(), ConnectionError>;

    async fn open_stream(
        &self,
        track: &TrackRef,
        options: StreamOptions,
        notifier: CompletionNotifier,
    ) -> Result<Box<dyn StreamSink>, PlaybackError>;
}
