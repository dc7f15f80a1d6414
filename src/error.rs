//! Error taxonomy for the bot.
//!
//! Errors are grouped by the layer that produces them. Everything that can
//! reach a command boundary converts into [`MusicError`], which knows how to
//! render itself as a user-facing error card.

use serenity::model::id::ChannelId;
use std::time::Duration;
use thiserror::Error;

use crate::ui::Card;

/// Fallos del ciclo de vida de la conexión de voz
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("ya estoy conectado al canal {0}")]
    AlreadyConnected(ChannelId),

    #[error("no estoy conectado a ningún canal de voz")]
    NotConnected,

    #[error("no se pudo entrar al canal de voz: {0}")]
    JoinFailed(String),

    #[error("no se pudo salir del canal de voz: {0}")]
    LeaveFailed(String),

    #[error("tiempo de espera agotado al conectar ({0:?})")]
    Timeout(Duration),
}

/// Fallos de control de reproducción
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlaybackError {
    #[error("no hay nada sonando")]
    NotPlaying,

    #[error("ya estoy pausado")]
    AlreadyPaused,

    #[error("no estoy pausado")]
    NotPaused,

    #[error("la cola está vacía")]
    EmptyQueue,

    #[error("la cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    #[error("no se pudo abrir el stream de audio: {0}")]
    StreamOpen(String),

    #[error("control del stream falló: {0}")]
    Sink(String),

    #[error("tiempo de espera agotado al abrir el stream ({0:?})")]
    Timeout(Duration),
}

/// Fallos del servicio de búsqueda de canciones
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolutionError {
    #[error("nada encontrado para \"{0}\"")]
    NotFound(String),

    #[error("error en la API externa: {0}")]
    UpstreamApi(String),

    #[error("URL inválida: {0}")]
    InvalidUrl(String),
}

/// Fallos detectados por el despachador antes de ejecutar un comando
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommandError {
    #[error("comando desconocido: {0}")]
    Unknown(String),

    #[error("el comando {0} solo funciona dentro de un servidor")]
    GuildOnly(&'static str),

    #[error("el comando {0} solo funciona desde Discord")]
    DiscordOnly(&'static str),

    #[error("el comando {0} solo funciona desde la terminal")]
    TerminalOnly(&'static str),

    #[error("faltan argumentos, uso: {0}")]
    ArgsRequired(&'static str),

    #[error("tienes que estar en un canal de voz")]
    NotInVoiceChannel,
}

/// Error de alto nivel que puede llegar a la frontera de un comando
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MusicError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("la sesión del servidor ya no está disponible")]
    SessionClosed,
}

pub type MusicResult<T> = Result<T, MusicError>;

impl MusicError {
    /// Título corto para la tarjeta de error
    pub fn title(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Ops",
            Self::Playback(PlaybackError::StreamOpen(_) | PlaybackError::Timeout(_)) => {
                "Problema con el audio"
            }
            Self::Playback(_) => "No se puede",
            Self::Resolution(ResolutionError::NotFound(_)) => "Nada encontrado",
            Self::Resolution(_) => "Error en la búsqueda",
            Self::Command(CommandError::ArgsRequired(_)) => "Faltan argumentos",
            Self::Command(_) => "Ops!",
            Self::SessionClosed => "Error interno",
        }
    }

    /// Tarjeta que se envía al canal de texto que originó el comando
    pub fn to_card(&self) -> Card {
        let mut description = self.to_string();
        if let Some(first) = description.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        Card::Error {
            title: self.title().to_string(),
            description,
        }
    }
}
