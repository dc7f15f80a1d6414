//! # UI Module
//!
//! Everything the bot shows in a text channel is a [`Card`]. Cards are plain
//! data; [`embeds`] renders them as Discord embeds and [`Card::to_plain_text`]
//! renders them for the terminal. [`ChatGateway`] is the seam the playback
//! layer talks through, and [`messenger::DiscordMessenger`] implements it on
//! top of the serenity HTTP client.

pub mod embeds;
pub mod messenger;

use async_trait::async_trait;
use serenity::model::id::{ChannelId, MessageId};
use std::fmt::Write;

use crate::{
    audio::{queue::QueuePage, request::Requester},
    sources::TrackRef,
};

pub use messenger::DiscordMessenger;

/// Referencia a un mensaje ya publicado, suficiente para borrarlo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

/// Contenido de un mensaje del bot
#[derive(Debug, Clone, PartialEq)]
pub enum Card {
    Enqueued {
        track: TrackRef,
        requester: Requester,
        position: usize,
    },
    NowPlaying {
        track: TrackRef,
        requester: Requester,
    },
    Info(String),
    Error {
        title: String,
        description: String,
    },
    Queue(QueuePage),
    Help {
        title: String,
        description: String,
        fields: Vec<(String, String)>,
    },
}

impl Card {
    pub fn info(text: impl Into<String>) -> Self {
        Self::Info(text.into())
    }

    /// Nombre corto del tipo de tarjeta, para logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Enqueued { .. } => "enqueued",
            Self::NowPlaying { .. } => "now_playing",
            Self::Info(_) => "info",
            Self::Error { .. } => "error",
            Self::Queue(_) => "queue",
            Self::Help { .. } => "help",
        }
    }

    /// Versión en texto plano para la terminal
    pub fn to_plain_text(&self) -> String {
        match self {
            Self::Enqueued {
                track,
                requester,
                position,
            } => format!(
                "#{} en cola: {} (pedida por {})",
                position, track.title, requester.name
            ),
            Self::NowPlaying { track, requester } => {
                format!("Reproduciendo: {} (pedida por {})", track.title, requester.name)
            }
            Self::Info(text) => text.clone(),
            Self::Error { title, description } => format!("{}: {}", title, description),
            Self::Queue(page) => {
                let mut out = format!(
                    "Cola ({} canciones, página {}/{})",
                    page.total_items, page.current_page, page.total_pages
                );
                for item in &page.items {
                    let marker = if item.is_current { "▶" } else { " " };
                    let _ = write!(
                        out,
                        "\n{} {}. {} - {}",
                        marker, item.position, item.title, item.requester
                    );
                }
                out
            }
            Self::Help {
                title,
                description,
                fields,
            } => {
                let mut out = format!("{}\n{}", title, description);
                for (name, value) in fields {
                    let _ = write!(out, "\n  {} - {}", name, value);
                }
                out
            }
        }
    }
}

/// Canal de salida hacia el chat
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn send(&self, channel_id: ChannelId, card: Card) -> anyhow::Result<MessageHandle>;

    async fn delete(&self, handle: MessageHandle) -> anyhow::Result<()>;
}
