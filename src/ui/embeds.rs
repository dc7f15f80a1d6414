use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use super::Card;
use crate::{
    audio::{queue::QueuePage, request::Requester},
    sources::TrackRef,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Jukebox";

/// Convierte una tarjeta en el embed que se publica
pub fn render(card: &Card) -> CreateEmbed {
    match card {
        Card::Enqueued {
            track,
            requester,
            position,
        } => create_enqueued_embed(track, requester, *position),
        Card::NowPlaying { track, requester } => create_now_playing_embed(track, requester),
        Card::Info(text) => create_info_embed(text),
        Card::Error { title, description } => create_error_embed(title, description),
        Card::Queue(page) => create_queue_embed(page),
        Card::Help {
            title,
            description,
            fields,
        } => create_help_embed(title, description, fields),
    }
}

/// Campos comunes a las tarjetas de una canción
fn track_fields(mut embed: CreateEmbed, track: &TrackRef, requester: &Requester) -> CreateEmbed {
    if let Some(artist) = &track.artist {
        embed = embed.field("🎤 Artista", artist, true);
    }

    embed = match track.duration {
        Some(duration) => embed.field("⏱️ Duración", format_duration(duration), true),
        None => embed.field("⏱️ Duración", "🔴 En vivo", true),
    };

    embed = embed.field("👤 Solicitado por", format!("<@{}>", requester.user_id), true);

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }
    if let Some(url) = track.page_url() {
        embed = embed.url(url);
    }
    embed
}

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &TrackRef, requester: &Requester) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN);

    track_fields(embed, track, requester)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_enqueued_embed(track: &TrackRef, requester: &Requester, position: usize) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title(format!("✅ #{} en la cola", position))
        .description(format!("**{}** se ha agregado a la cola de reproducción", track.title))
        .color(colors::MUSIC_PURPLE);

    track_fields(embed, track, requester)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente cuando llegue su turno",
        ))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(page: &QueuePage) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if page.total_items == 0 {
        return embed
            .description("😴 **La cola está vacía**")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    let mut description = String::new();
    for item in &page.items {
        let duration = item
            .duration
            .map(|dur| format!(" `[{}]`", format_duration(dur)))
            .unwrap_or_default();
        let marker = if item.is_current { "▶️ " } else { "" };
        description.push_str(&format!(
            "{}**{}**. {}{} · {}\n",
            marker, item.position, item.title, duration, item.requester
        ));
    }

    let footer = if page.total_pages > 1 {
        format!(
            "Página {} de {} • {} canciones",
            page.current_page, page.total_pages, page.total_items
        )
    } else {
        format!("{} • {} canciones", STANDARD_FOOTER, page.total_items)
    };

    embed
        .description(description)
        .footer(CreateEmbedFooter::new(footer))
        .timestamp(Timestamp::now())
}

/// Crea un embed de ayuda
pub fn create_help_embed(title: &str, description: &str, fields: &[(String, String)]) -> CreateEmbed {
    fields
        .iter()
        .fold(
            CreateEmbed::default()
                .title(title)
                .description(description)
                .color(colors::INFO_BLUE),
            |embed, (name, value)| embed.field(name, value, false),
        )
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de información
pub fn create_info_embed(text: &str) -> CreateEmbed {
    CreateEmbed::default()
        .description(text)
        .color(colors::INFO_BLUE)
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(212)), "3:32");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1:02:03");
    }
}
