//! # Bot Module
//!
//! Discord front end: turns prefixed chat messages into commands and keeps
//! sessions in sync with voice state changes reported by the gateway.
//!
//! - [`commands`] - command table, parsing and precondition flags
//! - [`handlers`] - command execution against the session registry
//! - [`terminal`] - operator commands typed on stdin (`/help`, `/exit`, ...)

pub mod commands;
pub mod handlers;
pub mod terminal;

use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Message, Ready, UserId, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{audio::Requester, ui::ChatGateway};
use commands::{DiscordOrigin, Origin};
use handlers::{dispatch, CommandContext, Outcome};

/// Manejador de eventos de Discord
pub struct JukeboxBot {
    commands: Arc<CommandContext>,
    chat: Arc<dyn ChatGateway>,
}

impl JukeboxBot {
    pub fn new(commands: Arc<CommandContext>, chat: Arc<dyn ChatGateway>) -> Self {
        Self { commands, chat }
    }
}

/// Canal de voz en el que está el usuario, según la caché
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
        info!("💬 Prefijo de comandos: {}", self.commands.prefix);
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(parsed) = commands::parse(&self.commands.prefix, &msg.content) else {
            return;
        };

        let origin = Origin::Discord(DiscordOrigin {
            guild_id: msg.guild_id,
            text_channel: msg.channel_id,
            author: Requester {
                user_id: msg.author.id,
                name: msg
                    .author
                    .global_name
                    .clone()
                    .unwrap_or_else(|| msg.author.name.clone()),
            },
            voice_channel: msg
                .guild_id
                .and_then(|guild_id| user_voice_channel(&ctx, guild_id, msg.author.id)),
        });
        info!(
            "💬 Comando {} de {} en {:?}",
            parsed.name, msg.author.name, msg.guild_id
        );

        let card = match dispatch(&self.commands, &parsed, &origin).await {
            Ok(Outcome::Reply(card)) => card,
            Ok(Outcome::Silent | Outcome::Exit) => return,
            Err(e) => {
                warn!("⚠️ Comando {} falló: {}", parsed.name, e);
                e.to_card()
            }
        };
        if let Err(e) = self.chat.send(msg.channel_id, card).await {
            error!("❌ No se pudo responder en {}: {}", msg.channel_id, e);
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        if new.user_id != ctx.cache.current_user().id || new.channel_id.is_some() {
            return;
        }
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let previous = old.and_then(|state| state.channel_id);
        info!("🔌 Bot desconectado del canal de voz en guild {}", guild_id);
        self.commands.registry.voice_lost(guild_id, previous);
    }
}
