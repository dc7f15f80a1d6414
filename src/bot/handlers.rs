use serenity::model::id::GuildId;
use std::{fmt::Write, sync::Arc, time::Instant};
use tracing::info;

use super::commands::{self, CommandKind, CommandSpec, DiscordOrigin, Origin, ParsedCommand};
use crate::{
    audio::{
        queue::PlayerState,
        session::ConnectionState,
        Request, SessionRegistry,
    },
    error::{CommandError, MusicError, MusicResult, PlaybackError},
    sources::TrackResolver,
    ui::Card,
};

/// Lo que queda por hacer después de un comando
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Reply(Card),
    /// Las tarjetas las publica la sesión
    Silent,
    Exit,
}

fn reply(text: impl Into<String>) -> Outcome {
    Outcome::Reply(Card::info(text))
}

/// Dependencias compartidas por todos los comandos
pub struct CommandContext {
    pub registry: Arc<SessionRegistry>,
    pub resolver: Arc<dyn TrackResolver>,
    pub prefix: String,
    started_at: Instant,
}

impl CommandContext {
    pub fn new(
        registry: Arc<SessionRegistry>,
        resolver: Arc<dyn TrackResolver>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            resolver,
            prefix: prefix.into(),
            started_at: Instant::now(),
        }
    }

    fn prefix_for(&self, origin: &Origin) -> &str {
        if origin.is_terminal() {
            commands::TERMINAL_PREFIX
        } else {
            &self.prefix
        }
    }
}

/// Busca, valida y ejecuta un comando
pub async fn dispatch(
    ctx: &CommandContext,
    parsed: &ParsedCommand,
    origin: &Origin,
) -> MusicResult<Outcome> {
    let spec = commands::find(&parsed.name)
        .ok_or_else(|| CommandError::Unknown(parsed.name.clone()))?;
    commands::check(spec, origin, &parsed.args)?;
    let args = parsed.args.as_slice();

    match spec.kind {
        CommandKind::Play => play(ctx, discord(spec, origin)?, args).await,
        CommandKind::Skip => {
            ctx.registry.skip(guild(spec, origin)?).await?;
            Ok(reply("⏭️ Saltando canción"))
        }
        CommandKind::Stop => stop(ctx, guild(spec, origin)?).await,
        CommandKind::Pause => {
            ctx.registry.pause(guild(spec, origin)?).await?;
            Ok(reply("⏸️ Reproducción pausada"))
        }
        CommandKind::Resume => {
            ctx.registry.resume(guild(spec, origin)?).await?;
            Ok(reply("▶️ Reproducción reanudada"))
        }
        CommandKind::Queue => queue(ctx, guild(spec, origin)?, args).await,
        CommandKind::Clear => {
            ctx.registry.clear(guild(spec, origin)?).await?;
            Ok(reply("🗑️ Cola vaciada"))
        }
        CommandKind::Join => join(ctx, spec, discord(spec, origin)?).await,
        CommandKind::Leave => {
            ctx.registry.leave(guild(spec, origin)?).await?;
            Ok(reply("👋 Desconectado del canal de voz"))
        }
        CommandKind::Volume => volume(ctx, guild(spec, origin)?, args).await,
        CommandKind::Ping => Ok(reply(format!(
            "🏓 Pong! En línea hace {}",
            humantime::format_duration(std::time::Duration::from_secs(
                ctx.started_at.elapsed().as_secs()
            ))
        ))),
        CommandKind::Help => {
            let topic = args.first().map(String::as_str);
            Ok(Outcome::Reply(commands::help_card(
                ctx.prefix_for(origin),
                origin,
                topic,
            )?))
        }
        CommandKind::Sessions => sessions(ctx).await,
        CommandKind::Exit => Ok(Outcome::Exit),
    }
}

fn discord<'a>(spec: &CommandSpec, origin: &'a Origin) -> Result<&'a DiscordOrigin, CommandError> {
    match origin {
        Origin::Discord(origin) => Ok(origin),
        Origin::Terminal => Err(CommandError::DiscordOnly(spec.name)),
    }
}

fn guild(spec: &CommandSpec, origin: &Origin) -> Result<GuildId, CommandError> {
    origin.guild_id().ok_or(CommandError::GuildOnly(spec.name))
}

async fn play(ctx: &CommandContext, origin: &DiscordOrigin, args: &[String]) -> MusicResult<Outcome> {
    let guild_id = origin.guild_id.ok_or(CommandError::GuildOnly("play"))?;
    let voice_channel = origin.voice_channel.ok_or(CommandError::NotInVoiceChannel)?;

    let query = args.join(" ");
    let track = ctx.resolver.resolve(&query).await?;
    info!("🔍 [{}] \"{}\" → {}", guild_id, query, track.title);

    let request = Request::new(track, origin.author.clone(), origin.text_channel);
    ctx.registry.enqueue(guild_id, voice_channel, request).await?;
    Ok(Outcome::Silent)
}

async fn join(ctx: &CommandContext, spec: &CommandSpec, origin: &DiscordOrigin) -> MusicResult<Outcome> {
    let guild_id = origin.guild_id.ok_or(CommandError::GuildOnly(spec.name))?;
    let channel = origin.voice_channel.ok_or(CommandError::NotInVoiceChannel)?;
    ctx.registry.join(guild_id, channel).await?;
    Ok(reply(format!("🔊 Conectado a <#{}>", channel)))
}

/// Detiene la música y sale del canal
async fn stop(ctx: &CommandContext, guild_id: GuildId) -> MusicResult<Outcome> {
    match ctx.registry.stop(guild_id).await {
        Ok(()) | Err(MusicError::Playback(PlaybackError::NotPlaying)) => {}
        Err(e) => return Err(e),
    }
    ctx.registry.leave(guild_id).await?;
    Ok(reply("⏹️ Música detenida, ¡chau!"))
}

async fn queue(ctx: &CommandContext, guild_id: GuildId, args: &[String]) -> MusicResult<Outcome> {
    let snapshot = ctx.registry.snapshot(guild_id).await?;
    if snapshot.queue.items.is_empty() {
        return Err(PlaybackError::EmptyQueue.into());
    }
    let page = args
        .first()
        .and_then(|arg| arg.parse::<usize>().ok())
        .unwrap_or(1);
    Ok(Outcome::Reply(Card::Queue(snapshot.queue.page(page))))
}

async fn volume(ctx: &CommandContext, guild_id: GuildId, args: &[String]) -> MusicResult<Outcome> {
    if args.is_empty() {
        let snapshot = ctx.registry.snapshot(guild_id).await?;
        return Ok(reply(format!("🔊 Volumen actual: {}%", snapshot.queue.volume.percent())));
    }
    let volume = ctx.registry.set_volume(guild_id, &args[0]).await?;
    Ok(reply(format!("🔊 Volumen: {}%", volume.percent())))
}

async fn sessions(ctx: &CommandContext) -> MusicResult<Outcome> {
    let guilds = ctx.registry.guilds();
    if guilds.is_empty() {
        return Ok(reply("No hay sesiones activas"));
    }

    let mut text = format!("{} sesiones activas", guilds.len());
    for guild_id in guilds {
        let snapshot = ctx.registry.snapshot(guild_id).await?;
        let connection = match snapshot.connection {
            ConnectionState::Connected(channel) => format!("canal {}", channel),
            ConnectionState::Disconnected => "desconectado".to_string(),
        };
        let state = match snapshot.queue.state {
            PlayerState::Idle => "en espera",
            PlayerState::Playing => "reproduciendo",
            PlayerState::Paused => "pausado",
        };
        let _ = write!(
            text,
            "\n{}: {}, {}, {} en cola",
            guild_id,
            connection,
            state,
            snapshot.queue.items.len()
        );
    }
    Ok(reply(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            testing::{guild as test_guild, track, voice_channel, FakeVoice, RecordingChat},
            Requester, SessionSettings,
        },
        error::{ConnectionError, ResolutionError},
        sources::MockTrackResolver,
    };
    use pretty_assertions::assert_eq;
    use serenity::model::id::{ChannelId, UserId};

    struct Fixture {
        ctx: CommandContext,
        voice: FakeVoice,
        chat: RecordingChat,
    }

    fn fixture(resolver: MockTrackResolver) -> Fixture {
        let voice = FakeVoice::default();
        let chat = RecordingChat::default();
        let registry = SessionRegistry::new(
            Arc::new(voice.clone()),
            Arc::new(chat.clone()),
            SessionSettings::default(),
        );
        Fixture {
            ctx: CommandContext::new(Arc::new(registry), Arc::new(resolver), "$"),
            voice,
            chat,
        }
    }

    fn resolver_for(ids: &'static [&'static str]) -> MockTrackResolver {
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve().returning(move |query| {
            ids.iter()
                .find(|id| **id == query)
                .map(|id| track(id))
                .ok_or_else(|| ResolutionError::NotFound(query.to_string()))
        });
        resolver
    }

    fn from_member(in_voice: bool) -> Origin {
        Origin::Discord(DiscordOrigin {
            guild_id: Some(test_guild()),
            text_channel: ChannelId::new(100),
            author: Requester {
                user_id: UserId::new(7),
                name: "ana".into(),
            },
            voice_channel: in_voice.then(voice_channel),
        })
    }

    async fn run(fixture: &Fixture, line: &str, origin: &Origin) -> MusicResult<Outcome> {
        let prefix = fixture.ctx.prefix_for(origin).to_string();
        let parsed = commands::parse(&prefix, line).expect("not a command");
        dispatch(&fixture.ctx, &parsed, origin).await
    }

    #[tokio::test]
    async fn test_play_resolves_and_enqueues() {
        let f = fixture(resolver_for(&["a", "b"]));
        let member = from_member(true);

        assert_eq!(run(&f, "$play a", &member).await, Ok(Outcome::Silent));
        assert_eq!(run(&f, "$p b", &member).await, Ok(Outcome::Silent));

        assert_eq!(f.voice.opened(), vec!["a"]);
        assert_eq!(f.chat.sent_kinds(), vec!["now_playing", "enqueued"]);
    }

    #[tokio::test]
    async fn test_play_requires_voice_channel() {
        let f = fixture(resolver_for(&["a"]));
        assert_eq!(
            run(&f, "$play a", &from_member(false)).await,
            Err(MusicError::from(CommandError::NotInVoiceChannel))
        );
        assert!(f.voice.journal().is_empty());
    }

    #[tokio::test]
    async fn test_play_without_results() {
        let f = fixture(resolver_for(&[]));
        assert_eq!(
            run(&f, "$play nothing here", &from_member(true)).await,
            Err(MusicError::from(ResolutionError::NotFound("nothing here".into())))
        );
        assert!(f.ctx.registry.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let f = fixture(MockTrackResolver::new());
        assert_eq!(
            run(&f, "$dance", &from_member(true)).await,
            Err(MusicError::from(CommandError::Unknown("dance".into())))
        );
    }

    #[tokio::test]
    async fn test_stop_halts_and_leaves() {
        let f = fixture(resolver_for(&["a", "b"]));
        let member = from_member(true);
        run(&f, "$play a", &member).await.unwrap();
        run(&f, "$play b", &member).await.unwrap();

        assert!(matches!(run(&f, "$bye", &member).await, Ok(Outcome::Reply(_))));

        assert_eq!(f.voice.opened(), vec!["a"]);
        assert!(f.voice.journal().contains(&"leave:50".to_string()));
    }

    #[tokio::test]
    async fn test_stop_when_not_connected() {
        let f = fixture(MockTrackResolver::new());
        assert_eq!(
            run(&f, "$stop", &from_member(true)).await,
            Err(MusicError::from(ConnectionError::NotConnected))
        );
    }

    #[tokio::test]
    async fn test_queue_lists_entries() {
        let f = fixture(resolver_for(&["a", "b"]));
        let member = from_member(true);
        assert_eq!(
            run(&f, "$q", &member).await,
            Err(MusicError::from(PlaybackError::EmptyQueue))
        );
        run(&f, "$play a", &member).await.unwrap();
        run(&f, "$play b", &member).await.unwrap();

        let Ok(Outcome::Reply(Card::Queue(page))) = run(&f, "$queue", &member).await else {
            panic!("expected queue card");
        };
        assert_eq!(page.total_items, 2);
        assert!(page.items[0].is_current);
    }

    #[tokio::test]
    async fn test_skip_reply_and_advance() {
        let f = fixture(resolver_for(&["a", "b"]));
        let member = from_member(true);
        run(&f, "$play a", &member).await.unwrap();
        run(&f, "$play b", &member).await.unwrap();

        assert_eq!(
            run(&f, "$skip", &member).await,
            Ok(reply("⏭️ Saltando canción"))
        );
        f.ctx.registry.snapshot(test_guild()).await.unwrap();
        assert_eq!(f.voice.opened(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_volume_show_and_set() {
        let f = fixture(MockTrackResolver::new());
        let member = from_member(true);
        assert_eq!(
            run(&f, "$volume", &member).await,
            Ok(reply("🔊 Volumen actual: 30%"))
        );
        assert_eq!(run(&f, "$vol 0.5", &member).await, Ok(reply("🔊 Volumen: 50%")));
        assert_eq!(run(&f, "$vol 5", &member).await, Ok(reply("🔊 Volumen: 30%")));
    }

    #[tokio::test]
    async fn test_guild_commands_rejected_from_terminal() {
        let f = fixture(MockTrackResolver::new());
        assert_eq!(
            run(&f, "/skip", &Origin::Terminal).await,
            Err(MusicError::from(CommandError::GuildOnly("skip")))
        );
        assert_eq!(
            run(&f, "/play a", &Origin::Terminal).await,
            Err(MusicError::from(CommandError::DiscordOnly("play")))
        );
    }

    #[tokio::test]
    async fn test_terminal_exit_and_sessions() {
        let f = fixture(resolver_for(&["a"]));
        run(&f, "$play a", &from_member(true)).await.unwrap();

        assert_eq!(run(&f, "/exit", &Origin::Terminal).await, Ok(Outcome::Exit));
        let Ok(Outcome::Reply(Card::Info(text))) = run(&f, "/sessions", &Origin::Terminal).await
        else {
            panic!("expected sessions listing");
        };
        assert_eq!(text, "1 sesiones activas\n1: canal 50, reproduciendo, 1 en cola");
    }

    #[tokio::test]
    async fn test_join_and_leave() {
        let f = fixture(MockTrackResolver::new());
        let member = from_member(true);

        assert_eq!(
            run(&f, "$summon", &member).await,
            Ok(reply("🔊 Conectado a <#50>"))
        );
        run(&f, "$leave", &member).await.unwrap();
        assert_eq!(
            run(&f, "$leave", &member).await,
            Err(MusicError::from(ConnectionError::NotConnected))
        );
        assert_eq!(f.voice.journal(), vec!["join:50", "leave:50"]);
    }
}
