use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod ui;

use crate::audio::{driver::SongbirdGateway, SessionRegistry};
use crate::bot::{handlers::CommandContext, terminal, JukeboxBot};
use crate::config::Config;
use crate::sources::{LocalLibrary, SourceManager, TrackResolver, YouTubeResolver};
use crate::ui::DiscordMessenger;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    // Fuentes de canciones
    let youtube: Arc<dyn TrackResolver> = Arc::new(YouTubeResolver::new(
        config.youtube_api_key.clone(),
        config.region_code.clone(),
    )?);
    let local = config.music_folder.as_ref().map(|folder| {
        info!("📁 Biblioteca local en {}", folder.display());
        Arc::new(LocalLibrary::new(folder.clone())) as Arc<dyn TrackResolver>
    });
    let resolver = Arc::new(SourceManager::new(youtube, local));

    // Voz y chat
    let songbird = Songbird::serenity();
    let http = Arc::new(Http::new(&config.discord_token));
    let chat = Arc::new(DiscordMessenger::new(http));
    let voice = Arc::new(SongbirdGateway::new(songbird.clone())?);

    let registry = Arc::new(SessionRegistry::new(
        voice,
        chat.clone(),
        config.session_settings(),
    ));
    let commands = Arc::new(CommandContext::new(
        registry.clone(),
        resolver,
        config.prefix.clone(),
    ));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    // Construir cliente
    let handler = JukeboxBot::new(commands.clone(), chat);
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Comandos desde la terminal
    let shutdown = CancellationToken::new();
    tokio::spawn(terminal::run(commands, shutdown.clone()));

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("⚠️ No se pudo escuchar Ctrl+C: {}", e);
                    return;
                }
                info!("⚠️ Señal de shutdown recibida, cerrando...");
                shutdown.cancel();
            }
            _ = shutdown.cancelled() => {}
        }
        registry.destroy_all().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
