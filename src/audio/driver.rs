//! Voice pipeline backed by songbird.
//!
//! Remote tracks go through yt-dlp via [`YoutubeDl`]; local tracks are read
//! from disk. Both are probed before playback so a broken source fails at
//! open time instead of producing a silent track.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{Compose, File, Input, YoutubeDl},
    tracks::{PlayMode, Track, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

use super::{
    queue::Volume,
    voice::{
        CompletionNotifier, EndReason, StreamOptions, StreamSink, VoiceConnection, VoiceGateway,
    },
};
use crate::{
    error::{ConnectionError, PlaybackError},
    sources::{Locator, TrackRef},
};

/// Une el bot a canales de voz a través del manager de songbird
pub struct SongbirdGateway {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdGateway {
    pub fn new(manager: Arc<Songbird>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent("Mozilla/5.0 (compatible; Jukebox Discord Bot)")
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;
        Ok(Self { manager, http })
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, ConnectionError> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| ConnectionError::JoinFailed(e.to_string()))?;

        Ok(Arc::new(SongbirdConnection {
            guild_id,
            channel_id,
            call,
            manager: self.manager.clone(),
            http: self.http.clone(),
        }))
    }
}

struct SongbirdConnection {
    guild_id: GuildId,
    channel_id: ChannelId,
    call: Arc<tokio::sync::Mutex<Call>>,
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdConnection {
    async fn build_input(&self, track: &TrackRef) -> Result<Input, PlaybackError> {
        match &track.locator {
            Locator::Url(url) => {
                let mut ytdl = YoutubeDl::new(self.http.clone(), url.clone());
                ytdl.aux_metadata()
                    .await
                    .map_err(|e| PlaybackError::StreamOpen(format!("{}: {}", url, e)))?;
                Ok(ytdl.into())
            }
            Locator::File(path) => {
                tokio::fs::metadata(path)
                    .await
                    .map_err(|e| PlaybackError::StreamOpen(format!("{}: {}", path.display(), e)))?;
                Ok(File::new(path.clone()).into())
            }
        }
    }
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    async fn leave(&self) -> Result<(), ConnectionError> {
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|e| ConnectionError::LeaveFailed(e.to_string()))
    }

    async fn open_stream(
        &self,
        track: &TrackRef,
        options: StreamOptions,
        notifier: CompletionNotifier,
    ) -> Result<Box<dyn StreamSink>, PlaybackError> {
        let input = self.build_input(track).await?;
        let handle = {
            let mut call = self.call.lock().await;
            call.play(prepared_track(input, options.volume))
        };

        let sink = SongbirdSink {
            handle,
            notifier: Arc::new(Mutex::new(Some(notifier))),
            pending: Arc::new(Mutex::new(None)),
        };
        let watcher = CompletionWatcher {
            guild_id: self.guild_id,
            notifier: sink.notifier.clone(),
            pending: sink.pending.clone(),
        };

        let registered = sink
            .handle
            .add_event(Event::Track(TrackEvent::End), watcher.clone())
            .and_then(|_| sink.handle.add_event(Event::Track(TrackEvent::Error), watcher));
        if let Err(e) = registered {
            sink.close();
            return Err(PlaybackError::StreamOpen(e.to_string()));
        }

        info!("🎧 [{}] Stream abierto: {}", self.guild_id, track.title);
        Ok(Box::new(sink))
    }
}

/// El volumen va en el track antes de que empiece a sonar
fn prepared_track(input: Input, volume: Volume) -> Track {
    Track::from(input).volume(volume.get())
}

/// Escucha el fin o el error de un track y avisa a la sesión una sola vez
#[derive(Clone)]
struct CompletionWatcher {
    guild_id: GuildId,
    notifier: Arc<Mutex<Option<CompletionNotifier>>>,
    pending: Arc<Mutex<Option<EndReason>>>,
}

#[async_trait]
impl VoiceEventHandler for CompletionWatcher {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let notifier = self.notifier.lock().take()?;

        let failure = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(format!("{:?}", e)),
                _ => None,
            }),
            _ => None,
        };

        match failure {
            Some(error) => notifier.errored(error),
            None => {
                let reason = self.pending.lock().take().unwrap_or(EndReason::Finished);
                debug!("[{}] Track terminado ({})", self.guild_id, reason);
                notifier.ended(reason);
            }
        }
        Some(Event::Cancel)
    }
}

struct SongbirdSink {
    handle: TrackHandle,
    notifier: Arc<Mutex<Option<CompletionNotifier>>>,
    pending: Arc<Mutex<Option<EndReason>>>,
}

fn control_error(e: songbird::error::ControlError) -> PlaybackError {
    PlaybackError::Sink(e.to_string())
}

impl StreamSink for SongbirdSink {
    fn pause(&self) -> Result<(), PlaybackError> {
        self.handle.pause().map_err(control_error)
    }

    fn resume(&self) -> Result<(), PlaybackError> {
        self.handle.play().map_err(control_error)
    }

    fn set_volume(&self, volume: Volume) -> Result<(), PlaybackError> {
        self.handle.set_volume(volume.get()).map_err(control_error)
    }

    fn end(&self, reason: EndReason) -> Result<(), PlaybackError> {
        *self.pending.lock() = Some(reason);
        self.handle.stop().map_err(control_error)
    }

    fn close(&self) {
        self.notifier.lock().take();
        if let Err(e) = self.handle.stop() {
            debug!("Track ya detenido al cerrar: {}", e);
        }
    }
}
