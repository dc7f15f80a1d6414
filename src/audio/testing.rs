//! Fakes for the voice and chat seams, shared by the playback tests.
//!
//! [`FakeVoice`] records every call in a journal (`open:a`, `pause:a`,
//! `end:a:skip`, ...) and lets a test finish or fail a track on demand.
//! Sinks deliver their completion synchronously from `end`, so by the time a
//! skip returns the event is already waiting in the session mailbox.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use super::{
    queue::{PlaybackQueue, Volume},
    request::{Request, Requester},
    session::{SessionMessage, SessionSettings},
    voice::{
        CompletionNotifier, EndReason, StreamOptions, StreamSink, VoiceConnection, VoiceGateway,
    },
};
use crate::{
    error::{ConnectionError, PlaybackError},
    sources::{Locator, TrackRef},
    ui::{Card, ChatGateway, MessageHandle},
};

pub fn guild() -> GuildId {
    GuildId::new(1)
}

pub fn voice_channel() -> ChannelId {
    ChannelId::new(50)
}

pub fn text_channel() -> ChannelId {
    ChannelId::new(100)
}

pub fn track(id: &str) -> TrackRef {
    TrackRef::new(
        id,
        format!("Song {}", id),
        Locator::Url(format!("https://youtu.be/{}", id)),
    )
}

pub fn request(id: &str) -> Request {
    Request::new(
        track(id),
        Requester {
            user_id: UserId::new(7),
            name: "ana".into(),
        },
        text_channel(),
    )
}

struct SinkState {
    track_id: String,
    notifier: Mutex<Option<CompletionNotifier>>,
}

#[derive(Default)]
struct VoiceInner {
    journal: Mutex<Vec<String>>,
    sinks: Mutex<Vec<Arc<SinkState>>>,
    fail_open: Mutex<HashSet<String>>,
    refuse_end: AtomicBool,
    fail_join: AtomicBool,
    fail_leave: AtomicBool,
    join_delay: Mutex<Option<Duration>>,
    open_delay: Mutex<Option<Duration>>,
}

#[derive(Clone, Default)]
pub struct FakeVoice(Arc<VoiceInner>);

impl FakeVoice {
    fn log(&self, entry: String) {
        self.0.journal.lock().push(entry);
    }

    pub fn journal(&self) -> Vec<String> {
        self.0.journal.lock().clone()
    }

    /// Canciones cuyo stream se abrió, en orden
    pub fn opened(&self) -> Vec<String> {
        self.journal()
            .iter()
            .filter_map(|entry| entry.strip_prefix("open:"))
            .map(str::to_string)
            .collect()
    }

    pub fn finish(&self, track_id: &str) {
        self.take_notifier(track_id).ended(EndReason::Finished);
    }

    pub fn fail(&self, track_id: &str, error: &str) {
        self.take_notifier(track_id).errored(error);
    }

    fn take_notifier(&self, track_id: &str) -> CompletionNotifier {
        let sinks = self.0.sinks.lock();
        let state = sinks
            .iter()
            .rev()
            .find(|state| state.track_id == track_id)
            .unwrap_or_else(|| panic!("no stream for {}", track_id));
        let notifier = state.notifier.lock().take();
        notifier.unwrap_or_else(|| panic!("stream {} already completed", track_id))
    }

    pub fn fail_open(&self, track_id: &str) {
        self.0.fail_open.lock().insert(track_id.to_string());
    }

    pub fn refuse_end(&self) {
        self.0.refuse_end.store(true, Ordering::SeqCst);
    }

    pub fn fail_join(&self) {
        self.0.fail_join.store(true, Ordering::SeqCst);
    }

    pub fn fail_leave(&self) {
        self.0.fail_leave.store(true, Ordering::SeqCst);
    }

    pub fn delay_join(&self, delay: Duration) {
        *self.0.join_delay.lock() = Some(delay);
    }

    pub fn delay_open(&self, delay: Duration) {
        *self.0.open_delay.lock() = Some(delay);
    }

    pub fn connection(&self, channel_id: ChannelId) -> Arc<dyn VoiceConnection> {
        Arc::new(FakeConnection {
            channel_id,
            voice: self.clone(),
        })
    }
}

#[async_trait]
impl VoiceGateway for FakeVoice {
    async fn join(
        &self,
        _guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, ConnectionError> {
        let delay = *self.0.join_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.0.fail_join.load(Ordering::SeqCst) {
            self.log(format!("join_failed:{}", channel_id));
            return Err(ConnectionError::JoinFailed("denied".into()));
        }
        self.log(format!("join:{}", channel_id));
        Ok(self.connection(channel_id))
    }
}

struct FakeConnection {
    channel_id: ChannelId,
    voice: FakeVoice,
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    async fn leave(&self) -> Result<(), ConnectionError> {
        self.voice.log(format!("leave:{}", self.channel_id));
        if self.voice.0.fail_leave.load(Ordering::SeqCst) {
            return Err(ConnectionError::LeaveFailed("gateway gone".into()));
        }
        Ok(())
    }

    async fn open_stream(
        &self,
        track: &TrackRef,
        _options: StreamOptions,
        notifier: CompletionNotifier,
    ) -> Result<Box<dyn StreamSink>, PlaybackError> {
        let delay = *self.voice.0.open_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.voice.0.fail_open.lock().contains(&track.id) {
            self.voice.log(format!("open_failed:{}", track.id));
            return Err(PlaybackError::StreamOpen(format!("{} unavailable", track.id)));
        }
        self.voice.log(format!("open:{}", track.id));
        let state = Arc::new(SinkState {
            track_id: track.id.clone(),
            notifier: Mutex::new(Some(notifier)),
        });
        self.voice.0.sinks.lock().push(state.clone());
        Ok(Box::new(FakeSink {
            state,
            voice: self.voice.clone(),
        }))
    }
}

struct FakeSink {
    state: Arc<SinkState>,
    voice: FakeVoice,
}

impl StreamSink for FakeSink {
    fn pause(&self) -> Result<(), PlaybackError> {
        self.voice.log(format!("pause:{}", self.state.track_id));
        Ok(())
    }

    fn resume(&self) -> Result<(), PlaybackError> {
        self.voice.log(format!("resume:{}", self.state.track_id));
        Ok(())
    }

    fn set_volume(&self, volume: Volume) -> Result<(), PlaybackError> {
        self.voice
            .log(format!("volume:{}:{}", self.state.track_id, volume.get()));
        Ok(())
    }

    fn end(&self, reason: EndReason) -> Result<(), PlaybackError> {
        if self.voice.0.refuse_end.load(Ordering::SeqCst) {
            self.voice.log(format!("end_refused:{}", self.state.track_id));
            return Err(PlaybackError::Sink("track already gone".into()));
        }
        self.voice
            .log(format!("end:{}:{}", self.state.track_id, reason));
        let notifier = self.state.notifier.lock().take();
        if let Some(notifier) = notifier {
            notifier.ended(reason);
        }
        Ok(())
    }

    fn close(&self) {
        self.voice.log(format!("close:{}", self.state.track_id));
        self.state.notifier.lock().take();
    }
}

#[derive(Default)]
struct ChatInner {
    sent: Mutex<Vec<(MessageHandle, Card)>>,
    deleted: Mutex<Vec<MessageHandle>>,
    next_id: AtomicU64,
    fail_deletes: AtomicBool,
    fail_sends: AtomicBool,
    send_delay: Mutex<Option<Duration>>,
}

/// Chat que guarda lo enviado; los ids de mensaje empiezan en 1
#[derive(Clone, Default)]
pub struct RecordingChat(Arc<ChatInner>);

impl RecordingChat {
    pub fn sent(&self) -> Vec<(MessageHandle, Card)> {
        self.0.sent.lock().clone()
    }

    pub fn sent_kinds(&self) -> Vec<&'static str> {
        self.0.sent.lock().iter().map(|(_, card)| card.kind()).collect()
    }

    pub fn deleted_ids(&self) -> Vec<u64> {
        self.0
            .deleted
            .lock()
            .iter()
            .map(|handle| handle.message_id.get())
            .collect()
    }

    pub fn fail_deletes(&self) {
        self.0.fail_deletes.store(true, Ordering::SeqCst);
    }

    pub fn fail_sends(&self) {
        self.0.fail_sends.store(true, Ordering::SeqCst);
    }

    pub fn delay_sends(&self, delay: Duration) {
        *self.0.send_delay.lock() = Some(delay);
    }
}

#[async_trait]
impl ChatGateway for RecordingChat {
    async fn send(&self, channel_id: ChannelId, card: Card) -> anyhow::Result<MessageHandle> {
        let delay = *self.0.send_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.0.fail_sends.load(Ordering::SeqCst) {
            anyhow::bail!("missing permissions");
        }
        let id = self.0.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = MessageHandle {
            channel_id,
            message_id: MessageId::new(id),
        };
        self.0.sent.lock().push((handle, card));
        Ok(handle)
    }

    async fn delete(&self, handle: MessageHandle) -> anyhow::Result<()> {
        if self.0.fail_deletes.load(Ordering::SeqCst) {
            anyhow::bail!("unknown message");
        }
        self.0.deleted.lock().push(handle);
        Ok(())
    }
}

/// Cola aislada con sus fakes y el buzón donde caen los eventos de stream
pub struct Harness {
    pub queue: PlaybackQueue,
    pub voice: FakeVoice,
    pub chat: RecordingChat,
    events: UnboundedReceiver<SessionMessage>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(SessionSettings::default())
    }

    pub fn with_settings(settings: SessionSettings) -> Self {
        let (tx, events) = unbounded_channel();
        let chat = RecordingChat::default();
        let queue = PlaybackQueue::new(guild(), Arc::new(chat.clone()), tx, &settings);
        Self {
            queue,
            voice: FakeVoice::default(),
            chat,
            events,
        }
    }

    pub fn bound() -> Self {
        let mut harness = Self::new();
        harness.bind();
        harness
    }

    pub fn bind(&mut self) {
        self.queue.bind(self.voice.connection(voice_channel()));
    }

    /// Entrega a la cola los eventos de stream pendientes
    pub async fn pump(&mut self) {
        while let Ok(message) = self.events.try_recv() {
            if let SessionMessage::Sink { sink_id, event } = message {
                self.queue.on_sink_event(sink_id, event).await;
            }
        }
    }
}
