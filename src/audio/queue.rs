use chrono::{DateTime, Utc};
use serenity::model::id::GuildId;
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc::UnboundedSender, time::timeout};
use tracing::{debug, error, info, warn};

use super::{
    request::{Announcer, Request},
    session::{SessionMessage, SessionSettings},
    voice::{
        CompletionNotifier, EndReason, SinkEvent, SinkId, StreamOptions, StreamSink,
        VoiceConnection,
    },
};
use crate::{
    error::{ConnectionError, MusicError, MusicResult, PlaybackError},
    ui::ChatGateway,
};

/// Volumen con el que arranca cada sesión
pub const DEFAULT_VOLUME: f32 = 0.3;

/// Canciones por página en el listado de la cola
pub const QUEUE_PAGE_SIZE: usize = 10;

/// Volumen normalizado; cualquier valor fuera de rango vuelve al predeterminado
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Volume(f32);

impl Volume {
    pub const MIN: f32 = 0.0;
    /// Incluido en el rango válido: `1.0` es volumen pleno
    pub const MAX: f32 = 1.0;

    pub fn new(value: f32) -> Self {
        if value.is_finite() && (Self::MIN..=Self::MAX).contains(&value) {
            Self(value)
        } else {
            Self::default()
        }
    }

    /// Interpreta lo que escribió el usuario
    pub fn parse(input: &str) -> Self {
        input
            .trim()
            .parse::<f32>()
            .map(Self::new)
            .unwrap_or_default()
    }

    pub fn get(self) -> f32 {
        self.0
    }

    pub fn percent(self) -> u8 {
        (self.0 * 100.0).round() as u8
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self(DEFAULT_VOLUME)
    }
}

/// Estado de una entrada de la cola
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Enqueued,
    Playing,
    Stopped,
}

/// Estado del reproductor de una sesión
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Playing,
    Paused,
}

#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: u64,
    pub request: Request,
    pub status: EntryStatus,
    pub added_at: DateTime<Utc>,
}

/// Resultado de encolar una canción
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// La canción empezó a sonar de inmediato
    Started { position: usize },
    /// La canción espera su turno
    Queued { position: usize },
}

struct ActiveSink {
    id: SinkId,
    sink: Box<dyn StreamSink>,
    paused: bool,
}

/// Cola de reproducción de un servidor.
///
/// Vive dentro del actor de la sesión, así que todo acceso es secuencial.
/// Las entradas nunca se reordenan; `cursor` apunta a la entrada que suena o
/// que sonó por última vez, y puede quedar una posición más allá del final
/// cuando la cola se agotó. Como mucho hay un stream activo a la vez.
pub struct PlaybackQueue {
    guild_id: GuildId,
    entries: Vec<QueueEntry>,
    cursor: Option<usize>,
    active: Option<ActiveSink>,
    connection: Option<Arc<dyn VoiceConnection>>,
    announcer: Announcer,
    events: UnboundedSender<SessionMessage>,
    volume: Volume,
    max_size: usize,
    open_timeout: Duration,
    next_entry_id: u64,
    next_sink_id: SinkId,
}

impl PlaybackQueue {
    pub(crate) fn new(
        guild_id: GuildId,
        chat: Arc<dyn ChatGateway>,
        events: UnboundedSender<SessionMessage>,
        settings: &SessionSettings,
    ) -> Self {
        Self {
            guild_id,
            entries: Vec::new(),
            cursor: None,
            active: None,
            connection: None,
            announcer: Announcer::new(guild_id, chat, settings.notification_timeout),
            events,
            volume: settings.default_volume,
            max_size: settings.max_queue_size,
            open_timeout: settings.stream_open_timeout,
            next_entry_id: 1,
            next_sink_id: 1,
        }
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn volume(&self) -> Volume {
        self.volume
    }

    pub fn is_bound(&self) -> bool {
        self.connection.is_some()
    }

    pub fn state(&self) -> PlayerState {
        match &self.active {
            Some(active) if active.paused => PlayerState::Paused,
            Some(_) => PlayerState::Playing,
            None => PlayerState::Idle,
        }
    }

    pub fn current(&self) -> Option<&QueueEntry> {
        self.active.as_ref()?;
        self.cursor.and_then(|index| self.entries.get(index))
    }

    /// Entradas que todavía no terminaron
    fn pending(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.status != EntryStatus::Stopped)
            .count()
    }

    /// Conecta la cola a una conexión de voz nueva
    pub fn bind(&mut self, connection: Arc<dyn VoiceConnection>) {
        self.connection = Some(connection);
    }

    /// Suelta la conexión: el stream activo se cierra sin avanzar la cola
    pub fn unbind(&mut self) {
        if self.halt_active() {
            info!("⏹️ [{}] Reproducción cortada al desconectar", self.guild_id);
        }
        self.connection = None;
    }

    pub async fn enqueue(&mut self, request: Request) -> MusicResult<EnqueueOutcome> {
        if self.connection.is_none() {
            return Err(ConnectionError::NotConnected.into());
        }
        if self.pending() >= self.max_size {
            return Err(PlaybackError::QueueFull(self.max_size).into());
        }

        let entry = QueueEntry {
            id: self.next_entry_id,
            request,
            status: EntryStatus::Enqueued,
            added_at: Utc::now(),
        };
        self.next_entry_id += 1;
        let title = entry.request.track.title.clone();
        self.entries.push(entry);
        let index = self.entries.len() - 1;
        info!(
            "➕ [{}] En cola #{}: {}",
            self.guild_id,
            index + 1,
            title
        );

        if self.active.is_none() {
            self.cursor = self.first_unplayed();
            self.start_from_cursor().await.map_err(MusicError::from)?;
            if self.cursor == Some(index) {
                return Ok(EnqueueOutcome::Started { position: index + 1 });
            }
        }

        self.announcer
            .announce_enqueued(&mut self.entries[index].request, index + 1)
            .await;
        Ok(EnqueueOutcome::Queued { position: index + 1 })
    }

    fn first_unplayed(&self) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.status == EntryStatus::Enqueued)
    }

    fn advance_cursor(&mut self) {
        let next = self.cursor.map_or(0, |index| index + 1);
        self.cursor = Some(next.min(self.entries.len()));
    }

    fn mark_current(&mut self, status: EntryStatus) {
        if let Some(entry) = self.cursor.and_then(|index| self.entries.get_mut(index)) {
            entry.status = status;
        }
    }

    /// Arranca la entrada del cursor; si su stream no abre, la da por
    /// terminada y prueba con la siguiente. Devuelve `Ok(false)` si no quedó
    /// nada por reproducir, o el primer error si ninguna pudo arrancar.
    async fn start_from_cursor(&mut self) -> Result<bool, PlaybackError> {
        let mut first_error = None;
        loop {
            match self.start_current().await {
                Ok(true) => return Ok(true),
                Ok(false) => return first_error.map_or(Ok(false), Err),
                Err(e) => {
                    warn!("⚠️ [{}] No se pudo reproducir la entrada: {}", self.guild_id, e);
                    self.mark_current(EntryStatus::Stopped);
                    if let Some(entry) = self.cursor.and_then(|index| self.entries.get_mut(index)) {
                        self.announcer.retract(&mut entry.request).await;
                    }
                    first_error.get_or_insert(e);
                    self.advance_cursor();
                }
            }
        }
    }

    async fn start_current(&mut self) -> Result<bool, PlaybackError> {
        let Some(index) = self.cursor.filter(|&index| index < self.entries.len()) else {
            return Ok(false);
        };
        let Some(connection) = self.connection.clone() else {
            debug!("🔇 [{}] Sin conexión de voz, nada que arrancar", self.guild_id);
            return Ok(false);
        };

        let sink_id = self.next_sink_id;
        self.next_sink_id += 1;
        let notifier = CompletionNotifier::new(sink_id, self.events.clone());
        let options = StreamOptions { volume: self.volume };
        let track = self.entries[index].request.track.clone();

        let sink = timeout(
            self.open_timeout,
            connection.open_stream(&track, options, notifier),
        )
        .await
        .map_err(|_| PlaybackError::Timeout(self.open_timeout))??;

        self.active = Some(ActiveSink {
            id: sink_id,
            sink,
            paused: false,
        });
        self.entries[index].status = EntryStatus::Playing;
        info!("🎵 [{}] Reproduciendo: {}", self.guild_id, track.title);

        self.announcer
            .announce_now_playing(&mut self.entries[index].request)
            .await;
        Ok(true)
    }

    /// Cierra el stream activo sin notificación; devuelve si había uno
    fn halt_active(&mut self) -> bool {
        match self.active.take() {
            Some(active) => {
                active.sink.close();
                self.mark_current(EntryStatus::Stopped);
                true
            }
            None => false,
        }
    }

    pub async fn on_sink_event(&mut self, sink_id: SinkId, event: SinkEvent) {
        match event {
            SinkEvent::Ended(reason) => self.on_sink_completed(sink_id, reason).await,
            SinkEvent::Errored(e) => self.on_sink_error(sink_id, &e).await,
        }
    }

    pub async fn on_sink_error(&mut self, sink_id: SinkId, error: &str) {
        error!("❌ [{}] Error en el stream {}: {}", self.guild_id, sink_id, error);
        self.on_sink_completed(sink_id, EndReason::Skip).await;
    }

    pub async fn on_sink_completed(&mut self, sink_id: SinkId, reason: EndReason) {
        if self.active.as_ref().map(|active| active.id) != Some(sink_id) {
            debug!("[{}] Evento obsoleto del stream {}, ignorado", self.guild_id, sink_id);
            return;
        }
        self.halt_active();
        info!("⏹️ [{}] Stream terminado: {}", self.guild_id, reason);

        if reason == EndReason::Stop {
            return;
        }

        self.advance_cursor();
        match self.start_from_cursor().await {
            Ok(true) => {}
            Ok(false) => info!("📭 [{}] Fin de la cola", self.guild_id),
            Err(e) => warn!("⚠️ [{}] No quedó nada reproducible: {}", self.guild_id, e),
        }
    }

    pub async fn skip(&mut self) -> Result<(), PlaybackError> {
        self.request_end(EndReason::Skip).await
    }

    pub async fn stop(&mut self) -> Result<(), PlaybackError> {
        self.request_end(EndReason::Stop).await
    }

    /// Pausa el stream y le pide terminar; si el stream no acepta el pedido,
    /// la terminación se completa acá mismo
    async fn request_end(&mut self, reason: EndReason) -> Result<(), PlaybackError> {
        let active = self.active.as_ref().ok_or(PlaybackError::NotPlaying)?;
        let sink_id = active.id;
        if let Err(e) = active.sink.pause() {
            debug!("[{}] No se pudo pausar antes de terminar: {}", self.guild_id, e);
        }
        if let Err(e) = active.sink.end(reason) {
            warn!("⚠️ [{}] El stream no aceptó terminar: {}", self.guild_id, e);
            self.on_sink_completed(sink_id, reason).await;
        }
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), PlaybackError> {
        let active = self.active.as_mut().ok_or(PlaybackError::NotPlaying)?;
        if active.paused {
            return Err(PlaybackError::AlreadyPaused);
        }
        active.sink.pause()?;
        active.paused = true;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), PlaybackError> {
        let active = self.active.as_mut().ok_or(PlaybackError::NotPlaying)?;
        if !active.paused {
            return Err(PlaybackError::NotPaused);
        }
        active.sink.resume()?;
        active.paused = false;
        Ok(())
    }

    /// Vacía la cola; lo que estaba sonando se corta sin avanzar y sus
    /// tarjetas se retiran del chat
    pub async fn clear(&mut self) {
        if self.halt_active() {
            info!("⏹️ [{}] Reproducción cortada al limpiar la cola", self.guild_id);
        }
        for mut entry in std::mem::take(&mut self.entries) {
            self.announcer.retract(&mut entry.request).await;
        }
        self.announcer.retire_now_playing().await;
        self.cursor = None;
    }

    pub fn set_volume(&mut self, input: &str) -> Volume {
        self.volume = Volume::parse(input);
        if let Some(active) = &self.active {
            if let Err(e) = active.sink.set_volume(self.volume) {
                warn!("⚠️ [{}] No se pudo aplicar el volumen: {}", self.guild_id, e);
            }
        }
        self.volume
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let current = self.active.as_ref().and(self.cursor);
        QueueSnapshot {
            state: self.state(),
            volume: self.volume,
            items: self
                .entries
                .iter()
                .enumerate()
                .map(|(index, entry)| QueueItem {
                    position: index + 1,
                    title: entry.request.track.title.clone(),
                    requester: entry.request.requester.name.clone(),
                    duration: entry.request.track.duration,
                    is_current: current == Some(index),
                })
                .collect(),
        }
    }
}

/// Fila del listado de la cola
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub position: usize,
    pub title: String,
    pub requester: String,
    pub duration: Option<Duration>,
    pub is_current: bool,
}

/// Vista de la cola en un instante
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSnapshot {
    pub state: PlayerState,
    pub volume: Volume,
    pub items: Vec<QueueItem>,
}

impl Default for QueueSnapshot {
    fn default() -> Self {
        Self {
            state: PlayerState::Idle,
            volume: Volume::default(),
            items: Vec::new(),
        }
    }
}

impl QueueSnapshot {
    /// Obtiene una página específica de la cola
    pub fn page(&self, page: usize) -> QueuePage {
        let total_items = self.items.len();
        let total_pages = total_items.div_ceil(QUEUE_PAGE_SIZE).max(1);
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * QUEUE_PAGE_SIZE;
        let end = (start + QUEUE_PAGE_SIZE).min(total_items);

        QueuePage {
            items: self.items.get(start..end).unwrap_or_default().to_vec(),
            current_page,
            total_pages,
            total_items,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuePage {
    pub items: Vec<QueueItem>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}
