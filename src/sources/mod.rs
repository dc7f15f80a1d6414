//! # Sources Module
//!
//! Track resolution: turns what a user typed after `play` into a
//! [`TrackRef`] the voice layer can stream.
//!
//! - [`youtube`] - YouTube URLs and free-text search (Data API v3 or yt-dlp)
//! - [`local`] - files from the configured local music folder
//!
//! [`SourceManager`] routes a query to the right resolver.

pub mod local;
pub mod youtube;

use async_trait::async_trait;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::debug;

use crate::error::ResolutionError;

pub use local::LocalLibrary;
pub use youtube::YouTubeResolver;

/// Prefijos que envían la búsqueda a la biblioteca local
const LOCAL_PREFIXES: [&str; 2] = ["local:", "file:"];

/// Contrato del servicio que resuelve búsquedas a canciones
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resuelve una búsqueda (URL o texto libre) a una canción reproducible
    async fn resolve(&self, query: &str) -> Result<TrackRef, ResolutionError>;
}

/// Dónde está el audio de una canción
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Página o stream remoto, reproducido vía yt-dlp
    Url(String),
    /// Archivo en disco
    File(PathBuf),
}

/// Representa una canción ya resuelta
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRef {
    pub id: String,
    pub locator: Locator,
    pub title: String,
    pub duration: Option<Duration>,
    pub artist: Option<String>,
    pub thumbnail: Option<String>,
}

impl TrackRef {
    pub fn new(id: impl Into<String>, title: impl Into<String>, locator: Locator) -> Self {
        Self {
            id: id.into(),
            locator,
            title: title.into(),
            duration: None,
            artist: None,
            thumbnail: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_artist(mut self, artist: String) -> Self {
        self.artist = Some(artist);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: String) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    /// URL pública para enlazar en las tarjetas, si la hay
    pub fn page_url(&self) -> Option<&str> {
        match &self.locator {
            Locator::Url(url) => Some(url),
            Locator::File(_) => None,
        }
    }
}

/// Enruta cada búsqueda a la fuente que le corresponde
pub struct SourceManager {
    youtube: Arc<dyn TrackResolver>,
    local: Option<Arc<dyn TrackResolver>>,
}

impl SourceManager {
    pub fn new(youtube: Arc<dyn TrackResolver>, local: Option<Arc<dyn TrackResolver>>) -> Self {
        Self { youtube, local }
    }

    /// Separa el prefijo de biblioteca local, si lo hay
    fn split_local(query: &str) -> Option<&str> {
        let lower = query.to_ascii_lowercase();
        LOCAL_PREFIXES
            .iter()
            .find(|prefix| lower.starts_with(*prefix))
            .map(|prefix| query[prefix.len()..].trim())
    }
}

#[async_trait]
impl TrackResolver for SourceManager {
    async fn resolve(&self, query: &str) -> Result<TrackRef, ResolutionError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResolutionError::NotFound(String::new()));
        }

        match Self::split_local(query) {
            Some(name) => {
                debug!("📁 Búsqueda local: {}", name);
                match &self.local {
                    Some(local) => local.resolve(name).await,
                    None => Err(ResolutionError::NotFound(name.to_string())),
                }
            }
            None => self.youtube.resolve(query).await,
        }
    }
}
