use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{Locator, TrackRef, TrackResolver};
use crate::error::ResolutionError;

const AUDIO_EXTENSIONS: [&str; 6] = ["mp3", "wav", "ogg", "flac", "m4a", "opus"];

/// Biblioteca de archivos de audio en una carpeta local
pub struct LocalLibrary {
    folder: PathBuf,
}

impl LocalLibrary {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn is_audio_file(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }

    /// Lista los archivos de audio de la carpeta, ordenados por nombre
    pub async fn list(&self) -> Result<Vec<PathBuf>, ResolutionError> {
        let mut dir = tokio::fs::read_dir(&self.folder).await.map_err(|e| {
            warn!("📁 No se pudo leer {}: {}", self.folder.display(), e);
            ResolutionError::NotFound(self.folder.display().to_string())
        })?;

        let mut files = Vec::new();
        while let Ok(Some(entry)) = dir.next_entry().await {
            let path = entry.path();
            if Self::is_audio_file(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl TrackResolver for LocalLibrary {
    async fn resolve(&self, query: &str) -> Result<TrackRef, ResolutionError> {
        let needle = query.trim().to_lowercase();
        let files = self.list().await?;
        debug!("📁 {} archivos en la biblioteca local", files.len());

        let path = files
            .into_iter()
            .find(|path| {
                path.file_stem()
                    .map(|stem| stem.to_string_lossy().to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| ResolutionError::NotFound(query.to_string()))?;

        let title = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| query.to_string());
        let id = path.display().to_string();

        Ok(TrackRef::new(id, title, Locator::File(path)))
    }
}
