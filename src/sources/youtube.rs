use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::{sync::OnceLock, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use super::{Locator, TrackRef, TrackResolver};
use crate::error::ResolutionError;

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const SEARCH_RESULTS: &str = "5";

/// Respuesta de `search.list`
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

/// Respuesta de `videos.list`
#[derive(Debug, Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoDetails {
    id: String,
    snippet: VideoSnippet,
    content_details: Option<ContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    title: String,
    channel_title: Option<String>,
    thumbnails: Option<Thumbnails>,
}

#[derive(Debug, Deserialize)]
struct Thumbnails {
    default: Option<Thumbnail>,
    medium: Option<Thumbnail>,
    high: Option<Thumbnail>,
}

#[derive(Debug, Deserialize, Clone)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: String,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: String,
    duration: Option<f64>,
    uploader: Option<String>,
    thumbnail: Option<String>,
    webpage_url: String,
}

/// Resuelve URLs y búsquedas de YouTube
pub struct YouTubeResolver {
    api_key: Option<String>,
    region_code: Option<String>,
    client: reqwest::Client,
    // Limitar requests concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

impl YouTubeResolver {
    pub fn new(api_key: Option<String>, region_code: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            region_code,
            client,
            rate_limiter: Semaphore::new(3),
        })
    }

    /// Verifica si el texto parece una URL (y no una búsqueda libre)
    pub fn looks_like_url(input: &str) -> bool {
        static URL_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = URL_REGEX.get_or_init(|| {
            Regex::new(r"^(?i)(https?://|(www\.|m\.|music\.)?(youtube\.com|youtu\.be)/)")
                .expect("regex de URL válida")
        });
        regex.is_match(input.trim())
    }

    /// Extrae el ID del vídeo de una URL de YouTube.
    ///
    /// Devuelve `Ok(None)` cuando el texto no es una URL, para que el llamador
    /// lo trate como búsqueda libre.
    pub fn extract_video_id(input: &str) -> Result<Option<String>, ResolutionError> {
        let input = input.trim();
        if !Self::looks_like_url(input) {
            return Ok(None);
        }

        let with_scheme = if input.contains("://") {
            input.to_string()
        } else {
            format!("https://{}", input)
        };
        let parsed =
            Url::parse(&with_scheme).map_err(|e| ResolutionError::InvalidUrl(e.to_string()))?;

        let host = parsed
            .host_str()
            .unwrap_or_default()
            .trim_start_matches("www.")
            .trim_start_matches("m.")
            .trim_start_matches("music.");

        let id = match host {
            "youtube.com" => {
                let mut segments = parsed.path_segments().into_iter().flatten();
                match segments.next() {
                    Some("watch") => parsed
                        .query_pairs()
                        .find(|(key, _)| key == "v")
                        .map(|(_, value)| value.into_owned()),
                    Some("embed" | "shorts" | "v" | "live") => segments.next().map(str::to_string),
                    _ => None,
                }
            }
            "youtu.be" => parsed
                .path_segments()
                .into_iter()
                .flatten()
                .next()
                .map(str::to_string),
            other => {
                return Err(ResolutionError::InvalidUrl(format!(
                    "servicio no implementado para {}",
                    other
                )))
            }
        };

        match id.filter(|id| !id.is_empty()) {
            Some(id) => Ok(Some(id)),
            None => Err(ResolutionError::InvalidUrl("URL sin vídeo".to_string())),
        }
    }

    fn watch_url(video_id: &str) -> String {
        format!("https://www.youtube.com/watch?v={}", video_id)
    }

    // --- YouTube Data API v3 ---

    async fn api_get<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ResolutionError> {
        let response = self
            .client
            .get(format!("{}/{}", API_BASE, endpoint))
            .query(params)
            .send()
            .await
            .map_err(|e| ResolutionError::UpstreamApi(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            warn!("❌ YouTube API error: {}", status);
            return Err(ResolutionError::UpstreamApi(format!(
                "YouTube API respondió {}",
                status
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ResolutionError::UpstreamApi(e.to_string()))
    }

    async fn api_details(&self, api_key: &str, video_id: &str) -> Result<TrackRef, ResolutionError> {
        let response: VideosResponse = self
            .api_get(
                "videos",
                &[
                    ("part", "snippet,contentDetails"),
                    ("id", video_id),
                    ("key", api_key),
                ],
            )
            .await?;

        let video = response
            .items
            .into_iter()
            .next()
            .ok_or_else(|| ResolutionError::NotFound(video_id.to_string()))?;

        let mut track = TrackRef::new(
            video.id.clone(),
            video.snippet.title,
            Locator::Url(Self::watch_url(&video.id)),
        );
        if let Some(channel) = video.snippet.channel_title {
            track = track.with_artist(channel);
        }
        if let Some(thumbnail) = video
            .snippet
            .thumbnails
            .and_then(|t| t.high.or(t.medium).or(t.default))
        {
            track = track.with_thumbnail(thumbnail.url);
        }
        if let Some(duration) = video
            .content_details
            .and_then(|details| parse_iso8601_duration(&details.duration))
        {
            track = track.with_duration(duration);
        }

        Ok(track)
    }

    async fn api_search(&self, api_key: &str, query: &str) -> Result<TrackRef, ResolutionError> {
        let mut params = vec![
            ("part", "snippet"),
            ("type", "video"),
            ("maxResults", SEARCH_RESULTS),
            ("q", query),
            ("key", api_key),
        ];
        if let Some(region) = self.region_code.as_deref() {
            params.push(("regionCode", region));
        }

        let response: SearchResponse = self.api_get("search", &params).await?;
        let video_id = response
            .items
            .into_iter()
            .find_map(|item| item.id.video_id)
            .ok_or_else(|| ResolutionError::NotFound(query.to_string()))?;

        self.api_details(api_key, &video_id).await
    }

    // --- yt-dlp ---

    async fn ytdlp_lookup(&self, target: &str, query: &str) -> Result<TrackRef, ResolutionError> {
        debug!("📊 Obteniendo info con yt-dlp: {}", target);

        let output = Command::new("yt-dlp")
            .args(["--no-playlist", "--dump-json", "--no-warnings", target])
            .output()
            .await
            .map_err(|e| ResolutionError::UpstreamApi(format!("Error al ejecutar yt-dlp: {}", e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(ResolutionError::UpstreamApi(format!("yt-dlp error: {}", error.trim())));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let info = stdout
            .lines()
            .find_map(|line| serde_json::from_str::<YtDlpInfo>(line).ok())
            .ok_or_else(|| ResolutionError::NotFound(query.to_string()))?;

        let mut track = TrackRef::new(info.id, info.title, Locator::Url(info.webpage_url));
        if let Some(uploader) = info.uploader {
            track = track.with_artist(uploader);
        }
        if let Some(thumbnail) = info.thumbnail {
            track = track.with_thumbnail(thumbnail);
        }
        if let Some(duration) = info.duration.filter(|d| *d > 0.0) {
            track = track.with_duration(Duration::from_secs_f64(duration));
        }
        Ok(track)
    }
}

#[async_trait]
impl TrackResolver for YouTubeResolver {
    async fn resolve(&self, query: &str) -> Result<TrackRef, ResolutionError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolutionError::UpstreamApi(e.to_string()))?;

        let video_id = Self::extract_video_id(query)?;
        info!("🔍 Resolviendo en YouTube: {}", query);

        match (self.api_key.as_deref(), video_id) {
            (Some(key), Some(id)) => self.api_details(key, &id).await,
            (Some(key), None) => self.api_search(key, query).await,
            (None, Some(id)) => self.ytdlp_lookup(&Self::watch_url(&id), query).await,
            (None, None) => {
                self.ytdlp_lookup(&format!("ytsearch1:{}", query), query)
                    .await
            }
        }
    }
}

/// Convierte una duración ISO-8601 de la API (`PT3M33S`) a `Duration`.
///
/// Los directos vienen como `P0D` y se tratan como sin duración.
pub fn parse_iso8601_duration(value: &str) -> Option<Duration> {
    static DURATION_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = DURATION_REGEX.get_or_init(|| {
        Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$")
            .expect("regex de duración válida")
    });

    let captures = regex.captures(value)?;
    let mut seconds: u64 = 0;
    for (index, unit) in [(1, 86_400), (2, 3_600), (3, 60), (4, 1)] {
        let Some(found) = captures.get(index) else {
            continue;
        };
        let amount: u64 = found.as_str().parse().ok()?;
        seconds = amount.checked_mul(unit)?.checked_add(seconds)?;
    }
    (seconds > 0).then(|| Duration::from_secs(seconds))
}
