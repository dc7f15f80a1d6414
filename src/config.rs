use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::audio::{queue::Volume, SessionSettings};

fn default_prefix() -> String {
    "$".to_string()
}

fn default_volume() -> f32 {
    crate::audio::queue::DEFAULT_VOLUME
}

fn default_max_queue_size() -> usize {
    1000
}

fn default_join_timeout() -> u64 {
    10
}

fn default_stream_open_timeout() -> u64 {
    20
}

fn default_notification_timeout() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,

    // Audio
    #[serde(default = "default_volume")]
    pub default_volume: f32,
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    // Tiempos de espera, en segundos
    #[serde(default = "default_join_timeout")]
    pub join_timeout_secs: u64,
    #[serde(default = "default_stream_open_timeout")]
    pub stream_open_timeout_secs: u64,
    #[serde(default = "default_notification_timeout")]
    pub notification_timeout_secs: u64,

    // Fuentes (opcionales)
    #[serde(default)]
    pub music_folder: Option<PathBuf>,
    #[serde(default)]
    pub youtube_api_key: Option<String>,
    #[serde(default)]
    pub region_code: Option<String>,
}

impl Config {
    /// Carga `.env`, luego `jukebox.toml` (opcional) y las variables `JUKEBOX_*`
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config: Self = ::config::Config::builder()
            .add_source(::config::File::with_name("jukebox").required(false))
            .add_source(::config::Environment::with_prefix("JUKEBOX").try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - The Discord token and the command prefix must not be empty
    /// - Volume must be between 0.0 and 1.0
    /// - Queue size and every timeout must be greater than 0
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("Discord token must not be empty");
        }

        if self.prefix.trim().is_empty() {
            anyhow::bail!("Command prefix must not be empty");
        }

        if !(Volume::MIN..=Volume::MAX).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between {} and {}, got: {}",
                Volume::MIN,
                Volume::MAX,
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.join_timeout_secs == 0
            || self.stream_open_timeout_secs == 0
            || self.notification_timeout_secs == 0
        {
            anyhow::bail!("Timeouts must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Secrets (token, API key) are never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: prefix '{}'\n  \
            Audio: {}% vol, {} max queue\n  \
            Timeouts: join {}s, stream {}s, notifications {}s\n  \
            Sources: YouTube API={}, region={}, local={}",
            self.prefix,
            (self.default_volume * 100.0).round() as u32,
            self.max_queue_size,
            self.join_timeout_secs,
            self.stream_open_timeout_secs,
            self.notification_timeout_secs,
            self.youtube_api_key.is_some(),
            self.region_code.as_deref().unwrap_or("-"),
            self.music_folder
                .as_ref()
                .map_or("-".to_string(), |folder| folder.display().to_string()),
        )
    }

    /// Ajustes que el registro entrega a cada sesión
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            default_volume: Volume::new(self.default_volume),
            max_queue_size: self.max_queue_size,
            join_timeout: Duration::from_secs(self.join_timeout_secs),
            stream_open_timeout: Duration::from_secs(self.stream_open_timeout_secs),
            notification_timeout: Duration::from_secs(self.notification_timeout_secs),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Sin token por defecto, tiene que venir del entorno
            discord_token: String::new(),
            prefix: default_prefix(),
            default_volume: default_volume(),
            max_queue_size: default_max_queue_size(),
            join_timeout_secs: default_join_timeout(),
            stream_open_timeout_secs: default_stream_open_timeout(),
            notification_timeout_secs: default_notification_timeout(),
            music_folder: None,
            youtube_api_key: None,
            region_code: None,
        }
    }
}
