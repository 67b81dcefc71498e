use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_API_BASE: &str = "https://discoveryprovider.audius.co";

fn default_schema_version() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Virtual clock; no audio device needed.
    Simulated,
    /// Accepts every command, never produces sound.
    Null,
    /// Real output through rodio (requires the `audio` feature).
    Rodio,
}

impl BackendKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "simulated" | "sim" => Some(Self::Simulated),
            "null" | "none" => Some(Self::Null),
            "rodio" | "audio" => Some(Self::Rodio),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub backend: BackendKind,
    pub initial_volume: f64,
    pub simulated_track_secs: u64,
    pub tick_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Simulated,
            initial_volume: 0.9,
            simulated_track_secs: 180,
            tick_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub trending_limit: u32,
    pub search_limit: u32,
    pub request_timeout_ms: u64,
    pub library_fetch_cap: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            trending_limit: 24,
            search_limit: 20,
            request_timeout_ms: 10_000,
            library_fetch_cap: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LibraryConfig {
    /// Overrides the platform data directory used for saved track ids.
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub api_base: String,
    pub log_level: String,
    pub player: PlayerConfig,
    pub catalog: CatalogConfig,
    pub library: LibraryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            api_base: DEFAULT_API_BASE.to_string(),
            log_level: "info".to_string(),
            player: PlayerConfig::default(),
            catalog: CatalogConfig::default(),
            library: LibraryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AppConfig, BackendKind};

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            log_level = "debug"

            [player]
            backend = "null"
            "#,
        )
        .expect("config parses");

        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.player.backend, BackendKind::Null);
        assert_eq!(cfg.player.initial_volume, 0.9);
        assert_eq!(cfg.catalog.trending_limit, 24);
        assert_eq!(cfg.api_base, super::DEFAULT_API_BASE);
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let text = toml::to_string_pretty(&AppConfig::default()).expect("serializes");
        let back: AppConfig = toml::from_str(&text).expect("parses");
        assert_eq!(back.player.backend, BackendKind::Simulated);
        assert_eq!(back.schema_version, 1);
    }

    #[test]
    fn backend_names_are_forgiving() {
        assert_eq!(BackendKind::parse(" Rodio "), Some(BackendKind::Rodio));
        assert_eq!(BackendKind::parse("sim"), Some(BackendKind::Simulated));
        assert_eq!(BackendKind::parse("speaker"), None);
    }
}
