use crate::camera::{CameraConstraints, RegionOfInterest, SamplingConfig};
use crate::session::{ScanOptions, StopPolicy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_video_device")]
    pub video_device: String,

    #[serde(default = "default_viewfinder_width")]
    pub viewfinder_width: u32,

    #[serde(default = "default_viewfinder_height")]
    pub viewfinder_height: u32,

    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Scan box edge as a fraction of the shorter viewfinder edge, `null` for the full frame
    #[serde(default = "default_qrbox_ratio")]
    pub qrbox_ratio: Option<f32>,

    #[serde(default)]
    pub stop_policy: StopPolicy,

    #[serde(default = "default_decoder_program")]
    pub decoder_program: String,

    #[serde(default)]
    pub decoder_args: Vec<String>,

    #[serde(default = "default_opener_program")]
    pub opener_program: String,

    #[serde(default = "default_permission_poll_ms")]
    pub permission_poll_ms: u64,

    #[serde(default = "default_startup_grace_ms")]
    pub startup_grace_ms: u64,

    /// Key-value storage file, defaults to `$XDG_DATA_HOME/qr2wa/storage.json`
    #[serde(default)]
    pub storage_path: Option<String>,

    #[serde(default = "default_audio_feedback")]
    pub audio_feedback: bool,

    #[serde(default = "default_start_sound")]
    pub start_sound_path: String,

    #[serde(default = "default_stop_sound")]
    pub stop_sound_path: String,

    #[serde(default = "default_match_sound")]
    pub match_sound_path: String,
}

fn default_video_device() -> String {
    "/dev/video0".to_string()
}

fn default_viewfinder_width() -> u32 {
    640
}

fn default_viewfinder_height() -> u32 {
    480
}

fn default_fps() -> u32 {
    10
}

fn default_qrbox_ratio() -> Option<f32> {
    Some(0.7)
}

fn default_decoder_program() -> String {
    "zbarcam".to_string()
}

fn default_opener_program() -> String {
    "xdg-open".to_string()
}

fn default_permission_poll_ms() -> u64 {
    2000
}

fn default_startup_grace_ms() -> u64 {
    300
}

fn default_audio_feedback() -> bool {
    false
}

fn default_start_sound() -> String {
    "ping-up.opus".to_string()
}

fn default_stop_sound() -> String {
    "ping-down.opus".to_string()
}

fn default_match_sound() -> String {
    "match.opus".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            video_device: default_video_device(),
            viewfinder_width: default_viewfinder_width(),
            viewfinder_height: default_viewfinder_height(),
            fps: default_fps(),
            qrbox_ratio: default_qrbox_ratio(),
            stop_policy: StopPolicy::default(),
            decoder_program: default_decoder_program(),
            decoder_args: Vec::new(),
            opener_program: default_opener_program(),
            permission_poll_ms: default_permission_poll_ms(),
            startup_grace_ms: default_startup_grace_ms(),
            storage_path: None,
            audio_feedback: default_audio_feedback(),
            start_sound_path: default_start_sound(),
            stop_sound_path: default_stop_sound(),
            match_sound_path: default_match_sound(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.config/qr2wa/config.json)
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, writing the defaults there if it is missing
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            tracing::info!(
                "Config file not found at {:?}, creating default config",
                config_path
            );
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        tracing::info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        tracing::info!("Saved config to {:?}", config_path);
        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        Ok(xdg_dir("XDG_CONFIG_HOME", ".config")?
            .join("qr2wa")
            .join("config.json"))
    }

    /// Where the key-value storage lives
    pub fn storage_path(&self) -> Result<PathBuf> {
        match &self.storage_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(xdg_dir("XDG_DATA_HOME", ".local/share")?
                .join("qr2wa")
                .join("storage.json")),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.video_device.is_empty() {
            return Err(anyhow::anyhow!("video_device cannot be empty"));
        }

        if self.decoder_program.is_empty() {
            return Err(anyhow::anyhow!("decoder_program cannot be empty"));
        }

        if self.opener_program.is_empty() {
            return Err(anyhow::anyhow!("opener_program cannot be empty"));
        }

        if self.fps == 0 {
            return Err(anyhow::anyhow!("fps must be at least 1"));
        }

        if self.viewfinder_width == 0 || self.viewfinder_height == 0 {
            return Err(anyhow::anyhow!("viewfinder size cannot be zero"));
        }

        if let Some(ratio) = self.qrbox_ratio {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(anyhow::anyhow!("qrbox_ratio must be in (0, 1]"));
            }
        }

        Ok(())
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            constraints: CameraConstraints {
                device: PathBuf::from(&self.video_device),
                width: self.viewfinder_width,
                height: self.viewfinder_height,
            },
            sampling: SamplingConfig {
                fps: self.fps,
                region: self.qrbox_ratio.map(|ratio| RegionOfInterest { ratio }),
            },
            stop_policy: self.stop_policy,
        }
    }

    pub fn permission_poll_interval(&self) -> Duration {
        Duration::from_millis(self.permission_poll_ms)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }
}

fn xdg_dir(var: &str, home_fallback: &str) -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(var) {
        return Ok(PathBuf::from(dir));
    }

    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(home_fallback))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stop_policy, StopPolicy::Manual);
    }

    #[test]
    fn test_missing_file_creates_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qr2wa").join("config.json");

        let config = Config::load_from(&path).unwrap();

        assert!(path.exists());
        assert_eq!(config.fps, 10);
        assert_eq!(config.video_device, "/dev/video0");
    }

    #[test]
    fn test_partial_file_uses_field_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"fps": 5, "stop_policy": "auto"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.fps, 5);
        assert_eq!(config.stop_policy, StopPolicy::Auto);
        assert_eq!(config.decoder_program, "zbarcam");
        assert_eq!(config.qrbox_ratio, Some(0.7));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ nope").unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = Config {
            fps: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            qrbox_ratio: Some(1.5),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            qrbox_ratio: None,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scan_options() {
        let config = Config {
            video_device: "/dev/video2".to_string(),
            fps: 4,
            qrbox_ratio: None,
            ..Config::default()
        };
        let options = config.scan_options();

        assert_eq!(options.constraints.device, PathBuf::from("/dev/video2"));
        assert_eq!(options.sampling.fps, 4);
        assert_eq!(options.sampling.region, None);
    }

    #[test]
    fn test_explicit_storage_path() {
        let config = Config {
            storage_path: Some("/tmp/qr2wa.json".to_string()),
            ..Config::default()
        };
        assert_eq!(
            config.storage_path().unwrap(),
            PathBuf::from("/tmp/qr2wa.json")
        );
    }
}
