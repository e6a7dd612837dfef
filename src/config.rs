//! Configuration management

use crate::{Result, VoiceError};
use ini::Ini;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Probe timeout ceiling; an unlock probe is meant to be near-instant
pub const MAX_PROBE_TIMEOUT_MS: u64 = 300;

/// Engine configuration
///
/// Wraps the INI file with typed getters. Missing keys fall back to the
/// defaults written by `default_config`.
pub struct Config {
    /// INI configuration storage
    ini: Ini,

    /// Config file path (~/.vocab-voice.cfg), if loaded from disk
    path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default path or create it
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, writing defaults if the file is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);

        let ini = if path.exists() {
            Ini::load_from_file(path)
                .map_err(|e| VoiceError::IniParse(format!("Failed to load config: {}", e)))?
        } else {
            info!("Config file not found, creating default");
            let default = Self::default_config();
            default
                .write_to_file(path)
                .map_err(|e| VoiceError::IniParse(format!("Failed to write config: {}", e)))?;
            default
        };

        Ok(Self {
            ini,
            path: Some(path.to_path_buf()),
        })
    }

    /// Parse configuration from INI text
    pub fn from_str(contents: &str) -> Result<Self> {
        let ini = Ini::load_from_str(contents)
            .map_err(|e| VoiceError::IniParse(format!("Failed to parse config: {}", e)))?;
        Ok(Self { ini, path: None })
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| VoiceError::Config("Config has no backing file".to_string()))?;
        debug!("Saving config to {:?}", path);
        self.ini
            .write_to_file(path)
            .map_err(|e| VoiceError::Config(format!("Failed to save config: {}", e)))
    }

    /// Get config file path (~/.vocab-voice.cfg)
    fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".vocab-voice.cfg")
    }

    /// Expose the config file path for display
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Create default configuration
    fn default_config() -> Ini {
        let mut ini = Ini::new();

        ini.with_section(Some("playback"))
            .set("voice_profile", "default")
            .set("max_remote_chars", "500")
            .set("unlock_grace_ms", "250")
            .set("budget_grace_ms", "50");

        ini.with_section(Some("budgets"))
            .set("remote_ms", "4000")
            .set("native_ms", "1500")
            .set("tone_ms", "1000")
            .set("sensory_ms", "50");

        ini.with_section(Some("unlock"))
            .set("probe_timeout_ms", "300");

        ini.with_section(Some("remote"))
            .set("endpoint", "")
            .set("request_timeout_ms", "4000");

        ini.with_section(Some("cache"))
            .set("max_bytes", "8388608");

        ini.with_section(Some("diagnostics"))
            .set("capacity", "200");

        ini.with_section(Some("detection"))
            .set("user_agent", "")
            .set("quirky_vendors", "MiuiBrowser,XiaoMi,HeyTapBrowser,VivoBrowser");

        ini.with_section(Some("tone"))
            .set("sample_rate", "22050")
            .set("note_ms", "90")
            .set("gap_ms", "20")
            .set("volume", "0.35")
            .set("max_notes", "32");

        ini.with_section(Some("output"))
            .set("player", "");

        ini
    }

    /// Get a string value from config
    pub fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        self.ini
            .get_from(Some(section), key)
            .unwrap_or(default)
            .to_string()
    }

    /// Get an unsigned integer value from config
    pub fn get_u64(&self, section: &str, key: &str, default: u64) -> u64 {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Get a float value from config
    pub fn get_float(&self, section: &str, key: &str, default: f32) -> f32 {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Set a value in config
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.ini.with_section(Some(section)).set(key, value);
    }

    fn get_optional(&self, section: &str, key: &str) -> Option<String> {
        self.ini
            .get_from(Some(section), key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn get_millis(&self, section: &str, key: &str, default: u64) -> Duration {
        Duration::from_millis(self.get_u64(section, key, default))
    }

    /// Voice profile identifier sent with every request
    pub fn voice_profile(&self) -> String {
        self.get_optional("playback", "voice_profile")
            .unwrap_or_else(|| "default".to_string())
    }

    /// Character cap applied before the remote synthesis endpoint
    pub fn max_remote_chars(&self) -> usize {
        self.get_u64("playback", "max_remote_chars", 500).max(1) as usize
    }

    /// How long `play` waits for the unlocker before running the chain anyway
    pub fn unlock_grace(&self) -> Duration {
        self.get_millis("playback", "unlock_grace_ms", 250)
    }

    /// Slack added on top of a backend budget before the hard stop
    pub fn budget_grace(&self) -> Duration {
        self.get_millis("playback", "budget_grace_ms", 50)
    }

    pub fn remote_budget(&self) -> Duration {
        self.get_millis("budgets", "remote_ms", 4000)
    }

    pub fn native_budget(&self) -> Duration {
        self.get_millis("budgets", "native_ms", 1500)
    }

    pub fn tone_budget(&self) -> Duration {
        self.get_millis("budgets", "tone_ms", 1000)
    }

    pub fn sensory_budget(&self) -> Duration {
        self.get_millis("budgets", "sensory_ms", 50)
    }

    /// Unlock micro-probe timeout, never above 300ms
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(
            self.get_u64("unlock", "probe_timeout_ms", MAX_PROBE_TIMEOUT_MS)
                .min(MAX_PROBE_TIMEOUT_MS),
        )
    }

    /// Remote synthesis endpoint URL; None disables the remote backend
    pub fn remote_endpoint(&self) -> Option<String> {
        self.get_optional("remote", "endpoint")
    }

    pub fn remote_request_timeout(&self) -> Duration {
        self.get_millis("remote", "request_timeout_ms", 4000)
    }

    /// Total byte budget of the audio asset cache
    pub fn cache_max_bytes(&self) -> usize {
        self.get_u64("cache", "max_bytes", 8 * 1024 * 1024) as usize
    }

    /// Number of attempt records kept by the diagnostics reporter
    pub fn diagnostics_capacity(&self) -> usize {
        self.get_u64("diagnostics", "capacity", 200).max(1) as usize
    }

    /// User agent override for capability detection
    pub fn user_agent(&self) -> Option<String> {
        self.get_optional("detection", "user_agent")
    }

    /// User agent markers of Android vendor browsers with silent native speech
    pub fn quirky_vendors(&self) -> Vec<String> {
        self.get_string(
            "detection",
            "quirky_vendors",
            "MiuiBrowser,XiaoMi,HeyTapBrowser,VivoBrowser",
        )
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
    }

    /// Explicit PCM player command line; None means auto-detect
    pub fn player(&self) -> Option<String> {
        self.get_optional("output", "player")
    }

    pub fn tone_sample_rate(&self) -> u32 {
        self.get_u64("tone", "sample_rate", 22_050).clamp(8_000, 96_000) as u32
    }

    pub fn tone_note(&self) -> Duration {
        self.get_millis("tone", "note_ms", 90)
    }

    pub fn tone_gap(&self) -> Duration {
        self.get_millis("tone", "gap_ms", 20)
    }

    pub fn tone_volume(&self) -> f32 {
        self.get_float("tone", "volume", 0.35).clamp(0.0, 1.0)
    }

    pub fn tone_max_notes(&self) -> usize {
        self.get_u64("tone", "max_notes", 32).max(1) as usize
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ini: Self::default_config(),
            path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.voice_profile(), "default");
        assert_eq!(config.max_remote_chars(), 500);
        assert_eq!(config.remote_budget(), Duration::from_millis(4000));
        assert_eq!(config.sensory_budget(), Duration::from_millis(50));
        assert_eq!(config.diagnostics_capacity(), 200);
        assert!(config.remote_endpoint().is_none());
        assert_eq!(config.quirky_vendors().len(), 4);
    }

    #[test]
    fn test_probe_timeout_is_capped() {
        let config = Config::from_str("[unlock]\nprobe_timeout_ms = 5000\n").unwrap();
        assert_eq!(config.probe_timeout(), Duration::from_millis(300));
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let config = Config::from_str("[budgets]\nremote_ms = 900\n").unwrap();
        assert_eq!(config.remote_budget(), Duration::from_millis(900));
        assert_eq!(config.native_budget(), Duration::from_millis(1500));
        assert_eq!(config.voice_profile(), "default");
    }

    #[test]
    fn test_set_overrides_value() {
        let mut config = Config::default();
        config.set("remote", "endpoint", "http://localhost:9000/tts");
        assert_eq!(
            config.remote_endpoint().as_deref(),
            Some("http://localhost:9000/tts")
        );
    }

    #[test]
    fn test_save_without_path_fails() {
        assert!(Config::default().save().is_err());
    }
}
