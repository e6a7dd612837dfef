//! Configuration loading tests
//!
//! Tests that engine configuration loads from disk and provides expected
//! default values

use std::time::Duration;
use tempfile::TempDir;
use vocab_voice::{BackendId, CapabilityDetector, Config, PlatformClass, PlaybackSettings};

#[test]
fn test_missing_file_is_created_with_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(".vocab-voice.cfg");

    let config = Config::load_from(&path).expect("Failed to load config");
    assert!(path.exists());
    assert_eq!(config.path(), Some(path.as_path()));

    // Written defaults read back the same
    let reloaded = Config::load_from(&path).unwrap();
    assert_eq!(reloaded.voice_profile(), "default");
    assert_eq!(reloaded.max_remote_chars(), 500);
    assert_eq!(reloaded.unlock_grace(), Duration::from_millis(250));
    assert_eq!(reloaded.remote_endpoint(), None);
    assert_eq!(reloaded.cache_max_bytes(), 8 * 1024 * 1024);
    assert_eq!(reloaded.diagnostics_capacity(), 200);
}

#[test]
fn test_user_values_override_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("voice.cfg");
    std::fs::write(
        &path,
        "[playback]\nvoice_profile=en-GB\n\n[budgets]\nnative_ms=900\n\n\
         [remote]\nendpoint=http://localhost:8080/tts\n\n[unlock]\nprobe_timeout_ms=5000\n",
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();
    let settings = PlaybackSettings::from_config(&config);
    assert_eq!(settings.voice_profile, "en-GB");
    assert_eq!(settings.budget_for(BackendId::Native), Duration::from_millis(900));
    assert_eq!(settings.budget_for(BackendId::Tone), Duration::from_millis(1000));
    assert_eq!(
        config.remote_endpoint().as_deref(),
        Some("http://localhost:8080/tts")
    );

    // Probe timeout never exceeds 300ms
    assert_eq!(config.probe_timeout(), Duration::from_millis(300));
}

#[test]
fn test_save_round_trips() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("voice.cfg");

    let mut config = Config::load_from(&path).unwrap();
    config.set("tone", "max_notes", "12");
    config.save().unwrap();

    let reloaded = Config::load_from(&path).unwrap();
    assert_eq!(reloaded.tone_max_notes(), 12);
}

#[test]
fn test_quirky_vendors_configurable() {
    let config = Config::from_str("[detection]\nquirky_vendors=SamsungBrowser\n").unwrap();
    let detector = CapabilityDetector::from_config(&config);

    assert_eq!(
        detector.classify("Mozilla/5.0 (Linux; Android 13) SamsungBrowser/23.0"),
        PlatformClass::AndroidVendorQuirky
    );
    assert_eq!(
        detector.classify("Mozilla/5.0 (Linux; Android 13) XiaoMi/MiuiBrowser/17.0"),
        PlatformClass::AndroidGeneric
    );
}
