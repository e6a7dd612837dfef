//! Runtime capability detection
//!
//! Classifies the environment the engine runs in and decides which playback
//! backends can be trusted, and in what order. Detection is heuristic: some
//! platforms report speech support yet produce no sound, so the profile
//! encodes what is *trustworthy*, not merely what is present.

use crate::config::Config;
use crate::platform;
use crate::speech::BackendId;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Environment variable overriding the host user agent
pub const USER_AGENT_ENV: &str = "VOCAB_VOICE_USER_AGENT";

static IOS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(iphone|ipad|ipod)\b").unwrap());
static ANDROID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bandroid\b").unwrap());
static DESKTOP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(windows|macintosh|mac os|macos|linux|x11|cros|freebsd)\b").unwrap()
});

/// Coarse platform family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformClass {
    Desktop,
    Ios,
    AndroidGeneric,
    /// Android vendor browser whose native speech reports success silently
    AndroidVendorQuirky,
    /// Unrecognized agent; gets the conservative profile
    Unknown,
}

/// What the runtime exposes, as observed without a user gesture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeProbe {
    pub user_agent: String,
    /// An output primitive that can play encoded/decoded audio exists
    pub has_audio_output: bool,
    /// A native speech engine is installed
    pub has_speech_engine: bool,
    /// Locally generated PCM can be played
    pub has_synth_output: bool,
    pub has_vibration: bool,
    pub has_display: bool,
}

impl RuntimeProbe {
    /// Probe with only a user agent and nothing else available
    pub fn bare(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            has_audio_output: false,
            has_speech_engine: false,
            has_synth_output: false,
            has_vibration: false,
            has_display: false,
        }
    }

    /// Probe with every primitive present
    pub fn full(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            has_audio_output: true,
            has_speech_engine: true,
            has_synth_output: true,
            has_vibration: true,
            has_display: true,
        }
    }

    /// Probe the running process
    ///
    /// None of these checks plays sound or needs a user gesture.
    pub fn from_host(config: &Config) -> Self {
        let user_agent = std::env::var(USER_AGENT_ENV)
            .ok()
            .filter(|ua| !ua.trim().is_empty())
            .or_else(|| config.user_agent())
            .unwrap_or_else(platform::host_user_agent);

        let has_player = crate::audio::PlayerCommand::resolve(config.player().as_deref()).is_some();
        let has_speech_engine =
            cfg!(feature = "native-tts") || platform::find_executable("espeak-ng").is_some();

        let probe = Self {
            user_agent,
            has_audio_output: has_player,
            has_speech_engine,
            has_synth_output: has_player,
            has_vibration: false,
            has_display: platform::has_terminal_display(),
        };
        debug!("Host probe: {:?}", probe);
        probe
    }
}

/// Capabilities the playback chain is built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityProfile {
    pub platform_class: PlatformClass,
    pub supports_remote_audio: bool,
    /// Native speech is present *and* trusted to be audible
    pub supports_native_speech: bool,
    pub supports_tone_synthesis: bool,
    pub supports_vibration: bool,
    pub supports_visual_fallback: bool,
    /// Native speech exists even if untrusted; it is tried after tones
    pub native_speech_present: bool,
}

impl CapabilityProfile {
    /// Profile for platforms nothing is known about
    pub fn conservative() -> Self {
        Self {
            platform_class: PlatformClass::Unknown,
            supports_remote_audio: true,
            supports_native_speech: false,
            supports_tone_synthesis: false,
            supports_vibration: false,
            supports_visual_fallback: false,
            native_speech_present: false,
        }
    }

    /// Profile where only the sensory fallback is left
    pub fn sensory_only(platform_class: PlatformClass) -> Self {
        Self {
            platform_class,
            supports_remote_audio: false,
            supports_native_speech: false,
            supports_tone_synthesis: false,
            supports_vibration: false,
            supports_visual_fallback: false,
            native_speech_present: false,
        }
    }

    /// Backends to try, highest priority first
    ///
    /// Untrusted native speech sits below tone synthesis so it can never be
    /// the last audible option. The sensory fallback is always last.
    pub fn backend_order(&self) -> Vec<BackendId> {
        let mut order = Vec::with_capacity(5);
        if self.supports_remote_audio {
            order.push(BackendId::Remote);
        }
        if self.supports_native_speech {
            order.push(BackendId::Native);
        }
        if self.supports_tone_synthesis {
            order.push(BackendId::Tone);
        }
        if !self.supports_native_speech && self.native_speech_present {
            order.push(BackendId::Native);
        }
        order.push(BackendId::Sensory);
        order
    }
}

/// Turns a runtime probe into a capability profile
#[derive(Debug, Clone)]
pub struct CapabilityDetector {
    /// Case-insensitive user agent markers of quirky Android vendor browsers
    quirky_markers: Vec<String>,
}

impl CapabilityDetector {
    pub fn new(quirky_markers: Vec<String>) -> Self {
        Self {
            quirky_markers: quirky_markers
                .into_iter()
                .map(|m| m.to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.quirky_vendors())
    }

    /// Classify a user agent string
    pub fn classify(&self, user_agent: &str) -> PlatformClass {
        if IOS_RE.is_match(user_agent) {
            return PlatformClass::Ios;
        }
        if ANDROID_RE.is_match(user_agent) {
            let lower = user_agent.to_lowercase();
            if self.quirky_markers.iter().any(|m| lower.contains(m.as_str())) {
                return PlatformClass::AndroidVendorQuirky;
            }
            return PlatformClass::AndroidGeneric;
        }
        if DESKTOP_RE.is_match(user_agent) {
            return PlatformClass::Desktop;
        }
        PlatformClass::Unknown
    }

    /// Compute the capability profile for `probe`
    ///
    /// Pure and idempotent. Never fails: unknown agents get the
    /// conservative profile.
    pub fn detect(&self, probe: &RuntimeProbe) -> CapabilityProfile {
        let platform_class = self.classify(&probe.user_agent);

        let profile = match platform_class {
            PlatformClass::Unknown => CapabilityProfile::conservative(),
            class => {
                let quirky = class == PlatformClass::AndroidVendorQuirky;
                let no_vibration =
                    matches!(class, PlatformClass::Desktop | PlatformClass::Ios);
                CapabilityProfile {
                    platform_class: class,
                    supports_remote_audio: probe.has_audio_output,
                    supports_native_speech: probe.has_speech_engine && !quirky,
                    supports_tone_synthesis: probe.has_synth_output,
                    supports_vibration: probe.has_vibration && !no_vibration,
                    supports_visual_fallback: probe.has_display,
                    native_speech_present: probe.has_speech_engine,
                }
            }
        };

        debug!(
            "Detected {:?} for agent {:?}: {:?}",
            platform_class, probe.user_agent, profile
        );
        profile
    }
}

impl Default for CapabilityDetector {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 Mobile/15E148 Safari/604.1";
    const PIXEL: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 Chrome/120.0 Mobile Safari/537.36";
    const MIUI: &str = "Mozilla/5.0 (Linux; U; Android 12; zh-cn; 2201123C Build/SKQ1) AppleWebKit/537.36 Chrome/100.0 Mobile Safari/537.36 XiaoMi/MiuiBrowser/17.1.1";
    const WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0 Safari/537.36";

    #[test]
    fn test_classify_agents() {
        let detector = CapabilityDetector::default();
        assert_eq!(detector.classify(IPHONE), PlatformClass::Ios);
        assert_eq!(detector.classify(PIXEL), PlatformClass::AndroidGeneric);
        assert_eq!(detector.classify(MIUI), PlatformClass::AndroidVendorQuirky);
        assert_eq!(detector.classify(WINDOWS), PlatformClass::Desktop);
        assert_eq!(detector.classify("curl/8.0"), PlatformClass::Unknown);
        assert_eq!(detector.classify(""), PlatformClass::Unknown);
    }

    #[test]
    fn test_unknown_gets_conservative_profile() {
        let detector = CapabilityDetector::default();
        let profile = detector.detect(&RuntimeProbe::full("SomeEmbeddedThing/1.0"));
        assert_eq!(profile, CapabilityProfile::conservative());
        assert_eq!(
            profile.backend_order(),
            vec![BackendId::Remote, BackendId::Sensory]
        );
    }

    #[test]
    fn test_quirky_android_demotes_native_speech() {
        let detector = CapabilityDetector::default();
        let profile = detector.detect(&RuntimeProbe::full(MIUI));
        assert!(!profile.supports_native_speech);
        assert!(profile.native_speech_present);
        assert_eq!(
            profile.backend_order(),
            vec![
                BackendId::Remote,
                BackendId::Tone,
                BackendId::Native,
                BackendId::Sensory
            ]
        );
    }

    #[test]
    fn test_generic_android_order() {
        let detector = CapabilityDetector::default();
        let profile = detector.detect(&RuntimeProbe::full(PIXEL));
        assert!(profile.supports_vibration);
        assert_eq!(
            profile.backend_order(),
            vec![
                BackendId::Remote,
                BackendId::Native,
                BackendId::Tone,
                BackendId::Sensory
            ]
        );
    }

    #[test]
    fn test_ios_has_no_vibration() {
        let detector = CapabilityDetector::default();
        let profile = detector.detect(&RuntimeProbe::full(IPHONE));
        assert_eq!(profile.platform_class, PlatformClass::Ios);
        assert!(!profile.supports_vibration);
        assert!(profile.supports_visual_fallback);
    }

    #[test]
    fn test_detect_is_idempotent() {
        let detector = CapabilityDetector::default();
        let probe = RuntimeProbe::full(WINDOWS);
        assert_eq!(detector.detect(&probe), detector.detect(&probe));
    }

    #[test]
    fn test_sensory_only_order() {
        let profile = CapabilityProfile::sensory_only(PlatformClass::Desktop);
        assert_eq!(profile.backend_order(), vec![BackendId::Sensory]);
    }

    #[test]
    fn test_custom_markers() {
        let detector = CapabilityDetector::new(vec!["AcmeBrowser".to_string()]);
        let ua = "Mozilla/5.0 (Linux; Android 13) AcmeBrowser/2.0";
        assert_eq!(detector.classify(ua), PlatformClass::AndroidVendorQuirky);
        assert_eq!(detector.classify(MIUI), PlatformClass::AndroidGeneric);
    }
}
