//! Host platform detection utilities

use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

/// WSLg exposes its PulseAudio server at this socket
pub const WSLG_PULSE_PATH: &str = "/mnt/wslg/PulseServer";

/// Detect if running in WSL (Windows Subsystem for Linux)
///
/// Checks for WSL-specific indicators in /proc/version and environment variables.
pub fn is_wsl() -> bool {
    if let Ok(contents) = fs::read_to_string("/proc/version") {
        let lower = contents.to_lowercase();
        if lower.contains("microsoft") || lower.contains("wsl") {
            return true;
        }
    }

    std::env::var("WSL_DISTRO_NAME").is_ok()
}

/// PulseAudio server a child process should be pointed at, if any
///
/// Returns the WSLg socket when running under WSL without `PULSE_SERVER`
/// already set. Native Linux uses PulseAudio's default socket.
pub fn pulse_server_override() -> Option<&'static str> {
    if std::env::var("PULSE_SERVER").is_ok() {
        return None;
    }
    if is_wsl() && Path::new(WSLG_PULSE_PATH).exists() {
        return Some(WSLG_PULSE_PATH);
    }
    None
}

/// Locate an executable on PATH
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|full| full.is_file())
}

/// User agent string describing this host process
///
/// Shaped so the capability detector classifies it like any other agent.
pub fn host_user_agent() -> String {
    let os = match std::env::consts::OS {
        "macos" => "Macintosh; Mac OS X",
        "ios" => "iPhone; CPU iPhone OS",
        "android" => "Linux; Android",
        "windows" => "Windows NT",
        "linux" if is_wsl() => "X11; Linux; WSL",
        "linux" => "X11; Linux",
        other => other,
    };
    format!(
        "{}/{} ({}; {})",
        crate::APP_NAME,
        crate::VERSION,
        os,
        std::env::consts::ARCH
    )
}

/// Whether on-screen feedback can reach the user
pub fn has_terminal_display() -> bool {
    std::io::stderr().is_terminal()
}
