use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use toastchat_core::{DEFAULT_FILES_DIR, NotFoundPolicy};
use url::Url;

/// `config.json` is expected to be tiny; larger files are treated as corrupt.
pub const MAX_CONFIG_BYTES: u64 = 64 * 1024;

pub const DEFAULT_BRIDGE_URL: &str = "ws://127.0.0.1:8765/bridge";
pub const DEFAULT_HOTKEY: &str = "ctrl+alt+w";
pub const DEFAULT_TITLE: &str = "ToastChat";
/// AppUserModelID of Windows PowerShell, which is allowed to raise toasts
/// without an installed shortcut.
pub const DEFAULT_APP_ID: &str =
    "{1AC14E77-02E7-4E5D-B744-2EB1AE5198B7}\\WindowsPowerShell\\v1.0\\powershell.exe";

const MAX_BRIDGE_URL_LEN: usize = 2048;
const MAX_APP_ID_LEN: usize = 256;
const MAX_TITLE_LEN: usize = 64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ClipboardBackend {
    /// Bitmaps, copied files and text.
    #[default]
    Full,
    /// Plain text only.
    TextOnly,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum NotifierBackend {
    Toast,
    Console,
}

impl Default for NotifierBackend {
    fn default() -> Self {
        if cfg!(target_os = "windows") {
            NotifierBackend::Toast
        } else {
            NotifierBackend::Console
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,
    #[serde(default = "default_hotkey")]
    pub hotkey: String,
    #[serde(default = "default_files_dir")]
    pub files_dir: PathBuf,
    #[serde(default)]
    pub not_found: NotFoundPolicy,
    #[serde(default)]
    pub clipboard: ClipboardBackend,
    #[serde(default)]
    pub notifier: NotifierBackend,
    #[serde(default = "default_app_id")]
    pub app_id: String,
    #[serde(default = "default_title")]
    pub title: String,
}

fn default_bridge_url() -> String {
    DEFAULT_BRIDGE_URL.to_owned()
}

fn default_hotkey() -> String {
    DEFAULT_HOTKEY.to_owned()
}

fn default_files_dir() -> PathBuf {
    PathBuf::from(DEFAULT_FILES_DIR)
}

fn default_app_id() -> String {
    DEFAULT_APP_ID.to_owned()
}

fn default_title() -> String {
    DEFAULT_TITLE.to_owned()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bridge_url: default_bridge_url(),
            hotkey: default_hotkey(),
            files_dir: default_files_dir(),
            not_found: NotFoundPolicy::default(),
            clipboard: ClipboardBackend::default(),
            notifier: NotifierBackend::default(),
            app_id: default_app_id(),
            title: default_title(),
        }
    }
}

/// Command-line values that take precedence over the saved file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub bridge_url: Option<String>,
    pub hotkey: Option<String>,
    pub files_dir: Option<PathBuf>,
    pub not_found: Option<NotFoundPolicy>,
    pub clipboard: Option<ClipboardBackend>,
    pub notifier: Option<NotifierBackend>,
    pub app_id: Option<String>,
    pub title: Option<String>,
}

impl Settings {
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(value) = overrides.bridge_url {
            self.bridge_url = value;
        }
        if let Some(value) = overrides.hotkey {
            self.hotkey = value;
        }
        if let Some(value) = overrides.files_dir {
            self.files_dir = value;
        }
        if let Some(value) = overrides.not_found {
            self.not_found = value;
        }
        if let Some(value) = overrides.clipboard {
            self.clipboard = value;
        }
        if let Some(value) = overrides.notifier {
            self.notifier = value;
        }
        if let Some(value) = overrides.app_id {
            self.app_id = value;
        }
        if let Some(value) = overrides.title {
            self.title = value;
        }
    }
}

#[derive(Debug)]
pub enum ConfigLoadError {
    Metadata(io::Error),
    TooLarge { size: u64, max: u64 },
    Read(io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigLoadError::Metadata(e) => write!(f, "metadata read failed: {e}"),
            ConfigLoadError::TooLarge { size, max } => {
                write!(f, "file too large: {size} bytes (max {max})")
            }
            ConfigLoadError::Read(e) => write!(f, "read failed: {e}"),
            ConfigLoadError::Parse(e) => write!(f, "parse failed: {e}"),
            ConfigLoadError::Invalid(e) => write!(f, "invalid settings: {e}"),
        }
    }
}

impl std::error::Error for ConfigLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigLoadError::Metadata(e) => Some(e),
            ConfigLoadError::Read(e) => Some(e),
            ConfigLoadError::Parse(e) => Some(e),
            ConfigLoadError::TooLarge { .. } | ConfigLoadError::Invalid(_) => None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigSaveError {
    Invalid(String),
    Serialize(serde_json::Error),
    WriteTmp(io::Error),
    Rename(io::Error),
}

impl std::fmt::Display for ConfigSaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSaveError::Invalid(e) => write!(f, "invalid settings: {e}"),
            ConfigSaveError::Serialize(e) => write!(f, "serialize failed: {e}"),
            ConfigSaveError::WriteTmp(e) => write!(f, "tmp write failed: {e}"),
            ConfigSaveError::Rename(e) => write!(f, "rename failed: {e}"),
        }
    }
}

impl std::error::Error for ConfigSaveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigSaveError::Serialize(e) => Some(e),
            ConfigSaveError::WriteTmp(e) => Some(e),
            ConfigSaveError::Rename(e) => Some(e),
            ConfigSaveError::Invalid(_) => None,
        }
    }
}

/// Per-user directory for config and logs.
///
/// `TOASTCHAT_CONFIG_DIR` wins, then `%LOCALAPPDATA%\ToastChat`, then
/// `$XDG_CONFIG_HOME/toastchat` or `~/.config/toastchat`, then `.`.
pub fn app_dir() -> PathBuf {
    let dir = if let Some(override_dir) = std::env::var_os("TOASTCHAT_CONFIG_DIR") {
        PathBuf::from(override_dir)
    } else if let Some(base) = std::env::var_os("LOCALAPPDATA") {
        PathBuf::from(base).join("ToastChat")
    } else if let Some(base) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(base).join("toastchat")
    } else if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".config").join("toastchat")
    } else {
        PathBuf::from(".")
    };
    let _ = fs::create_dir_all(&dir);
    dir
}

pub fn config_path() -> PathBuf {
    app_dir().join("config.json")
}

pub fn log_path() -> PathBuf {
    app_dir().join("logs").join("toastchat.log")
}

pub fn parse_settings_json(data: &str) -> Result<Settings, serde_json::Error> {
    serde_json::from_str::<Settings>(data)
}

pub fn validate_settings(settings: &Settings) -> Result<(), String> {
    let mut errors: Vec<String> = Vec::new();

    let bridge_url = settings.bridge_url.trim();
    if bridge_url.is_empty() {
        errors.push("Bridge URL is required.".to_string());
    } else if bridge_url.len() > MAX_BRIDGE_URL_LEN {
        errors.push(format!(
            "Bridge URL is too long ({} > {} chars).",
            bridge_url.len(),
            MAX_BRIDGE_URL_LEN
        ));
    } else {
        match Url::parse(bridge_url) {
            Ok(url) => {
                let scheme = url.scheme();
                if scheme != "ws" && scheme != "wss" {
                    errors.push(
                        "Bridge URL must start with ws:// or wss:// (WebSocket).".to_string(),
                    );
                }
            }
            Err(err) => errors.push(format!("Bridge URL is invalid: {err}")),
        }
    }

    if let Err(err) = crate::hotkey::parse_hotkey(&settings.hotkey) {
        errors.push(err);
    }

    if settings.files_dir.as_os_str().is_empty() {
        errors.push("Files directory is required.".to_string());
    }

    let app_id = settings.app_id.trim();
    if app_id.is_empty() || app_id.len() > MAX_APP_ID_LEN {
        errors.push(format!(
            "Toast app id must be 1..={MAX_APP_ID_LEN} chars."
        ));
    }

    let title = settings.title.trim();
    if title.is_empty() || title.len() > MAX_TITLE_LEN {
        errors.push(format!("Toast title must be 1..={MAX_TITLE_LEN} chars."));
    }

    if settings.notifier == NotifierBackend::Toast && !cfg!(target_os = "windows") {
        errors.push("Toast notifications need Windows; use --notifier console.".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "Please fix the following:\n\n- {}",
            errors.join("\n- ")
        ))
    }
}

/// Reads saved settings; `Ok(None)` when no file exists yet.
pub fn load_settings_from_path(path: &Path) -> Result<Option<Settings>, ConfigLoadError> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(ConfigLoadError::Metadata(err)),
    };
    if meta.len() > MAX_CONFIG_BYTES {
        return Err(ConfigLoadError::TooLarge {
            size: meta.len(),
            max: MAX_CONFIG_BYTES,
        });
    }

    let data = fs::read_to_string(path).map_err(ConfigLoadError::Read)?;
    let settings = parse_settings_json(&data).map_err(ConfigLoadError::Parse)?;
    validate_settings(&settings).map_err(ConfigLoadError::Invalid)?;
    Ok(Some(settings))
}

pub fn save_settings_to_path(path: &Path, settings: &Settings) -> Result<(), ConfigSaveError> {
    validate_settings(settings).map_err(ConfigSaveError::Invalid)?;

    let tmp = path.with_extension("json.tmp");
    let payload = serde_json::to_string_pretty(settings).map_err(ConfigSaveError::Serialize)?;
    fs::write(&tmp, payload.as_bytes()).map_err(ConfigSaveError::WriteTmp)?;

    if path.exists() {
        let _ = fs::remove_file(path);
    }

    fs::rename(&tmp, path).map_err(ConfigSaveError::Rename)?;
    Ok(())
}

pub fn save_settings_with_retry(path: &Path, settings: &Settings) -> Result<(), ConfigSaveError> {
    const MAX_ATTEMPTS: u32 = 3;
    const BACKOFF_BASE_MS: u64 = 50;

    let mut attempt: u32 = 1;
    loop {
        match save_settings_to_path(path, settings) {
            Ok(()) => return Ok(()),
            Err(err @ ConfigSaveError::Invalid(_)) => return Err(err),
            Err(err) if attempt >= MAX_ATTEMPTS => return Err(err),
            Err(_) => {
                let backoff_ms = BACKOFF_BASE_MS.saturating_mul(1_u64 << (attempt - 1));
                std::thread::sleep(Duration::from_millis(backoff_ms));
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn console_settings() -> Settings {
        Settings {
            notifier: NotifierBackend::Console,
            ..Settings::default()
        }
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let settings = parse_settings_json(r#"{"not_found":"silent","clipboard":"text-only"}"#)
            .expect("parse partial settings");
        assert_eq!(settings.bridge_url, DEFAULT_BRIDGE_URL);
        assert_eq!(settings.hotkey, DEFAULT_HOTKEY);
        assert_eq!(settings.files_dir, PathBuf::from("Files"));
        assert_eq!(settings.not_found, NotFoundPolicy::Silent);
        assert_eq!(settings.clipboard, ClipboardBackend::TextOnly);
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let mut settings = console_settings();
        settings.apply(Overrides {
            hotkey: Some("ctrl+shift+m".to_owned()),
            not_found: Some(NotFoundPolicy::Silent),
            ..Overrides::default()
        });
        assert_eq!(settings.hotkey, "ctrl+shift+m");
        assert_eq!(settings.not_found, NotFoundPolicy::Silent);
        assert_eq!(settings.bridge_url, DEFAULT_BRIDGE_URL);
    }

    #[test]
    fn validation_lists_every_problem() {
        let settings = Settings {
            bridge_url: "http://localhost".to_owned(),
            hotkey: "ctrl+alt+".to_owned(),
            title: String::new(),
            ..console_settings()
        };
        let err = validate_settings(&settings).unwrap_err();
        assert!(err.contains("ws:// or wss://"), "{err}");
        assert!(err.contains("Hotkey"), "{err}");
        assert!(err.contains("title"), "{err}");
    }

    #[test]
    fn defaults_validate_with_console_notifier() {
        validate_settings(&console_settings()).expect("defaults are valid");
    }

    #[test]
    fn log_file_lives_beside_the_config() {
        let log = log_path();
        assert!(log.ends_with(Path::new("logs").join("toastchat.log")));
        assert_eq!(log.parent().and_then(Path::parent), config_path().parent());
    }
}
