use std::io::Write;

use toastchat_client::config::{
    ClipboardBackend, MAX_CONFIG_BYTES, NotifierBackend, Settings, load_settings_from_path,
    save_settings_to_path, save_settings_with_retry,
};
use toastchat_core::NotFoundPolicy;

fn console_settings() -> Settings {
    Settings {
        notifier: NotifierBackend::Console,
        ..Settings::default()
    }
}

#[test]
fn load_settings_ignores_oversized_file() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("config.json");

    let mut file = std::fs::File::create(&path).expect("create config.json");
    file.write_all(&vec![b' '; (MAX_CONFIG_BYTES as usize) + 1024])
        .expect("write oversized config.json");
    drop(file);

    let err = load_settings_from_path(&path).expect_err("oversized file should error");
    let msg = err.to_string();
    assert!(msg.contains("too large"), "unexpected error: {msg}");
}

#[test]
fn missing_file_is_not_an_error() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let loaded = load_settings_from_path(&dir.path().join("config.json")).expect("load");
    assert!(loaded.is_none());
}

#[test]
fn saved_settings_load_back() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("config.json");

    let settings = Settings {
        bridge_url: "wss://bridge.example:9443/bridge".to_owned(),
        hotkey: "ctrl+shift+k".to_owned(),
        not_found: NotFoundPolicy::Silent,
        clipboard: ClipboardBackend::TextOnly,
        ..console_settings()
    };
    save_settings_with_retry(&path, &settings).expect("save settings");
    assert!(!path.with_extension("json.tmp").exists());

    let loaded = load_settings_from_path(&path)
        .expect("load settings")
        .expect("settings present");
    assert_eq!(loaded, settings);
}

#[test]
fn invalid_settings_are_never_written() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("config.json");

    let settings = Settings {
        bridge_url: "ftp://example".to_owned(),
        ..console_settings()
    };
    let err = save_settings_to_path(&path, &settings).expect_err("invalid url");
    assert!(err.to_string().contains("ws://"), "unexpected error: {err}");
    assert!(!path.exists());
}

#[test]
fn hand_edited_garbage_reports_parse_error() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").expect("write config.json");

    let err = load_settings_from_path(&path).expect_err("garbage should error");
    assert!(err.to_string().contains("parse failed"), "unexpected error: {err}");
}
