use std::{path::PathBuf, sync::Arc, thread};

use clap::Parser;
use toastchat_core::{FilesDir, Notifier, NotFoundPolicy, Router, Session};
use tracing::{error, info, warn};

use toastchat_client::{
    bridge::BridgeClient,
    clipboard::build_clipboard,
    config::{
        ClipboardBackend, NotifierBackend, Overrides, Settings, config_path,
        load_settings_from_path, log_path, save_settings_with_retry, validate_settings,
    },
    console::ConsoleNotifier,
    hotkey::{compose_channel, run_hotkey_loop},
    logging::init_logging,
    worker::{run_compose_worker, run_inbound_worker},
};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "ToastChat",
    about = "Answer chat messages from desktop notifications"
)]
struct ClientArgs {
    /// WebSocket address of the chat bridge.
    #[arg(long)]
    bridge_url: Option<String>,
    /// Global shortcut that opens the compose prompt, e.g. ctrl+alt+w.
    #[arg(long)]
    hotkey: Option<String>,
    /// Where received attachments and clipboard images are stored.
    #[arg(long)]
    files_dir: Option<PathBuf>,
    /// What to do when a nickname matches no single chat: notify or silent.
    #[arg(long)]
    not_found: Option<NotFoundPolicy>,
    #[arg(long, value_enum)]
    clipboard: Option<ClipboardBackend>,
    #[arg(long, value_enum)]
    notifier: Option<NotifierBackend>,
    /// AppUserModelID toasts are raised under.
    #[arg(long)]
    app_id: Option<String>,
    #[arg(long)]
    title: Option<String>,
    /// Store the effective settings as the new defaults.
    #[arg(long, default_value_t = false)]
    save_config: bool,
}

impl ClientArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            bridge_url: self.bridge_url.clone(),
            hotkey: self.hotkey.clone(),
            files_dir: self.files_dir.clone(),
            not_found: self.not_found,
            clipboard: self.clipboard,
            notifier: self.notifier,
            app_id: self.app_id.clone(),
            title: self.title.clone(),
        }
    }
}

fn main() {
    run();
}

fn run() {
    init_logging(&log_path());

    let args = match ClientArgs::try_parse() {
        Ok(args) => args,
        Err(err) => {
            if err.use_stderr() {
                error!("arg parse failed: {}", err);
            }
            err.exit();
        }
    };

    let settings = match resolve_settings(&args) {
        Ok(settings) => settings,
        Err(err) => {
            error!("config resolution failed: {}", err);
            eprintln!("ToastChat failed to start:\n\n{err}");
            std::process::exit(2);
        }
    };

    let files = match FilesDir::new(&settings.files_dir).and_then(|files| {
        files.ensure()?;
        Ok(files)
    }) {
        Ok(files) => files,
        Err(err) => {
            error!(files_dir = %settings.files_dir.display(), "files directory unusable: {}", err);
            std::process::exit(1);
        }
    };

    let (bridge, inbound_rx) = match BridgeClient::connect(&settings.bridge_url) {
        Ok(connected) => connected,
        Err(err) => {
            error!(bridge_url = %settings.bridge_url, "bridge unavailable: {}", err);
            eprintln!("ToastChat could not reach the chat bridge: {err}");
            std::process::exit(1);
        }
    };

    let notifier = match build_notifier(&settings) {
        Ok(notifier) => notifier,
        Err(err) => {
            error!("{}", err);
            std::process::exit(2);
        }
    };

    let router = Arc::new(
        Router::new(
            Arc::new(bridge),
            notifier,
            build_clipboard(settings.clipboard),
            Arc::new(Session::new()),
            files,
        )
        .with_not_found_policy(settings.not_found),
    );

    info!(
        bridge_url = %settings.bridge_url,
        hotkey = %settings.hotkey,
        files_dir = %settings.files_dir.display(),
        notifier = ?settings.notifier,
        "ToastChat running"
    );

    let inbound_router = router.clone();
    let spawned = thread::Builder::new()
        .name("inbound".to_owned())
        .spawn(move || {
            run_inbound_worker(inbound_router, inbound_rx);
            error!("bridge connection lost; exiting");
            std::process::exit(1);
        });
    if let Err(err) = spawned {
        error!("failed to start inbound worker: {}", err);
        std::process::exit(1);
    }

    let (trigger, trigger_rx) = compose_channel();
    let compose_router = router.clone();
    let spawned = thread::Builder::new()
        .name("compose".to_owned())
        .spawn(move || run_compose_worker(compose_router, trigger_rx));
    if let Err(err) = spawned {
        error!("failed to start compose worker: {}", err);
        std::process::exit(1);
    }

    if let Err(err) = run_hotkey_loop(&settings.hotkey, || {
        trigger.fire();
    }) {
        error!("{}", err);
        std::process::exit(1);
    }
    warn!("hotkey event source ended");
}

fn resolve_settings(args: &ClientArgs) -> Result<Settings, String> {
    let path = config_path();
    let mut settings = match load_settings_from_path(&path) {
        Ok(Some(saved)) => saved,
        Ok(None) => Settings::default(),
        Err(err) => {
            warn!(path = %path.display(), "ignoring saved config: {}", err);
            Settings::default()
        }
    };
    settings.apply(args.overrides());
    validate_settings(&settings)?;

    if args.save_config {
        match save_settings_with_retry(&path, &settings) {
            Ok(()) => info!(path = %path.display(), "settings saved"),
            Err(err) => warn!(path = %path.display(), "saving settings failed: {}", err),
        }
    }
    Ok(settings)
}

fn build_notifier(settings: &Settings) -> Result<Arc<dyn Notifier>, String> {
    match settings.notifier {
        NotifierBackend::Console => Ok(Arc::new(ConsoleNotifier::stdio(&settings.title))),
        #[cfg(target_os = "windows")]
        NotifierBackend::Toast => Ok(Arc::new(toastchat_client::toast::ToastNotifier::new(
            &settings.app_id,
            &settings.title,
        ))),
        #[cfg(not(target_os = "windows"))]
        NotifierBackend::Toast => {
            Err("toast notifications are only available on Windows".to_owned())
        }
    }
}
