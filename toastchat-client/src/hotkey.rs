use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState, hotkey::HotKey};
use tracing::{debug, info};

pub fn parse_hotkey(label: &str) -> Result<HotKey, String> {
    label
        .trim()
        .parse::<HotKey>()
        .map_err(|err| format!("Hotkey {label:?} is invalid: {err}"))
}

/// Hands hotkey presses to the compose worker.
///
/// The channel is a rendezvous: a press only gets through while the worker
/// is idle and waiting, so presses during an open compose prompt are dropped.
#[derive(Clone)]
pub struct ComposeTrigger {
    tx: SyncSender<()>,
}

pub fn compose_channel() -> (ComposeTrigger, Receiver<()>) {
    let (tx, rx) = mpsc::sync_channel(0);
    (ComposeTrigger { tx }, rx)
}

impl ComposeTrigger {
    /// Returns whether the press was accepted.
    pub fn fire(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                debug!("compose prompt already open; hotkey press dropped");
                false
            }
            Err(TrySendError::Disconnected(())) => false,
        }
    }
}

/// Registers `label` and runs `on_press` on this thread for every press.
/// Only returns on registration failure or when the event source ends.
pub fn run_hotkey_loop(label: &str, mut on_press: impl FnMut()) -> Result<(), String> {
    let hotkey = parse_hotkey(label)?;
    let manager =
        GlobalHotKeyManager::new().map_err(|err| format!("hotkey manager init failed: {err}"))?;
    manager
        .register(hotkey)
        .map_err(|err| format!("registering hotkey {label} failed: {err}"))?;
    info!(hotkey = label, "hotkey registered");

    let receiver = GlobalHotKeyEvent::receiver();
    let mut handle = |event: GlobalHotKeyEvent| {
        if event.id() == hotkey.id() && event.state() == HotKeyState::Pressed {
            on_press();
        }
    };

    #[cfg(target_os = "windows")]
    pump_messages(&mut || {
        while let Ok(event) = receiver.try_recv() {
            handle(event);
        }
    });

    #[cfg(not(target_os = "windows"))]
    while let Ok(event) = receiver.recv() {
        handle(event);
    }

    let _ = manager.unregister(hotkey);
    Ok(())
}

/// Hotkey events are delivered through the thread's message queue, so the
/// registering thread has to keep pumping it.
#[cfg(target_os = "windows")]
fn pump_messages(drain: &mut impl FnMut()) {
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        DispatchMessageW, GetMessageW, MSG, TranslateMessage,
    };

    // SAFETY: MSG is plain data and is only handed to the message APIs of
    // the thread that owns the queue.
    unsafe {
        let mut msg: MSG = std::mem::zeroed();
        while GetMessageW(&mut msg, 0, 0, 0) > 0 {
            TranslateMessage(&msg);
            DispatchMessageW(&msg);
            drain();
        }
    }
}
