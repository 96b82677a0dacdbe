pub mod bridge;
pub mod clipboard;
pub mod config;
pub mod console;
pub mod hotkey;
pub mod logging;
pub mod toast;
pub mod worker;
