use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, warn};

use crate::{FilesDir, MediaKind, RouterError};

#[derive(Debug, Error)]
#[error("clipboard read failed: {0}")]
pub struct ClipboardError(pub String);

/// Read access to the system clipboard.
///
/// Each method reports `Ok(None)` / an empty list when the clipboard simply
/// holds no content of that type.
pub trait ClipboardSource: Send + Sync {
    fn image_png(&self) -> Result<Option<Vec<u8>>, ClipboardError>;

    fn file_list(&self) -> Result<Vec<PathBuf>, ClipboardError>;

    fn text(&self) -> Result<Option<String>, ClipboardError>;
}

/// Turns the clipboard into a path for a `kind` send.
///
/// Sources are tried in a fixed order and the first one that yields a path
/// wins: a bitmap (images only, saved as PNG into `files`), then the first
/// copied file, then the plain text taken literally.
pub fn resolve_clipboard_path(
    kind: MediaKind,
    clipboard: &dyn ClipboardSource,
    files: &FilesDir,
) -> Result<PathBuf, RouterError> {
    if kind == MediaKind::Image {
        match clipboard.image_png() {
            Ok(Some(png)) => match files.store_clipboard_image(&png) {
                Ok(path) => {
                    debug!(path = %path.display(), "clipboard image stored");
                    return Ok(path);
                }
                Err(err) => warn!("storing clipboard image failed: {}", err),
            },
            Ok(None) => {}
            Err(err) => debug!("no clipboard image: {}", err),
        }
    }

    match clipboard.file_list() {
        Ok(list) => {
            if let Some(first) = list.into_iter().next() {
                debug!(path = %first.display(), "clipboard file reference");
                return Ok(first);
            }
        }
        Err(err) => debug!("no clipboard file list: {}", err),
    }

    match clipboard.text() {
        Ok(Some(text)) => {
            let literal = normalize_path_input(&text);
            if !literal.is_empty() {
                debug!(path = literal, "clipboard text used as path");
                return Ok(PathBuf::from(literal));
            }
        }
        Ok(None) => {}
        Err(err) => debug!("no clipboard text: {}", err),
    }

    Err(RouterError::ClipboardEmpty)
}

/// Trims whitespace and one pair of surrounding double quotes, as left by
/// Explorer's "Copy as path".
pub fn normalize_path_input(input: &str) -> &str {
    let trimmed = input.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .map(str::trim)
        .unwrap_or(trimmed)
}
