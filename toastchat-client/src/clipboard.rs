use std::{io::Cursor, path::PathBuf, sync::Arc};

use arboard::Clipboard;
use image::{ImageFormat, RgbaImage};
use toastchat_core::{ClipboardError, ClipboardSource};

use crate::config::ClipboardBackend;

/// Full clipboard access through `arboard`.
///
/// A fresh handle is opened per read; on Windows holding one open would keep
/// other applications from writing to the clipboard.
pub struct ArboardClipboard;

/// Only plain text is read; bitmaps and copied files are never looked at.
pub struct TextOnlyClipboard;

pub fn build_clipboard(backend: ClipboardBackend) -> Arc<dyn ClipboardSource> {
    match backend {
        ClipboardBackend::Full => Arc::new(ArboardClipboard),
        ClipboardBackend::TextOnly => Arc::new(TextOnlyClipboard),
    }
}

fn open() -> Result<Clipboard, ClipboardError> {
    Clipboard::new().map_err(|err| ClipboardError(format!("clipboard open failed: {err}")))
}

fn read_text() -> Result<Option<String>, ClipboardError> {
    match open()?.get_text() {
        Ok(text) => Ok(Some(text)),
        Err(arboard::Error::ContentNotAvailable) => Ok(None),
        Err(err) => Err(ClipboardError(err.to_string())),
    }
}

impl ClipboardSource for ArboardClipboard {
    fn image_png(&self) -> Result<Option<Vec<u8>>, ClipboardError> {
        match open()?.get_image() {
            Ok(image) => encode_png(image.width, image.height, &image.bytes).map(Some),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(err) => Err(ClipboardError(err.to_string())),
        }
    }

    fn file_list(&self) -> Result<Vec<PathBuf>, ClipboardError> {
        match open()?.get().file_list() {
            Ok(files) => Ok(files),
            Err(arboard::Error::ContentNotAvailable) => Ok(Vec::new()),
            Err(err) => Err(ClipboardError(err.to_string())),
        }
    }

    fn text(&self) -> Result<Option<String>, ClipboardError> {
        read_text()
    }
}

impl ClipboardSource for TextOnlyClipboard {
    fn image_png(&self) -> Result<Option<Vec<u8>>, ClipboardError> {
        Ok(None)
    }

    fn file_list(&self) -> Result<Vec<PathBuf>, ClipboardError> {
        Ok(Vec::new())
    }

    fn text(&self) -> Result<Option<String>, ClipboardError> {
        read_text()
    }
}

/// Encodes a tightly packed RGBA8 bitmap as PNG.
pub fn encode_png(width: usize, height: usize, rgba: &[u8]) -> Result<Vec<u8>, ClipboardError> {
    let too_big = || ClipboardError(format!("bitmap too large: {width}x{height}"));
    let width = u32::try_from(width).map_err(|_| too_big())?;
    let height = u32::try_from(height).map_err(|_| too_big())?;

    let buffer = RgbaImage::from_raw(width, height, rgba.to_vec()).ok_or_else(|| {
        ClipboardError(format!(
            "bitmap size mismatch: {} bytes for {width}x{height}",
            rgba.len()
        ))
    })?;

    let mut out = Cursor::new(Vec::new());
    buffer
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|err| ClipboardError(format!("png encode failed: {err}")))?;
    Ok(out.into_inner())
}
