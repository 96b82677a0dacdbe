use std::{
    fs, io,
    path::{Path, PathBuf},
};

use sha2::{Digest, Sha256};

pub const DEFAULT_FILES_DIR: &str = "Files";
const MAX_FILE_NAME_LEN: usize = 128;

/// Directory that receives fetched attachments and clipboard images.
///
/// Nothing here is ever cleaned up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilesDir {
    root: PathBuf,
}

impl FilesDir {
    /// Anchors `root` to the current directory when it is relative.
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            root: std::path::absolute(root.as_ref())?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    pub fn attachment_path(&self, file_name: &str) -> PathBuf {
        self.root.join(sanitize_file_name(file_name))
    }

    /// Stores PNG bytes under a content-derived name and returns the path.
    pub fn store_clipboard_image(&self, png: &[u8]) -> io::Result<PathBuf> {
        self.ensure()?;
        let digest = Sha256::digest(png);
        let path = self
            .root
            .join(format!("clipboard-{}.png", hex::encode(&digest[0..8])));
        if !path.exists() {
            fs::write(&path, png)?;
        }
        Ok(path)
    }
}

pub fn sanitize_file_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return "file.bin".to_string();
    }
    let mut out = String::with_capacity(trimmed.len());
    for ch in trimmed.chars() {
        if matches!(ch, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || ch.is_control() {
            out.push('_');
        } else {
            out.push(ch);
        }
    }
    if out.len() > MAX_FILE_NAME_LEN {
        let mut end = MAX_FILE_NAME_LEN;
        while !out.is_char_boundary(end) {
            end -= 1;
        }
        out.truncate(end);
    }
    out
}
