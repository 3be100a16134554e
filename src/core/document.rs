//! Files handed to the viewer

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Extensions accepted by drop and the open dialog
pub const SUPPORTED_EXTENSIONS: &[&str] = &["md", "markdown"];

/// Raw file contents plus what the info bar shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl LoadedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Read a file from disk
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Untitled".to_string());
        Ok(Self { name, bytes })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Name without its extension, used for export file names
    pub fn stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name)
    }
}

/// Whether a file name has a supported extension
pub fn is_supported(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

/// Human-readable size: bytes, then KB and MB with one decimal
pub fn format_file_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    let size = bytes as f64;
    if size < KB {
        format!("{bytes} B")
    } else if size < MB {
        format!("{:.1} KB", size / KB)
    } else {
        format!("{:.1} MB", size / MB)
    }
}

pub fn window_title(name: Option<&str>) -> String {
    match name {
        Some(name) => format!("{name} - Markview"),
        None => "Markview".to_string(),
    }
}
