//! System font discovery for watermark text
//!
//! The built-in PDF fonts only cover Latin text. To stamp CJK (or any other
//! script) we look for a well-known Unicode font on the host, once per process,
//! and keep its bytes around for shaping and glyph outlines.

use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Font files probed in order; the first that loads wins
pub const FONT_CANDIDATES: &[&str] = &[
    "/System/Library/Fonts/PingFang.ttc",
    "/System/Library/Fonts/STHeiti Light.ttc",
    "/Library/Fonts/Arial Unicode.ttf",
    "/usr/share/fonts/truetype/droid/DroidSansFallbackFull.ttf",
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
    "C:\\Windows\\Fonts\\msyh.ttc",
];

static RESOLVED: OnceCell<Option<WatermarkFont>> = OnceCell::new();

/// A parsed-once font file usable for drawing watermark glyphs
#[derive(Clone)]
pub struct WatermarkFont {
    path: PathBuf,
    data: Vec<u8>,
    index: u32,
}

impl std::fmt::Debug for WatermarkFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatermarkFont")
            .field("path", &self.path)
            .field("bytes", &self.data.len())
            .field("index", &self.index)
            .finish()
    }
}

impl WatermarkFont {
    /// Load a font file, using the first face of a collection
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let data = fs::read(path)?;
        Self::from_bytes(path.to_path_buf(), data)
    }

    /// Wrap font bytes, checking that they parse as a font face
    pub fn from_bytes(path: PathBuf, data: Vec<u8>) -> Result<Self> {
        let font = Self { path, data, index: 0 };
        font.face()?;
        Ok(font)
    }

    /// Where the font was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the face; cheap enough to do once per document
    pub fn face(&self) -> Result<rustybuzz::Face<'_>> {
        rustybuzz::Face::from_slice(&self.data, self.index).ok_or_else(|| {
            Error::Font(format!("cannot parse font face in {}", self.path.display()))
        })
    }
}

/// Probe `candidates` in order and return the first font that loads
pub fn resolve_from<P: AsRef<Path>>(candidates: &[P]) -> Option<WatermarkFont> {
    for candidate in candidates {
        let path = candidate.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "font candidate not present");
            continue;
        }
        match WatermarkFont::load(path) {
            Ok(font) => return Some(font),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unusable font"),
        }
    }
    None
}

/// The process-wide watermark font, probed on first use
pub fn resolved() -> Option<&'static WatermarkFont> {
    RESOLVED
        .get_or_init(|| {
            let font = resolve_from(FONT_CANDIDATES);
            match &font {
                Some(f) => info!(path = %f.path().display(), "registered watermark font"),
                None => info!("no Unicode font found, falling back to Helvetica"),
            }
            font
        })
        .as_ref()
}

/// Whether a Unicode-capable font was registered
pub fn resolve() -> bool {
    resolved().is_some()
}
