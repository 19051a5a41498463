//! Supported document formats and the watermarking capability they share

use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};

/// Extensions accepted during directory traversal, lower-case and without the dot
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["pdf", "docx", "xlsx"];

/// Apply a text watermark to one document, writing a new document.
///
/// `input` and `output` may name different files only; implementations read the
/// whole input before writing the output.
pub trait Watermarker {
    fn apply(&self, input: &Path, output: &Path, text: &str) -> Result<()>;
}

/// Document kinds, selected solely by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Xlsx,
}

impl DocumentFormat {
    /// Match an extension (case-insensitive, with or without a leading dot)
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "xlsx" => Some(Self::Xlsx),
            _ => None,
        }
    }

    /// Detect the format of a path from its extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Short label used in user-facing diagnostics
    pub fn label(self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Docx => "Word",
            Self::Xlsx => "Excel",
        }
    }

    /// Cargo feature that compiles in this format's backend
    pub fn feature(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Xlsx => "xlsx",
        }
    }

    /// The handler for this format
    pub fn watermarker(self) -> Box<dyn Watermarker> {
        match self {
            #[cfg(feature = "pdf")]
            Self::Pdf => Box::new(crate::pdf::PdfWatermarker::with_system_font()),
            #[cfg(feature = "docx")]
            Self::Docx => Box::new(crate::docx::DocxWatermarker::default()),
            #[cfg(feature = "xlsx")]
            Self::Xlsx => Box::new(crate::xlsx::XlsxWatermarker::default()),
            #[allow(unreachable_patterns)]
            other => Box::new(MissingBackend(other)),
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Stands in for a format whose backend was left out of the build
#[derive(Debug, Clone, Copy)]
pub struct MissingBackend(pub DocumentFormat);

impl Watermarker for MissingBackend {
    fn apply(&self, _input: &Path, _output: &Path, _text: &str) -> Result<()> {
        Err(Error::MissingBackend {
            format: self.0.label(),
            feature: self.0.feature(),
        })
    }
}
