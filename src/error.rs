//! Error types for the watermark library

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the watermark library
#[derive(Error, Debug)]
pub enum Error {
    /// PDF processing error
    #[cfg(feature = "pdf")]
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// Zip container error (docx/xlsx)
    #[cfg(feature = "ooxml")]
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// XML parse or write error
    #[cfg(feature = "ooxml")]
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Malformed XML attribute
    #[cfg(feature = "ooxml")]
    #[error("XML attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Extension is not one of pdf/docx/xlsx
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    /// The backend for a format was not compiled in
    #[error("{format} support is not available; rebuild with `--features {feature}`")]
    MissingBackend {
        format: &'static str,
        feature: &'static str,
    },

    /// Encrypted PDFs cannot be stamped
    #[error("PDF is encrypted: {}", .0.display())]
    EncryptedPdf(PathBuf),

    /// A required part is missing from an Office package
    #[error("Missing package part: {0}")]
    MissingPart(String),

    /// The Office package is structurally invalid
    #[error("Invalid package: {0}")]
    InvalidPackage(String),

    /// Font error
    #[error("Font error: {0}")]
    Font(String),

    /// General error
    #[error("{0}")]
    General(String),
}
