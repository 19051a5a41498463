//! Document Watermark Library
//!
//! Stamps a text watermark onto PDF, Word (.docx) and Excel (.xlsx) files:
//! - PDF: three rotated, translucent gray copies of the text over every page
//! - Word: a large light-gray run in each section's header
//! - Excel: the center print header of every worksheet
//!
//! Files can be processed one at a time or by walking a directory tree, writing
//! `<name>_watermarked<ext>` siblings, a mirrored output tree, or overwriting the
//! originals.
//!
//! # Example
//!
//! ```no_run
//! use doc_watermark::{process_directory, process_file};
//! use std::path::Path;
//!
//! // report.pdf -> report_watermarked.pdf
//! let ok = process_file(Path::new("report.pdf"), "机密文件", None, false);
//! assert!(ok);
//!
//! let summary = process_directory(Path::new("docs"), "内部使用", Some(Path::new("out")), false);
//! println!("{} ok, {} failed", summary.success, summary.failed);
//! ```

pub mod error;
pub mod format;
#[cfg(feature = "pdf")]
pub mod pdf;
#[cfg(feature = "ooxml")]
pub mod ooxml;
#[cfg(feature = "docx")]
pub mod docx;
#[cfg(feature = "xlsx")]
pub mod xlsx;
pub mod process;
pub mod walk;

// Re-export commonly used items
pub use error::{Error, Result};
pub use format::{DocumentFormat, Watermarker, SUPPORTED_EXTENSIONS};
pub use process::{process_file, sibling_output_path, OutputMode, WatermarkRequest};
pub use walk::{process_directory, WalkSummary};
