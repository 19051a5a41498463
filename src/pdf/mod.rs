//! PDF watermarking module

pub mod font;
pub mod overlay;
pub mod page;

// Re-export commonly used items
pub use font::{resolve as resolve_font, WatermarkFont};
pub use overlay::{OverlayOptions, PdfWatermarker};
