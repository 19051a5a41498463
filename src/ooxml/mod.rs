//! Office Open XML plumbing shared by the Word and Excel handlers

pub mod content_types;
pub mod package;
pub mod relationships;
pub mod xml;

pub use package::Package;
