//! Recursive directory processing

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::format::DocumentFormat;
use crate::process::process_file;

/// Per-directory tally of processed files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub success: usize,
    pub failed: usize,
}

impl WalkSummary {
    pub fn total(&self) -> usize {
        self.success + self.failed
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Office writes `~$name.docx` lock files next to open documents
fn is_lock_file(name: &str) -> bool {
    name.starts_with("~$")
}

/// Files before subdirectories, then by name
fn files_first(a: &DirEntry, b: &DirEntry) -> Ordering {
    a.file_type()
        .is_dir()
        .cmp(&b.file_type().is_dir())
        .then_with(|| a.file_name().cmp(b.file_name()))
}

fn is_candidate(entry: &DirEntry) -> bool {
    let is_file = entry.file_type().is_file() || (entry.path_is_symlink() && entry.path().is_file());
    if !is_file {
        return false;
    }

    let name = entry.file_name().to_string_lossy();
    if is_hidden(&name) || is_lock_file(&name) {
        return false;
    }

    DocumentFormat::from_path(entry.path()).is_some()
}

/// Supported files under `root`, skipping hidden directories, hidden files and lock files.
///
/// The whole list is gathered up front so files written during processing are never revisited.
pub fn collect_candidates(root: &Path) -> Vec<PathBuf> {
    let walker = WalkDir::new(root)
        .sort_by(files_first)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !(e.file_type().is_dir() && is_hidden(&e.file_name().to_string_lossy())));

    let mut files = Vec::new();
    for entry in walker {
        match entry {
            Ok(entry) if is_candidate(&entry) => files.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "skipping unreadable entry"),
        }
    }
    files
}

/// Output directory for `file` when mirroring `root` into `output_dir`
fn mirrored_dir(root: &Path, file: &Path, output_dir: &Path) -> PathBuf {
    let relative = file
        .parent()
        .and_then(|parent| parent.strip_prefix(root).ok())
        .unwrap_or_else(|| Path::new(""));
    if relative.as_os_str().is_empty() {
        output_dir.to_path_buf()
    } else {
        output_dir.join(relative)
    }
}

/// Watermark every supported file under `root`, printing progress per file
pub fn process_directory(root: &Path, text: &str, output_dir: Option<&Path>, overwrite: bool) -> WalkSummary {
    let files = collect_candidates(root);
    debug!(root = %root.display(), count = files.len(), "collected files");

    let mut summary = WalkSummary::default();
    for file in &files {
        let file_output_dir = output_dir.map(|out| mirrored_dir(root, file, out));
        let name = file.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();

        println!("处理: {}", name);
        if process_file(file, text, file_output_dir.as_deref(), overwrite) {
            println!("  ✓ 完成");
            summary.success += 1;
        } else {
            println!("  ✗ 失败");
            summary.failed += 1;
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_collect_candidates_filters_and_orders() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        for name in [
            "b.docx",
            "A.PDF",
            "c.txt",
            ".hidden.xlsx",
            "~$b.docx",
            "sub/d.xlsx",
            ".git/e.pdf",
            "z.pdf",
        ] {
            touch(&root.join(name));
        }

        let found: Vec<PathBuf> = collect_candidates(root)
            .into_iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();

        assert_eq!(
            found,
            vec![
                PathBuf::from("A.PDF"),
                PathBuf::from("b.docx"),
                PathBuf::from("z.pdf"),
                PathBuf::from("sub/d.xlsx"),
            ]
        );
    }

    #[test]
    fn test_mirrored_dir() {
        let root = Path::new("/data/in");
        let out = Path::new("/data/out");
        assert_eq!(mirrored_dir(root, Path::new("/data/in/a.pdf"), out), PathBuf::from("/data/out"));
        assert_eq!(
            mirrored_dir(root, Path::new("/data/in/x/y/a.pdf"), out),
            PathBuf::from("/data/out/x/y")
        );
    }

    #[test]
    fn test_empty_directory() {
        let temp = TempDir::new().unwrap();
        let summary = process_directory(temp.path(), "DRAFT", None, false);
        assert_eq!(summary, WalkSummary::default());
        assert_eq!(summary.total(), 0);
    }
}
