//! Single-file processing: output path policy, handler dispatch, overwrite backup

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::format::DocumentFormat;

/// Where the watermarked copy of a file goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// `<stem>_watermarked<ext>` next to the original
    SiblingFile,
    /// `<dir>/<file name>`, creating the directory as needed
    MirroredDirectory(PathBuf),
    /// Replace the original, keeping `<path>.tmp` as a backup until the handler succeeds
    Overwrite,
}

impl OutputMode {
    /// An output directory takes precedence over `--overwrite`
    pub fn from_flags(output_dir: Option<&Path>, overwrite: bool) -> Self {
        match output_dir {
            Some(dir) => Self::MirroredDirectory(dir.to_path_buf()),
            None if overwrite => Self::Overwrite,
            None => Self::SiblingFile,
        }
    }
}

/// One file to watermark
#[derive(Debug, Clone)]
pub struct WatermarkRequest {
    pub path: PathBuf,
    pub text: String,
    pub mode: OutputMode,
}

impl WatermarkRequest {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>, mode: OutputMode) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
            mode,
        }
    }

    /// Run the request, printing a diagnostic on failure.
    ///
    /// Never panics or propagates: every error ends up as `false`.
    pub fn process(&self) -> bool {
        let format = match DocumentFormat::from_path(&self.path) {
            Some(format) => format,
            None => {
                println!("不支持的文件类型: {}", dotted_extension(&self.path));
                return false;
            }
        };

        match self.run(format) {
            Ok(()) => true,
            Err(e) => {
                println!("{} 处理失败: {}", format.label(), e);
                false
            }
        }
    }

    fn run(&self, format: DocumentFormat) -> Result<()> {
        let handler = format.watermarker();

        match &self.mode {
            OutputMode::SiblingFile => {
                let output = sibling_output_path(&self.path);
                debug!(input = %self.path.display(), output = %output.display(), "watermarking");
                handler.apply(&self.path, &output, &self.text)
            }
            OutputMode::MirroredDirectory(dir) => {
                fs::create_dir_all(dir)?;
                let name = self
                    .path
                    .file_name()
                    .ok_or_else(|| Error::General(format!("not a file: {}", self.path.display())))?;
                let output = dir.join(name);
                debug!(input = %self.path.display(), output = %output.display(), "watermarking");
                handler.apply(&self.path, &output, &self.text)
            }
            OutputMode::Overwrite => {
                let backup = backup_path(&self.path);
                fs::rename(&self.path, &backup)?;
                debug!(path = %self.path.display(), backup = %backup.display(), "watermarking in place");

                let result = handler.apply(&backup, &self.path, &self.text);
                match &result {
                    Ok(()) => {
                        if let Err(e) = fs::remove_file(&backup) {
                            warn!(backup = %backup.display(), error = %e, "failed to remove backup");
                        }
                    }
                    Err(_) => restore_backup(&backup, &self.path),
                }
                result
            }
        }
    }
}

/// Watermark one file; see [`OutputMode::from_flags`] for how the flags combine
pub fn process_file(path: &Path, text: &str, output_dir: Option<&Path>, overwrite: bool) -> bool {
    WatermarkRequest::new(path, text, OutputMode::from_flags(output_dir, overwrite)).process()
}

/// `dir/report.pdf` -> `dir/report_watermarked.pdf`
pub fn sibling_output_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().map(OsString::from).unwrap_or_default();
    let mut name = stem;
    name.push("_watermarked");
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

/// `dir/report.pdf` -> `dir/report.pdf.tmp`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn restore_backup(backup: &Path, original: &Path) {
    if let Err(e) = fs::rename(backup, original) {
        warn!(backup = %backup.display(), error = %e, "failed to restore original");
        println!("恢复原文件失败: {} ({})", backup.display(), e);
    }
}

/// Lower-cased extension with its dot, or empty
fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}
