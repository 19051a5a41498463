//! Office Open XML package: a zip archive of named parts

use std::fs;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::content_types::CONTENT_TYPES_PART;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    data: Vec<u8>,
    is_dir: bool,
}

/// All parts of a package held in memory, in archive order
#[derive(Debug, Clone, Default)]
pub struct Package {
    entries: Vec<Entry>,
}

/// Part names are stored without a leading slash and compared case-insensitively
fn normalize(name: &str) -> &str {
    name.trim_start_matches('/')
}

impl Package {
    /// Read a package from disk
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let file = fs::File::open(path)?;
        Self::read(file)
    }

    /// Read a package from any seekable source
    pub fn read<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let mut entries = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let name = file.name().to_string();
            let is_dir = file.is_dir();
            let mut data = Vec::new();
            if !is_dir {
                file.read_to_end(&mut data)?;
            }
            entries.push(Entry { name, data, is_dir });
        }

        let package = Self { entries };
        if !package.contains(CONTENT_TYPES_PART) {
            return Err(Error::MissingPart(CONTENT_TYPES_PART.to_string()));
        }

        debug!(parts = package.entries.len(), "read package");
        Ok(package)
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        let name = normalize(name);
        self.entries
            .iter()
            .find(|e| !e.is_dir && e.name.eq_ignore_ascii_case(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    /// Bytes of a part, if present
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.entry(name).map(|e| e.data.as_slice())
    }

    /// Bytes of a part that must exist
    pub fn require(&self, name: &str) -> Result<&[u8]> {
        self.part(name)
            .ok_or_else(|| Error::MissingPart(normalize(name).to_string()))
    }

    /// Replace a part's bytes, or add the part at the end
    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        let name = normalize(name);
        match self
            .entries
            .iter_mut()
            .find(|e| !e.is_dir && e.name.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.data = data,
            None => self.entries.push(Entry {
                name: name.to_string(),
                data,
                is_dir: false,
            }),
        }
    }

    /// Names of all parts (directories excluded)
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|e| !e.is_dir)
            .map(|e| e.name.as_str())
    }

    /// Serialize the package as a zip archive
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for entry in &self.entries {
            if entry.is_dir {
                zip.add_directory(entry.name.as_str(), options)?;
            } else {
                zip.start_file(entry.name.as_str(), options)?;
                zip.write_all(&entry.data)?;
            }
        }

        Ok(zip.finish()?.into_inner())
    }

    /// Write the package to `path`; nothing is written if serialization fails
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        fs::write(path, bytes)?;
        Ok(())
    }
}
