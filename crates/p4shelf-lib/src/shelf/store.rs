//! Named-blob containers behind an archive.
//!
//! The archive format is a zip file, but builder and replayer only see the
//! [`ContentStore`] trait so tests can run against [`MemoryStore`].

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Archive {0} was opened for {1}")]
    WrongMode(PathBuf, &'static str),

    #[error("Archive has no entry named {0}")]
    MissingEntry(String),
}

/// A container of named byte blobs.
pub trait ContentStore {
    /// Add a blob under `name`
    fn write_entry(&mut self, name: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Read the blob stored under `name`
    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, StoreError>;

    /// Names of all stored blobs, in storage order
    fn entry_names(&self) -> Vec<String>;
}

enum ZipMode {
    Create(ZipWriter<File>, Vec<String>),
    Read(ZipArchive<File>),
}

/// A zip file on disk, open either for writing or for reading.
pub struct ZipStore {
    path: PathBuf,
    mode: ZipMode,
}

impl ZipStore {
    /// Create (or truncate) an archive for writing.
    pub fn create(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::create_in(path, File::create(path)?))
    }

    /// Write a new archive into an already open, empty `file`.
    pub fn create_in(path: &Path, file: File) -> Self {
        Self {
            path: path.to_path_buf(),
            mode: ZipMode::Create(ZipWriter::new(file), Vec::new()),
        }
    }

    /// Open an existing archive for reading.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let file = File::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            mode: ZipMode::Read(ZipArchive::new(file)?),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the central directory. Archives being read need no finishing.
    pub fn finish(self) -> Result<(), StoreError> {
        if let ZipMode::Create(mut writer, _) = self.mode {
            writer.finish()?;
        }
        Ok(())
    }
}

impl ContentStore for ZipStore {
    fn write_entry(&mut self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        match &mut self.mode {
            ZipMode::Create(writer, names) => {
                let options =
                    FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
                writer.start_file(name, options)?;
                writer.write_all(data)?;
                names.push(name.to_string());
                Ok(())
            }
            ZipMode::Read(_) => Err(StoreError::WrongMode(self.path.clone(), "reading")),
        }
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, StoreError> {
        match &mut self.mode {
            ZipMode::Read(archive) => {
                let mut entry = match archive.by_name(name) {
                    Ok(entry) => entry,
                    Err(zip::result::ZipError::FileNotFound) => {
                        return Err(StoreError::MissingEntry(name.to_string()))
                    }
                    Err(e) => return Err(e.into()),
                };
                let mut data = Vec::new();
                entry.read_to_end(&mut data)?;
                Ok(data)
            }
            ZipMode::Create(..) => Err(StoreError::WrongMode(self.path.clone(), "writing")),
        }
    }

    fn entry_names(&self) -> Vec<String> {
        match &self.mode {
            ZipMode::Create(_, names) => names.clone(),
            ZipMode::Read(archive) => archive.file_names().map(str::to_string).collect(),
        }
    }
}

/// An in-memory store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, Vec<u8>>,
    order: Vec<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, name: &str, data: impl Into<Vec<u8>>) -> Self {
        if self.entries.insert(name.to_string(), data.into()).is_none() {
            self.order.push(name.to_string());
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ContentStore for MemoryStore {
    fn write_entry(&mut self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        if self.entries.insert(name.to_string(), data.to_vec()).is_none() {
            self.order.push(name.to_string());
        }
        Ok(())
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, StoreError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::MissingEntry(name.to_string()))
    }

    fn entry_names(&self) -> Vec<String> {
        self.order.clone()
    }
}
