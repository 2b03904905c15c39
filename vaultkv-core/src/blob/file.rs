//! Blob file writer and file-backed storage

use super::{BlobIndex, BlobRecord, BlobStorage, ReadOptions};
use crate::config::BLOB_FILE_EXTENSION;
use crate::{Result, VaultError};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Path of blob file `file_number` inside `dir`
pub fn blob_file_path(dir: &Path, file_number: u64) -> PathBuf {
    dir.join(format!("{:06}.{}", file_number, BLOB_FILE_EXTENSION))
}

/// Metadata of a finished blob file
#[derive(Debug, Clone)]
pub struct BlobFileMeta {
    pub file_number: u64,
    pub path: PathBuf,
    pub record_count: usize,
    pub file_size: u64,
}

/// Appends records to a new blob file
pub struct BlobFileWriter {
    file_number: u64,
    path: PathBuf,
    file: BufWriter<File>,
    offset: u64,
    record_count: usize,
    scratch: Vec<u8>,
}

impl BlobFileWriter {
    /// Create blob file `file_number` in `dir`. Fails if it already exists.
    pub fn create(dir: &Path, file_number: u64) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = blob_file_path(dir, file_number);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;

        debug!("Created blob file {:?}", path);

        Ok(Self {
            file_number,
            path,
            file: BufWriter::new(file),
            offset: 0,
            record_count: 0,
            scratch: Vec::new(),
        })
    }

    /// File number being written
    pub fn file_number(&self) -> u64 {
        self.file_number
    }

    /// Append a record and return the index that locates it
    pub fn add(&mut self, key: &[u8], value: &[u8], expiration: u64) -> Result<BlobIndex> {
        self.scratch.clear();
        BlobRecord::new(key, value).encode_to(&mut self.scratch);
        self.file.write_all(&self.scratch)?;

        let size = self.scratch.len() as u64;
        let index = BlobIndex::new(self.file_number, self.offset, size).with_expiration(expiration);
        self.offset += size;
        self.record_count += 1;

        Ok(index)
    }

    /// Flush buffered records and sync the file to disk
    pub fn finish(mut self) -> Result<BlobFileMeta> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;

        info!(
            "Finished blob file {} ({} records, {} bytes)",
            self.file_number, self.record_count, self.offset
        );

        Ok(BlobFileMeta {
            file_number: self.file_number,
            path: self.path,
            record_count: self.record_count,
            file_size: self.offset,
        })
    }
}

/// Blob storage backed by the blob files of one column family directory
pub struct BlobFileStorage {
    dir: PathBuf,
    files: RwLock<HashMap<u64, Arc<Mutex<File>>>>,
}

impl BlobFileStorage {
    /// Create storage over `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            files: RwLock::new(HashMap::new()),
        })
    }

    /// Directory holding the blob files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Start a new blob file in this storage
    pub fn new_writer(&self, file_number: u64) -> Result<BlobFileWriter> {
        BlobFileWriter::create(&self.dir, file_number)
    }

    /// Delete a blob file, as garbage collection would
    pub fn remove_file(&self, file_number: u64) -> Result<()> {
        self.files.write().remove(&file_number);
        fs::remove_file(blob_file_path(&self.dir, file_number))?;
        debug!("Removed blob file {}", file_number);
        Ok(())
    }

    /// Numbers of the blob files currently on disk, ascending
    pub fn file_numbers(&self) -> Result<Vec<u64>> {
        let mut numbers = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BLOB_FILE_EXTENSION) {
                continue;
            }
            if let Some(number) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            {
                numbers.push(number);
            }
        }
        numbers.sort_unstable();
        Ok(numbers)
    }

    fn file(&self, file_number: u64) -> Result<Arc<Mutex<File>>> {
        if let Some(file) = self.files.read().get(&file_number) {
            return Ok(file.clone());
        }

        let path = blob_file_path(&self.dir, file_number);
        let file = match File::open(&path) {
            Ok(file) => Arc::new(Mutex::new(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(VaultError::Corruption(format!(
                    "Blob file {} not found",
                    file_number
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let mut files = self.files.write();
        Ok(files.entry(file_number).or_insert(file).clone())
    }

    /// Drop the cached handle so the next read reopens the file
    fn evict(&self, file_number: u64) {
        if self.files.write().remove(&file_number).is_some() {
            debug!("Evicted cached handle of blob file {}", file_number);
        }
    }
}

impl BlobStorage for BlobFileStorage {
    fn get<'b>(
        &self,
        options: &ReadOptions,
        index: &BlobIndex,
        buffer: &'b mut Vec<u8>,
    ) -> Result<BlobRecord<'b>> {
        let file = self.file(index.file_number)?;

        if let Err(e) = read_at(&file, index, buffer) {
            if e.is_corruption() {
                self.evict(index.file_number);
            }
            return Err(e);
        }

        match BlobRecord::decode(buffer, options.verify_checksums) {
            Ok(record) => Ok(record),
            Err(e) => {
                self.evict(index.file_number);
                Err(e)
            }
        }
    }
}

/// Read the raw record bytes `index` points at into `buffer`.
///
/// The range is checked against the file length before anything is
/// allocated; an index pointing outside the file is corruption.
fn read_at(file: &Mutex<File>, index: &BlobIndex, buffer: &mut Vec<u8>) -> Result<()> {
    let out_of_range = || {
        VaultError::Corruption(format!(
            "Blob record {}@{}+{} beyond end of file",
            index.file_number, index.offset, index.size
        ))
    };

    let mut file = file.lock();
    let file_len = file.metadata()?.len();
    match index.offset.checked_add(index.size) {
        Some(end) if end <= file_len => {}
        _ => return Err(out_of_range()),
    }
    let size = usize::try_from(index.size).map_err(|_| out_of_range())?;

    buffer.clear();
    buffer.resize(size, 0);
    file.seek(SeekFrom::Start(index.offset))?;
    file.read_exact(buffer).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            out_of_range()
        } else {
            e.into()
        }
    })
}
