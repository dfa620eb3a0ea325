//! The directory-backed record store.
//!
//! A store is rooted at a directory. Each dataset inside it is a pair of
//! files:
//!
//! - `<name>.layout.json`: the serialized [`RecordLayout`], making the
//!   dataset self-describing;
//! - `<name>.dat`: the packed records, one [`RecordLayout::size`]-byte
//!   record after another.
//!
//! Locations are shared as `Rc<StoreLocation>`, so a sink holds a live
//! reference onto its store for exactly as long as it exists, and nested
//! groups of datasets are just subdirectories sharing the root's lifetime.
//!
//! Appending writes through a fixed 16-record chunk buffer; a dataset must
//! be flushed (or closed, which flushes) before its rows are visible to
//! readers.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use snafu::prelude::*;

use crate::record::{
    BadDatasetNameSnafu, BadSidecarSnafu, CorruptSnafu, IoSnafu, LayoutMismatchSnafu,
    MissingStoreSnafu, RecordError, RecordLayout, RecordSizeSnafu,
};

const LAYOUT_SUFFIX: &str = ".layout.json";
const DATA_SUFFIX: &str = ".dat";

/// Records buffered per dataset before they are written through.
pub const CHUNK_RECORDS: usize = 16;

/// A location inside a record store: the root or one of its groups.
pub struct StoreLocation {
    dir: PathBuf,
}

impl StoreLocation {
    /// Create a fresh store at `dir`, discarding any datasets already
    /// present there.
    pub fn create(dir: impl AsRef<Path>) -> Result<Rc<StoreLocation>, RecordError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).context(IoSnafu {
            path: dir.display().to_string(),
        })?;
        let location = StoreLocation { dir };
        location.clear_datasets()?;
        Ok(Rc::new(location))
    }

    /// Open an existing store at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Rc<StoreLocation>, RecordError> {
        let dir = dir.as_ref().to_path_buf();
        ensure!(
            dir.is_dir(),
            MissingStoreSnafu {
                path: dir.display().to_string(),
            }
        );
        Ok(Rc::new(StoreLocation { dir }))
    }

    /// Open a store at `dir`, creating it (empty) when absent. Existing
    /// datasets are kept.
    pub fn open_or_create(dir: impl AsRef<Path>) -> Result<Rc<StoreLocation>, RecordError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).context(IoSnafu {
            path: dir.display().to_string(),
        })?;
        Ok(Rc::new(StoreLocation { dir }))
    }

    /// A nested group of datasets, created on demand.
    pub fn group(self: &Rc<Self>, name: &str) -> Result<Rc<StoreLocation>, RecordError> {
        check_entry_name(name)?;
        StoreLocation::open_or_create(self.dir.join(name))
    }

    /// The directory backing this location.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn layout_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}{LAYOUT_SUFFIX}"))
    }

    fn data_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}{DATA_SUFFIX}"))
    }

    fn clear_datasets(&self) -> Result<(), RecordError> {
        let entries = fs::read_dir(&self.dir).context(IoSnafu {
            path: self.dir.display().to_string(),
        })?;
        for entry in entries {
            let entry = entry.context(IoSnafu {
                path: self.dir.display().to_string(),
            })?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(LAYOUT_SUFFIX) || name.ends_with(DATA_SUFFIX) {
                fs::remove_file(entry.path()).context(IoSnafu {
                    path: entry.path().display().to_string(),
                })?;
            }
        }
        Ok(())
    }

    /// Whether a dataset by this name exists here.
    pub fn dataset_exists(&self, name: &str) -> bool {
        self.layout_path(name).is_file()
    }

    /// Unlink a dataset (both its layout and its data).
    pub fn remove_dataset(&self, name: &str) -> Result<(), RecordError> {
        check_entry_name(name)?;
        for path in [self.layout_path(name), self.data_path(name)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).context(IoSnafu {
                        path: path.display().to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    /// Create a dataset with the given layout and length zero.
    pub fn create_dataset(&self, name: &str, layout: &RecordLayout) -> Result<Dataset, RecordError> {
        check_entry_name(name)?;
        let layout_path = self.layout_path(name);
        let sidecar = serde_json::to_vec_pretty(layout).context(BadSidecarSnafu {
            path: layout_path.display().to_string(),
        })?;
        fs::write(&layout_path, sidecar).context(IoSnafu {
            path: layout_path.display().to_string(),
        })?;

        let data_path = self.data_path(name);
        let file = File::create(&data_path).context(IoSnafu {
            path: data_path.display().to_string(),
        })?;
        Ok(Dataset {
            name: name.to_string(),
            path: data_path,
            file,
            record_size: layout.size,
            len: 0,
            chunk: Vec::with_capacity(CHUNK_RECORDS * layout.size),
        })
    }

    /// Open an existing dataset for appending, verifying that its stored
    /// layout equals `expected` exactly.
    pub fn open_dataset(&self, name: &str, expected: &RecordLayout) -> Result<Dataset, RecordError> {
        check_entry_name(name)?;
        let stored = self.read_layout(name)?;
        ensure!(stored == *expected, LayoutMismatchSnafu { dataset: name });

        let data_path = self.data_path(name);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&data_path)
            .context(IoSnafu {
                path: data_path.display().to_string(),
            })?;
        let data_len = file
            .metadata()
            .context(IoSnafu {
                path: data_path.display().to_string(),
            })?
            .len();
        ensure!(
            stored.size > 0 && data_len % stored.size as u64 == 0,
            CorruptSnafu {
                dataset: name,
                data_len,
                record_size: stored.size,
            }
        );
        Ok(Dataset {
            name: name.to_string(),
            path: data_path,
            file,
            record_size: stored.size,
            len: data_len / stored.size as u64,
            chunk: Vec::with_capacity(CHUNK_RECORDS * stored.size),
        })
    }

    /// Read a dataset's stored layout.
    pub fn read_layout(&self, name: &str) -> Result<RecordLayout, RecordError> {
        let layout_path = self.layout_path(name);
        let mut json = String::new();
        File::open(&layout_path)
            .and_then(|mut f| f.read_to_string(&mut json))
            .context(IoSnafu {
                path: layout_path.display().to_string(),
            })?;
        serde_json::from_str(&json).context(BadSidecarSnafu {
            path: layout_path.display().to_string(),
        })
    }

    /// Read a dataset's packed records. Rows buffered by a live [`Dataset`]
    /// are not visible until it is flushed or closed.
    pub fn read_rows(&self, name: &str) -> Result<Vec<u8>, RecordError> {
        let data_path = self.data_path(name);
        fs::read(&data_path).context(IoSnafu {
            path: data_path.display().to_string(),
        })
    }

    /// Number of records currently stored in a dataset.
    pub fn dataset_len(&self, name: &str) -> Result<u64, RecordError> {
        let layout = self.read_layout(name)?;
        let data_path = self.data_path(name);
        let data_len = fs::metadata(&data_path)
            .map(|m| m.len())
            .unwrap_or(0);
        ensure!(
            layout.size > 0 && data_len % layout.size as u64 == 0,
            CorruptSnafu {
                dataset: name,
                data_len,
                record_size: layout.size,
            }
        );
        Ok(data_len / layout.size as u64)
    }
}

fn check_entry_name(name: &str) -> Result<(), RecordError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.ends_with(LAYOUT_SUFFIX)
        && !name.ends_with(DATA_SUFFIX);
    ensure!(valid, BadDatasetNameSnafu { name });
    Ok(())
}

/// An open, extendible dataset of fixed-size records.
#[derive(Debug)]
pub struct Dataset {
    name: String,
    path: PathBuf,
    file: File,
    record_size: usize,
    len: u64,
    chunk: Vec<u8>,
}

impl Dataset {
    /// The dataset name inside its store.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of records, buffered ones included.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True when no records have been appended yet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Record size in bytes.
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Extend the dataset by one record.
    pub fn append(&mut self, record: &[u8]) -> Result<(), RecordError> {
        ensure!(
            record.len() == self.record_size,
            RecordSizeSnafu {
                expected: self.record_size,
                actual: record.len(),
            }
        );
        self.chunk.extend_from_slice(record);
        self.len += 1;
        if self.chunk.len() >= CHUNK_RECORDS * self.record_size {
            self.write_chunk()?;
        }
        Ok(())
    }

    fn write_chunk(&mut self) -> Result<(), RecordError> {
        if self.chunk.is_empty() {
            return Ok(());
        }
        self.file.write_all(&self.chunk).context(IoSnafu {
            path: self.path.display().to_string(),
        })?;
        self.chunk.clear();
        Ok(())
    }

    /// Write buffered records through to the data file.
    pub fn flush(&mut self) -> Result<(), RecordError> {
        self.write_chunk()?;
        self.file.flush().context(IoSnafu {
            path: self.path.display().to_string(),
        })
    }

    /// Flush and release the dataset.
    pub fn close(mut self) -> Result<(), RecordError> {
        self.flush()?;
        self.file.sync_all().context(IoSnafu {
            path: self.path.display().to_string(),
        })
    }
}

impl Drop for Dataset {
    fn drop(&mut self) {
        if !self.chunk.is_empty() {
            if let Err(e) = self.write_chunk() {
                log::warn!("dataset {} lost buffered rows on drop: {e}", self.name);
            }
        }
    }
}
