//! Blob corpus: every non-hidden regular file in a directory, mapped
//! read-only, handed out round-robin to new connections.
//!
//! Blobs live behind `Arc` so a connection's reference stays valid no matter
//! when the pool drops it; each mapping is released exactly once when the
//! last reference goes away.

use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr;
use std::slice;
use std::sync::Arc;

use thiserror::Error;

/// Errors from corpus loading. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("cannot read blob directory {dir}: {source}")]
    ReadDir {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot open blob {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot map blob {path}: {source}")]
    Map {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no blobs in {dir}")]
    Empty { dir: PathBuf },
}

/// One corpus file, mapped read-only for the process lifetime.
#[derive(Debug)]
pub struct Blob {
    path: PathBuf,
    ptr: *const u8,
    len: usize,
}

// The mapping is read-only and never remapped, so sharing it across threads
// is safe.
unsafe impl Send for Blob {}
unsafe impl Sync for Blob {}

impl Blob {
    fn map(path: PathBuf) -> Result<Self, CorpusError> {
        let file = File::open(&path).map_err(|source| CorpusError::Open {
            path: path.clone(),
            source,
        })?;
        let len = file
            .metadata()
            .map_err(|source| CorpusError::Open {
                path: path.clone(),
                source,
            })?
            .len() as usize;
        if len == 0 {
            // Zero-length files are legal corpus members; nothing to map.
            return Ok(Self {
                path,
                ptr: ptr::null(),
                len: 0,
            });
        }
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ,
                libc::MAP_PRIVATE,
                file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(CorpusError::Map {
                path,
                source: io::Error::last_os_error(),
            });
        }
        Ok(Self {
            path,
            ptr: ptr as *const u8,
            len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The mapped bytes (empty slice for a zero-length blob).
    pub fn bytes(&self) -> &[u8] {
        if self.len == 0 {
            &[]
        } else {
            unsafe { slice::from_raw_parts(self.ptr, self.len) }
        }
    }
}

impl Drop for Blob {
    fn drop(&mut self) {
        if self.len > 0 {
            unsafe {
                libc::munmap(self.ptr as *mut libc::c_void, self.len);
            }
        }
    }
}

/// Size aggregates logged after load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorpusSummary {
    pub count: usize,
    pub min_len: usize,
    pub mean_len: f64,
    pub max_len: usize,
}

/// Ordered blob set with a round-robin cursor and lap counter.
#[derive(Debug)]
pub struct Corpus {
    blobs: Vec<Arc<Blob>>,
    cursor: usize,
    laps: u64,
}

impl Corpus {
    /// Map every eligible file under `dir`. Hidden files and non-regular
    /// entries are skipped; zero eligible files is an error.
    pub fn load(dir: &Path) -> Result<Self, CorpusError> {
        let entries = std::fs::read_dir(dir).map_err(|source| CorpusError::ReadDir {
            dir: dir.to_path_buf(),
            source,
        })?;
        let mut blobs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CorpusError::ReadDir {
                dir: dir.to_path_buf(),
                source,
            })?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let file_type = entry.file_type().map_err(|source| CorpusError::Open {
                path: entry.path(),
                source,
            })?;
            if !file_type.is_file() {
                continue;
            }
            blobs.push(Arc::new(Blob::map(entry.path())?));
        }
        if blobs.is_empty() {
            return Err(CorpusError::Empty {
                dir: dir.to_path_buf(),
            });
        }
        let corpus = Self {
            blobs,
            cursor: 0,
            laps: 0,
        };
        let summary = corpus.summary();
        tracing::info!(
            count = summary.count,
            min = summary.min_len,
            mean = summary.mean_len,
            max = summary.max_len,
            "corpus loaded"
        );
        Ok(corpus)
    }

    /// Next blob, round-robin. Wrapping past the last blob counts a lap.
    pub fn next_blob(&mut self) -> Arc<Blob> {
        let blob = Arc::clone(&self.blobs[self.cursor]);
        self.cursor += 1;
        if self.cursor == self.blobs.len() {
            self.cursor = 0;
            self.laps += 1;
        }
        blob
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }

    /// Completed round-robin passes over the whole corpus.
    pub fn laps(&self) -> u64 {
        self.laps
    }

    /// Size aggregates over all blobs (count is never 0 after load).
    pub fn summary(&self) -> CorpusSummary {
        let mut min_len = usize::MAX;
        let mut max_len = 0usize;
        let mut total = 0usize;
        for blob in &self.blobs {
            min_len = min_len.min(blob.len());
            max_len = max_len.max(blob.len());
            total += blob.len();
        }
        CorpusSummary {
            count: self.blobs.len(),
            min_len,
            mean_len: total as f64 / self.blobs.len() as f64,
            max_len,
        }
    }
}
