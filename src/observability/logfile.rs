//! Size-rotated log file.
//!
//! Writes append to `path`. Once a write would push the file past
//! `rotate_length` bytes, the file is shifted to `path.1` (older files to
//! `path.2`, ...) and a fresh `path` is opened. At most `max_rotated_files`
//! rotated files are kept.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing_subscriber::fmt::MakeWriter;

pub const DEFAULT_ROTATE_LENGTH: u64 = 1_000_000;
pub const DEFAULT_MAX_ROTATED_FILES: usize = 10;

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    file: File,
    size: u64,
    rotate_length: u64,
    max_rotated_files: usize,
}

/// Shared handle to a rotating log file. Clones write to the same file.
#[derive(Debug, Clone)]
pub struct LogFile {
    inner: Arc<Mutex<Inner>>,
}

impl LogFile {
    pub fn open(path: impl Into<PathBuf>, rotate_length: u64, max_rotated_files: usize) -> io::Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                path,
                file,
                size,
                rotate_length,
                max_rotated_files,
            })),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.lock().path.clone()
    }

    /// Rotate now, regardless of size.
    pub fn rotate(&self) -> io::Result<()> {
        self.lock().rotate()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        if self.max_rotated_files == 0 {
            fs::remove_file(&self.path)?;
        } else {
            let oldest = rotated_path(&self.path, self.max_rotated_files);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for n in (1..self.max_rotated_files).rev() {
                let from = rotated_path(&self.path, n);
                if from.exists() {
                    fs::rename(&from, rotated_path(&self.path, n + 1))?;
                }
            }
            fs::rename(&self.path, rotated_path(&self.path, 1))?;
        }

        self.file = open_append(&self.path)?;
        self.size = 0;
        Ok(())
    }
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.lock();
        if inner.rotate_length > 0
            && inner.size > 0
            && inner.size + buf.len() as u64 > inner.rotate_length
        {
            inner.rotate()?;
        }
        let written = inner.file.write(buf)?;
        inner.size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock().file.flush()
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn rotated_path(path: &Path, n: usize) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(format!(".{n}"));
    PathBuf::from(name)
}
