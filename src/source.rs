use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single pull read, already classified for the analyzer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReadError {
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("out of memory allocating {requested} bytes")]
    OutOfMemory { requested: u64 },
    #[error("short read at offset {offset}: expected {expected} bytes, got {got}")]
    ShortRead { offset: u64, expected: u64, got: u64 },
    #[error("io error: {0}")]
    Io(String),
}

impl From<SourceError> for ReadError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Io(io) => match io.kind() {
                ErrorKind::PermissionDenied => ReadError::AccessDenied(io.to_string()),
                ErrorKind::OutOfMemory => ReadError::OutOfMemory { requested: 0 },
                _ => ReadError::Io(io.to_string()),
            },
        }
    }
}

/// A local, immutable, randomly readable byte sequence of known length.
pub trait ByteSource: Send + Sync {
    fn len(&self) -> u64;
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, SourceError>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct LocalFile {
    file: File,
    path: PathBuf,
    len: u64,
    #[cfg(not(unix))]
    lock: std::sync::Mutex<()>,
}

impl LocalFile {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            path: path.to_path_buf(),
            len,
            #[cfg(not(unix))]
            lock: std::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for LocalFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFile")
            .field("path", &self.path)
            .field("len", &self.len)
            .finish()
    }
}

impl ByteSource for LocalFile {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, SourceError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            Ok(self.file.read_at(buf, offset)?)
        }
        #[cfg(not(unix))]
        {
            use std::io::{Read, Seek, SeekFrom};
            let _guard = self
                .lock
                .lock()
                .map_err(|_| std::io::Error::other("file lock poisoned"))?;
            let mut f = &self.file;
            f.seek(SeekFrom::Start(offset))?;
            Ok(f.read(buf)?)
        }
    }
}

/// Fill `buf` from `offset`, looping over short reads from the source.
pub fn read_exact_at(
    source: &dyn ByteSource,
    offset: u64,
    buf: &mut [u8],
) -> Result<(), ReadError> {
    let mut filled = 0usize;
    while filled < buf.len() {
        let pos = offset + filled as u64;
        let n = source.read_at(pos, &mut buf[filled..])?;
        if n == 0 {
            return Err(ReadError::ShortRead {
                offset,
                expected: buf.len() as u64,
                got: filled as u64,
            });
        }
        filled += n;
    }
    Ok(())
}

/// Allocate a zeroed buffer, turning allocation failure into a read error.
pub fn alloc_buffer(len: u64) -> Result<Vec<u8>, ReadError> {
    let size = usize::try_from(len).map_err(|_| ReadError::OutOfMemory { requested: len })?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| ReadError::OutOfMemory { requested: len })?;
    buf.resize(size, 0);
    Ok(buf)
}
