pub(super) mod download;
pub(super) mod upload;

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

/// One open file read by many part workers.
///
/// A `File` has a single cursor, so seek and read happen under one lock.
pub(crate) struct SharedFile {
    file: Mutex<File>,
}

impl SharedFile {
    pub(crate) fn open(path: &Path) -> std::io::Result<Self> {
        Ok(Self { file: Mutex::new(File::open(path)?) })
    }

    /// Read up to `len` bytes at `offset`. Shorter only at end of file.
    pub(crate) fn read_part(&self, offset: u64, len: u64) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len as usize];
        let mut filled = 0usize;
        let mut f = self
            .file
            .lock()
            .map_err(|_| std::io::Error::other("file lock poisoned"))?;
        f.seek(SeekFrom::Start(offset))?;
        while filled < buf.len() {
            match f.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }
}
