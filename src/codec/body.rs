//! Scoped, read-only access to a waveform body file.

use crate::error::{Result, ScopeError};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// A memory-mapped waveform body.
///
/// The mapping and file handle are released on drop, so every exit path of
/// a decode (including `?` on an error) unmaps the file.
#[derive(Debug)]
pub struct WaveformBody {
    path: PathBuf,
    // Zero-length files cannot be mapped on every platform
    map: Option<Mmap>,
}

impl WaveformBody {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| {
            ScopeError::Io(e).with_context(format!("Couldn't open waveform body {:?}", path))
        })?;
        let len = file.metadata()?.len();

        let map = if len == 0 {
            None
        } else {
            // SAFETY: the map is read-only and private to this process. Session
            // data directories are not expected to be modified while a load
            // is in progress.
            let map = unsafe { Mmap::map(&file) }.map_err(|e| {
                ScopeError::Io(e).with_context(format!("Couldn't map waveform body {:?}", path))
            })?;
            Some(map)
        };

        Ok(Self { path, map })
    }

    pub fn bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
