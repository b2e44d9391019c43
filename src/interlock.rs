//! The file-access interlock: multi-reader/single-writer coordination
//! keyed by host path, shared by every session on the server.
//!
//! A file is represented at most once in the table. Readers stack up on
//! the shared entry; any writer demands exclusivity. The host handle is
//! opened on first acquisition and closed when the last reference goes.
//! Directories get a parallel, simpler table: only a reader count.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};

use crate::attr::{AttrStore, ObjectAttr};

/// Maximum number of concurrently interlocked files per server.
pub const MAX_OPEN_FILES: usize = 512;

/// Maximum number of concurrently open directories per server.
pub const MAX_OPEN_DIRS: usize = 256;

/// How a file is being opened. The three modes correspond to the client's
/// OPENIN, OPENUP and OPENOUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Must exist, read-only.
    Read,
    /// Must exist, read-write.
    Update,
    /// Create or truncate, read-write.
    WriteTruncate,
}

impl OpenMode {
    /// True for the modes that take the writer side of the interlock.
    pub fn writes(self) -> bool {
        !matches!(self, OpenMode::Read)
    }
}

/// Why an interlocked open was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterlockError {
    /// The file is held in a conflicting mode by someone.
    Busy,
    /// Every slot in the table is taken.
    TableFull,
    /// The host open itself failed.
    OpenFailed,
}

/// A live interlocked file.
pub struct FileEntry {
    pub path: PathBuf,
    pub file: File,
    pub readers: u32,
    pub writers: u32,
}

/// A live open directory.
pub struct DirEntry {
    pub path: PathBuf,
    pub readers: u32,
}

/// The per-server interlock tables.
pub struct Interlock {
    files: Vec<Option<FileEntry>>,
    dirs: Vec<Option<DirEntry>>,
}

impl Default for Interlock {
    fn default() -> Self {
        Self::new()
    }
}

impl Interlock {
    pub fn new() -> Self {
        Self {
            files: (0..MAX_OPEN_FILES).map(|_| None).collect(),
            dirs: (0..MAX_OPEN_DIRS).map(|_| None).collect(),
        }
    }

    /// Acquires `path` in `mode`, opening the host file if this is the
    /// first reference. A create-or-truncate open stamps default
    /// attributes with `owner` as the new owner.
    pub async fn open(
        &mut self,
        path: &Path,
        mode: OpenMode,
        owner: u16,
        attrs: &dyn AttrStore,
    ) -> Result<usize, InterlockError> {
        if let Some(index) = self.index_of(path) {
            let entry = self.files[index].as_mut().expect("index_of returned a live slot");
            if mode.writes() || entry.writers > 0 {
                return Err(InterlockError::Busy);
            }
            entry.readers += 1;
            return Ok(index);
        }

        let free = self
            .files
            .iter()
            .position(|slot| slot.is_none())
            .ok_or(InterlockError::TableFull)?;

        let mut options = OpenOptions::new();
        match mode {
            OpenMode::Read => options.read(true),
            OpenMode::Update => options.read(true).write(true),
            OpenMode::WriteTruncate => options.read(true).write(true).create(true).truncate(true),
        };
        let file = options.open(path).await.map_err(|_| InterlockError::OpenFailed)?;

        if mode == OpenMode::WriteTruncate {
            attrs.write_attrs(path, &ObjectAttr::created_by(owner)).await;
        }

        let (readers, writers) = if mode.writes() { (0, 1) } else { (1, 0) };
        self.files[free] =
            Some(FileEntry { path: path.to_path_buf(), file, readers, writers });
        Ok(free)
    }

    /// Releases one reference in `mode`; the slot is freed (and the host
    /// handle closed) when the last reference goes.
    pub fn close(&mut self, index: usize, mode: OpenMode) {
        let Some(Some(entry)) = self.files.get_mut(index) else { return };
        if mode.writes() {
            entry.writers = entry.writers.saturating_sub(1);
        } else {
            entry.readers = entry.readers.saturating_sub(1);
        }
        if entry.readers == 0 && entry.writers == 0 {
            self.files[index] = None;
        }
    }

    /// The live entry at `index`.
    pub fn entry(&self, index: usize) -> Option<&FileEntry> {
        self.files.get(index)?.as_ref()
    }

    /// Mutable access to the host file at `index`.
    pub fn file_mut(&mut self, index: usize) -> Option<&mut File> {
        Some(&mut self.files.get_mut(index)?.as_mut()?.file)
    }

    /// Mutable access to two distinct host files at once, for streaming
    /// one into the other.
    pub fn file_pair_mut(&mut self, a: usize, b: usize) -> Option<(&mut File, &mut File)> {
        if a == b || a >= self.files.len() || b >= self.files.len() {
            return None;
        }
        let (low, high, flipped) = if a < b { (a, b, false) } else { (b, a, true) };
        let (head, tail) = self.files.split_at_mut(high);
        let first = &mut head[low].as_mut()?.file;
        let second = &mut tail[0].as_mut()?.file;
        Some(if flipped { (second, first) } else { (first, second) })
    }

    fn index_of(&self, path: &Path) -> Option<usize> {
        self.files
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|entry| entry.path == path))
    }

    /// Number of live file slots; liveness equals `readers + writers > 0`.
    pub fn live_files(&self) -> usize {
        self.files.iter().flatten().count()
    }

    /// Reader/writer counts for a slot, for invariant checking.
    pub fn counts(&self, index: usize) -> Option<(u32, u32)> {
        self.entry(index).map(|e| (e.readers, e.writers))
    }

    /// Acquires a directory reference, reusing an existing entry for the
    /// same path.
    pub fn open_dir(&mut self, path: &Path) -> Result<usize, InterlockError> {
        if let Some(index) = self
            .dirs
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|entry| entry.path == path))
        {
            self.dirs[index].as_mut().expect("found a live slot").readers += 1;
            return Ok(index);
        }
        let free =
            self.dirs.iter().position(|slot| slot.is_none()).ok_or(InterlockError::TableFull)?;
        self.dirs[free] = Some(DirEntry { path: path.to_path_buf(), readers: 1 });
        Ok(free)
    }

    /// Releases a directory reference.
    pub fn close_dir(&mut self, index: usize) {
        let Some(Some(entry)) = self.dirs.get_mut(index) else { return };
        entry.readers = entry.readers.saturating_sub(1);
        if entry.readers == 0 {
            self.dirs[index] = None;
        }
    }

    /// The live directory entry at `index`.
    pub fn dir(&self, index: usize) -> Option<&DirEntry> {
        self.dirs.get(index)?.as_ref()
    }

    /// Number of live directory slots.
    pub fn live_dirs(&self) -> usize {
        self.dirs.iter().flatten().count()
    }
}
