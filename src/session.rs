//! Per-station login state and the per-session handle table.
//!
//! A session exists from a successful `I AM` until `BYE` (or displacement
//! by a fresh login from the same station). Its handle table maps small
//! integers to open files or directories; clients pass either kind
//! opaquely, so both live in one numeric space. Slot 0 is never handed
//! out: closing "handle 0" is the protocol's close-everything wildcard.

use std::collections::HashMap;

use crate::interlock::OpenMode;
use crate::transport::Station;
use crate::users::Privilege;

/// Handle table size; slot 0 is reserved, so 32 usable handles.
pub const MAX_HANDLES: usize = 33;

/// Padded tail shown for a directory anchored at the root.
pub const ROOT_TAIL: &str = "$";

/// An open file as seen by one session.
#[derive(Debug, Clone)]
pub struct FileHandle {
    /// Index into the interlock's file table.
    pub interlock: usize,
    /// Byte offset of the next transfer.
    pub cursor: u64,
    pub mode: OpenMode,
    /// Low bit of the last PUTBYTE control byte; starts at 2 so the first
    /// write can never look like a retransmission.
    pub sequence: u8,
    /// Set once a read has gone past the end; the next one errors.
    pub past_eof: bool,
    /// Full dotted path including disc, for resolving relative paths.
    pub acorn_path: String,
}

/// An open directory as seen by one session.
#[derive(Debug, Clone)]
pub struct DirHandle {
    /// Index into the interlock's directory table.
    pub interlock: usize,
    /// Position for sequential catalogue reads.
    pub cursor: u64,
    /// Full dotted path including disc.
    pub acorn_path: String,
}

impl FileHandle {
    pub fn new(interlock: usize, mode: OpenMode, acorn_path: String) -> Self {
        Self { interlock, cursor: 0, mode, sequence: 2, past_eof: false, acorn_path }
    }
}

impl DirHandle {
    pub fn new(interlock: usize, acorn_path: String) -> Self {
        Self { interlock, cursor: 0, acorn_path }
    }
}

/// Either kind of open object a handle slot can hold.
#[derive(Debug, Clone)]
pub enum Handle {
    File(FileHandle),
    Dir(DirHandle),
}

impl Handle {
    /// The stored dotted path, whichever kind this is.
    pub fn acorn_path(&self) -> &str {
        match self {
            Handle::File(f) => &f.acorn_path,
            Handle::Dir(d) => &d.acorn_path,
        }
    }
}

/// The resolver's view of a session: just enough to anchor and authorise
/// a path lookup, detached from the session borrow.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub user_id: u16,
    pub privilege: Privilege,
    pub current_disc: u8,
    /// Dotted full path of the handle the lookup is relative to, if any.
    pub anchor: Option<String>,
}

/// One logged-in station.
pub struct Session {
    pub station: Station,
    pub user_id: u16,
    pub privilege: Privilege,
    pub boot_option: u8,
    /// The three anchor handles.
    pub root: u8,
    pub current: u8,
    pub library: u8,
    pub current_disc: u8,
    pub library_disc: u8,
    /// Last path component of each anchor, or "$" at a root.
    pub current_tail: String,
    pub library_tail: String,
    /// Current and library positions relative to the disc root.
    pub current_path: String,
    pub library_path: String,
    handles: Vec<Option<Handle>>,
}

impl Session {
    pub fn new(station: Station, user_id: u16, privilege: Privilege, boot_option: u8) -> Self {
        Self {
            station,
            user_id,
            privilege,
            boot_option,
            root: 0,
            current: 0,
            library: 0,
            current_disc: 0,
            library_disc: 0,
            current_tail: ROOT_TAIL.into(),
            library_tail: ROOT_TAIL.into(),
            current_path: String::new(),
            library_path: String::new(),
            handles: (0..MAX_HANDLES).map(|_| None).collect(),
        }
    }

    /// True when another handle can be allocated.
    pub fn has_free_slot(&self) -> bool {
        (1..MAX_HANDLES).any(|i| self.handles[i].is_none())
    }

    /// Allocates the lowest free slot above 0. `None` when the table is
    /// exhausted.
    pub fn allocate(&mut self, handle: Handle) -> Option<u8> {
        let slot = (1..MAX_HANDLES).find(|&i| self.handles[i].is_none())?;
        self.handles[slot] = Some(handle);
        Some(slot as u8)
    }

    /// Removes and returns the handle in `slot`.
    pub fn release(&mut self, slot: u8) -> Option<Handle> {
        self.handles.get_mut(slot as usize)?.take()
    }

    pub fn handle(&self, slot: u8) -> Option<&Handle> {
        self.handles.get(slot as usize)?.as_ref()
    }

    pub fn handle_mut(&mut self, slot: u8) -> Option<&mut Handle> {
        self.handles.get_mut(slot as usize)?.as_mut()
    }

    /// The file handle in `slot`, if that is what it holds.
    pub fn file(&self, slot: u8) -> Option<&FileHandle> {
        match self.handle(slot)? {
            Handle::File(f) => Some(f),
            Handle::Dir(_) => None,
        }
    }

    pub fn file_mut(&mut self, slot: u8) -> Option<&mut FileHandle> {
        match self.handle_mut(slot)? {
            Handle::File(f) => Some(f),
            Handle::Dir(_) => None,
        }
    }

    /// Slots currently in use, lowest first.
    pub fn open_slots(&self) -> Vec<u8> {
        (1..MAX_HANDLES).filter(|&i| self.handles[i].is_some()).map(|i| i as u8).collect()
    }

    /// Builds the resolver's view of this session, anchored at `relative_to`
    /// when that slot holds a live handle.
    pub fn view(&self, relative_to: Option<u8>) -> SessionView {
        let anchor = relative_to
            .and_then(|slot| self.handle(slot))
            .map(|handle| handle.acorn_path().to_string());
        SessionView {
            user_id: self.user_id,
            privilege: self.privilege,
            current_disc: self.current_disc,
            anchor,
        }
    }

    /// View anchored at the current directory.
    pub fn view_current(&self) -> SessionView {
        self.view(Some(self.current))
    }
}

/// Active sessions keyed by station.
#[derive(Default)]
pub struct SessionTable {
    sessions: HashMap<Station, Session>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, station: &Station) -> Option<&Session> {
        self.sessions.get(station)
    }

    pub fn get_mut(&mut self, station: &Station) -> Option<&mut Session> {
        self.sessions.get_mut(station)
    }

    pub fn insert(&mut self, session: Session) {
        self.sessions.insert(session.station, session);
    }

    pub fn remove(&mut self, station: &Station) -> Option<Session> {
        self.sessions.remove(station)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Station currently logged in as `user_id`, if any.
    pub fn station_of(&self, user_id: u16) -> Option<Station> {
        self.sessions.values().find(|s| s.user_id == user_id).map(|s| s.station)
    }
}
