//! OPEN, CLOSE and the EOF query.

use tracing::debug;

use crate::error::{FsError, Result};
use crate::interlock::{InterlockError, OpenMode};
use crate::name::Perm;
use crate::resolve::ObjectType;
use crate::server::Server;
use crate::session::{FileHandle, Handle};
use crate::transport::Station;
use crate::users::Privilege;
use crate::wire;

pub(crate) fn map_interlock(err: InterlockError) -> FsError {
    match err {
        InterlockError::Busy => FsError::AlreadyOpen,
        InterlockError::TableFull => FsError::TooManyOpenFiles,
        InterlockError::OpenFailed => FsError::Fs("FS Error"),
    }
}

/// Fsop 0x06: opens a file (or directory) and hands back a handle.
pub(crate) async fn open(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    data: &[u8],
) -> Result<()> {
    let must_exist = wire::u8_at(data, 5).ok_or(FsError::BadCommand)? != 0;
    let readonly = wire::u8_at(data, 6).ok_or(FsError::BadCommand)? != 0;
    let raw = wire::cr_string(data, 7);
    let filename = raw.trim_start();
    let filename = filename.split(' ').next().unwrap_or("");
    if filename.is_empty() {
        return Err(FsError::NotFound);
    }

    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let user_id = session.user_id;
    let privilege = session.privilege;
    let view = session.view_current();
    let has_slot = session.has_free_slot();

    debug!(station = %from, filename, readonly, must_exist, "open");

    let res = server.resolve(&view, filename, false).await.map_err(|_| FsError::NotFound)?;

    if must_exist && res.ftype == ObjectType::NotFound {
        return Err(FsError::NotFound);
    }
    if res.ftype == ObjectType::File && !readonly && !res.my_perm.contains(Perm::OWNER_WRITE) {
        return Err(FsError::InsufficientAccess);
    }
    if !readonly && res.perm.contains(Perm::LOCKED) && res.ftype != ObjectType::NotFound {
        return Err(FsError::Locked);
    }
    if !readonly && res.ftype == ObjectType::NotFound && !privilege.contains(Privilege::SYSTEM) {
        let parent_ok = if res.parent_owner == user_id {
            res.parent_perm.contains(Perm::OWNER_WRITE)
        } else {
            res.parent_perm.contains(Perm::OTHER_WRITE)
        };
        if !parent_ok {
            return Err(FsError::InsufficientAccess);
        }
    }

    if !has_slot {
        return Err(FsError::TooManyOpenFiles);
    }
    let mode = if readonly {
        OpenMode::Read
    } else if must_exist {
        OpenMode::Update
    } else {
        OpenMode::WriteTruncate
    };

    let index = server
        .interlock
        .open(&res.host_path, mode, user_id, server.attrs.as_ref())
        .await
        .map_err(map_interlock)?;

    let session = server.sessions.get_mut(&from).ok_or(FsError::WhoAreYou)?;
    let handle = FileHandle::new(index, mode, res.acorn_full_path.clone());
    let Some(user_handle) = session.allocate(Handle::File(handle)) else {
        server.interlock.close(index, mode);
        return Err(FsError::TooManyOpenFiles);
    };

    debug!(station = %from, handle = user_handle, "opened");
    server.reply(from, reply_port, vec![0, 0, user_handle]);
    Ok(())
}

/// Releases one handle slot through the interlock rules.
pub(crate) fn close_slot(server: &mut Server, from: &Station, slot: u8) {
    let Some(session) = server.sessions.get_mut(from) else { return };
    match session.release(slot) {
        Some(Handle::File(file)) => server.interlock.close(file.interlock, file.mode),
        Some(Handle::Dir(dir)) => server.interlock.close_dir(dir.interlock),
        None => {}
    }
}

/// Fsop 0x07: closes a handle; handle 0 closes everything the session
/// holds.
pub(crate) async fn close(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    data: &[u8],
) -> Result<()> {
    let handle = wire::u8_at(data, 5).ok_or(FsError::Channel)?;
    debug!(station = %from, handle, "close");

    if handle == 0 {
        // The close-everything wildcard sweeps file handles only; the
        // session's directory anchors stay put.
        let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
        let slots: Vec<u8> =
            session.open_slots().into_iter().filter(|&s| session.file(s).is_some()).collect();
        for slot in slots {
            close_slot(server, &from, slot);
        }
    } else {
        let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
        if session.handle(handle).is_none() {
            return Err(FsError::Channel);
        }
        close_slot(server, &from, handle);
    }
    server.ok(from, reply_port);
    Ok(())
}

/// Fsop 0x11: reports whether the handle's cursor sits at the end.
pub(crate) async fn eof(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    data: &[u8],
) -> Result<()> {
    let handle = wire::u8_at(data, 2).ok_or(FsError::Channel)?;
    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let file = session.file(handle).ok_or(FsError::Channel)?;
    let cursor = file.cursor;
    let index = file.interlock;

    let host = server.interlock.file_mut(index).ok_or(FsError::Channel)?;
    let size = host.metadata().await?.len();
    let at_end = if cursor >= size { 1 } else { 0 };
    server.reply(from, reply_port, vec![0, 0, at_end]);
    Ok(())
}
