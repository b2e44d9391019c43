//! Directory-shaped operations: CDIR, DELETE, RENAME, SDISC and the
//! `*DIR` / `*LIB` re-anchoring commands.

use tracing::{debug, info};

use crate::attr::ObjectAttr;
use crate::error::{FsError, Result};
use crate::interlock::{InterlockError, OpenMode};
use crate::name::Perm;
use crate::ops::login::{anchor_dir, dir_tail};
use crate::resolve::{self, ObjectType};
use crate::server::Server;
use crate::session::Handle;
use crate::transport::Station;
use crate::users::Privilege;
use crate::host;

/// CDIR (fsop 0x1B and the OSCLI verb): create a directory.
pub(crate) async fn cdir(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    relative_to: u8,
    args: &str,
) -> Result<()> {
    let path = args.trim();
    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let user_id = session.user_id;
    let privilege = session.privilege;
    let view = session.view(Some(relative_to));

    debug!(station = %from, path, "cdir");

    let res = server.resolve(&view, path, false).await.map_err(|_| FsError::NotFound)?;
    if res.ftype != ObjectType::NotFound {
        return Err(FsError::Fs("Exists"));
    }
    let allowed = privilege.contains(Privilege::SYSTEM)
        || (res.parent_owner == user_id && res.parent_perm.contains(Perm::OWNER_WRITE));
    if !allowed {
        return Err(FsError::InsufficientAccess);
    }

    tokio::fs::create_dir(&res.host_path)
        .await
        .map_err(|_| FsError::Fs("Unable to make directory"))?;
    server.attrs.write_attrs(&res.host_path, &ObjectAttr::created_by(user_id)).await;
    server.ok(from, reply_port);
    Ok(())
}

/// DELETE (fsop 0x14 and the OSCLI verb): wildcard-aware removal.
pub(crate) async fn delete(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    relative_to: u8,
    args: &str,
) -> Result<()> {
    let path = args.trim();
    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let user_id = session.user_id;
    let privilege = session.privilege;
    let view = session.view(Some(relative_to));

    debug!(station = %from, path, "delete");

    let res = server.resolve(&view, path, true).await.map_err(|_| FsError::NotFound)?;
    if res.ftype == ObjectType::NotFound || res.matches.is_empty() {
        return Err(FsError::NotFound);
    }

    for entry in &res.matches {
        if entry.ftype == ObjectType::File {
            // Probe the interlock: an open file cannot be deleted.
            let index = server
                .interlock
                .open(&entry.host_path, OpenMode::Update, user_id, server.attrs.as_ref())
                .await
                .map_err(|_| FsError::AlreadyOpen)?;
            server.interlock.close(index, OpenMode::Update);
        }
        if entry.ftype == ObjectType::Dir
            && resolve::acorn_entry_count(&entry.host_path).await > 0
        {
            return Err(FsError::Fs("Dir not empty"));
        }
        if entry.perm.contains(Perm::LOCKED) {
            return Err(FsError::EntryLocked);
        }
        let allowed = privilege.contains(Privilege::SYSTEM)
            || entry.owner == user_id
            || (entry.parent_owner == user_id && entry.parent_perm.contains(Perm::OWNER_WRITE));
        if !allowed {
            return Err(FsError::InsufficientAccess);
        }

        let removed = match entry.ftype {
            ObjectType::File => tokio::fs::remove_file(&entry.host_path).await,
            ObjectType::Dir => tokio::fs::remove_dir(&entry.host_path).await,
            _ => Ok(()),
        };
        if removed.is_err() {
            info!(station = %from, path = %entry.host_path.display(), "failed to remove");
            return Err(FsError::Fs("FS Error"));
        }
        server.attrs.remove_attrs(&entry.host_path).await;
    }

    server.ok(from, reply_port);
    Ok(())
}

/// `*RENAME <from> <to>`: move within or across directories, never on
/// top of an existing file.
pub(crate) async fn rename(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    args: &str,
) -> Result<()> {
    let mut tokens = args.trim().split_whitespace();
    let from_path = tokens.next().ok_or(FsError::BadString)?;
    let to_path = tokens.next().ok_or(FsError::BadString)?;

    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let user_id = session.user_id;
    let privilege = session.privilege;
    let view = session.view_current();

    debug!(station = %from, from = from_path, to = to_path, "rename");

    let source = server.resolve(&view, from_path, false).await.map_err(|_| FsError::NotFoundDc)?;
    let dest = server.resolve(&view, to_path, false).await.map_err(|_| FsError::NotFoundDc)?;
    if source.ftype == ObjectType::NotFound {
        return Err(FsError::NotFoundDc);
    }

    if source.perm.contains(Perm::LOCKED) {
        return Err(FsError::EntryLocked);
    }
    let source_ok = privilege.contains(Privilege::SYSTEM)
        || source.owner == user_id
        || source.parent_owner == user_id;
    if !source_ok {
        return Err(FsError::InsufficientAccess);
    }

    let target = match dest.ftype {
        ObjectType::NotFound => {
            let parent_ok = privilege.contains(Privilege::SYSTEM)
                || dest.parent_owner == user_id
                || dest.parent_perm.contains(Perm::OTHER_WRITE);
            if !parent_ok {
                return Err(FsError::InsufficientAccess);
            }
            dest.host_path.clone()
        }
        ObjectType::Dir => {
            // Moving into an existing directory keeps the source's name.
            if dest.owner != user_id && !privilege.contains(Privilege::SYSTEM) {
                return Err(FsError::InsufficientAccess);
            }
            dest.host_path.join(&source.host_name)
        }
        _ => return Err(FsError::Fs("Destination exists")),
    };

    if source.ftype == ObjectType::File {
        // Hold the interlock for a moment to make sure nobody has the
        // file open.
        let index = server
            .interlock
            .open(&source.host_path, OpenMode::Update, user_id, server.attrs.as_ref())
            .await
            .map_err(|err| match err {
                InterlockError::Busy => FsError::AlreadyOpen,
                InterlockError::TableFull => FsError::TooManyOpenFiles,
                InterlockError::OpenFailed => FsError::Fs("FS Error"),
            })?;
        server.interlock.close(index, OpenMode::Update);
    }

    host::rename_noreplace(&source.host_path, &target)
        .await
        .map_err(|_| FsError::Fs("FS Error"))?;
    server.attrs.rename_attrs(&source.host_path, &target).await;

    server.reply(from, reply_port, vec![0, 0]);
    Ok(())
}

/// `*SDISC <disc>`: re-anchor root, current and library on another disc.
pub(crate) async fn sdisc(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    args: &str,
) -> Result<()> {
    let disc_name = args.trim();
    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let user_id = session.user_id;
    let privilege = session.privilege;
    let boot_option = session.boot_option;
    let current_disc = session.current_disc;

    let user = server.users.get(user_id).ok_or(FsError::UserNotKnown)?;
    let home = user.home.trim().to_string();
    let library = user.library.trim().to_string();
    let home_disc = user.home_disc;

    debug!(station = %from, disc = disc_name, "sdisc");

    let view = crate::session::SessionView {
        user_id,
        privilege,
        current_disc,
        anchor: None,
    };

    let root_res = match server.resolve(&view, &format!(":{disc_name}.$"), false).await {
        Ok(res) if res.ftype == ObjectType::Dir => res,
        _ => return Err(FsError::Fs("Cannot map root directory on new disc")),
    };

    let home_res = match server.resolve(&view, &format!(":{disc_name}.{home}"), false).await {
        Ok(res) if res.ftype == ObjectType::Dir && res.disc == home_disc => res,
        Ok(res) if res.ftype == ObjectType::NotFound || res.disc != home_disc => {
            root_res.clone()
        }
        Ok(_) => return Err(FsError::Fs("Cannot map home directory on new disc")),
        Err(_) => root_res.clone(),
    };

    let lib_res = match server.resolve(&view, &format!(":{disc_name}.{library}"), false).await {
        Ok(res) if res.ftype == ObjectType::Dir => res,
        Ok(res) if res.ftype == ObjectType::NotFound => root_res.clone(),
        Ok(_) => return Err(FsError::Fs("Cannot map library directory on new disc")),
        Err(_) => root_res.clone(),
    };

    let session = server.sessions.get_mut(&from).ok_or(FsError::WhoAreYou)?;
    let old = [session.root, session.current, session.library];

    let root = anchor_dir(&mut server.interlock, session, &root_res)
        .map_err(|_| FsError::Fs("Root directory channel ?"))?;
    let current = match anchor_dir(&mut server.interlock, session, &home_res) {
        Ok(handle) => handle,
        Err(_) => {
            if let Some(Handle::Dir(dir)) = session.release(root) {
                server.interlock.close_dir(dir.interlock);
            }
            return Err(FsError::Fs("Home directory channel ?"));
        }
    };
    let lib = match anchor_dir(&mut server.interlock, session, &lib_res) {
        Ok(handle) => handle,
        Err(_) => {
            for slot in [root, current] {
                if let Some(Handle::Dir(dir)) = session.release(slot) {
                    server.interlock.close_dir(dir.interlock);
                }
            }
            return Err(FsError::Fs("Library directory channel ?"));
        }
    };

    for slot in old {
        if let Some(Handle::Dir(dir)) = session.release(slot) {
            server.interlock.close_dir(dir.interlock);
        }
    }

    session.root = root;
    session.current = current;
    session.library = lib;
    session.current_disc = root_res.disc;
    session.library_disc = lib_res.disc;
    session.current_tail = dir_tail(&home_res);
    session.library_tail = dir_tail(&lib_res);
    session.current_path = home_res.path_from_root.clone();
    session.library_path = lib_res.path_from_root.clone();

    server.reply(from, reply_port, vec![0x06, 0x00, root, current, lib, boot_option]);
    Ok(())
}

async fn change_anchor(
    server: &mut Server,
    from: Station,
    packet_dir: u8,
    args: &str,
    library: bool,
) -> Result<u8> {
    let path = args.trim();
    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let view = session.view(Some(packet_dir));

    let res = match server.resolve(&view, path, false).await {
        Ok(res) if res.ftype != ObjectType::NotFound => res,
        _ => return Err(FsError::CommandNotFound),
    };
    if res.ftype != ObjectType::Dir {
        return Err(FsError::TypesDontMatch);
    }

    let session = server.sessions.get_mut(&from).ok_or(FsError::WhoAreYou)?;
    let handle = anchor_dir(&mut server.interlock, session, &res)
        .map_err(|_| FsError::TooManyOpenDirs)?;

    let old = if library { session.library } else { session.current };
    if library {
        session.library = handle;
        session.library_disc = res.disc;
        session.library_tail = dir_tail(&res);
        session.library_path = res.path_from_root.clone();
    } else {
        session.current = handle;
        session.current_disc = res.disc;
        session.current_tail = dir_tail(&res);
        session.current_path = res.path_from_root.clone();
    }
    if old > 0 {
        if let Some(Handle::Dir(dir)) = session.release(old) {
            server.interlock.close_dir(dir.interlock);
        }
    }
    Ok(handle)
}

/// `*DIR <path>`: move the current directory anchor.
pub(crate) async fn change_dir(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    packet_dir: u8,
    args: &str,
) -> Result<()> {
    let handle = change_anchor(server, from, packet_dir, args, false).await?;
    server.reply(from, reply_port, vec![0x07, 0x00, handle]);
    Ok(())
}

/// `*LIB <path>`: move the library anchor.
pub(crate) async fn change_lib(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    packet_dir: u8,
    args: &str,
) -> Result<()> {
    let handle = change_anchor(server, from, packet_dir, args, true).await?;
    server.reply(from, reply_port, vec![0x09, 0x00, handle]);
    Ok(())
}
