//! Login, logout and per-user settings: `I AM`, `BYE`, `PASS` and the
//! boot option.

use chrono::{Datelike, Local, Timelike};
use tracing::info;

use crate::error::{FsError, Result};
use crate::interlock::Interlock;
use crate::resolve::{ObjectType, Resolution};
use crate::server::Server;
use crate::session::{DirHandle, Handle, Session};
use crate::transport::Station;
use crate::users::{Privilege, MAX_USERS};
use crate::wire;

/// Blank-password stand-in accepted on either side of a `PASS` exchange.
const BLANK: &str = "\"\"";

/// Opens a directory reference and binds it to a session handle, rolling
/// the reference back if the handle table is full.
pub(crate) fn anchor_dir(
    interlock: &mut Interlock,
    session: &mut Session,
    res: &Resolution,
) -> Result<u8> {
    let slot = interlock
        .open_dir(&res.host_path)
        .map_err(|_| FsError::TooManyOpenDirs)?;
    match session.allocate(Handle::Dir(DirHandle::new(slot, res.acorn_full_path.clone()))) {
        Some(handle) => Ok(handle),
        None => {
            interlock.close_dir(slot);
            Err(FsError::Channel)
        }
    }
}

/// The padded tail a directory resolution displays: its last component,
/// or "$" at the root.
pub(crate) fn dir_tail(res: &Resolution) -> String {
    if res.components.is_empty() {
        "$".to_string()
    } else {
        res.acorn_name.clone()
    }
}

/// `*I AM [station] <user> [password]`.
pub(crate) async fn login(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    args: &str,
) -> Result<()> {
    let text = args.trim().to_ascii_uppercase();
    let mut tokens = text.split_whitespace().peekable();

    // Some clients lead with their own station number.
    if tokens.peek().is_some_and(|t| t.chars().next().is_some_and(|c| c.is_ascii_digit())) {
        tokens.next();
    }
    let Some(username) = tokens.next() else {
        return Err(FsError::Fs("Garbled login command"));
    };
    let username: String = username.chars().take(10).collect();
    let password: String = tokens.next().unwrap_or("").chars().take(6).collect();

    let Some(user_id) = server.users.find(&username) else {
        info!(station = %from, username = %username, "login attempt for unknown user");
        return Err(FsError::UserNotKnown);
    };
    let user = server.users.get(user_id).expect("find returned a live id");
    if !user.password_matches(&password) {
        info!(station = %from, username = %username, "login attempt with wrong password");
        return Err(FsError::WrongPassword);
    }
    if user.privilege.contains(Privilege::LOCKED) {
        info!(station = %from, username = %username, "login attempt on locked account");
        return Err(FsError::AccountLocked);
    }

    let privilege = user.privilege;
    let boot_option = user.boot_option;
    let home_disc = user.home_disc;
    let home = user.home.trim().to_string();
    let library = user.library.trim().to_string();

    if server.sessions.get(&from).is_some() {
        // A fresh login from the same station displaces the old session.
        server.logoff(&from);
    } else if server.sessions.len() >= MAX_USERS {
        return Err(FsError::TooManyUsers);
    }

    let mut session = Session::new(from, user_id, privilege, boot_option);
    session.current_disc = home_disc;

    let view = session.view(None);
    let root_res = server
        .resolve(&view, "$", false)
        .await
        .map_err(|_| FsError::Fs("Unable to map root."))?;
    if root_res.ftype != ObjectType::Dir {
        return Err(FsError::BadDirectory("Bad root directory."));
    }

    let home_res = match server.resolve(&view, &home, false).await {
        Ok(res) if res.ftype != ObjectType::NotFound => res,
        _ => root_res.clone(),
    };
    if home_res.ftype != ObjectType::Dir {
        return Err(FsError::BadDirectory("Bad home directory."));
    }

    let lib_res = match server.resolve(&view, &library, false).await {
        Ok(res) if res.ftype == ObjectType::Dir => res,
        _ => root_res.clone(),
    };

    let root = anchor_dir(&mut server.interlock, &mut session, &root_res)?;
    let current = match anchor_dir(&mut server.interlock, &mut session, &home_res) {
        Ok(handle) => handle,
        Err(err) => {
            release_all(&mut server.interlock, &mut session);
            return Err(err);
        }
    };
    let lib = match anchor_dir(&mut server.interlock, &mut session, &lib_res) {
        Ok(handle) => handle,
        Err(err) => {
            release_all(&mut server.interlock, &mut session);
            return Err(err);
        }
    };

    session.root = root;
    session.current = current;
    session.library = lib;
    session.current_disc = home_res.disc;
    session.library_disc = lib_res.disc;
    session.current_tail = dir_tail(&home_res);
    session.library_tail = dir_tail(&lib_res);
    session.current_path = home_res.path_from_root.clone();
    session.library_path = lib_res.path_from_root.clone();

    info!(
        station = %from,
        username = %username,
        user_id,
        disc = session.current_disc,
        "login"
    );

    if let Some(record) = server.users.get_mut(user_id) {
        let now = Local::now();
        record.last_login = crate::users::LoginStamp {
            year: (now.year() % 100) as u8,
            month: now.month() as u8,
            day: now.day() as u8,
            hour: now.hour() as u8,
            min: now.minute() as u8,
            sec: now.second() as u8,
        };
    }
    let _ = server.users.persist(user_id).await;

    server.sessions.insert(session);
    server.reply(from, reply_port, vec![0x05, 0x00, root, current, lib, boot_option]);
    Ok(())
}

fn release_all(interlock: &mut Interlock, session: &mut Session) {
    for slot in session.open_slots() {
        match session.release(slot) {
            Some(Handle::File(file)) => interlock.close(file.interlock, file.mode),
            Some(Handle::Dir(dir)) => interlock.close_dir(dir.interlock),
            None => {}
        }
    }
}

/// `BYE` / fsop 0x17: releases every handle and removes the session.
pub(crate) async fn bye(server: &mut Server, from: Station, reply_port: u8) -> Result<()> {
    info!(station = %from, "bye");
    server.logoff(&from);
    server.ok(from, reply_port);
    Ok(())
}

/// `*PASS <old> <new>`; `""` stands for the blank password.
pub(crate) async fn change_password(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    args: &str,
) -> Result<()> {
    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let user_id = session.user_id;
    let user = server.users.get(user_id).ok_or(FsError::UserNotKnown)?;
    if user.privilege.contains(Privilege::NO_PASSWORD_CHANGE) {
        return Err(FsError::InsufficientPrivilege);
    }

    let mut tokens = args.trim().split_whitespace();
    let old = tokens.next().ok_or(FsError::BadCommand)?;
    let new = tokens.next().ok_or(FsError::BadCommand)?;
    if new.len() > 6 {
        return Err(FsError::BadCommand);
    }

    let old_matches =
        (old == BLANK && user.password_matches("")) || user.password_matches(old);
    if !old_matches {
        return Err(FsError::BadPassword);
    }

    let new_password = if new == BLANK { String::new() } else { new.to_string() };
    let username = user.username.clone();
    if let Some(record) = server.users.get_mut(user_id) {
        record.password = new_password;
    }
    let _ = server.users.persist(user_id).await;
    info!(station = %from, username = %username, "password changed");
    server.ok(from, reply_port);
    Ok(())
}

/// Fsop 0x16: sets the user's boot option.
pub(crate) async fn set_boot_option(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    data: &[u8],
) -> Result<()> {
    let option = wire::u8_at(data, 5).ok_or(FsError::BadOption)?;
    if option > 7 {
        return Err(FsError::BadOption);
    }
    let session = server.sessions.get_mut(&from).ok_or(FsError::WhoAreYou)?;
    session.boot_option = option;
    let user_id = session.user_id;
    if let Some(record) = server.users.get_mut(user_id) {
        record.boot_option = option;
    }
    let _ = server.users.persist(user_id).await;
    server.ok(from, reply_port);
    Ok(())
}
