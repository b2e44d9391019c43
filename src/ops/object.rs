//! Object metadata: GET/SET-OBJECT-INFO and the `*INFO` line.

use tracing::debug;

use crate::error::{FsError, Result};
use crate::name::{self, Perm};
use crate::resolve::{self, ObjectType, ResolveError};
use crate::server::Server;
use crate::transport::Station;
use crate::users::Privilege;
use crate::wire;

fn ftype_byte(ftype: ObjectType) -> u8 {
    match ftype {
        ObjectType::NotFound => 0,
        ObjectType::File => 1,
        ObjectType::Dir => 2,
        ObjectType::Other => 3,
    }
}

/// Fsop 0x12: read selected metadata of an object.
///
/// Sub-command 1 reads the date, 2 load/exec, 3 the length, 4 the access
/// byte, 5 everything, 6 a directory header with its 16-bit entry count.
pub(crate) async fn get_object_info(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    data: &[u8],
) -> Result<()> {
    let command = wire::u8_at(data, 5).ok_or(FsError::BadCommand)?;
    let path_at = if command == 3 { 10 } else { 6 };
    let path = wire::cr_string(data, path_at);

    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let user_id = session.user_id;
    let relative_to = wire::u8_at(data, 3).ok_or(FsError::BadCommand)?;
    let view = session.view(Some(relative_to));

    debug!(station = %from, path = %path, command, "get object info");

    let res = match server.resolve(&view, path.trim(), true).await {
        Ok(res) if res.ftype == ObjectType::NotFound => {
            server.reply(from, reply_port, vec![0, 0, 0]);
            return Ok(());
        }
        Ok(res) => res,
        Err(ResolveError::NoDir) => {
            server.reply(from, reply_port, vec![0, 0, 0]);
            return Ok(());
        }
        Err(_) => return Err(FsError::BadFilename),
    };

    let mut reply = vec![0u8, 0, ftype_byte(res.ftype)];

    if command == 2 || command == 5 {
        wire::u32(&mut reply, res.load)?;
        wire::u32(&mut reply, res.exec)?;
    }
    if command == 3 || command == 5 {
        wire::u24(&mut reply, res.length)?;
    }
    if command == 4 || command == 5 {
        reply.push(name::perm_to_wire(res.perm, res.ftype == ObjectType::Dir));
        reply.push(if res.owner == user_id { 0x00 } else { 0xff });
    }
    if command == 1 || command == 5 {
        reply.push(res.day);
        reply.push(res.monthyear);
    }
    if command == 6 {
        if res.ftype != ObjectType::Dir {
            return Err(FsError::TypesDontMatch);
        }
        reply.push(0);
        reply.push(10);
        let tail = if res.components.is_empty() { "$" } else { &res.acorn_name };
        wire::push_padded(&mut reply, tail, 10);
        reply.push(if res.owner == user_id { 0x00 } else { 0xff });
        let entries = resolve::acorn_entry_count(&res.host_path).await;
        wire::u16(&mut reply, entries.min(u16::MAX as usize) as u16)?;
    }

    server.reply(from, reply_port, reply);
    Ok(())
}

/// Fsop 0x13: write selected metadata of an object.
pub(crate) async fn set_object_info(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    data: &[u8],
) -> Result<()> {
    let command = wire::u8_at(data, 5).ok_or(FsError::BadCommand)?;
    let path_at = match command {
        1 => 15,
        4 => 7,
        2 | 3 | 5 => 10,
        _ => return Err(FsError::Fs("FS Error")),
    };
    let path = wire::cr_string(data, path_at);

    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let user_id = session.user_id;
    let privilege = session.privilege;
    let relative_to = wire::u8_at(data, 3).ok_or(FsError::BadCommand)?;
    let view = session.view(Some(relative_to));

    debug!(station = %from, path = %path, command, "set object info");

    let res = match server.resolve(&view, path.trim(), false).await {
        Ok(res) if res.ftype != ObjectType::NotFound => res,
        _ => return Err(FsError::NotFound),
    };

    if !privilege.contains(Privilege::SYSTEM)
        && res.owner != user_id
        && res.parent_owner != user_id
    {
        return Err(FsError::InsufficientAccess);
    }
    if command != 1 && command != 4 && res.perm.contains(Perm::LOCKED) {
        return Err(FsError::Locked);
    }

    let mut attr = server.attrs.read_attrs(&res.host_path).await;
    match command {
        1 => {
            attr.load = wire::u32_at(data, 6).ok_or(FsError::BadCommand)?;
            attr.exec = wire::u32_at(data, 10).ok_or(FsError::BadCommand)?;
            let wire_perm = wire::u8_at(data, 14).ok_or(FsError::BadCommand)?;
            attr.perm = name::wire_to_perm(wire_perm);
        }
        2 => attr.load = wire::u32_at(data, 6).ok_or(FsError::BadCommand)?,
        3 => attr.exec = wire::u32_at(data, 6).ok_or(FsError::BadCommand)?,
        4 => {
            let wire_perm = wire::u8_at(data, 6).ok_or(FsError::BadCommand)?;
            attr.perm = name::wire_to_perm(wire_perm);
        }
        5 => {
            // Set-date: the on-disc date follows the host's modification
            // time, so there is nothing to store.
        }
        _ => unreachable!("filtered above"),
    }
    server.attrs.write_attrs(&res.host_path, &attr).await;
    server.reply(from, reply_port, vec![0, 0]);
    Ok(())
}

/// `*INFO <file>`: one human-readable line of file metadata.
pub(crate) async fn info(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    args: &str,
) -> Result<()> {
    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let user_id = session.user_id;
    let view = session.view_current();
    let mode = server.date_mode();

    let res = server.resolve(&view, args.trim(), false).await.map_err(|_| FsError::NotFound)?;
    if res.ftype == ObjectType::NotFound {
        return Err(FsError::NotFound);
    }
    if res.ftype != ObjectType::File {
        return Err(FsError::NotAFile);
    }
    if res.owner != user_id && res.perm.contains(Perm::HIDDEN) {
        return Err(FsError::NotFound);
    }

    let mut perms = String::new();
    if res.perm.contains(Perm::LOCKED) {
        perms.push('L');
    }
    if res.perm.contains(Perm::OWNER_WRITE) {
        perms.push('W');
    }
    if res.perm.contains(Perm::OWNER_READ) {
        perms.push('R');
    }
    perms.push('/');
    if res.perm.contains(Perm::OTHER_WRITE) {
        perms.push('W');
    }
    if res.perm.contains(Perm::OTHER_READ) {
        perms.push('R');
    }

    let (day, month, _) = name::unpack_date(mode, res.day, res.monthyear);
    let line = format!(
        "{:<10} {:08X} {:08X}   {:06X}    {:<7}   {:02}/{:02}/{:02} {:06X}",
        res.acorn_name,
        res.load,
        res.exec,
        res.length,
        perms,
        day,
        month,
        name::display_year(mode, res.day, res.monthyear),
        res.internal,
    );

    let mut reply = vec![0x04u8, 0];
    reply.extend_from_slice(line.as_bytes());
    reply.push(wire::CR);
    reply.push(0x80);
    server.reply(from, reply_port, reply);
    Ok(())
}
