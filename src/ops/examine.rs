//! EXAMINE and the catalogue header.

use tracing::debug;

use crate::error::{FsError, Result};
use crate::name::{self, Perm};
use crate::resolve::{ObjectType, ResolvedEntry};
use crate::server::Server;
use crate::transport::Station;
use crate::wire;

/// Owner-side permission letters: a type letter, then L, W, R.
fn perm_left(entry: &ResolvedEntry) -> String {
    let mut s = String::new();
    match entry.ftype {
        ObjectType::Dir => s.push('D'),
        ObjectType::Other => s.push('S'),
        _ => {}
    }
    if entry.perm.contains(Perm::LOCKED) {
        s.push('L');
    }
    if entry.perm.contains(Perm::OWNER_WRITE) {
        s.push('W');
    }
    if entry.perm.contains(Perm::OWNER_READ) {
        s.push('R');
    }
    s
}

/// Other-side permission letters.
fn perm_right(entry: &ResolvedEntry) -> String {
    let mut s = String::new();
    if entry.perm.contains(Perm::OTHER_WRITE) {
        s.push('W');
    }
    if entry.perm.contains(Perm::OTHER_READ) {
        s.push('R');
    }
    s
}

/// Fsop 0x03: list a directory in one of four formats.
///
/// `arg` selects the format: 0 machine-packed, 1 long human line, 2 short
/// padded names, 3 names with permission strings. `start`/`n` window the
/// listing. Hidden entries are skipped unless the requester owns them.
pub(crate) async fn examine(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    data: &[u8],
) -> Result<()> {
    let relative_to = wire::u8_at(data, 3).ok_or(FsError::BadCommand)?;
    let arg = wire::u8_at(data, 5).ok_or(FsError::BadCommand)?;
    let start = wire::u8_at(data, 6).ok_or(FsError::BadCommand)? as usize;
    let count = wire::u8_at(data, 7).ok_or(FsError::BadCommand)? as usize;
    // Format 2 requests carry their path one byte later than the rest.
    let path = if arg == 2 {
        wire::cr_string(data, 9)
    } else {
        wire::cr_string(data, 8)
    };
    let path = path.trim().to_string();

    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let user_id = session.user_id;
    let view = session.view(Some(relative_to));
    let mode = server.date_mode();

    debug!(station = %from, path = %path, arg, start, count, "examine");

    let target = server.resolve(&view, &path, true).await.map_err(|_| FsError::NotFound)?;

    // A wildcard over files lists its matches; a directory lists its
    // contents; a plain file is not examinable.
    let terminal_wildcard =
        path.rsplit('.').next().map(name::has_wildcard).unwrap_or(false);
    let listing = if target.ftype != ObjectType::Dir && terminal_wildcard {
        target.matches
    } else if target.ftype == ObjectType::Dir {
        let listing_path = if path.is_empty() { "*".to_string() } else { format!("{path}.*") };
        match server.resolve(&view, &listing_path, true).await {
            Ok(res) => res.matches,
            Err(crate::resolve::ResolveError::NoDir) => Vec::new(),
            Err(_) => return Err(FsError::NotFound),
        }
    } else {
        return Err(FsError::TypesDontMatch);
    };

    let visible = listing
        .iter()
        .filter(|e| !e.perm.contains(Perm::HIDDEN) || e.owner == user_id);

    let mut reply = vec![0u8, 0, 0, 0];
    let mut examined = 0u16;
    for entry in visible.skip(start).take(count) {
        match arg {
            0 => {
                wire::u32(&mut reply, entry.load)?;
                wire::u32(&mut reply, entry.exec)?;
                reply.push(entry.perm.bits());
                reply.push(entry.day);
                reply.push(entry.monthyear);
                wire::u24(&mut reply, entry.internal as u32)?;
                wire::u24(&mut reply, entry.length)?;
            }
            1 => {
                let (day, month, _) = name::unpack_date(mode, entry.day, entry.monthyear);
                let line = format!(
                    "{:<10} {:08X} {:08X}   {:06X}   {:>4}/{:<2}     {:02}/{:02}/{:02} {:06X}",
                    entry.acorn_name,
                    entry.load,
                    entry.exec,
                    entry.length,
                    perm_left(entry),
                    perm_right(entry),
                    day,
                    month,
                    name::display_year(mode, entry.day, entry.monthyear),
                    entry.internal,
                );
                reply.extend_from_slice(line.as_bytes());
                reply.push(0);
            }
            2 => {
                reply.push(0x0a);
                wire::push_padded(&mut reply, &entry.acorn_name, 10);
            }
            3 => {
                let line = format!(
                    "{:<10} {:>4}/{:<2}",
                    entry.acorn_name,
                    perm_left(entry),
                    perm_right(entry)
                );
                reply.extend_from_slice(line.as_bytes());
                reply.push(0);
            }
            _ => return Err(FsError::BadCommand),
        }
        examined += 1;
    }

    reply.push(0x80);
    reply[2] = (examined & 0xff) as u8;
    reply[3] = (examined >> 8) as u8;
    server.reply(from, reply_port, reply);
    Ok(())
}

/// Fsop 0x04: the catalogue header line for a directory.
pub(crate) async fn cat_header(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    data: &[u8],
) -> Result<()> {
    let relative_to = wire::u8_at(data, 3).ok_or(FsError::BadCommand)?;
    let path = wire::cr_string(data, 5);

    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let user_id = session.user_id;
    let current_disc = session.current_disc;
    let view = session.view(Some(relative_to));

    let res = server.resolve(&view, path.trim(), false).await.map_err(|_| FsError::NotFound)?;
    if res.ftype != ObjectType::Dir {
        return Err(FsError::TypesDontMatch);
    }

    let tail = if res.components.is_empty() { "$" } else { &res.acorn_name };
    let disc_name = server.discs.name(current_disc).unwrap_or("").to_string();

    let mut reply = vec![0u8, 0];
    wire::push_padded(&mut reply, tail, 10);
    reply.push(if res.owner == user_id { b'O' } else { b'P' });
    reply.extend_from_slice(b"   ");
    wire::push_padded(&mut reply, &disc_name, 15);
    reply.push(wire::CR);
    reply.push(0x80);
    server.reply(from, reply_port, reply);
    Ok(())
}
