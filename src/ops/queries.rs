//! Read-only enumerations of server state: discs, users, time, version,
//! environment and free space.

use tracing::debug;

use crate::error::{FsError, Result};
use crate::host;
use crate::server::Server;
use crate::transport::Station;
use crate::users::Privilege;
use crate::wire;

/// Fsop 0x0E: disc names, windowed by `start`/`number`.
pub(crate) async fn read_discs(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    data: &[u8],
) -> Result<()> {
    let start = wire::u8_at(data, 5).ok_or(FsError::BadCommand)? as usize;
    let number = wire::u8_at(data, 6).ok_or(FsError::BadCommand)? as usize;

    let mut reply = vec![10u8, 0, 0];
    let mut delivered = 0u8;
    for index in server.discs.indexes().skip(start).take(number) {
        let name = server.discs.name(index).unwrap_or("");
        reply.push(index);
        wire::push_padded(&mut reply, name, 16);
        delivered += 1;
    }
    reply[2] = delivered;
    server.reply(from, reply_port, reply);
    Ok(())
}

/// Fsop 0x10: the server's clock.
pub(crate) async fn read_time(server: &mut Server, from: Station, reply_port: u8) -> Result<()> {
    let (day, monthyear, hour, minute, second) = server.time_now();
    server.reply(from, reply_port, vec![0, 0, day, monthyear, hour, minute, second]);
    Ok(())
}

/// Fsop 0x0F: currently logged-on users, windowed by `start`/`number`.
pub(crate) async fn read_logged_on_users(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    data: &[u8],
) -> Result<()> {
    let start = wire::u8_at(data, 5).ok_or(FsError::BadCommand)? as usize;
    let number = wire::u8_at(data, 6).ok_or(FsError::BadCommand)? as usize;

    let mut rows: Vec<(Station, String, bool)> = server
        .sessions
        .iter()
        .map(|session| {
            let name = server
                .users
                .get(session.user_id)
                .map(|u| u.username.clone())
                .unwrap_or_default();
            (session.station, name, session.privilege.contains(Privilege::SYSTEM))
        })
        .collect();
    rows.sort_by_key(|(station, _, _)| (station.net, station.stn));

    let mut reply = vec![0u8, 0, 0];
    let mut delivered = 0u8;
    for (station, name, is_system) in rows.into_iter().skip(start).take(number) {
        reply.push(station.stn);
        reply.push(station.net);
        wire::push_padded(&mut reply, &name, 10);
        reply.push(u8::from(is_system));
        delivered += 1;
    }
    reply[2] = delivered;
    server.reply(from, reply_port, reply);
    Ok(())
}

/// Fsop 0x18: where (and with what privilege) a named user is logged on.
pub(crate) async fn read_user_info(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    data: &[u8],
) -> Result<()> {
    let username = wire::cr_string(data, 5);
    let username = username.trim();
    debug!(station = %from, username, "read user info");

    let found = server.sessions.iter().find(|session| {
        server
            .users
            .get(session.user_id)
            .is_some_and(|u| u.matches_name(username))
    });
    match found {
        Some(session) => {
            let is_system = session.privilege.contains(Privilege::SYSTEM);
            let station = session.station;
            server.reply(
                from,
                reply_port,
                vec![0, 0, u8::from(is_system), station.stn, station.net],
            );
            Ok(())
        }
        None => Err(FsError::NotLoggedOn),
    }
}

/// Fsop 0x19: the version banner.
pub(crate) async fn read_version(server: &mut Server, from: Station, reply_port: u8) -> Result<()> {
    let mut reply = vec![0u8, 0];
    reply.extend_from_slice(env!("CARGO_PKG_VERSION").as_bytes());
    reply.push(wire::CR);
    server.reply(from, reply_port, reply);
    Ok(())
}

/// Fsop 0x15: disc name plus the current and library tails.
pub(crate) async fn read_user_env(
    server: &mut Server,
    from: Station,
    reply_port: u8,
) -> Result<()> {
    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let disc_name = server.discs.name(session.current_disc).unwrap_or("").to_string();

    let mut reply = vec![0u8, 0, 16];
    wire::push_padded(&mut reply, &disc_name, 16);
    wire::push_padded(&mut reply, &session.current_tail, 10);
    wire::push_padded(&mut reply, &session.library_tail, 10);
    server.reply(from, reply_port, reply);
    Ok(())
}

/// Fsop 0x1A: free and total space of a named disc, in 256-byte units.
pub(crate) async fn read_free(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    data: &[u8],
) -> Result<()> {
    let wanted = wire::cr_string(data, 5);
    let wanted = wanted.trim();
    debug!(station = %from, disc = wanted, "read free space");

    let Some(index) = server.discs.find(wanted) else {
        return Err(FsError::Fs("No such disc"));
    };
    let dir = server
        .discs
        .host_dir(&server.config.root, index)
        .ok_or(FsError::Fs("No such disc"))?;
    let (free, total) = host::disc_space(&dir).ok_or(FsError::Fs("FS Error"))?;

    let mut reply = vec![0u8, 0];
    wire::u24(&mut reply, free)?;
    wire::u24(&mut reply, total)?;
    server.reply(from, reply_port, reply);
    Ok(())
}
