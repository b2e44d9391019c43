//! LOAD and LOAD-AS-COMMAND: stream a whole file to the client.

use std::io::SeekFrom;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use crate::bulk::MAX_CHUNK;
use crate::error::{FsError, Result};
use crate::name::Perm;
use crate::resolve::{ObjectType, Resolution};
use crate::server::Server;
use crate::transport::Station;
use crate::users::Privilege;
use crate::wire;

/// Breather between the prologue and the data burst; slow stations drop
/// packets without it.
const STREAM_DELAY: Duration = Duration::from_millis(15);

/// Fsop 0x02 (and 0x05 with `load_as` set): send attributes, then the
/// body in data-port chunks, then the epilogue.
///
/// A load-as-command that misses relative to the given anchor retries
/// against the session's library before giving up.
pub(crate) async fn load(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    ctrl: u8,
    data: &[u8],
    load_as: bool,
) -> Result<()> {
    let data_port = wire::u8_at(data, 2).ok_or(FsError::BadCommand)?;
    let relative_to = wire::u8_at(data, 3).ok_or(FsError::BadCommand)?;
    let mut command = wire::cr_string(data, 5);
    if load_as {
        // Clients send their whole command line; the name ends at the
        // first space.
        command.truncate(command.find(' ').unwrap_or(command.len()));
    }

    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let privilege = session.privilege;
    let view = session.view(Some(relative_to));
    let library_view = session.view(Some(session.library));

    debug!(station = %from, name = %command, load_as, "load");

    let not_found = || if load_as { FsError::BadCommand } else { FsError::NotFound };

    let mut res: Option<Resolution> = match server.resolve(&view, &command, false).await {
        Ok(r) if r.ftype != ObjectType::NotFound => Some(r),
        _ => None,
    };
    if res.is_none() && load_as {
        res = match server.resolve(&library_view, &command, false).await {
            Ok(r) if r.ftype != ObjectType::NotFound => Some(r),
            _ => None,
        };
    }
    let res = res.ok_or_else(not_found)?;

    if res.ftype != ObjectType::File {
        return Err(not_found());
    }
    if !privilege.contains(Privilege::SYSTEM) && !res.my_perm.contains(Perm::OWNER_READ) {
        return Err(FsError::InsufficientAccess);
    }

    let mut file =
        tokio::fs::File::open(&res.host_path).await.map_err(|_| FsError::CannotOpen)?;

    let mut prologue = vec![0u8, 0];
    wire::u32(&mut prologue, res.load)?;
    wire::u32(&mut prologue, res.exec)?;
    wire::u24(&mut prologue, res.length)?;
    prologue.push(res.perm.bits());
    prologue.push(res.day);
    prologue.push(res.monthyear);
    server.reply_ctrl(from, reply_port, ctrl, prologue);

    tokio::time::sleep(STREAM_DELAY).await;

    file.seek(SeekFrom::Start(0)).await?;
    let mut buffer = vec![0u8; MAX_CHUNK];
    loop {
        let got = file.read(&mut buffer).await?;
        if got == 0 {
            break;
        }
        server.send(from, data_port, 0x80, buffer[..got].to_vec());
    }

    tokio::time::sleep(STREAM_DELAY).await;
    server.reply(from, reply_port, vec![0, 0]);
    Ok(())
}
