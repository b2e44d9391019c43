//! SAVE: receive a whole file over a negotiated data port.

use std::time::Instant;

use tracing::debug;

use crate::attr::ObjectAttr;
use crate::bulk::{BulkContext, MAX_CHUNK};
use crate::error::{FsError, Result};
use crate::interlock::OpenMode;
use crate::name::Perm;
use crate::ops::open::map_interlock;
use crate::resolve::ObjectType;
use crate::server::Server;
use crate::transport::Station;
use crate::users::Privilege;
use crate::wire;

/// Fsop 0x01: parse load/exec/length and the filename, open the target
/// write-truncate under the interlock, and either finish immediately
/// (zero length) or park a bulk context for the incoming stream.
pub(crate) async fn save(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    ctrl: u8,
    data: &[u8],
) -> Result<()> {
    let ack_port = wire::u8_at(data, 2).ok_or(FsError::BadCommand)?;
    let load = wire::u32_at(data, 5).ok_or(FsError::BadCommand)?;
    let exec = wire::u32_at(data, 9).ok_or(FsError::BadCommand)?;
    let length = wire::u24_at(data, 13).ok_or(FsError::BadCommand)?;
    let filename = wire::cr_string(data, 16);
    let filename = filename.trim();

    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let user_id = session.user_id;
    let privilege = session.privilege;
    let view = session.view_current();

    debug!(station = %from, filename, load, exec, length, "save");

    let Some(port) = server.bulk.allocate() else {
        return Err(FsError::TooManyOpenFiles);
    };

    let res = server.resolve(&view, filename, false).await.map_err(|_| FsError::BadPath)?;

    if res.ftype != ObjectType::NotFound && res.perm.contains(Perm::LOCKED) {
        return Err(FsError::Locked);
    }
    if res.ftype != ObjectType::File && res.ftype != ObjectType::NotFound {
        return Err(FsError::InsufficientAccess);
    }
    let writable = privilege.contains(Privilege::SYSTEM)
        || (res.ftype == ObjectType::File && res.my_perm.contains(Perm::OWNER_WRITE))
        || (res.ftype == ObjectType::NotFound
            && if res.parent_owner == user_id {
                res.parent_perm.contains(Perm::OWNER_WRITE)
            } else {
                res.parent_perm.contains(Perm::OTHER_WRITE)
            });
    if !writable {
        return Err(FsError::InsufficientAccess);
    }

    let index = server
        .interlock
        .open(&res.host_path, OpenMode::WriteTruncate, user_id, server.attrs.as_ref())
        .await
        .map_err(map_interlock)?;

    server
        .attrs
        .write_attrs(
            &res.host_path,
            &ObjectAttr { owner: user_id, load, exec, perm: Perm::owner_only() },
        )
        .await;

    let mut begin = vec![0u8, 0, port];
    wire::u16(&mut begin, MAX_CHUNK as u16)?;
    server.reply_ctrl(from, reply_port, ctrl, begin);

    if length == 0 {
        // Nothing to stream: close out and complete at once.
        let (day, monthyear) = server.date_now();
        server.interlock.close(index, OpenMode::WriteTruncate);
        server.reply_ctrl(
            from,
            reply_port,
            ctrl,
            vec![0, 0, Perm::owner_only().bits(), day, monthyear],
        );
    } else {
        server.bulk.insert(
            port,
            BulkContext {
                station: from,
                interlock: index,
                length,
                received: 0,
                reply_port,
                ack_port,
                ctrl,
                mode: OpenMode::WriteTruncate,
                user_handle: None,
                last_receive: Instant::now(),
            },
        );
    }
    Ok(())
}
