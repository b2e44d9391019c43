//! Multi-byte transfers: GETBYTES, PUTBYTES and the routing of inbound
//! bulk chunks on their ancillary ports.

use std::io::SeekFrom;
use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::bulk::{BulkContext, MAX_CHUNK};
use crate::error::{FsError, Result};
use crate::name::Perm;
use crate::server::Server;
use crate::transport::Station;
use crate::wire;

/// Fsop 0x0A: stream up to the requested count from the handle to the
/// client's data port.
///
/// The transmitted stream is padded with zeroes to the requested count;
/// the completion packet reports how many bytes were real.
pub(crate) async fn get_bytes(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    ctrl: u8,
    data: &[u8],
) -> Result<()> {
    if data.len() < 13 {
        return Err(FsError::Fs("Bad server request"));
    }
    let txport = wire::u8_at(data, 2).ok_or(FsError::Channel)?;
    let handle = wire::u8_at(data, 5).ok_or(FsError::Channel)?;
    let from_cursor = wire::u8_at(data, 6).ok_or(FsError::Channel)? != 0;
    let bytes = wire::u24_at(data, 7).ok_or(FsError::Channel)?;
    let offset_arg = wire::u24_at(data, 10).ok_or(FsError::Channel)?;

    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let file = session.file(handle).ok_or(FsError::Channel)?;
    let index = file.interlock;
    let offset = if from_cursor { file.cursor } else { offset_arg as u64 };

    debug!(station = %from, handle, bytes, offset, "get bytes");

    // Acknowledge the request before the burst.
    server.reply_ctrl(from, reply_port, ctrl, vec![0, 0]);

    let mut transmitted = 0u32;
    let mut actual = 0u32;
    let mut eof;
    let mut chunks: Vec<Vec<u8>> = Vec::new();
    {
        let host = server.interlock.file_mut(index).ok_or(FsError::Channel)?;
        let size = host.metadata().await.map_err(|_| FsError::Fs("FS Error on read"))?.len();
        host.seek(SeekFrom::Start(offset)).await.map_err(|_| FsError::Fs("FS Error on read"))?;

        eof = offset >= size;
        while transmitted < bytes {
            let want = (bytes - transmitted).min(MAX_CHUNK as u32) as usize;
            let mut chunk = vec![0u8; want];
            let mut got = 0usize;
            while !eof && got < want {
                match host.read(&mut chunk[got..]).await {
                    Ok(0) => eof = true,
                    Ok(n) => got += n,
                    Err(_) => return Err(FsError::Fs("FS Error on read")),
                }
            }
            actual += got as u32;
            transmitted += want as u32;
            chunks.push(chunk);
        }
        if offset + actual as u64 >= size {
            eof = true;
        }
    }
    for chunk in chunks {
        server.send(from, txport, 0x80, chunk);
    }

    let file = server
        .sessions
        .get_mut(&from)
        .and_then(|s| s.file_mut(handle))
        .ok_or(FsError::Channel)?;
    file.cursor = offset + actual as u64;

    let mut done = vec![0u8, 0, if eof { 0x80 } else { 0x00 }];
    wire::u24(&mut done, actual)?;
    server.reply(from, reply_port, done);
    Ok(())
}

/// Fsop 0x0B: negotiate an ancillary port for an incoming stream into an
/// open handle.
pub(crate) async fn put_bytes(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    ctrl: u8,
    data: &[u8],
) -> Result<()> {
    if data.len() < 13 {
        return Err(FsError::Fs("Bad server request"));
    }
    let txport = wire::u8_at(data, 2).ok_or(FsError::Channel)?;
    let handle = wire::u8_at(data, 5).ok_or(FsError::Channel)?;
    let from_cursor = wire::u8_at(data, 6).ok_or(FsError::Channel)? != 0;
    let bytes = wire::u24_at(data, 7).ok_or(FsError::Channel)?;
    let offset_arg = wire::u24_at(data, 10).ok_or(FsError::Channel)?;

    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let file = session.file(handle).ok_or(FsError::Channel)?;
    let index = file.interlock;
    let mode = file.mode;
    let offset = if from_cursor { file.cursor } else { offset_arg as u64 };

    debug!(station = %from, handle, bytes, offset, "put bytes");

    let host = server.interlock.file_mut(index).ok_or(FsError::Channel)?;
    host.seek(SeekFrom::Start(offset)).await?;

    let Some(port) = server.bulk.allocate() else {
        return Err(FsError::Fs("No channels available"));
    };

    if bytes == 0 {
        // Nothing to receive; the handle stays open.
        let mut begin = vec![0u8, 0, port];
        wire::u16(&mut begin, MAX_CHUNK as u16)?;
        server.reply_ctrl(from, reply_port, ctrl, begin);
        let (day, monthyear) = server.date_now();
        server.reply_ctrl(
            from,
            reply_port,
            ctrl,
            vec![0, 0, Perm::owner_only().bits(), day, monthyear],
        );
        return Ok(());
    }

    server.bulk.insert(
        port,
        BulkContext {
            station: from,
            interlock: index,
            length: bytes,
            received: 0,
            reply_port,
            ack_port: txport,
            ctrl,
            mode,
            user_handle: Some(handle),
            last_receive: Instant::now(),
        },
    );

    let mut begin = vec![0u8, 0, port];
    wire::u16(&mut begin, MAX_CHUNK as u16)?;
    server.reply_ctrl(from, reply_port, ctrl, begin);
    Ok(())
}

/// A datagram on a non-fileserver port: appended to whichever transfer
/// owns the port, acknowledged per chunk, completed when the announced
/// length has arrived.
pub(crate) async fn bulk_receive(
    server: &mut Server,
    from: Station,
    port: u8,
    ctrl: u8,
    data: &[u8],
) {
    let Some(context) = server.bulk.get(port) else { return };
    if context.station != from {
        return;
    }
    let index = context.interlock;
    let user_handle = context.user_handle;
    let length = context.length;
    let reply_port = context.reply_port;
    let ack_port = context.ack_port;
    let completion_ctrl = context.ctrl;
    let mode = context.mode;

    let Some(host) = server.interlock.file_mut(index) else {
        warn!(port, "bulk port refers to a dead interlock entry");
        server.bulk.release(port);
        return;
    };
    if let Err(err) = host.write_all(data).await {
        warn!(port, %err, "bulk write failed");
        return;
    }
    let _ = host.flush().await;

    let received = {
        let context = server.bulk.get_mut(port).expect("checked above");
        context.received += data.len() as u32;
        context.last_receive = Instant::now();
        context.received
    };

    if let Some(handle) = user_handle {
        if let Some(file) =
            server.sessions.get_mut(&from).and_then(|s| s.file_mut(handle))
        {
            file.cursor += data.len() as u64;
        }
    }

    if received >= length {
        server.bulk.release(port);
        let (day, monthyear) = server.date_now();
        if let Some(_handle) = user_handle {
            // PUTBYTES: the user handle keeps the file open.
            let mut done = vec![0u8, 0, port];
            let _ = wire::u24(&mut done, received);
            server.reply_ctrl(from, reply_port, completion_ctrl, done);
        } else {
            // SAVE: release the write side and report the stamped
            // attributes.
            server.interlock.close(index, mode);
            server.reply_ctrl(
                from,
                reply_port,
                completion_ctrl,
                vec![0, 0, Perm::owner_only().bits(), day, monthyear],
            );
        }
    } else {
        server.send(from, ack_port, ctrl, vec![0]);
    }
}
