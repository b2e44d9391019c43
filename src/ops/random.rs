//! Single-byte transfers and random-access information.

use std::io::SeekFrom;

use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::debug;

use crate::error::{FsError, Result};
use crate::interlock::OpenMode;
use crate::server::Server;
use crate::transport::Station;
use crate::wire;

/// Fsop 0x08: reads the byte at the cursor.
///
/// The status byte distinguishes a normal read (0x00), the final byte
/// (0x80) and an attempt past the end (0xC0). The first past-end attempt
/// latches the handle; a second one errors outright.
pub(crate) async fn get_byte(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    ctrl: u8,
    data: &[u8],
) -> Result<()> {
    let handle = wire::u8_at(data, 2).ok_or(FsError::Channel)?;
    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let file = session.file(handle).ok_or(FsError::Channel)?;
    let cursor = file.cursor;
    let index = file.interlock;
    if file.past_eof {
        return Err(FsError::Eof);
    }

    let host = server.interlock.file_mut(index).ok_or(FsError::Channel)?;
    let size = host.metadata().await.map_err(|_| FsError::Fs("FS Error on read"))?.len();
    host.seek(SeekFrom::Start(cursor)).await.map_err(|_| FsError::Fs("FS Error on read"))?;
    let mut byte = [0u8; 1];
    let got = host.read(&mut byte).await.map_err(|_| FsError::Fs("FS Error on read"))?;

    let (value, status, new_cursor, latch) = if got == 0 {
        (0xfe, 0xc0, cursor, true)
    } else {
        let next = cursor + 1;
        (byte[0], if next >= size { 0x80 } else { 0x00 }, next, false)
    };

    let file = server
        .sessions
        .get_mut(&from)
        .and_then(|s| s.file_mut(handle))
        .ok_or(FsError::Channel)?;
    file.cursor = new_cursor;
    if latch {
        file.past_eof = true;
    }

    server.reply_ctrl(from, reply_port, ctrl, vec![0, 0, value, status]);
    Ok(())
}

/// Fsop 0x09: writes one byte at the cursor.
///
/// A request whose low control bit equals the stored sequence bit is a
/// retransmission: acknowledge it without writing.
pub(crate) async fn put_byte(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    ctrl: u8,
    data: &[u8],
) -> Result<()> {
    let handle = wire::u8_at(data, 2).ok_or(FsError::Channel)?;
    let byte = wire::u8_at(data, 3).ok_or(FsError::Channel)?;
    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let file = session.file(handle).ok_or(FsError::Channel)?;
    if file.mode == OpenMode::Read {
        return Err(FsError::NotOpenForUpdate);
    }
    let cursor = file.cursor;
    let index = file.interlock;
    let duplicate = (ctrl & 0x01) == file.sequence;

    if !duplicate {
        let host = server.interlock.file_mut(index).ok_or(FsError::Channel)?;
        host.seek(SeekFrom::Start(cursor))
            .await
            .map_err(|_| FsError::Fs("FS error writing to file"))?;
        host.write_all(&[byte]).await.map_err(|_| FsError::Fs("FS error writing to file"))?;
        host.flush().await.map_err(|_| FsError::Fs("FS error writing to file"))?;
    } else {
        debug!(station = %from, handle, "ignoring retransmitted byte");
    }

    let file = server
        .sessions
        .get_mut(&from)
        .and_then(|s| s.file_mut(handle))
        .ok_or(FsError::Channel)?;
    if !duplicate {
        file.cursor = cursor + 1;
    }
    file.sequence = ctrl & 0x01;

    server.reply_ctrl(from, reply_port, ctrl, vec![0, 0]);
    Ok(())
}

/// Fsop 0x0C: reads cursor (function 0) or extent/allocation (1, 2).
pub(crate) async fn get_random_access_info(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    data: &[u8],
) -> Result<()> {
    let handle = wire::u8_at(data, 5).ok_or(FsError::Channel)?;
    let function = wire::u8_at(data, 6).ok_or(FsError::Channel)?;
    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let file = session.file(handle).ok_or(FsError::Channel)?;
    let cursor = file.cursor;
    let index = file.interlock;

    let value = match function {
        0 => cursor,
        1 | 2 => {
            let host = server.interlock.file_mut(index).ok_or(FsError::Channel)?;
            host.metadata().await?.len()
        }
        _ => return Err(FsError::Fs("FS Error")),
    };

    let mut reply = vec![0u8, 0];
    wire::u24(&mut reply, value as u32)?;
    server.reply(from, reply_port, reply);
    Ok(())
}

/// Fsop 0x0D: moves the cursor (function 0) or sets the extent
/// (function 1), zero-filling growth and truncating shrinkage.
pub(crate) async fn set_random_access_info(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    data: &[u8],
) -> Result<()> {
    let handle = wire::u8_at(data, 5).ok_or(FsError::Channel)?;
    let function = wire::u8_at(data, 6).ok_or(FsError::Channel)?;
    let value = wire::u24_at(data, 7).ok_or(FsError::Channel)? as u64;

    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let file = session.file(handle).ok_or(FsError::Channel)?;
    let index = file.interlock;

    let host = server.interlock.file_mut(index).ok_or(FsError::Channel)?;
    let extent = host.metadata().await?.len();

    match function {
        0 => {
            if value > extent {
                host.set_len(value)
                    .await
                    .map_err(|_| FsError::Fs("FS Error extending file"))?;
            }
            let file = server
                .sessions
                .get_mut(&from)
                .and_then(|s| s.file_mut(handle))
                .ok_or(FsError::Channel)?;
            file.cursor = value;
        }
        1 => {
            host.set_len(value).await.map_err(|_| {
                if value > extent {
                    FsError::Fs("FS Error extending file")
                } else {
                    FsError::Fs("FS Error truncating file")
                }
            })?;
        }
        _ => return Err(FsError::Fs("FS Error - unknown function")),
    }

    server.reply(from, reply_port, vec![0, 0]);
    Ok(())
}
