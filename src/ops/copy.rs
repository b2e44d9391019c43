//! `*COPY <wildcard-source> <destination>`.

use tracing::debug;

use crate::attr::ObjectAttr;
use crate::error::{FsError, Result};
use crate::host;
use crate::interlock::OpenMode;
use crate::name::Perm;
use crate::ops::open::map_interlock;
use crate::resolve::ObjectType;
use crate::server::Server;
use crate::transport::Station;

/// Copies every source match (files only) into the destination, which
/// must be a directory when more than one file matched. Each transfer
/// holds a read interlock on the source and a write interlock on the
/// target for its duration.
pub(crate) async fn copy(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    args: &str,
) -> Result<()> {
    let mut tokens = args.trim().split_whitespace();
    let source = tokens.next().ok_or(FsError::Fs("Bad parameters"))?;
    let destination = tokens.next().ok_or(FsError::Fs("Bad parameters"))?;

    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let user_id = session.user_id;
    let view = session.view_current();

    debug!(station = %from, source, destination, "copy");

    let src = server.resolve(&view, source, true).await.map_err(|_| FsError::NotFoundDc)?;
    if src.matches.is_empty() {
        return Err(FsError::NotFoundDc);
    }
    let all_files = src
        .matches
        .iter()
        .all(|e| e.ftype == ObjectType::File && e.my_perm.contains(Perm::OWNER_READ));
    if !all_files {
        return Err(FsError::Fs("Source must be all files"));
    }

    let dst = server.resolve(&view, destination, false).await.map_err(|_| FsError::Fs("Bad destination"))?;
    if dst.ftype != ObjectType::Dir && src.matches.len() > 1 {
        return Err(FsError::Fs("Destination not a dir"));
    }

    for entry in &src.matches {
        let input = server
            .interlock
            .open(&entry.host_path, OpenMode::Read, user_id, server.attrs.as_ref())
            .await
            .map_err(map_interlock)?;

        let target = if dst.ftype == ObjectType::Dir {
            dst.host_path.join(&entry.host_name)
        } else {
            dst.host_path.clone()
        };
        let output = match server
            .interlock
            .open(&target, OpenMode::WriteTruncate, user_id, server.attrs.as_ref())
            .await
        {
            Ok(index) => index,
            Err(err) => {
                server.interlock.close(input, OpenMode::Read);
                return Err(map_interlock(err));
            }
        };

        let copied = {
            let Some((src_file, dst_file)) = server.interlock.file_pair_mut(input, output)
            else {
                server.interlock.close(input, OpenMode::Read);
                server.interlock.close(output, OpenMode::WriteTruncate);
                return Err(FsError::Fs("FS Error in copy"));
            };
            host::copy_contents(src_file, dst_file, entry.length as u64).await
        };
        server.interlock.close(input, OpenMode::Read);
        server.interlock.close(output, OpenMode::WriteTruncate);
        if copied.is_err() {
            return Err(FsError::Fs("FS Error in copy"));
        }

        server
            .attrs
            .write_attrs(
                &target,
                &ObjectAttr {
                    owner: user_id,
                    load: entry.load,
                    exec: entry.exec,
                    perm: entry.perm,
                },
            )
            .await;
    }

    server.ok(from, reply_port);
    Ok(())
}
