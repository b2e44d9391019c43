//! Host-filesystem helpers that need more than `tokio::fs` offers.

use std::io;
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Renames `from` to `to`, refusing to replace an existing destination.
#[cfg(target_os = "linux")]
pub async fn rename_noreplace(from: &Path, to: &Path) -> io::Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let from = CString::new(from.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;
    let to = CString::new(to.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;
    let rc = unsafe {
        libc::renameat2(
            libc::AT_FDCWD,
            from.as_ptr(),
            libc::AT_FDCWD,
            to.as_ptr(),
            libc::RENAME_NOREPLACE,
        )
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Renames `from` to `to`, refusing to replace an existing destination.
///
/// Without a kernel no-replace primitive this is check-then-rename.
#[cfg(not(target_os = "linux"))]
pub async fn rename_noreplace(from: &Path, to: &Path) -> io::Result<()> {
    if tokio::fs::symlink_metadata(to).await.is_ok() {
        return Err(io::Error::new(io::ErrorKind::AlreadyExists, "destination exists"));
    }
    tokio::fs::rename(from, to).await
}

/// Free and total space of the filesystem holding `path`, in 256-byte
/// units, both clamped to the 24-bit wire range.
#[cfg(target_os = "linux")]
pub fn disc_space(path: &Path) -> Option<(u32, u32)> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return None;
    }
    let unit = (stat.f_bsize as u64) >> 8;
    let free = (unit * stat.f_bavail as u64).min(0xff_ffff) as u32;
    let total = (unit * stat.f_blocks as u64).min(0xff_ffff) as u32;
    Some((free, total))
}

#[cfg(not(target_os = "linux"))]
pub fn disc_space(_path: &Path) -> Option<(u32, u32)> {
    None
}

/// Streams the whole of `src` into `dst` through the kernel where the
/// platform allows, falling back to a buffered copy. The source may be a
/// shared reader, so the transfer always starts from the beginning.
pub async fn copy_contents(src: &mut File, dst: &mut File, length: u64) -> io::Result<u64> {
    src.seek(std::io::SeekFrom::Start(0)).await?;
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;

        let in_fd = src.as_raw_fd();
        let out_fd = dst.as_raw_fd();
        let mut offset: libc::off_t = 0;
        let mut copied = 0u64;
        loop {
            if copied >= length {
                return Ok(copied);
            }
            let chunk = (length - copied).min(1 << 20) as usize;
            let sent = unsafe { libc::sendfile(out_fd, in_fd, &mut offset, chunk) };
            if sent > 0 {
                copied += sent as u64;
            } else if sent == 0 {
                // Source exhausted early.
                return Ok(copied);
            } else if copied == 0 {
                // The descriptor refuses sendfile outright; fall through
                // to the buffered copy.
                break;
            } else {
                return Err(io::Error::last_os_error());
            }
        }
    }

    let mut copied = 0u64;
    let mut buffer = vec![0u8; 64 * 1024];
    while copied < length {
        let want = buffer.len().min((length - copied) as usize);
        let got = src.read(&mut buffer[..want]).await?;
        if got == 0 {
            break;
        }
        dst.write_all(&buffer[..got]).await?;
        copied += got as u64;
    }
    dst.flush().await?;
    Ok(copied)
}
