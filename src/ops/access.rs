//! Permission and ownership commands: `*ACCESS`, `*OWNER`, `*CHOWN`.

use tracing::debug;

use crate::error::{FsError, Result};
use crate::name::Perm;
use crate::resolve::ObjectType;
use crate::server::Server;
use crate::transport::Station;
use crate::users::Privilege;
use crate::wire;

/// Parses an `owner[/other]` permission string: W, R, H and L on the
/// owner side, W and R on the other side.
fn parse_perm_string(text: &str) -> Result<Perm> {
    let mut perm = Perm::empty();
    let (left, right) = match text.split_once('/') {
        Some((l, r)) => (l, Some(r)),
        None => (text, None),
    };
    for ch in left.chars() {
        perm |= match ch.to_ascii_uppercase() {
            'W' => Perm::OWNER_WRITE,
            'R' => Perm::OWNER_READ,
            'H' => Perm::HIDDEN,
            'L' => Perm::LOCKED,
            _ => return Err(FsError::BadAttribute),
        };
    }
    if let Some(right) = right {
        for ch in right.trim_end().chars() {
            perm |= match ch.to_ascii_uppercase() {
                'W' => Perm::OTHER_WRITE,
                'R' => Perm::OTHER_READ,
                _ => return Err(FsError::BadAttribute),
            };
        }
    }
    Ok(perm)
}

/// `*ACCESS <path> <perms>`.
pub(crate) async fn access(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    args: &str,
) -> Result<()> {
    let mut tokens = args.trim().split_whitespace();
    let path = tokens.next().ok_or(FsError::BadFileName)?;
    let perm_text = tokens.next().ok_or(FsError::BadAttribute)?;
    let perm = parse_perm_string(perm_text)?;

    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let user_id = session.user_id;
    let privilege = session.privilege;
    let view = session.view_current();

    debug!(station = %from, path, perms = perm_text, "access");

    let res = server.resolve(&view, path, false).await.map_err(|_| FsError::NotFound)?;
    if res.ftype == ObjectType::NotFound {
        return Err(FsError::NotFound);
    }

    let allowed = privilege.contains(Privilege::SYSTEM)
        || res.owner == user_id
        || (res.parent_owner == user_id && res.parent_perm.contains(Perm::OWNER_WRITE));
    if !allowed {
        return Err(FsError::InsufficientAccess);
    }

    let mut attr = server.attrs.read_attrs(&res.host_path).await;
    attr.perm = perm;
    server.attrs.write_attrs(&res.host_path, &attr).await;
    server.ok(from, reply_port);
    Ok(())
}

/// `*OWNER <path>`: reports the owning user as an informational error
/// line, the way Acorn clients expect it.
pub(crate) async fn owner(
    server: &mut Server,
    from: Station,
    _reply_port: u8,
    args: &str,
) -> Result<()> {
    let path = args.trim().split(' ').next().unwrap_or("");
    if path.is_empty() {
        return Err(FsError::BadCommand);
    }

    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let user_id = session.user_id;
    let privilege = session.privilege;
    let view = session.view_current();

    let res = server.resolve(&view, path, false).await.map_err(|_| FsError::NotFound)?;
    if res.ftype == ObjectType::NotFound {
        return Err(FsError::NotFound);
    }

    let allowed = privilege.contains(Privilege::SYSTEM)
        || res.owner == user_id
        || res.parent_owner == user_id;
    if !allowed {
        return Err(FsError::InsufficientAccess);
    }

    let username = server
        .users
        .get(res.owner)
        .map(|u| u.username.clone())
        .unwrap_or_default();
    Err(FsError::Report(format!("Owner: {} {:04}", wire::padded(&username, 10), res.owner)))
}

/// `*CHOWN <path> [user]`: change ownership; giving an object away is
/// reserved to system users.
pub(crate) async fn chown(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    args: &str,
) -> Result<()> {
    let mut tokens = args.trim().split_whitespace();
    let path = tokens.next().ok_or(FsError::BadCommand)?;
    let target_user = tokens.next();

    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let user_id = session.user_id;
    let privilege = session.privilege;
    let view = session.view_current();

    debug!(station = %from, path, target = ?target_user, "chown");

    if target_user.is_some() && !privilege.contains(Privilege::SYSTEM) {
        return Err(FsError::InsufficientAccess);
    }

    let res = server.resolve(&view, path, false).await.map_err(|_| FsError::NotFound)?;
    if res.ftype == ObjectType::NotFound {
        return Err(FsError::NotFound);
    }

    let new_owner = match target_user {
        Some(name) => server.users.find(name).ok_or(FsError::NoSuchUser)?,
        None => user_id,
    };

    if res.perm.contains(Perm::LOCKED) {
        return Err(FsError::Locked);
    }
    let allowed = privilege.contains(Privilege::SYSTEM)
        || (res.owner == user_id && res.perm.contains(Perm::OWNER_WRITE))
        || (res.parent_owner == user_id && res.parent_perm.contains(Perm::OWNER_WRITE));
    if !allowed {
        return Err(FsError::InsufficientAccess);
    }

    let mut attr = server.attrs.read_attrs(&res.host_path).await;
    attr.owner = new_owner;
    server.attrs.write_attrs(&res.host_path, &attr).await;
    server.ok(from, reply_port);
    Ok(())
}
