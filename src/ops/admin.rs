//! Administrative commands: `*SETHOME`, `*SETLIB`, `*LINK`, `*FLOG`,
//! `*NEWUSER` and `*PRIV`. All but SETLIB are reserved to system users
//! by the dispatcher.

use tracing::{debug, info};

use crate::attr::ObjectAttr;
use crate::error::{FsError, Result};
use crate::name::Perm;
use crate::resolve::ObjectType;
use crate::server::Server;
use crate::transport::Station;
use crate::users::{Privilege, UserRecord};
use crate::wire;

/// Longest stored home or library path.
const MAX_DIR_PATH: usize = 93;

/// Renders a resolved position as the `$.`-prefixed dotted path stored
/// in user records.
fn stored_dir(path_from_root: &str) -> String {
    if path_from_root.is_empty() {
        "$".to_string()
    } else {
        format!("$.{path_from_root}")
    }
}

/// `*SETHOME <dir>`: permanently set the caller's home directory.
pub(crate) async fn set_home(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    packet_dir: u8,
    args: &str,
) -> Result<()> {
    let path = args.trim();
    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let user_id = session.user_id;
    let view = session.view(Some(packet_dir));

    let res = match server.resolve(&view, path, false).await {
        Ok(res)
            if res.ftype == ObjectType::Dir && res.path_from_root.len() <= MAX_DIR_PATH =>
        {
            res
        }
        _ => return Err(FsError::BadDirectory("Bad directory")),
    };

    if let Some(record) = server.users.get_mut(user_id) {
        record.home = stored_dir(&res.path_from_root);
        record.home_disc = res.disc;
    }
    let _ = server.users.persist(user_id).await;
    server.ok(from, reply_port);
    Ok(())
}

/// `*SETLIB <dir>`: permanently set the caller's library directory. The
/// directory must live on the caller's home disc.
pub(crate) async fn set_lib(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    packet_dir: u8,
    args: &str,
) -> Result<()> {
    let path = args.trim();
    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let user_id = session.user_id;
    if session.privilege.contains(Privilege::LOCKED) {
        return Err(FsError::InsufficientAccess);
    }
    let view = session.view(Some(packet_dir));
    let home_disc = server.users.get(user_id).map(|u| u.home_disc).unwrap_or(0);

    let res = match server.resolve(&view, path, false).await {
        Ok(res)
            if res.ftype == ObjectType::Dir
                && res.path_from_root.len() <= MAX_DIR_PATH
                && res.disc == home_disc =>
        {
            res
        }
        _ => return Err(FsError::BadDirectory("Bad library")),
    };

    if let Some(record) = server.users.get_mut(user_id) {
        record.library = stored_dir(&res.path_from_root);
    }
    let _ = server.users.persist(user_id).await;
    server.ok(from, reply_port);
    Ok(())
}

/// `*LINK <source> <destination>`: create a host symbolic link and lock
/// the source so it cannot be deleted under the link.
pub(crate) async fn link(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    args: &str,
) -> Result<()> {
    let mut tokens = args.trim().split_whitespace();
    let source = tokens.next().ok_or(FsError::Fs("Bad parameters"))?;
    let destination = tokens.next().ok_or(FsError::Fs("Bad parameters"))?;

    let session = server.sessions.get(&from).ok_or(FsError::WhoAreYou)?;
    let view = session.view_current();

    let src = match server.resolve(&view, source, false).await {
        Ok(res) if res.ftype != ObjectType::NotFound => res,
        _ => return Err(FsError::NotFoundDc),
    };
    let dst = server.resolve(&view, destination, false).await.map_err(|_| FsError::NotFoundDc)?;

    debug!(station = %from, source, destination, "link");

    #[cfg(unix)]
    {
        tokio::fs::symlink(&src.host_path, &dst.host_path)
            .await
            .map_err(|_| FsError::Fs("Cannot create link"))?;
    }
    #[cfg(not(unix))]
    {
        return Err(FsError::Fs("Cannot create link"));
    }

    // Lock the source: deleting a symlink target leaves dangling links
    // behind, so force the user to think about it first.
    #[cfg(unix)]
    {
        let mut attr = server.attrs.read_attrs(&src.host_path).await;
        attr.perm |= Perm::LOCKED;
        server.attrs.write_attrs(&src.host_path, &attr).await;
        server.ok(from, reply_port);
        Ok(())
    }
}

/// `*FLOG <station|user>`: force a station (or every session of a named
/// user) off the server.
pub(crate) async fn force_logoff(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    args: &str,
) -> Result<()> {
    let target = args.trim();
    let mut stations: Vec<Station> = Vec::new();

    if target.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        let (net, stn) = match target.split_once('.') {
            Some((net, stn)) => (
                net.parse().map_err(|_| FsError::Fs("Bad station specification"))?,
                stn.parse().map_err(|_| FsError::Fs("Bad station specification"))?,
            ),
            None => {
                (0, target.parse().map_err(|_| FsError::Fs("Bad station specification"))?)
            }
        };
        stations.push(Station::new(net, stn));
    } else {
        stations.extend(
            server
                .sessions
                .iter()
                .filter(|session| {
                    server
                        .users
                        .get(session.user_id)
                        .is_some_and(|u| u.matches_name(target))
                })
                .map(|session| session.station),
        );
    }

    for station in stations {
        info!(%station, by = %from, "forced logoff");
        server.logoff(&station);
    }
    server.ok(from, reply_port);
    Ok(())
}

/// `*NEWUSER <name> [full name]`: create an account in the first free
/// slot, with a home directory on disc 0.
pub(crate) async fn new_user(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    args: &str,
) -> Result<()> {
    let args = args.trim();
    let (username, fullname) = match args.split_once(' ') {
        Some((name, rest)) => (name, rest.trim()),
        None => (args, ""),
    };
    let username = username.to_ascii_uppercase();
    if username.is_empty() || username.len() > 10 {
        return Err(FsError::BadCommand);
    }

    info!(station = %from, username = %username, "new user");

    if server.users.find(&username).is_some() {
        return Err(FsError::Fs("User exists"));
    }
    let Some(id) = server.users.allocate() else {
        return Err(FsError::Fs("No available users"));
    };

    let home_dir = server
        .discs
        .host_dir(&server.config.root, 0)
        .map(|dir| dir.join(&username));
    let Some(home_dir) = home_dir else {
        return Err(FsError::Fs("Unable to create home directory"));
    };
    tokio::fs::create_dir(&home_dir)
        .await
        .map_err(|_| FsError::Fs("Unable to create home directory"))?;
    server.attrs.write_attrs(&home_dir, &ObjectAttr::created_by(id)).await;

    if let Some(record) = server.users.get_mut(id) {
        *record = UserRecord {
            username: username.clone(),
            password: String::new(),
            fullname: fullname.to_string(),
            privilege: Privilege::USER,
            boot_option: 0,
            home: format!("$.{username}"),
            library: "$.Library".to_string(),
            home_disc: 0,
            ..UserRecord::empty()
        };
    }
    let _ = server.users.persist(id).await;
    server.ok(from, reply_port);
    Ok(())
}

/// `*PRIV <user> <S|U|L|N|D>`: change a user's privilege; D deletes the
/// account.
pub(crate) async fn set_privilege(
    server: &mut Server,
    from: Station,
    reply_port: u8,
    args: &str,
) -> Result<()> {
    let mut tokens = args.trim().split_whitespace();
    let username = tokens.next().ok_or(FsError::BadCommand)?;
    let letter = tokens.next().and_then(|t| t.chars().next()).ok_or(FsError::BadCommand)?;

    let privilege = match letter.to_ascii_uppercase() {
        'S' => Privilege::SYSTEM,
        'U' => Privilege::USER,
        'L' => Privilege::LOCKED,
        'N' => Privilege::NO_PASSWORD_CHANGE,
        'D' => Privilege::empty(),
        _ => return Err(FsError::BadCommand),
    };

    let Some(id) = server.users.find(username) else {
        return Err(FsError::UserNotFound);
    };
    info!(station = %from, username, ?privilege, "privilege change");
    if let Some(record) = server.users.get_mut(id) {
        record.privilege = privilege;
    }
    let _ = server.users.persist(id).await;
    server.ok(from, reply_port);
    Ok(())
}
