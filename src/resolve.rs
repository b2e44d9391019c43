//! Path resolution: from a client-supplied dotted path to a fully
//! qualified host location with ownership, permissions and dates.
//!
//! Resolution walks the host tree case-insensitively, translating the
//! namespace escape as it goes and back-filling attribute sidecars for
//! every object it visits. Wildcard resolution collects every terminal
//! match; in a non-terminal position it descends into the first match in
//! case-insensitive name order.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Local};
use regex::Regex;
use tracing::debug;

use crate::attr::AttrStore;
use crate::discs::DiscSet;
use crate::name::{self, DateMode, Perm, MAX_PATH_COMPONENTS};
use crate::session::SessionView;
use crate::users::Privilege;

/// Why a path failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    /// The path contained invalid material.
    BadFormat,
    /// The named disc does not exist.
    NoDisc,
    /// An intermediate directory was missing or yielded no matches.
    NoDir,
    /// The object is neither a file nor a directory.
    BadType,
    /// Too many path components.
    TooLong,
}

/// What a resolved terminal turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    NotFound,
    File,
    Dir,
    Other,
}

/// One wildcard match.
#[derive(Debug, Clone)]
pub struct ResolvedEntry {
    pub ftype: ObjectType,
    pub owner: u16,
    pub parent_owner: u16,
    pub perm: Perm,
    pub parent_perm: Perm,
    pub my_perm: Perm,
    pub load: u32,
    pub exec: u32,
    pub length: u32,
    pub internal: u64,
    pub host_path: PathBuf,
    pub host_name: String,
    pub acorn_name: String,
    pub day: u8,
    pub monthyear: u8,
}

/// The product of a successful resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub ftype: ObjectType,
    pub disc: u8,
    pub disc_name: String,
    pub components: Vec<String>,
    /// Position relative to the disc root, in dotted form.
    pub path_from_root: String,
    /// Terminal name in dotted-namespace form ("$" at the root).
    pub acorn_name: String,
    /// Full dotted path of the form `":<disc>.$[.comp…]"`. After a
    /// terminal wildcard match the tail is left off; the caller appends
    /// whichever match it settles on.
    pub acorn_full_path: String,
    pub host_path: PathBuf,
    pub host_name: String,
    pub owner: u16,
    pub parent_owner: u16,
    pub perm: Perm,
    pub parent_perm: Perm,
    /// The requesting user's effective rights on the object.
    pub my_perm: Perm,
    pub load: u32,
    pub exec: u32,
    pub length: u32,
    /// Host-internal object identity (the inode number).
    pub internal: u64,
    pub day: u8,
    pub monthyear: u8,
    /// Every terminal wildcard match, in case-insensitive name order.
    pub matches: Vec<ResolvedEntry>,
}

/// The requester's rights on an object: everything for system users, the
/// owner nibble for the owner, and the other bits (plus locked and
/// hidden) for anyone else.
pub fn effective_perm(privilege: Privilege, user_id: u16, owner: u16, perm: Perm) -> Perm {
    if privilege.contains(Privilege::SYSTEM) {
        return Perm::from_bits_retain(0xff);
    }
    if user_id == owner {
        return perm & (Perm::LOCKED | Perm::OWNER_WRITE | Perm::OWNER_READ);
    }
    let mut effective = perm & (Perm::LOCKED | Perm::HIDDEN);
    if perm.contains(Perm::OTHER_READ) {
        effective |= Perm::OWNER_READ;
    }
    if perm.contains(Perm::OTHER_WRITE) {
        effective |= Perm::OWNER_WRITE;
    }
    effective
}

fn inode(meta: &std::fs::Metadata) -> u64 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        meta.ino()
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        0
    }
}

fn mtime_date(meta: &std::fs::Metadata, mode: DateMode) -> (u8, u8) {
    let mtime: DateTime<Local> =
        meta.modified().map(DateTime::from).unwrap_or_else(|_| Local::now());
    name::pack_date(mode, mtime.day() as u8, mtime.month() as u8, mtime.year().max(0) as u16)
}

/// Case-insensitive scan of `dir` for `target`, returning the on-disc name.
async fn scan_exact(dir: &Path, target: &str) -> std::io::Result<Option<String>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if let Some(found) = entry.file_name().to_str() {
            if found.eq_ignore_ascii_case(target) {
                return Ok(Some(found.to_string()));
            }
        }
    }
    Ok(None)
}

/// Names in `dir` matching `pattern`, capped at the name-length limit,
/// excluding the host's `lost+found`, in case-insensitive order.
async fn scan_matching(dir: &Path, pattern: &Regex) -> Vec<String> {
    let mut names = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return names;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let Some(found) = entry.file_name().to_str().map(str::to_owned) else { continue };
        if found.len() > name::MAX_NAME_LEN || found.eq_ignore_ascii_case("lost+found") {
            continue;
        }
        if pattern.is_match(&found) {
            names.push(found);
        }
    }
    names.sort_by_key(|n| n.to_ascii_lowercase());
    names
}

/// Number of entries in `dir` a client catalogue would show.
pub async fn acorn_entry_count(dir: &Path) -> usize {
    // "*" matches any run of name-class characters, and the scan itself
    // enforces the length cap, so this counts exactly the listable names.
    let Some(class) = name::compile_wildcard("*") else { return 0 };
    scan_matching(dir, &class).await.len()
}

struct DiscSpec {
    disc: Option<u8>,
    remainder: String,
}

fn extract_disc(discs: &DiscSet, input: &str) -> Result<DiscSpec, ResolveError> {
    let Some(rest) = input.strip_prefix(':') else {
        if input.starts_with('.') {
            return Err(ResolveError::BadFormat);
        }
        return Ok(DiscSpec { disc: None, remainder: input.to_string() });
    };

    let (disc_name, tail) = match rest.find('.') {
        Some(dot) => (&rest[..dot], &rest[dot + 1..]),
        None => (rest, ""),
    };
    if disc_name.eq_ignore_ascii_case("lost+found") {
        return Err(ResolveError::NoDisc);
    }
    if disc_name.is_empty() || disc_name.len() > name::MAX_NAME_LEN {
        return Err(ResolveError::BadFormat);
    }
    let disc = discs.find(disc_name).ok_or(ResolveError::NoDisc)?;

    let remainder = if tail.starts_with('$') {
        tail.to_string()
    } else if tail.is_empty() {
        "$".to_string()
    } else {
        format!("$.{tail}")
    };
    Ok(DiscSpec { disc: Some(disc), remainder })
}

fn apply_anchor(view: &SessionView, path: &str) -> Result<String, ResolveError> {
    if let Some(rest) = path.strip_prefix('$') {
        return match rest.chars().next() {
            None => Ok(String::new()),
            Some('.') => Ok(rest[1..].to_string()),
            Some(_) => Err(ResolveError::BadFormat),
        };
    }
    let mut prefix = String::new();
    if let Some(anchor) = &view.anchor {
        // The stored anchor has the form ":<disc>.$[.path]".
        if let Some(dollar) = anchor.find('$') {
            let tail = anchor[dollar + 1..].trim_start_matches('.');
            prefix = tail.to_string();
        }
    }
    Ok(if prefix.is_empty() {
        path.to_string()
    } else if path.is_empty() {
        prefix
    } else {
        format!("{prefix}.{path}")
    })
}

fn tokenise(adjusted: &str) -> Result<Vec<String>, ResolveError> {
    let mut components = Vec::new();
    if adjusted.is_empty() {
        return Ok(components);
    }
    for segment in adjusted.split('.') {
        if segment == "^" {
            components.pop();
            continue;
        }
        if !name::is_valid_name(segment) {
            return Err(ResolveError::BadFormat);
        }
        components.push(segment.to_string());
    }
    if components.len() > MAX_PATH_COMPONENTS {
        return Err(ResolveError::TooLong);
    }
    Ok(components)
}

async fn entry_for(
    attrs: &dyn AttrStore,
    mode: DateMode,
    view: &SessionView,
    dir: &Path,
    host_name: &str,
    parent_owner: u16,
    parent_perm: Perm,
) -> Option<ResolvedEntry> {
    let host_path = dir.join(host_name);
    let meta = tokio::fs::metadata(&host_path).await.ok()?;
    // Attributes are read only once the entry's host path is fully
    // formed; the sidecar is back-filled so later lookups see it.
    let attr = attrs.read_attrs(&host_path).await;
    attrs.write_attrs(&host_path, &attr).await;

    let ftype = if meta.is_dir() {
        ObjectType::Dir
    } else if meta.is_file() {
        ObjectType::File
    } else {
        ObjectType::Other
    };
    let (day, monthyear) = mtime_date(&meta, mode);
    let (load, exec) =
        if ftype == ObjectType::File { (attr.load, attr.exec) } else { (0, 0) };
    Some(ResolvedEntry {
        ftype,
        owner: attr.owner,
        parent_owner,
        perm: attr.perm,
        parent_perm,
        my_perm: effective_perm(view.privilege, view.user_id, attr.owner, attr.perm),
        load,
        exec,
        length: if ftype == ObjectType::File { meta.len() as u32 } else { 0 },
        internal: inode(&meta),
        host_path,
        host_name: host_name.to_string(),
        acorn_name: name::host_to_acorn(host_name),
        day,
        monthyear,
    })
}

/// Resolves `input` for the session described by `view`.
///
/// `wildcard` enables '#'/'*' expansion; without it those characters are
/// ordinary name characters. A terminal that does not exist (and carries
/// no wildcards) resolves successfully as `NotFound` with the host path
/// pre-extended so a create can proceed.
pub async fn resolve(
    root: &Path,
    discs: &DiscSet,
    attrs: &dyn AttrStore,
    mode: DateMode,
    view: &SessionView,
    input: &str,
    wildcard: bool,
) -> Result<Resolution, ResolveError> {
    // Any space terminates the input.
    let input = input.split(' ').next().unwrap_or("");
    debug!(path = input, wildcard, "resolve");

    let spec = extract_disc(discs, input)?;
    let adjusted = apply_anchor(view, &spec.remainder)?;
    let disc = spec.disc.unwrap_or(view.current_disc);
    let disc_name = discs.name(disc).ok_or(ResolveError::NoDisc)?.to_string();
    let components = tokenise(&adjusted)?;

    let mut host = discs.host_dir(root, disc).ok_or(ResolveError::NoDisc)?;
    let mut acorn_full = format!(":{disc_name}.$");

    let root_attr = attrs.read_attrs(&host).await;
    attrs.write_attrs(&host, &root_attr).await;
    let root_meta = tokio::fs::metadata(&host).await.ok();
    let (day, monthyear) =
        root_meta.as_ref().map(|m| mtime_date(m, mode)).unwrap_or((0, 0));

    let mut res = Resolution {
        ftype: ObjectType::Dir,
        disc,
        disc_name,
        components: components.clone(),
        path_from_root: adjusted.clone(),
        acorn_name: "$".to_string(),
        acorn_full_path: acorn_full.clone(),
        host_path: host.clone(),
        host_name: String::new(),
        owner: 0,
        parent_owner: 0,
        perm: root_attr.perm,
        parent_perm: root_attr.perm,
        my_perm: effective_perm(view.privilege, view.user_id, 0, root_attr.perm),
        load: root_attr.load,
        exec: root_attr.exec,
        length: 0,
        internal: root_meta.as_ref().map(inode).unwrap_or(0),
        day,
        monthyear,
        matches: Vec::new(),
    };

    if components.is_empty() {
        return Ok(res);
    }

    if wildcard {
        let mut real_path_from_root = String::new();
        for (at, segment) in components.iter().enumerate() {
            let last = at == components.len() - 1;
            let parent_attr = attrs.read_attrs(&host).await;
            let pattern = name::compile_wildcard(&name::acorn_to_host(segment))
                .ok_or(ResolveError::BadFormat)?;
            let names = scan_matching(&host, &pattern).await;

            let mut entries = Vec::with_capacity(names.len());
            for found in &names {
                if let Some(entry) = entry_for(
                    attrs,
                    mode,
                    view,
                    &host,
                    found,
                    parent_attr.owner,
                    parent_attr.perm,
                )
                .await
                {
                    entries.push(entry);
                }
            }

            if entries.is_empty() {
                if last && !name::has_wildcard(segment) {
                    let host_name = name::acorn_to_host(segment);
                    res.ftype = ObjectType::NotFound;
                    res.parent_owner = parent_attr.owner;
                    res.parent_perm = parent_attr.perm;
                    res.host_name = host_name.clone();
                    res.acorn_name = segment.clone();
                    host.push(host_name);
                    res.host_path = host;
                    res.path_from_root = real_path_from_root;
                    res.acorn_full_path = acorn_full;
                    return Ok(res);
                }
                return Err(ResolveError::NoDir);
            }

            let first = &entries[0];
            res.ftype = first.ftype;
            res.owner = first.owner;
            res.parent_owner = first.parent_owner;
            res.perm = first.perm;
            res.parent_perm = first.parent_perm;
            res.my_perm = first.my_perm;
            res.load = first.load;
            res.exec = first.exec;
            res.length = first.length;
            res.internal = first.internal;
            res.acorn_name = first.acorn_name.clone();
            res.host_name = first.host_name.clone();
            res.day = first.day;
            res.monthyear = first.monthyear;

            if last {
                res.host_path = first.host_path.clone();
                res.matches = entries;
            } else {
                host = first.host_path.clone();
                acorn_full.push('.');
                acorn_full.push_str(&first.acorn_name);
                if !real_path_from_root.is_empty() {
                    real_path_from_root.push('.');
                }
                real_path_from_root.push_str(&first.acorn_name);
            }
        }
        // The terminal name is deliberately left off: wildcard callers
        // append whichever match they settle on.
        res.path_from_root = real_path_from_root;
        res.acorn_full_path = acorn_full;
        return Ok(res);
    }

    // Non-wildcard walk.
    for (at, segment) in components.iter().enumerate() {
        let last = at == components.len() - 1;
        let host_segment = name::acorn_to_host(segment);

        let dir_attr = attrs.read_attrs(&host).await;
        let found = match scan_exact(&host, &host_segment).await {
            Ok(found) => found,
            Err(_) => {
                res.ftype = ObjectType::NotFound;
                return Ok(res);
            }
        };

        if last {
            res.parent_perm = dir_attr.perm;
        }

        let readable = view.privilege.contains(Privilege::SYSTEM)
            || view.user_id == dir_attr.owner
            || dir_attr.perm.contains(Perm::OTHER_READ);
        if found.is_none() && !readable {
            res.ftype = ObjectType::NotFound;
            return Ok(res);
        }

        let Some(found) = found else {
            res.ftype = ObjectType::NotFound;
            if last {
                res.parent_owner = dir_attr.owner;
                res.host_name = host_segment.clone();
                res.acorn_name = segment.clone();
                host.push(host_segment);
                res.host_path = host;
                res.acorn_full_path = acorn_full;
                return Ok(res);
            }
            return Err(ResolveError::NoDir);
        };

        host.push(&found);
        let acorn_name = name::host_to_acorn(&found);
        acorn_full.push('.');
        acorn_full.push_str(&acorn_name);

        let Ok(meta) = tokio::fs::metadata(&host).await else {
            return Err(ResolveError::NoDir);
        };
        if !meta.is_dir() && !last {
            res.ftype = ObjectType::NotFound;
            return Ok(res);
        }
        if !meta.is_dir() && !meta.is_file() {
            return Err(ResolveError::BadType);
        }

        let attr = attrs.read_attrs(&host).await;
        attrs.write_attrs(&host, &attr).await;

        res.internal = inode(&meta);
        res.owner = attr.owner;
        res.load = attr.load;
        res.exec = attr.exec;
        res.perm = attr.perm;
        res.parent_owner = dir_attr.owner;
        res.host_name = found.clone();
        res.acorn_name = acorn_name;

        if last {
            if meta.is_dir() {
                res.ftype = ObjectType::Dir;
                res.load = 0;
                res.exec = 0;
                res.length = 0;
            } else {
                res.ftype = ObjectType::File;
                res.length = meta.len() as u32;
            }
            let (day, monthyear) = mtime_date(&meta, mode);
            res.day = day;
            res.monthyear = monthyear;
            res.my_perm = effective_perm(view.privilege, view.user_id, attr.owner, attr.perm);
        }
    }

    res.host_path = host;
    res.acorn_full_path = acorn_full;
    Ok(res)
}
