//! Sidecar attribute storage.
//!
//! Every object in a disc tree carries four metadata fields the host
//! filesystem has no native home for: owner, load address, exec address
//! and the permission byte. [`AttrStore`] is the narrow interface the rest
//! of the server sees; [`SidecarStore`] is the default backend, keeping a
//! dot-prefixed sidecar file next to each object. Sidecar names contain
//! '.' and so can never collide with the 10-character name grammar, which
//! keeps them invisible to catalogue listings.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::warn;

use crate::name::Perm;

/// The four metadata fields attached to each object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectAttr {
    pub owner: u16,
    pub load: u32,
    pub exec: u32,
    pub perm: Perm,
}

impl ObjectAttr {
    /// Defaults applied when the backing store has no entry.
    pub fn absent() -> Self {
        Self { owner: 0, load: 0, exec: 0, perm: Perm::default_object() }
    }

    /// Attributes stamped on a freshly created object.
    pub fn created_by(owner: u16) -> Self {
        Self { owner, load: 0, exec: 0, perm: Perm::owner_only() }
    }
}

/// Reads and writes the four named attributes of a host path.
///
/// Failures are deliberately absorbed: reads fall back to defaults and
/// writes log and continue, so a broken sidecar never takes an operation
/// down with it.
#[async_trait]
pub trait AttrStore: Send + Sync {
    async fn read_attrs(&self, path: &Path) -> ObjectAttr;

    async fn write_attrs(&self, path: &Path, attr: &ObjectAttr);

    /// Drops the stored attributes for a deleted object.
    async fn remove_attrs(&self, path: &Path);

    /// Carries stored attributes across a rename.
    async fn rename_attrs(&self, from: &Path, to: &Path);
}

/// Default [`AttrStore`] backed by per-object sidecar files.
pub struct SidecarStore;

impl SidecarStore {
    /// Sidecar path for an object: `.NAME.attrs` in the same directory.
    fn sidecar(path: &Path) -> Option<PathBuf> {
        let name = path.file_name()?.to_str()?;
        Some(path.with_file_name(format!(".{name}.attrs")))
    }

    fn parse(text: &str) -> ObjectAttr {
        let mut attr = ObjectAttr::absent();
        for field in text.split_whitespace() {
            let Some((key, value)) = field.split_once('=') else { continue };
            match (key, u32::from_str_radix(value, 16)) {
                ("owner", Ok(v)) => attr.owner = v as u16,
                ("load", Ok(v)) => attr.load = v,
                ("exec", Ok(v)) => attr.exec = v,
                ("perm", Ok(v)) => attr.perm = Perm::from_bits_truncate(v as u8),
                _ => {}
            }
        }
        attr
    }

    fn render(attr: &ObjectAttr) -> String {
        format!(
            "owner={:04x} load={:08x} exec={:08x} perm={:02x}\n",
            attr.owner,
            attr.load,
            attr.exec,
            attr.perm.bits()
        )
    }
}

#[async_trait]
impl AttrStore for SidecarStore {
    async fn read_attrs(&self, path: &Path) -> ObjectAttr {
        let Some(sidecar) = Self::sidecar(path) else {
            return ObjectAttr::absent();
        };
        match fs::read_to_string(&sidecar).await {
            Ok(text) => Self::parse(&text),
            Err(_) => ObjectAttr::absent(),
        }
    }

    async fn write_attrs(&self, path: &Path, attr: &ObjectAttr) {
        let Some(sidecar) = Self::sidecar(path) else {
            warn!(path = %path.display(), "no sidecar location for attributes");
            return;
        };
        if let Err(err) = fs::write(&sidecar, Self::render(attr)).await {
            warn!(path = %path.display(), %err, "failed to write attributes");
        }
    }

    async fn remove_attrs(&self, path: &Path) {
        if let Some(sidecar) = Self::sidecar(path) {
            let _ = fs::remove_file(&sidecar).await;
        }
    }

    async fn rename_attrs(&self, from: &Path, to: &Path) {
        if let (Some(old), Some(new)) = (Self::sidecar(from), Self::sidecar(to)) {
            let _ = fs::rename(&old, &new).await;
        }
    }
}
