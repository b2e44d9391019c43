//! The server's disc set: named top-level subtrees under the server root.
//!
//! A disc lives on the host as a directory named `<index><name>`, where
//! the index is a single hex digit. At most ten discs are configured per
//! server.

use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

/// Maximum number of discs per server.
pub const MAX_DISCS: usize = 10;

/// Longest disc name.
pub const MAX_DISC_NAME: usize = 16;

/// The indexed disc names.
pub struct DiscSet {
    names: Vec<Option<String>>,
}

impl DiscSet {
    /// Scans `root` for disc directories.
    pub async fn discover(root: &Path) -> io::Result<Self> {
        let mut names: Vec<Option<String>> = vec![None; MAX_DISCS];
        let mut entries = tokio::fs::read_dir(root).await?;
        let mut found = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            if found >= MAX_DISCS {
                break;
            }
            let Ok(kind) = entry.file_type().await else { continue };
            if !kind.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else { continue };
            if name.len() < 2 || name.len() > MAX_DISC_NAME + 1 {
                continue;
            }
            let mut chars = name.chars();
            let Some(index) = chars.next().and_then(|c| c.to_digit(16)) else { continue };
            let index = index as usize;
            if index < MAX_DISCS && names[index].is_none() {
                let disc_name: String = chars.collect();
                info!(disc = index, name = %disc_name, "initialised disc");
                names[index] = Some(disc_name);
                found += 1;
            }
        }
        Ok(Self { names })
    }

    /// True when at least one disc was found.
    pub fn any(&self) -> bool {
        self.names.iter().any(Option::is_some)
    }

    /// The name of disc `index`.
    pub fn name(&self, index: u8) -> Option<&str> {
        self.names.get(index as usize)?.as_deref()
    }

    /// Case-insensitive lookup of a disc by name.
    pub fn find(&self, name: &str) -> Option<u8> {
        self.names
            .iter()
            .position(|slot| slot.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name)))
            .map(|i| i as u8)
    }

    /// Host directory of disc `index` under `root`.
    pub fn host_dir(&self, root: &Path, index: u8) -> Option<PathBuf> {
        let name = self.name(index)?;
        Some(root.join(format!("{:X}{}", index, name)))
    }

    /// Indexes of configured discs, ascending.
    pub fn indexes(&self) -> impl Iterator<Item = u8> + '_ {
        (0..MAX_DISCS as u8).filter(|&i| self.names[i as usize].is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn discovers_indexed_disc_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("0SYSTEM")).unwrap();
        std::fs::create_dir(dir.path().join("1DATA")).unwrap();
        std::fs::create_dir(dir.path().join("notadisc")).unwrap();
        std::fs::write(dir.path().join("2FILE"), b"").unwrap();

        let discs = DiscSet::discover(dir.path()).await.unwrap();
        assert_eq!(discs.name(0), Some("SYSTEM"));
        assert_eq!(discs.name(1), Some("DATA"));
        assert_eq!(discs.name(2), None);
        assert_eq!(discs.find("system"), Some(0));
        assert_eq!(discs.find("ABSENT"), None);
        assert_eq!(
            discs.host_dir(dir.path(), 1),
            Some(dir.path().join("1DATA"))
        );
        assert_eq!(discs.indexes().collect::<Vec<_>>(), vec![0, 1]);
    }
}
