//! Backing store for content files, with support for mounts.
//!
//! - `FileSystem` is a trait object (Send + Sync) working on paths relative to its root.
//! - `Ofs` maps onto an OS directory. Its existence probe is case-sensitive even on
//!   case-insensitive file systems, because content authored on one platform must
//!   resolve identically everywhere.
//! - `Vfs` keeps a list of `Mount`s and resolves which one serves a given path
//!   (last mounted = highest priority).

use std::{
    path::{Component, Path, PathBuf},
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use anyhow::{Context, Result, anyhow};

use crate::ContentConfig;

pub trait FileSystem: Send + Sync + 'static {
    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>>;

    fn file_size(&self, path: &Path) -> Result<u64>;

    /// Case-sensitive existence check.
    fn exists(&self, path: &Path) -> bool;

    fn name(&self) -> &str;
}

/// A filesystem rooted at an OS directory.
pub struct Ofs {
    root: PathBuf,
    name: String,
}

impl Ofs {
    pub fn new(root: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Ofs {
            root: root.into(),
            name: name.into(),
        }
    }

    fn resolve_path(&self, rel: &Path) -> PathBuf {
        if rel.is_absolute() {
            rel.to_path_buf()
        } else {
            self.root.join(rel)
        }
    }
}

/// Whether `dir` holds an entry named exactly `name`.
fn has_entry(dir: &Path, name: &std::ffi::OsStr) -> bool {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.flatten().any(|entry| entry.file_name() == name),
        Err(_) => false,
    }
}

impl FileSystem for Ofs {
    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        let abs = self.resolve_path(path);
        std::fs::read(&abs).with_context(|| format!("Ofs({}) failed to read {:?}", self.name, abs))
    }

    fn file_size(&self, path: &Path) -> Result<u64> {
        let abs = self.resolve_path(path);
        let meta = std::fs::metadata(&abs)
            .with_context(|| format!("Ofs({}) failed to stat {:?}", self.name, abs))?;
        Ok(meta.len())
    }

    fn exists(&self, path: &Path) -> bool {
        if !self.resolve_path(path).exists() {
            return false;
        }
        // The OS answered yes, but it may have folded case. Walk the entries.
        let mut dir = if path.is_absolute() {
            PathBuf::new()
        } else {
            self.root.clone()
        };
        for component in path.components() {
            match component {
                Component::Normal(name) => {
                    if !has_entry(&dir, name) {
                        return false;
                    }
                    dir.push(name);
                }
                Component::CurDir => {}
                other => dir.push(other.as_os_str()),
            }
        }
        true
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct Mount {
    /// Path prefix this mount answers to, e.g. "Base.rte" or "" (catch-all).
    prefix: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl Mount {
    fn matches(&self, path: &Path) -> bool {
        if self.prefix.as_os_str().is_empty() {
            return true;
        }
        path.starts_with(&self.prefix)
    }

    fn relative_path(&self, path: &Path) -> PathBuf {
        if self.prefix.as_os_str().is_empty() {
            path.to_path_buf()
        } else {
            path.strip_prefix(&self.prefix)
                .unwrap_or(Path::new(""))
                .to_path_buf()
        }
    }
}

/// Virtual file system: a prioritized collection of mounts.
#[derive(Clone, Default)]
pub struct Vfs {
    mounts: Arc<RwLock<Vec<Mount>>>,
}

impl Vfs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a VFS with every OS mount listed in `config`, in order.
    pub fn from_config(config: &ContentConfig) -> Self {
        let vfs = Vfs::new();
        for mount in &config.mounts {
            vfs.mount_os(&mount.prefix, mount.root.clone(), mount.name.clone());
        }
        vfs
    }

    pub fn mount(&self, prefix: impl AsRef<Path>, fs: Arc<dyn FileSystem>) {
        log::debug!("mounting {} at {:?}", fs.name(), prefix.as_ref());
        self.write().push(Mount {
            prefix: prefix.as_ref().to_path_buf(),
            fs,
        });
    }

    pub fn mount_os(
        &self,
        prefix: impl AsRef<Path>,
        root: impl Into<PathBuf>,
        name: impl Into<String>,
    ) {
        self.mount(prefix, Arc::new(Ofs::new(root, name)));
    }

    pub fn unmount(&self, prefix: impl AsRef<Path>) {
        self.write().retain(|m| m.prefix != prefix.as_ref());
    }

    fn resolve_mount_for(&self, path: &Path) -> Option<(Arc<dyn FileSystem>, PathBuf)> {
        self.read()
            .iter()
            .rev()
            .find(|m| m.matches(path))
            .map(|m| (m.fs.clone(), m.relative_path(path)))
    }

    pub fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let (fs, rel) = self
            .resolve_mount_for(Path::new(path))
            .ok_or_else(|| anyhow!("no mount found for path {:?}", path))?;
        fs.read_bytes(&rel)
            .with_context(|| format!("failed to read bytes from vfs path {:?}", path))
    }

    pub fn file_size(&self, path: &str) -> Result<u64> {
        let (fs, rel) = self
            .resolve_mount_for(Path::new(path))
            .ok_or_else(|| anyhow!("no mount found for path {:?}", path))?;
        fs.file_size(&rel)
            .with_context(|| format!("failed to stat vfs path {:?}", path))
    }

    pub fn exists(&self, path: &str) -> bool {
        match self.resolve_mount_for(Path::new(path)) {
            Some((fs, rel)) => fs.exists(&rel),
            None => false,
        }
    }

    /// (prefix, filesystem name) per mount, lowest priority first.
    pub fn debug_list_mounts(&self) -> Vec<(PathBuf, String)> {
        self.read()
            .iter()
            .map(|m| (m.prefix.clone(), m.fs.name().to_string()))
            .collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Mount>> {
        self.mounts.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Mount>> {
        self.mounts.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::MountConfig;

    #[test]
    fn mount_and_read_osfs() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir_all(root.join("Sounds")).unwrap();
        std::fs::write(root.join("Sounds/hello.wav"), "world").unwrap();

        let vfs = Vfs::new();
        vfs.mount_os("Base.rte", root.clone(), "base");

        assert!(vfs.exists("Base.rte/Sounds/hello.wav"));
        assert_eq!(vfs.read_bytes("Base.rte/Sounds/hello.wav").unwrap(), b"world");
        assert_eq!(vfs.file_size("Base.rte/Sounds/hello.wav").unwrap(), 5);
        assert!(!vfs.exists("Other.rte/Sounds/hello.wav"));
        assert!(vfs.read_bytes("Other.rte/x.wav").is_err());
    }

    #[test]
    fn exists_is_case_sensitive() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Sprites")).unwrap();
        std::fs::write(dir.path().join("Sprites/Walk.png"), [1u8]).unwrap();

        let vfs = Vfs::new();
        vfs.mount_os("", dir.path(), "data");

        assert!(vfs.exists("Sprites/Walk.png"));
        assert!(!vfs.exists("Sprites/walk.png"));
        assert!(!vfs.exists("sprites/Walk.png"));
    }

    #[test]
    fn mount_priority() {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        std::fs::write(dir_a.path().join("x.wav"), "from_a").unwrap();
        std::fs::write(dir_b.path().join("x.wav"), "from_b").unwrap();

        let vfs = Vfs::from_config(&ContentConfig {
            mounts: vec![
                MountConfig::new("common", dir_a.path(), "A"),
                MountConfig::new("common", dir_b.path(), "B"),
            ],
            ..ContentConfig::default()
        });

        assert_eq!(vfs.read_bytes("common/x.wav").unwrap(), b"from_b");
        assert_eq!(vfs.debug_list_mounts().len(), 2);

        vfs.unmount("common");
        assert!(!vfs.exists("common/x.wav"));
    }
}
