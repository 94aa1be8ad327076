use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::archive::layout::base_name;
use crate::domain::MediaKind;
use crate::error::{Result, SatchelError};

/// Bridge between path strings stored on records and files on disk.
pub trait MediaResolver: Send + Sync {
    /// Absolute path for a stored path string, if it maps to one at all.
    /// The caller checks existence.
    fn locate(&self, stored: &str) -> Option<PathBuf>;

    /// Persist a received media file and return the path string the record
    /// should carry from now on.
    fn restore(&self, kind: MediaKind, name: &str, bytes: &[u8]) -> Result<String>;
}

/// Media kept under one root directory. Relative stored paths resolve
/// against the root; restored files land in `root/images` or `root/voices`
/// and are recorded relative to the root.
#[derive(Clone, Debug)]
pub struct FsMediaResolver {
    root: PathBuf,
}

impl FsMediaResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn dir_for(kind: MediaKind) -> &'static str {
        match kind {
            MediaKind::Image => "images",
            MediaKind::Voice => "voices",
        }
    }
}

impl MediaResolver for FsMediaResolver {
    fn locate(&self, stored: &str) -> Option<PathBuf> {
        let stored = stored.trim();
        if stored.is_empty() {
            return None;
        }
        let p = Path::new(stored);
        if p.is_absolute() {
            Some(p.to_path_buf())
        } else {
            Some(self.root.join(p))
        }
    }

    fn restore(&self, kind: MediaKind, name: &str, bytes: &[u8]) -> Result<String> {
        let name = base_name(name)
            .ok_or_else(|| SatchelError::Format(format!("bad media name: {name:?}")))?;
        let sub = Self::dir_for(kind);
        let dir = self.root.join(sub);
        fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(dir.join(name)).map_err(|e| e.error)?;

        Ok(format!("{sub}/{name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_against_root() {
        let r = FsMediaResolver::new("/srv/media");
        assert_eq!(
            r.locate("images/a.jpg"),
            Some(PathBuf::from("/srv/media/images/a.jpg"))
        );
        assert_eq!(r.locate("/tmp/a.jpg"), Some(PathBuf::from("/tmp/a.jpg")));
        assert_eq!(r.locate("  "), None);
    }

    #[test]
    fn restore_writes_under_kind_dir() {
        let dir = tempfile::tempdir().unwrap();
        let r = FsMediaResolver::new(dir.path());
        let stored = r.restore(MediaKind::Voice, "memo.m4a", b"abc").unwrap();
        assert_eq!(stored, "voices/memo.m4a");
        assert_eq!(fs::read(dir.path().join("voices/memo.m4a")).unwrap(), b"abc");
        // and it resolves back to the same file
        assert_eq!(r.locate(&stored), Some(dir.path().join("voices/memo.m4a")));
    }
}
