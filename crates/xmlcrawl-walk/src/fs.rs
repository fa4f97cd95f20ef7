//! Filesystem access used by crawl workers.
//!
//! The crawler checks that its root is a directory, workers list directories
//! and read files. All of it goes through the [`FileSystem`] trait so the
//! engine can run against something other than the local disk.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use compact_str::CompactString;

use xmlcrawl_core::FoundFile;

/// Kind of a directory entry, as far as the crawler cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    /// A symbolic link that was not resolved.
    Symlink,
    /// Sockets, devices, broken links, etc.
    Other,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Full path to the entry.
    pub path: PathBuf,
    /// File name of the entry.
    pub name: CompactString,
    /// What the entry is.
    pub kind: EntryKind,
}

impl DirEntry {
    /// Create an entry.
    pub fn new(path: impl Into<PathBuf>, name: impl Into<CompactString>, kind: EntryKind) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            kind,
        }
    }
}

/// Filesystem operations a crawl needs.
pub trait FileSystem: Send + Sync + 'static {
    /// Whether `path` is a directory, following symlinks.
    fn is_dir(&self, path: &Path) -> io::Result<bool>;

    /// List the entries of a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// Read a file's full content and modification time.
    fn read_file(&self, path: &Path) -> io::Result<FoundFile>;
}

/// The local filesystem through `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs {
    follow_symlinks: bool,
}

impl LocalFs {
    /// Create a local filesystem view.
    ///
    /// With `follow_symlinks`, links are reported as the kind of their target
    /// and broken links as [`EntryKind::Other`].
    pub fn new(follow_symlinks: bool) -> Self {
        Self { follow_symlinks }
    }

    fn kind_of(&self, path: &Path, file_type: std::fs::FileType) -> EntryKind {
        if file_type.is_symlink() {
            if !self.follow_symlinks {
                return EntryKind::Symlink;
            }
            return match std::fs::metadata(path) {
                Ok(meta) if meta.is_dir() => EntryKind::Directory,
                Ok(meta) if meta.is_file() => EntryKind::File,
                _ => EntryKind::Other,
            };
        }
        if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        }
    }
}

impl FileSystem for LocalFs {
    fn is_dir(&self, path: &Path) -> io::Result<bool> {
        Ok(std::fs::metadata(path)?.is_dir())
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let entry_path = entry.path();
            let kind = self.kind_of(&entry_path, entry.file_type()?);
            let name = CompactString::new(entry.file_name().to_string_lossy());
            entries.push(DirEntry::new(entry_path, name, kind));
        }
        Ok(entries)
    }

    fn read_file(&self, path: &Path) -> io::Result<FoundFile> {
        let mut file = File::open(path)?;
        let metadata = file.metadata()?;
        let mut content = Vec::with_capacity(metadata.len() as usize);
        file.read_to_end(&mut content)?;

        Ok(FoundFile {
            path: path.to_path_buf(),
            content,
            modified: metadata.modified()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_read_dir_kinds() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();
        fs::write(temp.path().join("a.xml"), "<a/>").unwrap();

        let mut entries = LocalFs::default().read_dir(temp.path()).unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.xml");
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[1].name, "sub");
        assert_eq!(entries[1].kind, EntryKind::Directory);
    }

    #[test]
    fn test_read_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.xml");
        fs::write(&path, "<icons/>").unwrap();

        let file = LocalFs::default().read_file(&path).unwrap();
        assert_eq!(file.path, path);
        assert_eq!(file.content, b"<icons/>");
    }

    #[test]
    fn test_is_dir() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.xml");
        fs::write(&file, "<a/>").unwrap();

        let local = LocalFs::default();
        assert!(local.is_dir(temp.path()).unwrap());
        assert!(!local.is_dir(&file).unwrap());
        assert_eq!(
            local.is_dir(&temp.path().join("missing")).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn test_missing_dir_is_not_found() {
        let temp = TempDir::new().unwrap();
        let err = LocalFs::default()
            .read_dir(&temp.path().join("missing"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("target")).unwrap();
        std::os::unix::fs::symlink(temp.path().join("target"), temp.path().join("link")).unwrap();
        std::os::unix::fs::symlink(temp.path().join("nowhere"), temp.path().join("broken")).unwrap();

        let kind = |fs: LocalFs, name: &str| {
            fs.read_dir(temp.path())
                .unwrap()
                .into_iter()
                .find(|e| e.name == name)
                .unwrap()
                .kind
        };

        assert_eq!(kind(LocalFs::new(false), "link"), EntryKind::Symlink);
        assert_eq!(kind(LocalFs::new(true), "link"), EntryKind::Directory);
        assert_eq!(kind(LocalFs::new(true), "broken"), EntryKind::Other);
    }
}
