//! Archive collaborators.
//!
//! Readers report a missing member as `Ok(None)`; only genuine I/O failures
//! are errors. Absence and an empty member are different things.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use tracing::debug;

use crate::error::ArchiveError;

/// Read access to a firmware archive.
pub trait ArchiveReader {
    /// Read a member by name, or `None` when it is not present.
    fn read(&self, member: &str) -> Result<Option<Bytes>, ArchiveError>;
}

/// Append-only access to the output package.
pub trait ArchiveWriter {
    /// Store `data` under `member`.
    fn write(&mut self, member: &str, data: &[u8]) -> Result<(), ArchiveError>;
}

/// In-memory archive.
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    members: BTreeMap<String, Bytes>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with_member(mut self, member: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.insert(member, data);
        self
    }

    pub fn insert(&mut self, member: impl Into<String>, data: impl Into<Bytes>) {
        self.members.insert(member.into(), data.into());
    }

    pub fn get(&self, member: &str) -> Option<&Bytes> {
        self.members.get(member)
    }

    /// Member names in sorted order.
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl ArchiveReader for MemoryArchive {
    fn read(&self, member: &str) -> Result<Option<Bytes>, ArchiveError> {
        Ok(self.members.get(member).cloned())
    }
}

impl ArchiveWriter for MemoryArchive {
    fn write(&mut self, member: &str, data: &[u8]) -> Result<(), ArchiveError> {
        self.members
            .insert(member.to_string(), Bytes::copy_from_slice(data));
        Ok(())
    }
}

/// Archive backed by a directory, such as an unpacked target-files tree.
#[derive(Debug, Clone)]
pub struct DirArchive {
    root: PathBuf,
}

impl DirArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a member name onto a path below the root.
    fn member_path(&self, member: &str) -> Result<PathBuf, ArchiveError> {
        let relative = Path::new(member);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if member.is_empty() || escapes {
            return Err(ArchiveError::InvalidMember(member.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl ArchiveReader for DirArchive {
    fn read(&self, member: &str) -> Result<Option<Bytes>, ArchiveError> {
        let path = self.member_path(member)?;
        match std::fs::read(&path) {
            Ok(data) => {
                debug!(member, size = data.len(), "Read archive member");
                Ok(Some(Bytes::from(data)))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(member, path = %path.display(), "Archive member not present");
                Ok(None)
            }
            Err(source) => Err(ArchiveError::Io {
                member: member.to_string(),
                source,
            }),
        }
    }
}

impl ArchiveWriter for DirArchive {
    fn write(&mut self, member: &str, data: &[u8]) -> Result<(), ArchiveError> {
        let path = self.member_path(member)?;
        let io_err = |source| ArchiveError::Io {
            member: member.to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(&path, data).map_err(io_err)?;
        debug!(member, size = data.len(), "Wrote archive member");
        Ok(())
    }
}
