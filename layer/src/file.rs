use bytes::Bytes;
use std::path::PathBuf;

/// Mask for the file type bits of a unix mode.
pub const S_IFMT: u32 = 0o170000;
/// File type bits of a symbolic link.
pub const S_IFLNK: u32 = 0o120000;
/// File type bits of a regular file.
pub const S_IFREG: u32 = 0o100000;

/// Where the bytes of a [TracedFile] come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    /// Contents live on disk at the given path.
    OnDisk(PathBuf),
    /// Contents are held in memory. For symlinks these bytes are the link target.
    InMemory(Bytes),
}

/// A file produced by the tracer: its mode (including the symlink bit) and a
/// handle to its content. Immutable once traced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracedFile {
    mode: u32,
    content: FileContent,
}

impl TracedFile {
    pub fn on_disk(path: impl Into<PathBuf>, mode: u32) -> Self {
        Self {
            mode,
            content: FileContent::OnDisk(path.into()),
        }
    }

    pub fn in_memory(data: impl Into<Bytes>, mode: u32) -> Self {
        Self {
            mode,
            content: FileContent::InMemory(data.into()),
        }
    }

    /// A regular, non-executable in-memory file.
    pub fn regular(data: impl Into<Bytes>) -> Self {
        Self::in_memory(data, S_IFREG | 0o644)
    }

    /// An in-memory symlink pointing to `target`.
    pub fn symlink(target: impl Into<Bytes>) -> Self {
        Self::in_memory(target, S_IFLNK | 0o777)
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn content(&self) -> &FileContent {
        &self.content
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    pub(crate) async fn read(&self) -> std::io::Result<Bytes> {
        match &self.content {
            FileContent::OnDisk(path) => Ok(tokio::fs::read(path).await?.into()),
            FileContent::InMemory(data) => Ok(data.clone()),
        }
    }

    pub(crate) async fn read_link(&self) -> std::io::Result<PathBuf> {
        match &self.content {
            FileContent::OnDisk(path) => tokio::fs::read_link(path).await,
            FileContent::InMemory(target) => Ok(PathBuf::from(
                String::from_utf8_lossy(target).into_owned(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::regular(S_IFREG | 0o644, false, false)]
    #[case::executable(S_IFREG | 0o755, false, true)]
    #[case::symlink(S_IFLNK | 0o777, true, true)]
    fn mode_bits(#[case] mode: u32, #[case] symlink: bool, #[case] executable: bool) {
        let file = TracedFile::in_memory(Bytes::new(), mode);
        assert_eq!(symlink, file.is_symlink());
        assert_eq!(executable, file.mode() & 0o100 != 0);
    }
}
