//! Stats traced paths on a real filesystem.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

use crate::{Error, TracedFile};

/// Stats every root-relative path in `paths` (without following symlinks)
/// and returns the corresponding [TracedFile]s, keyed by that path. Paths
/// that don't exist are left out; any other stat failure is an error.
///
/// At most `concurrency` stat calls are in flight at any time.
#[instrument(skip_all, fields(root = %root.display()), err)]
pub async fn stat_files<I>(
    root: &Path,
    paths: I,
    concurrency: usize,
) -> Result<BTreeMap<String, TracedFile>, Error>
where
    I: IntoIterator<Item = String>,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    let entries = futures::future::try_join_all(paths.into_iter().map(|path| {
        let semaphore = semaphore.clone();
        let fs_path = root.join(&path);
        async move {
            let _permit = semaphore.acquire().await?;
            match tokio::fs::symlink_metadata(&fs_path).await {
                Ok(metadata) => Ok::<_, Error>(Some((
                    path,
                    TracedFile::on_disk(fs_path, mode_of(&metadata)),
                ))),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(path = %path, "not on disk, skipping it");
                    Ok(None)
                }
                Err(e) => Err(Error::UnableToStat(path, e)),
            }
        }
    }))
    .await?;

    Ok(entries.into_iter().flatten().collect())
}

#[cfg(target_family = "unix")]
fn mode_of(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    metadata.mode()
}

#[cfg(not(target_family = "unix"))]
fn mode_of(metadata: &std::fs::Metadata) -> u32 {
    use crate::{S_IFLNK, S_IFREG};
    if metadata.file_type().is_symlink() {
        S_IFLNK | 0o777
    } else if metadata.permissions().readonly() {
        S_IFREG | 0o444
    } else {
        S_IFREG | 0o644
    }
}

#[cfg(test)]
mod tests {
    use super::stat_files;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_paths_are_left_out() {
        let tmpdir = TempDir::new().unwrap();
        std::fs::write(tmpdir.path().join("here.js"), b"1").unwrap();

        let files = stat_files(
            tmpdir.path(),
            ["here.js".to_string(), "nope.js".to_string()],
            4,
        )
        .await
        .expect("must stat");

        assert_eq!(vec!["here.js"], files.keys().map(String::as_str).collect::<Vec<_>>());
    }

    #[cfg(target_family = "unix")]
    #[tokio::test]
    async fn other_stat_failures_are_reported() {
        let tmpdir = TempDir::new().unwrap();
        std::fs::write(tmpdir.path().join("file.js"), b"1").unwrap();

        let err = stat_files(tmpdir.path(), ["file.js/child".to_string()], 4)
            .await
            .expect_err("must fail");

        assert!(matches!(err, crate::Error::UnableToStat(path, _) if path == "file.js/child"));
    }

    #[cfg(target_family = "unix")]
    #[tokio::test]
    async fn keeps_mode_bits() {
        use std::os::unix::fs::PermissionsExt;

        let tmpdir = TempDir::new().unwrap();
        let bin = tmpdir.path().join("run.sh");
        std::fs::write(&bin, b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::os::unix::fs::symlink("run.sh", tmpdir.path().join("link")).unwrap();

        let files = stat_files(
            tmpdir.path(),
            ["run.sh".to_string(), "link".to_string()],
            4,
        )
        .await
        .unwrap();

        assert_eq!(0o755, files["run.sh"].mode() & 0o777);
        assert!(!files["run.sh"].is_symlink());
        assert!(files["link"].is_symlink());
    }
}
