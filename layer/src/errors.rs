use tokio::sync::AcquireError;
use tokio::task::JoinError;

/// Errors produced while turning traced files into pseudo-files.
/// None of them are retried: the same input would fail the same way.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to stat {0}: {1}")]
    UnableToStat(String, std::io::Error),

    #[error("unable to read {0}: {1}")]
    UnableToRead(String, std::io::Error),

    #[error("unable to resolve symlink {0}: {1}")]
    UnableToReadLink(String, std::io::Error),

    #[error("unable to compress {0}: {1}")]
    UnableToCompress(String, std::io::Error),

    #[error("layer task join error: {0}")]
    JoinError(#[from] JoinError),

    #[error("io semaphore closed: {0}")]
    SemaphoreClosed(#[from] AcquireError),
}
