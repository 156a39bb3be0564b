#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{manifest} has unsupported version {version}")]
    UnsupportedVersion {
        manifest: &'static str,
        version: String,
    },

    #[error("{manifest} has no version field")]
    MissingVersion { manifest: &'static str },

    #[error("unable to parse {manifest}: {source}")]
    Json {
        manifest: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
