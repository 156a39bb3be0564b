use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Build(#[from] lambdapack_builder::Error),

    #[error(transparent)]
    Layer(#[from] lambdapack_layer::Error),

    #[error("unable to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    #[error("unable to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::Build(err) => err.code(),
            Error::Layer(_) => "LAYER_FAILED",
            Error::Read { .. } | Error::Walk(_) => "READ_FAILED",
            Error::Parse { .. } => "INVALID_INPUT",
            Error::Write { .. } => "WRITE_FAILED",
        }
    }
}
