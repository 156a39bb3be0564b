use crate::routes::Phase;

/// Build-aborting errors. None of them are retried: the build is a pure
/// function of its input.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to find lambda for route: {route}")]
    MissingLambda { route: String },

    #[error(
        "{} serverless function(s) exceed the maximum size limit of {compressed_limit} bytes compressed / {uncompressed_limit} bytes uncompressed: {}",
        pages.len(),
        pages.iter().map(|p| p.join(", ")).collect::<Vec<_>>().join("; ")
    )]
    LambdaSizeExceeded {
        /// Pages of each offending group.
        pages: Vec<Vec<String>>,
        compressed_limit: u64,
        uncompressed_limit: u64,
    },

    #[error(transparent)]
    Manifest(#[from] lambdapack_manifest::Error),

    #[error("invariant: route {0} is both blocking and fallback")]
    BlockingAndFallback(String),

    #[error("invariant: route {0} is both omitted and fallback")]
    OmittedAndFallback(String),

    #[error("no server pages were found in the build output, check that the build completed")]
    NoServerPages,

    #[error("{0} is required by the build but was not traced")]
    MissingFile(String),

    #[error("invalid functions pattern {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("unable to parse project config: {0}")]
    ProjectConfig(#[source] serde_json::Error),

    #[error("phase {requested:?} can't follow phase {current:?}")]
    PhaseOrder { current: Phase, requested: Phase },

    #[error(transparent)]
    Layer(#[from] lambdapack_layer::Error),

    #[error("unable to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Stable identifier reported alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            Error::MissingLambda { .. } => "MISSING_LAMBDA",
            Error::LambdaSizeExceeded { .. } => "LAMBDA_SIZE_EXCEEDED",
            Error::Manifest(lambdapack_manifest::Error::UnsupportedVersion { .. })
            | Error::Manifest(lambdapack_manifest::Error::MissingVersion { .. }) => {
                "MANIFEST_VERSION_UNSUPPORTED"
            }
            Error::Manifest(lambdapack_manifest::Error::Json { .. }) => "MANIFEST_INVALID",
            Error::BlockingAndFallback(_) => "NEXT_ISBLOCKING_ISFALLBACK",
            Error::OmittedAndFallback(_) => "NEXT_ISOMITTED_ISFALLBACK",
            Error::NoServerPages => "NO_SERVER_PAGES",
            Error::MissingFile(_) => "MISSING_FILE",
            Error::InvalidPattern { .. } | Error::ProjectConfig(_) => "INVALID_PROJECT_CONFIG",
            Error::PhaseOrder { .. } => "ROUTE_PHASE_ORDER",
            Error::Layer(_) => "LAYER_FAILED",
            Error::Io { .. } | Error::Serialize { .. } => "WRITE_FAILED",
        }
    }
}
