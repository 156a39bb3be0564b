use std::path::PathBuf;

use clap::Parser;
use lambdapack_builder::BuildConfig;
use tracing::Level;

/// Packages a framework build output into function bundles and a routing
/// table.
///
/// Reads the manifests and compiled pages from the dist directory, the
/// dependency trace produced for the server entry points, and writes
/// `config.json` plus one zip archive per function into the output
/// directory.
#[derive(Parser, Clone, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// A global log level to use when printing logs.
    /// It's also possible to set `RUST_LOG` according to
    /// `tracing_subscriber::filter::EnvFilter`, which will always have
    /// priority.
    #[arg(long, default_value_t = Level::INFO)]
    pub log_level: Level,

    /// Show progress bars for long running steps.
    #[arg(long)]
    pub progress: bool,

    /// The project root. Every traced path is relative to it.
    #[arg(default_value = ".")]
    pub project_dir: PathBuf,

    /// Build output directory, relative to the project root.
    #[arg(long, env = "LAMBDAPACK_DIST_DIR", default_value = ".next")]
    pub dist_dir: String,

    /// Where `config.json` and the function archives are written.
    #[arg(long, short = 'o', env = "LAMBDAPACK_OUTPUT", default_value = ".output")]
    pub output: PathBuf,

    /// The dependency trace (`fileList` and `reasons`) of the server entry
    /// points and every compiled page. Relative paths are resolved against
    /// the project root.
    #[arg(long, env = "LAMBDAPACK_TRACE", default_value = "lambdapack.trace.json")]
    pub trace: PathBuf,

    /// Project configuration with per-page function overrides.
    #[arg(long, env = "LAMBDAPACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Compressed size limit of one function, in bytes.
    #[arg(long, env = "LAMBDAPACK_COMPRESSED_BUDGET")]
    pub compressed_budget: Option<u64>,

    /// Uncompressed size limit of one function, in bytes.
    #[arg(long, env = "LAMBDAPACK_UNCOMPRESSED_BUDGET")]
    pub uncompressed_budget: Option<u64>,

    /// Force on-demand revalidation on or off. By default it's available
    /// whenever the build has API pages.
    #[arg(long)]
    pub preview_mode: Option<bool>,

    /// Keep the full route and pages manifests in every bundle.
    #[arg(long)]
    pub no_normalize_manifests: bool,

    /// Only write `config.json`.
    #[arg(long)]
    pub no_archives: bool,

    #[arg(long, env = "LAMBDAPACK_RUNTIME", default_value = "nodejs20.x")]
    pub runtime: String,

    /// Upper bound of concurrent file reads.
    #[arg(long, default_value_t = lambdapack_layer::DEFAULT_IO_CONCURRENCY)]
    pub io_concurrency: usize,
}

impl Args {
    pub fn build_config(&self) -> BuildConfig {
        let defaults = BuildConfig::default();
        BuildConfig {
            compressed_budget: self.compressed_budget.unwrap_or(defaults.compressed_budget),
            uncompressed_budget: self
                .uncompressed_budget
                .unwrap_or(defaults.uncompressed_budget),
            preview_mode: self.preview_mode,
            normalize_manifests: !self.no_normalize_manifests,
            io_concurrency: self.io_concurrency,
            dist_dir: self.dist_dir.clone(),
            runtime: self.runtime.clone(),
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Args;
    use clap::Parser;

    #[test]
    fn overrides_reach_build_config() {
        let args = Args::parse_from([
            "lambdapack",
            "site",
            "--dist-dir",
            "build",
            "--compressed-budget",
            "1024",
            "--no-normalize-manifests",
        ]);
        let config = args.build_config();

        assert_eq!("site", args.project_dir.to_str().unwrap());
        assert_eq!("build", config.dist_dir);
        assert_eq!(1024, config.compressed_budget);
        assert!(!config.normalize_manifests);
        assert_eq!(None, config.preview_mode);
    }
}
