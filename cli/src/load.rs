//! Collects a [BuildInput] from a build output on disk.

use bytes::Bytes;
use lambdapack_builder::{BuildInput, ProjectConfig};
use lambdapack_layer::{fs::stat_files, Trace};
use lambdapack_manifest::{
    APP_PATHS_MANIFEST, PAGES_MANIFEST, PRERENDER_MANIFEST, REQUIRED_SERVER_FILES, ROUTES_MANIFEST,
};
use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use crate::{Args, Error};

/// Directories of the build output that never end up in a bundle.
const SKIPPED_DIST_DIRS: [&str; 2] = ["cache", "standalone"];

async fn read(path: PathBuf) -> Result<Bytes, Error> {
    match tokio::fs::read(&path).await {
        Ok(data) => Ok(data.into()),
        Err(source) => Err(Error::Read { path, source }),
    }
}

async fn read_optional(path: PathBuf) -> Result<Option<Bytes>, Error> {
    match tokio::fs::read(&path).await {
        Ok(data) => Ok(Some(data.into())),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "not present");
            Ok(None)
        }
        Err(source) => Err(Error::Read { path, source }),
    }
}

/// `root`-relative, `/`-separated form of `path`.
fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Every non-directory below `root/dir`, skipping the top-level entries
/// named in `skip`. A missing directory is empty.
fn walk(root: &Path, dir: &str, skip: &[&str]) -> Result<Vec<String>, Error> {
    let start = root.join(dir);
    if !start.is_dir() {
        return Ok(vec![]);
    }

    let mut out = Vec::new();
    let entries = WalkDir::new(&start)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() != 1 || !skip.iter().any(|s| e.file_name() == *s));
    for entry in entries {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }
        out.push(relative(root, entry.path()));
    }
    Ok(out)
}

/// Reads the manifests and the trace, and stats every file a bundle or the
/// static output may need.
#[instrument(skip_all, fields(project = %args.project_dir.display()), err)]
pub async fn build_input(args: &Args) -> Result<BuildInput, Error> {
    let root = args.project_dir.as_path();
    let dist = args.dist_dir.as_str();
    let dist_path = root.join(dist);

    let build_id = read(dist_path.join("BUILD_ID")).await?;
    let trace_path = root.join(&args.trace);
    let trace: Trace = serde_json::from_slice(&read(trace_path.clone()).await?)
        .map_err(|source| Error::Parse {
            path: trace_path,
            source,
        })?;
    let project = match &args.config {
        Some(path) => ProjectConfig::from_slice(&read(root.join(path)).await?)?,
        None => ProjectConfig::default(),
    };

    let dist_files = walk(root, dist, &SKIPPED_DIST_DIRS)?;
    let public_files = walk(root, "public", &[])?;

    let mut static_files = BTreeMap::new();
    for path in &public_files {
        if let Some(rest) = path.strip_prefix("public/") {
            static_files.insert(format!("/{rest}"), path.clone());
        }
    }
    let static_prefix = format!("{dist}/static/");
    for path in &dist_files {
        if let Some(rest) = path.strip_prefix(&static_prefix) {
            static_files.insert(format!("/_next/static/{rest}"), path.clone());
        }
    }

    let paths: BTreeSet<String> = dist_files
        .into_iter()
        .chain(public_files)
        .chain(trace.file_list.iter().cloned())
        .collect();
    info!(files = paths.len(), "collected build files");

    let files = stat_files(root, paths, args.io_concurrency).await?;

    Ok(BuildInput {
        build_id: String::from_utf8_lossy(&build_id).trim().to_string(),
        routes_manifest: read(dist_path.join(ROUTES_MANIFEST)).await?,
        prerender_manifest: read_optional(dist_path.join(PRERENDER_MANIFEST)).await?,
        required_server_files: read(dist_path.join(REQUIRED_SERVER_FILES)).await?,
        pages_manifest: read(dist_path.join(PAGES_MANIFEST)).await?,
        app_paths_manifest: read_optional(dist_path.join(APP_PATHS_MANIFEST)).await?,
        trace,
        files,
        static_files,
        project,
    })
}
