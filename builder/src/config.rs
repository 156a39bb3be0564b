use glob::{MatchOptions, Pattern};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{Budget, Error, PageKind, KIB, MIB};

/// Runtime requirements of a function. Pages can only share a bundle if
/// these are equal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<u32>,
}

/// Project configuration as written by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// Source glob -> runtime overrides. The first matching pattern wins.
    #[serde(default)]
    pub functions: IndexMap<String, FunctionConfig>,
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

impl ProjectConfig {
    pub fn from_slice(data: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(data).map_err(Error::ProjectConfig)
    }

    /// Returns the overrides for `page`, matching every configured glob
    /// against the source files the page may have been compiled from.
    pub fn function_config(
        &self,
        page: &str,
        kind: PageKind,
        extensions: &[String],
    ) -> Result<FunctionConfig, Error> {
        if self.functions.is_empty() {
            return Ok(FunctionConfig::default());
        }

        let candidates = source_candidates(page, kind, extensions);
        for (pattern, config) in &self.functions {
            let compiled = Pattern::new(pattern).map_err(|source| Error::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
            if candidates
                .iter()
                .any(|c| compiled.matches_with(c, MATCH_OPTIONS))
            {
                return Ok(*config);
            }
        }
        Ok(FunctionConfig::default())
    }
}

/// `pages/blog/[slug].tsx`, `src/pages/blog/[slug].tsx`, ... for every
/// extension. App pages live under `app/`.
fn source_candidates(page: &str, kind: PageKind, extensions: &[String]) -> Vec<String> {
    let page = match page {
        "/" => "/index",
        page => page,
    };
    let dir = match kind {
        PageKind::App => "app",
        PageKind::Page | PageKind::Api => "pages",
    };

    let mut out = Vec::with_capacity(extensions.len() * 2);
    for prefix in ["", "src/"] {
        for ext in extensions {
            out.push(format!("{prefix}{dir}{page}.{ext}"));
        }
    }
    out
}

/// Knobs of the builder itself, not of the project being built.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub compressed_budget: u64,
    pub uncompressed_budget: u64,
    pub compressed_reserve: u64,
    pub uncompressed_reserve: u64,
    /// Whether on-demand revalidation (preview mode) is available. `None`
    /// enables it if the build has any API page.
    pub preview_mode: Option<bool>,
    /// Filter the route and page manifests in each bundle down to the
    /// bundle's own pages.
    pub normalize_manifests: bool,
    /// Fraction of a budget above which a group is reported.
    pub warning_ratio: f64,
    /// Traced entry points of the framework server, part of every bundle.
    pub runtime_entries: Vec<String>,
    pub io_concurrency: usize,
    pub page_extensions: Vec<String>,
    pub dist_dir: String,
    pub runtime: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            compressed_budget: 50 * MIB,
            uncompressed_budget: 250 * MIB,
            compressed_reserve: 250 * KIB,
            uncompressed_reserve: 2560 * KIB,
            preview_mode: None,
            normalize_manifests: true,
            warning_ratio: 0.9,
            runtime_entries: vec!["node_modules/next/dist/server/next-server.js".into()],
            io_concurrency: lambdapack_layer::DEFAULT_IO_CONCURRENCY,
            page_extensions: ["tsx", "ts", "jsx", "js"].map(String::from).to_vec(),
            dist_dir: ".next".into(),
            runtime: "nodejs20.x".into(),
        }
    }
}

impl BuildConfig {
    pub fn budget(&self) -> Budget {
        Budget {
            compressed: self.compressed_budget,
            uncompressed: self.uncompressed_budget,
            compressed_reserve: self.compressed_reserve,
            uncompressed_reserve: self.uncompressed_reserve,
        }
    }
}
