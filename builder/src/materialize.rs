use bytes::Bytes;
use lambdapack_layer::{PseudoFile, PseudoLayer, S_IFREG};
use lambdapack_manifest::{retain_route_pages, PagesManifest, PAGES_MANIFEST, ROUTES_MANIFEST};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

use crate::{BuildConfig, Error, FunctionConfig, LambdaGroup, PageKind};

/// Entry point of every bundle.
pub const LAUNCHER: &str = "___next_launcher.cjs";

const LAUNCHER_TEMPLATE: &str = r#"process.chdir(__dirname);
process.env.NODE_ENV = 'production';
__PREBUNDLED__const conf = __CONF__;
process.env.__NEXT_PRIVATE_STANDALONE_CONFIG = JSON.stringify(conf);

const NextServer = require('next/dist/server/next-server.js').default;
const nextServer = new NextServer({
  conf,
  dir: '.',
  minimalMode: true,
  customServer: false,
});

const handler = nextServer.getRequestHandler();
module.exports = async (req, res) => {
  try {
    await handler(req, res);
  } catch (err) {
    console.error(err);
    process.exit(1);
  }
};
"#;

/// A file in a bundle: either shared from a layer, or produced for this
/// bundle only.
#[derive(Debug, Clone)]
pub enum BundleFile {
    Layer(Arc<PseudoFile>),
    Generated { data: Bytes, mode: u32 },
}

impl BundleFile {
    pub fn generated(data: impl Into<Bytes>) -> Self {
        BundleFile::Generated {
            data: data.into(),
            mode: S_IFREG | 0o644,
        }
    }

    pub fn mode(&self) -> u32 {
        match self {
            BundleFile::Layer(file) => file.source().mode(),
            BundleFile::Generated { mode, .. } => *mode,
        }
    }

    /// Checksum of the uncompressed content. Symlinks have none.
    pub fn crc32(&self) -> Option<u32> {
        match self {
            BundleFile::Layer(file) => file.crc32(),
            BundleFile::Generated { data, .. } => Some(crc32fast::hash(data)),
        }
    }

    pub fn uncompressed_size(&self) -> u64 {
        match self {
            BundleFile::Layer(file) => file.uncompressed_size(),
            BundleFile::Generated { data, .. } => data.len() as u64,
        }
    }

    /// Generated files are stored uncompressed.
    pub fn compressed_size(&self) -> u64 {
        match self {
            BundleFile::Layer(file) => file.compressed_size(),
            BundleFile::Generated { data, .. } => data.len() as u64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationType {
    Page,
    #[serde(rename = "API")]
    Api,
    #[serde(rename = "ISR")]
    Isr,
}

impl OperationType {
    fn of(group: &LambdaGroup) -> Self {
        if group.is_api() {
            OperationType::Api
        } else if group.is_prerender_group {
            OperationType::Isr
        } else {
            OperationType::Page
        }
    }
}

/// One deployable function.
#[derive(Debug, Clone)]
pub struct LambdaBundle {
    /// Digest of the file list, stable across identical builds.
    pub name: String,
    pub pages: Vec<String>,
    pub kind: PageKind,
    pub function: FunctionConfig,
    pub handler: String,
    pub runtime: String,
    pub operation_type: OperationType,
    pub supports_response_streaming: bool,
    pub files: BTreeMap<String, BundleFile>,
}

impl LambdaBundle {
    pub fn compressed_size(&self) -> u64 {
        self.files.values().map(BundleFile::compressed_size).sum()
    }

    pub fn uncompressed_size(&self) -> u64 {
        self.files.values().map(BundleFile::uncompressed_size).sum()
    }

    /// Routes served by this bundle.
    pub fn routes(&self) -> impl Iterator<Item = String> + '_ {
        self.pages.iter().map(|id| self.kind.route(id))
    }
}

/// Turns [LambdaGroup]s into [LambdaBundle]s.
///
/// Files are taken in a fixed precedence, first writer wins: files generated
/// for the bundle (launcher, normalized manifests), then the shared initial
/// layer, then the group's own layer. Only one bundle is materialized at a
/// time.
pub struct Materializer {
    initial: PseudoLayer,
    launcher_config: serde_json::Value,
    routes_manifest: Option<Bytes>,
    pages_manifest: Option<PagesManifest>,
    dist_dir: String,
    runtime: String,
    normalize: bool,
    semaphore: Semaphore,
}

impl Materializer {
    pub fn new(initial: PseudoLayer, config: &BuildConfig, launcher_config: serde_json::Value) -> Self {
        Self {
            initial,
            launcher_config,
            routes_manifest: None,
            pages_manifest: None,
            dist_dir: config.dist_dir.clone(),
            runtime: config.runtime.clone(),
            normalize: config.normalize_manifests,
            semaphore: Semaphore::new(1),
        }
    }

    /// Manifests to filter down to each bundle's pages. The routes manifest
    /// is taken as written, so keys it carries beyond the modelled ones
    /// survive.
    pub fn with_manifests(mut self, routes_manifest: Bytes, pages_manifest: PagesManifest) -> Self {
        self.routes_manifest = Some(routes_manifest);
        self.pages_manifest = Some(pages_manifest);
        self
    }

    pub async fn materialize_all(&self, groups: &[LambdaGroup]) -> Result<Vec<LambdaBundle>, Error> {
        futures::future::try_join_all(groups.iter().map(|group| self.materialize(group))).await
    }

    #[instrument(skip_all, fields(pages = group.pages.len()), err)]
    pub async fn materialize(&self, group: &LambdaGroup) -> Result<LambdaBundle, Error> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(lambdapack_layer::Error::from)?;

        let mut files = BTreeMap::new();
        for (path, file) in self.generated_files(group)? {
            files.entry(path).or_insert(file);
        }
        for (path, file) in self.initial.iter().chain(group.layer.iter()) {
            files
                .entry(path.to_string())
                .or_insert_with(|| BundleFile::Layer(file.clone()));
        }

        let name = digest(&files);
        debug!(name = %name, files = files.len(), "materialized bundle");

        Ok(LambdaBundle {
            name,
            pages: group.pages.clone(),
            kind: group.kind,
            function: group.function,
            handler: LAUNCHER.to_string(),
            runtime: self.runtime.clone(),
            operation_type: OperationType::of(group),
            supports_response_streaming: group.is_streaming(),
            files,
        })
    }

    fn generated_files(&self, group: &LambdaGroup) -> Result<Vec<(String, BundleFile)>, Error> {
        let mut out = vec![(LAUNCHER.to_string(), BundleFile::generated(self.launcher(group.kind)?))];
        if !self.normalize {
            return Ok(out);
        }

        let routes_in_group: BTreeSet<String> =
            group.pages.iter().map(|id| group.kind.route(id)).collect();
        let pages_in_group: BTreeSet<&str> = group.pages.iter().map(String::as_str).collect();

        if let Some(routes_manifest) = &self.routes_manifest {
            let data = retain_route_pages(routes_manifest, |page| routes_in_group.contains(page))?;
            out.push((format!("{}/{}", self.dist_dir, ROUTES_MANIFEST), BundleFile::generated(data)));
        }

        if let Some(pages_manifest) = &self.pages_manifest {
            let mut pages_manifest = pages_manifest.clone();
            pages_manifest.retain_dynamic(|page| pages_in_group.contains(page));
            let data = serde_json::to_vec(&pages_manifest).map_err(|source| Error::Serialize {
                what: PAGES_MANIFEST,
                source,
            })?;
            out.push((format!("{}/{}", self.dist_dir, PAGES_MANIFEST), BundleFile::generated(data)));
        }

        Ok(out)
    }

    fn launcher(&self, kind: PageKind) -> Result<String, Error> {
        let conf = serde_json::to_string(&self.launcher_config).map_err(|source| Error::Serialize {
            what: LAUNCHER,
            source,
        })?;
        let prebundled = match kind {
            PageKind::App => "process.env.__NEXT_PRIVATE_PREBUNDLED_REACT = 'next';\n",
            PageKind::Page | PageKind::Api => "",
        };
        Ok(LAUNCHER_TEMPLATE
            .replace("__PREBUNDLED__", prebundled)
            .replace("__CONF__", &conf))
    }
}

/// base32 of the first 20 bytes of a blake3 hash over each file's path,
/// checksum, size and mode, in path order.
fn digest(files: &BTreeMap<String, BundleFile>) -> String {
    let mut hasher = blake3::Hasher::new();
    for (path, file) in files {
        hasher.update(path.as_bytes());
        hasher.update(&[0]);
        hasher.update(&file.crc32().unwrap_or_default().to_le_bytes());
        hasher.update(&file.uncompressed_size().to_le_bytes());
        hasher.update(&file.mode().to_le_bytes());
    }
    data_encoding::BASE32_DNSSEC.encode(&hasher.finalize().as_bytes()[..20])
}

#[cfg(test)]
mod tests {
    use super::{BundleFile, Materializer, OperationType, LAUNCHER};
    use crate::fixtures::{noise_file, page, PageSpec};
    use crate::group::GroupingEngine;
    use crate::{BuildConfig, LambdaGroup, PageKind};
    use lambdapack_layer::fixtures::pseudo_file;
    use lambdapack_layer::PseudoLayer;
    use bytes::Bytes;
    use lambdapack_manifest::PagesManifest;
    use std::sync::Arc;

    const ROUTES: &str = r#"{
        "version": 3,
        "pages404": true,
        "basePath": "",
        "rewrites": [],
        "rsc": { "header": "RSC" },
        "dynamicRoutes": [
            { "page": "/blog/[slug]", "regex": "^/blog/([^/]+?)(?:/)?$" },
            { "page": "/shop/[id]", "regex": "^/shop/([^/]+?)(?:/)?$" }
        ]
    }"#;

    const PAGES: &str = r#"{
        "/blog/[slug]": "pages/blog/[slug].js",
        "/shop/[id]": "pages/shop/[id].js",
        "/about": "pages/about.html"
    }"#;

    fn initial() -> PseudoLayer {
        [
            (".next/routes-manifest.json".to_string(), pseudo_file(ROUTES.as_bytes())),
            ("node_modules/next/dist/server/next-server.js".to_string(), noise_file(2048, 1)),
        ]
        .into_iter()
        .collect()
    }

    fn groups(initial: &PseudoLayer, budget_bytes: u64) -> Vec<LambdaGroup> {
        let mut budget = BuildConfig::default().budget();
        budget.compressed = budget_bytes;
        budget.compressed_reserve = 0;
        let pages = vec![
            page("/blog/[slug]", &[("lib/blog.js", noise_file(4096, 2))]),
            page("/shop/[id]", &[("lib/shop.js", noise_file(4096, 3))]),
        ];
        GroupingEngine::new(initial, budget).group(&pages)
    }

    fn materializer(initial: PseudoLayer, config: &BuildConfig) -> Materializer {
        Materializer::new(initial, config, serde_json::json!({ "distDir": ".next" })).with_manifests(
            Bytes::from_static(ROUTES.as_bytes()),
            PagesManifest::from_slice(PAGES.as_bytes()).unwrap(),
        )
    }

    fn generated_json(file: &BundleFile) -> serde_json::Value {
        match file {
            BundleFile::Generated { data, .. } => serde_json::from_slice(data).unwrap(),
            BundleFile::Layer(_) => panic!("expected a generated file"),
        }
    }

    #[tokio::test]
    async fn manifests_are_filtered_per_bundle() {
        let initial = initial();
        // Room for one page per group only.
        let groups = groups(&initial, initial.compressed_size() + 6000);
        assert_eq!(2, groups.len());

        let bundles = materializer(initial, &BuildConfig::default())
            .materialize_all(&groups)
            .await
            .expect("must materialize");

        let routes = generated_json(&bundles[0].files[".next/routes-manifest.json"]);
        let dynamic = routes["dynamicRoutes"].as_array().unwrap();
        assert_eq!(1, dynamic.len());
        assert_eq!("/blog/[slug]", dynamic[0]["page"]);
        assert_eq!("RSC", routes["rsc"]["header"]);
        assert!(routes.get("i18n").is_none());
        assert_eq!(serde_json::json!([]), routes["rewrites"]);

        let pages = generated_json(&bundles[1].files[".next/server/pages-manifest.json"]);
        assert!(pages.get("/blog/[slug]").is_none());
        assert!(pages.get("/shop/[id]").is_some());
        assert!(pages.get("/about").is_some());

        assert_ne!(bundles[0].name, bundles[1].name);
    }

    #[tokio::test]
    async fn shared_files_keep_their_identity() {
        let initial = initial();
        let groups = groups(&initial, initial.compressed_size() + 6000);
        let bundles = materializer(initial.clone(), &BuildConfig::default())
            .materialize_all(&groups)
            .await
            .unwrap();

        let server = "node_modules/next/dist/server/next-server.js";
        for bundle in &bundles {
            match &bundle.files[server] {
                BundleFile::Layer(file) => assert!(Arc::ptr_eq(file, initial.get(server).unwrap())),
                BundleFile::Generated { .. } => panic!("expected the layer's file"),
            }
        }
    }

    #[tokio::test]
    async fn embedded_manifest_kept_without_normalization() {
        let initial = initial();
        let groups = groups(&initial, u64::MAX / 2);
        let config = BuildConfig {
            normalize_manifests: false,
            ..Default::default()
        };
        let bundle = materializer(initial, &config)
            .materialize(&groups[0])
            .await
            .unwrap();

        assert!(matches!(
            bundle.files[".next/routes-manifest.json"],
            BundleFile::Layer(_)
        ));
        assert!(!bundle.files.contains_key(".next/server/pages-manifest.json"));
        assert_eq!(vec!["/blog/[slug]", "/shop/[id]"], bundle.pages);
    }

    #[tokio::test]
    async fn name_is_stable() {
        let initial = initial();
        let groups = groups(&initial, u64::MAX / 2);
        let materializer = materializer(initial, &BuildConfig::default());

        let first = materializer.materialize(&groups[0]).await.unwrap();
        let second = materializer.materialize(&groups[0]).await.unwrap();
        assert_eq!(first.name, second.name);
        assert_eq!(32, first.name.len());
        assert!(first.name.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[tokio::test]
    async fn launcher_and_operation_type() {
        let initial = PseudoLayer::new();
        let pages = vec![
            PageSpec::new("/dashboard/page").kind(PageKind::App).build(),
            PageSpec::new("/api/hello").build(),
            PageSpec::new("/[id]").prerender().build(),
        ];
        let groups = GroupingEngine::new(&initial, BuildConfig::default().budget()).group(&pages);
        let bundles = materializer(initial, &BuildConfig::default())
            .materialize_all(&groups)
            .await
            .unwrap();

        let ops: Vec<_> = bundles.iter().map(|b| (b.operation_type, b.supports_response_streaming)).collect();
        assert_eq!(
            vec![
                (OperationType::Isr, false),
                (OperationType::Page, true),
                (OperationType::Api, false),
            ],
            ops
        );

        let BundleFile::Generated { data, .. } = &bundles[1].files[LAUNCHER] else {
            panic!("launcher must be generated");
        };
        let launcher = std::str::from_utf8(data).unwrap();
        assert!(launcher.contains(r#"const conf = {"distDir":".next"};"#));
        assert!(launcher.contains("__NEXT_PRIVATE_PREBUNDLED_REACT"));
        assert_eq!(LAUNCHER, bundles[1].handler);
        assert_eq!(vec!["/dashboard".to_string()], bundles[1].routes().collect::<Vec<_>>());
    }
}
