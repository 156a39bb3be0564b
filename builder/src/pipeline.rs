//! The whole build, from manifests and traced files to [BuildOutput].

use bytes::Bytes;
use futures::future::try_join_all;
use glob::Pattern;
use lambdapack_layer::{LayerBuilder, LayerCache, PseudoLayer, Trace, TracedFile};
use lambdapack_manifest::{
    PagesManifest, PrerenderedRoutes, RequiredServerFiles, Routes, PRERENDER_MANIFEST,
};
use lambdapack_tracing::Timer;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::diagnostics::check_sizes;
use crate::group::GroupingEngine;
use crate::output::{OutputBuilder, HTML};
use crate::page::{output_key, INTERNAL_PAGES};
use crate::prerender::prerender_pages;
use crate::routes::{ErrorPages, RoutingInput, RoutingSynthesizer};
use crate::{
    BuildConfig, BuildOutput, Error, LambdaBundle, Materializer, Output, Page, PageKind,
    PrerenderClassifier, ProjectConfig,
};

/// Everything the build reads. Paths are relative to the project root.
#[derive(Debug, Clone, Default)]
pub struct BuildInput {
    pub build_id: String,
    pub routes_manifest: Bytes,
    /// Absent when nothing was prerendered.
    pub prerender_manifest: Option<Bytes>,
    pub required_server_files: Bytes,
    pub pages_manifest: Bytes,
    pub app_paths_manifest: Option<Bytes>,
    pub trace: Trace,
    /// Every file the bundles may reference.
    pub files: BTreeMap<String, TracedFile>,
    /// Files served as they are: route -> path.
    pub static_files: BTreeMap<String, String>,
    pub project: ProjectConfig,
}

/// A compiled page file waiting for its layer.
#[derive(Debug)]
struct PageSource {
    id: String,
    kind: PageKind,
    output_path: String,
}

struct Manifests {
    routes: Routes,
    prerender: PrerenderedRoutes,
    server_files: RequiredServerFiles,
    pages: PagesManifest,
    app_paths: PagesManifest,
}

impl Manifests {
    /// Every manifest is parsed before any work starts, so an unsupported
    /// version never gets as far as grouping.
    fn parse(input: &BuildInput) -> Result<Self, Error> {
        let prerender = match &input.prerender_manifest {
            Some(data) => PrerenderedRoutes::from_slice(data)?,
            None => {
                debug!(manifest = PRERENDER_MANIFEST, "not present, nothing was prerendered");
                PrerenderedRoutes::default()
            }
        };
        let app_paths = match &input.app_paths_manifest {
            Some(data) => PagesManifest::from_slice(data)?,
            None => PagesManifest::default(),
        };

        Ok(Self {
            routes: Routes::from_slice(&input.routes_manifest)?,
            prerender,
            server_files: RequiredServerFiles::from_slice(&input.required_server_files)?,
            pages: PagesManifest::from_slice(&input.pages_manifest)?,
            app_paths,
        })
    }
}

/// Runs a build. Consumed by [Pipeline::run]: the layer cache and the
/// diagnostics sink only live as long as one build.
pub struct Pipeline {
    config: BuildConfig,
    diagnostics: Box<dyn Write + Send>,
}

impl Pipeline {
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            diagnostics: Box::new(std::io::stderr()),
        }
    }

    /// Where size tables of oversized and nearly oversized functions go.
    pub fn with_diagnostics(mut self, out: impl Write + Send + 'static) -> Self {
        self.diagnostics = Box::new(out);
        self
    }

    #[instrument(skip_all, fields(build_id = %input.build_id), err)]
    pub async fn run(mut self, input: BuildInput) -> Result<(BuildOutput, Vec<LambdaBundle>), Error> {
        let timer = Timer::start("parse manifests");
        let manifests = Manifests::parse(&input)?;
        let ignore = compile_ignore(manifests.server_files.ignore())?;
        let dist = self.config.dist_dir.clone();
        let base = manifests.routes.base_path().to_string();
        timer.finish();

        let mut sources = Vec::new();
        let mut internal_sources = Vec::new();
        let mut static_pages = Vec::new();
        for (id, file) in manifests.pages.iter() {
            let output_path = format!("{dist}/server/{file}");
            if file.ends_with(".html") {
                static_pages.push((output_key(&base, id), output_path));
            } else if INTERNAL_PAGES.contains(&id) {
                internal_sources.push(PageSource {
                    id: id.to_string(),
                    kind: PageKind::Page,
                    output_path,
                });
            } else {
                sources.push(PageSource {
                    id: id.to_string(),
                    kind: PageKind::of_pages_entry(id),
                    output_path,
                });
            }
        }
        for (id, file) in manifests.app_paths.iter() {
            sources.push(PageSource {
                id: id.to_string(),
                kind: PageKind::App,
                output_path: format!("{dist}/server/{file}"),
            });
        }
        if sources.is_empty() {
            return Err(Error::NoServerPages);
        }

        let has_api = sources.iter().any(|s| s.kind == PageKind::Api);
        let can_use_preview_mode = self.config.preview_mode.unwrap_or(has_api);
        let prerendered = prerender_pages(
            &manifests.prerender,
            manifests.routes.i18n(),
            can_use_preview_mode,
        );

        let timer = Timer::start("build layers");
        let builder = LayerBuilder::new(Arc::new(LayerCache::new()), self.config.io_concurrency);
        let by_parent = input.trace.files_by_parent();

        let initial = self
            .initial_layer(&builder, &input, &manifests, &by_parent, &ignore)
            .await?;

        let build_page = |source: PageSource| {
            let (builder, input, by_parent, ignore) = (&builder, &input, &by_parent, &ignore);
            let is_prerender = prerendered.contains(&source.kind.route(&source.id));
            let function = input.project.function_config(
                &source.id,
                source.kind,
                &self.config.page_extensions,
            );
            async move {
                let traced = input
                    .files
                    .get(&source.output_path)
                    .ok_or_else(|| Error::MissingFile(source.output_path.clone()))?;
                let output = builder.pseudo_file(&source.output_path, traced).await?;
                let deps = input
                    .trace
                    .dependencies_of(by_parent, [source.output_path.as_str()]);
                let layer = builder
                    .build_layer(&select(&input.files, deps.iter().map(String::as_str), ignore))
                    .await?;

                Ok::<_, Error>(Page {
                    id: source.id,
                    kind: source.kind,
                    output_path: source.output_path,
                    output,
                    layer,
                    function: function?,
                    is_prerender,
                })
            }
        };
        let pages = try_join_all(sources.into_iter().map(build_page)).await?;
        let internal = try_join_all(internal_sources.into_iter().map(build_page)).await?;
        info!(
            pages = pages.len(),
            files = builder.cache().len(),
            "built layers"
        );
        timer.finish();

        let timer = Timer::start("group pages");
        let budget = self.config.budget();
        let groups = GroupingEngine::new(&initial, budget)
            .with_internal_pages(internal.iter().collect())
            .group(&pages);
        check_sizes(
            &groups,
            &initial,
            &budget,
            self.config.warning_ratio,
            &mut self.diagnostics,
        )?;
        info!(groups = groups.len(), "grouped pages");
        timer.finish();

        let timer = Timer::start("materialize bundles");
        let launcher_config = serde_json::to_value(manifests.server_files.config()).map_err(
            |source| Error::Serialize {
                what: "launcher config",
                source,
            },
        )?;
        let bundles = Materializer::new(initial, &self.config, launcher_config)
            .with_manifests(input.routes_manifest.clone(), manifests.pages.clone())
            .materialize_all(&groups)
            .await?;
        timer.finish();

        let timer = Timer::start("classify prerenders");
        let mut outputs = OutputBuilder::new();
        for (route, path) in &input.static_files {
            outputs.add_static(output_key(&base, route), Output::static_file(path.clone(), None));
        }
        for (key, path) in static_pages {
            outputs.add_static(key, Output::static_file(path, Some(HTML)));
        }

        let mut lambdas = BTreeMap::new();
        for bundle in &bundles {
            let keys = lambda_keys(bundle, &manifests.routes);
            for key in &keys {
                lambdas.insert(key.clone(), bundle.name.clone());
            }
            outputs.add_lambda(bundle, keys);
        }

        let pages_dir = format!("{dist}/server/pages");
        let default_locale = manifests.routes.i18n().map(|i18n| i18n.default_locale.as_str());
        let has_static = |name: &str| {
            input.files.contains_key(&format!("{pages_dir}/{name}"))
                || default_locale
                    .is_some_and(|l| input.files.contains_key(&format!("{pages_dir}/{l}/{name}")))
        };
        let has_static_404 = has_static("404.html");

        let prerenders = PrerenderClassifier::new(
            &manifests.prerender,
            &manifests.routes,
            &lambdas,
            pages_dir.as_str(),
        )
        .preview_mode(can_use_preview_mode)
        .static_404(has_static_404)
        .classify()?;
        info!(outputs = prerenders.len(), "classified prerenders");
        outputs.add_prerenders(prerenders);
        timer.finish();

        let timer = Timer::start("synthesize routes");
        let error_pages = ErrorPages {
            has_404: has_static_404 || manifests.routes.common.pages404,
            has_500: has_static("500.html") || manifests.pages.get("/500").is_some(),
        };
        let routes = RoutingSynthesizer::new(RoutingInput {
            routes: &manifests.routes,
            build_id: &input.build_id,
            error_pages,
        })
        .synthesize()?;
        timer.finish();

        Ok((outputs.finish(routes), bundles))
    }

    /// Required server files plus the traced runtime entries. Required files
    /// must exist, a runtime entry that wasn't traced is only reported.
    async fn initial_layer(
        &self,
        builder: &LayerBuilder,
        input: &BuildInput,
        manifests: &Manifests,
        by_parent: &BTreeMap<String, BTreeSet<String>>,
        ignore: &[Pattern],
    ) -> Result<PseudoLayer, Error> {
        let mut files = BTreeMap::new();
        for path in manifests.server_files.files() {
            let file = input
                .files
                .get(path)
                .ok_or_else(|| Error::MissingFile(path.clone()))?;
            files.insert(path.clone(), file.clone());
        }

        let mut entries = Vec::new();
        for entry in &self.config.runtime_entries {
            if input.files.contains_key(entry) {
                entries.push(entry.as_str());
            } else {
                warn!(entry = %entry, "runtime entry was not traced, skipping it");
            }
        }
        let deps = input.trace.dependencies_of(by_parent, entries.iter().copied());
        files.extend(select(
            &input.files,
            entries.iter().copied().chain(deps.iter().map(String::as_str)),
            ignore,
        ));

        builder.build_layer(&files).await.map_err(Error::from)
    }
}

fn compile_ignore(patterns: &[String]) -> Result<Vec<Pattern>, Error> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|source| Error::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}

/// The files among `paths` that were traced and aren't ignored.
fn select<'a>(
    files: &BTreeMap<String, TracedFile>,
    paths: impl IntoIterator<Item = &'a str>,
    ignore: &[Pattern],
) -> BTreeMap<String, TracedFile> {
    paths
        .into_iter()
        .filter(|path| !ignore.iter().any(|p| p.matches(path)))
        .filter_map(|path| match files.get(path) {
            Some(file) => Some((path.to_string(), file.clone())),
            None => {
                debug!(path, "traced but not present, skipping");
                None
            }
        })
        .collect()
}

/// Output keys a bundle is published under. With i18n, pages are also
/// reachable under every locale prefix.
fn lambda_keys(bundle: &LambdaBundle, routes: &Routes) -> Vec<String> {
    let base = routes.base_path();
    let mut keys = Vec::new();
    for route in bundle.routes() {
        keys.push(output_key(base, &route));
        if let (Some(i18n), PageKind::Page) = (routes.i18n(), bundle.kind) {
            for locale in &i18n.locales {
                let localized = match route.as_str() {
                    "/" => format!("/{locale}"),
                    route => format!("/{locale}{route}"),
                };
                keys.push(output_key(base, &localized));
            }
        }
    }
    keys
}
