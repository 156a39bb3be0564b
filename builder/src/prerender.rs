//! Classifies the routes of the prerender manifest and turns them into
//! outputs: prerenders backed by a bundle, or plain static files.

use indexmap::IndexMap;
use lambdapack_manifest::{I18n, PrerenderedRoutes, Revalidate, Routes};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::output::{Output, HTML, JSON};
use crate::page::{is_dynamic, output_key};
use crate::Error;

/// What a concrete route is, once locales are expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PrerenderState {
    /// Rendered once at build time.
    Static,
    /// Rendered at build time and regenerated after this many seconds.
    Revalidating(u32),
    BlockingFallback,
    Fallback,
    /// Not rendered at build time, answered with the 404 page.
    Omitted,
    NotFound,
}

/// A prerendered output, served from its fallback file and regenerated by
/// `lambda`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrerenderEntry {
    pub route: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_route: Option<String>,
    pub state: PrerenderState,
    pub expiration: Revalidate,
    /// Name of the bundle that renders the route.
    pub lambda: String,
    /// Build-relative file served until the first render.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    /// Outputs of one group are regenerated together.
    pub group: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bypass_token: Option<String>,
    /// `None` lets every query key through; an empty list none.
    pub allow_query: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_status: Option<u16>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub initial_headers: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

/// Outputs produced from the prerender manifest, in emission order.
#[derive(Debug, Clone, Default)]
pub struct Prerenders {
    outputs: IndexMap<String, Output>,
}

impl Prerenders {
    pub fn get(&self, key: &str) -> Option<&Output> {
        self.outputs.get(key)
    }

    pub fn entry(&self, key: &str) -> Option<&PrerenderEntry> {
        self.outputs.get(key).and_then(Output::as_prerender)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Output)> {
        self.outputs.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn into_outputs(self) -> IndexMap<String, Output> {
        self.outputs
    }
}

/// Page routes rendered through the prerender manifest. Their pages are
/// grouped apart from the others.
pub fn prerender_pages(
    manifest: &PrerenderedRoutes,
    i18n: Option<&I18n>,
    can_use_preview_mode: bool,
) -> BTreeSet<String> {
    let omitted = manifest
        .omitted_routes
        .keys()
        .filter(|_| can_use_preview_mode);
    let lazy = manifest
        .blocking_fallback_routes
        .keys()
        .chain(manifest.fallback_routes.keys());
    let rendered = manifest.static_routes.iter().map(|(route, entry)| {
        match (&entry.src_route, i18n) {
            (Some(src), _) => src.clone(),
            (None, Some(i18n)) if manifest.is_locale_prefixed => {
                normalize_locale_path(route, &i18n.locales).1
            }
            (None, _) => route.clone(),
        }
    });

    omitted.chain(lazy).cloned().chain(rendered).collect()
}

/// Splits a leading locale off `path`: `/fr/about` -> (`fr`, `/about`).
fn normalize_locale_path(path: &str, locales: &[String]) -> (Option<String>, String) {
    let mut segments = path.splitn(3, '/').skip(1);
    let Some(first) = segments.next() else {
        return (None, path.to_string());
    };
    match locales.iter().find(|l| l.eq_ignore_ascii_case(first)) {
        Some(locale) => {
            let rest = segments.next().unwrap_or_default();
            (Some(locale.clone()), format!("/{rest}"))
        }
        None => (None, path.to_string()),
    }
}

/// `/about` -> `/fr/about`, `/index` -> `/fr`. Without i18n, the path as is.
fn add_locale_or_default(path: &str, i18n: Option<&I18n>, locale: Option<&str>) -> String {
    let Some(i18n) = i18n else {
        return path.to_string();
    };
    let locale = locale.unwrap_or(&i18n.default_locale);
    match path {
        "/index" | "/" => format!("/{locale}"),
        path => format!("/{locale}{path}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Static,
    Fallback,
    Blocking,
    Omitted,
}

/// Walks the prerender manifest and emits one output per concrete page and
/// data path.
pub struct PrerenderClassifier<'a> {
    manifest: &'a PrerenderedRoutes,
    routes: &'a Routes,
    /// Output key -> name of the bundle serving it.
    lambdas: &'a BTreeMap<String, String>,
    pages_dir: String,
    can_use_preview_mode: bool,
    has_static_404: bool,
    group: u32,
    outputs: IndexMap<String, Output>,
}

impl<'a> PrerenderClassifier<'a> {
    /// `pages_dir` is the build-relative directory holding the rendered
    /// html and json files.
    pub fn new(
        manifest: &'a PrerenderedRoutes,
        routes: &'a Routes,
        lambdas: &'a BTreeMap<String, String>,
        pages_dir: impl Into<String>,
    ) -> Self {
        Self {
            manifest,
            routes,
            lambdas,
            pages_dir: pages_dir.into(),
            can_use_preview_mode: true,
            has_static_404: false,
            group: 1,
            outputs: IndexMap::new(),
        }
    }

    /// Whether prerenders can be bypassed and revalidated on demand. When
    /// they can't, non-revalidating pages are emitted as static files.
    pub fn preview_mode(mut self, can_use_preview_mode: bool) -> Self {
        self.can_use_preview_mode = can_use_preview_mode;
        self
    }

    pub fn static_404(mut self, has_static_404: bool) -> Self {
        self.has_static_404 = has_static_404;
        self
    }

    pub fn classify(mut self) -> Result<Prerenders, Error> {
        let manifest = self.manifest;

        for route in manifest.static_routes.keys() {
            self.route(route, Kind::Static, None)?;
        }
        for route in manifest.fallback_routes.keys() {
            self.route(route, Kind::Fallback, None)?;
        }
        for route in manifest.blocking_fallback_routes.keys() {
            self.route(route, Kind::Blocking, None)?;
        }
        if self.has_static_404 && self.can_use_preview_mode {
            for route in manifest.omitted_routes.keys() {
                self.route(route, Kind::Omitted, None)?;
            }
        }

        debug!(outputs = self.outputs.len(), groups = self.group - 1, "classified prerenders");
        Ok(Prerenders {
            outputs: self.outputs,
        })
    }

    fn i18n(&self) -> Option<&'a I18n> {
        self.routes.i18n()
    }

    fn file(&self, path: &str) -> String {
        format!("{}{}", self.pages_dir, path)
    }

    fn route(&mut self, route: &str, kind: Kind, locale: Option<&str>) -> Result<(), Error> {
        let manifest = self.manifest;
        if kind == Kind::Fallback && manifest.blocking_fallback_routes.contains_key(route) {
            return Err(Error::BlockingAndFallback(route.to_string()));
        }
        if kind == Kind::Fallback && manifest.omitted_routes.contains_key(route) {
            return Err(Error::OmittedAndFallback(route.to_string()));
        }

        let i18n = self.i18n();
        let base = self.routes.base_path();
        let mut locale = locale.map(str::to_string);

        let mut route_file = match route {
            "/" => "/index".to_string(),
            route => route.to_string(),
        };
        let mut orig_route_file = route_file.clone();
        if locale.is_none() && manifest.is_locale_prefixed {
            let (detected, pathname) =
                normalize_locale_path(route, i18n.map(|i| i.locales.as_slice()).unwrap_or(&[]));
            locale = detected;
            orig_route_file = match pathname.as_str() {
                "/" => "/index".to_string(),
                _ => pathname,
            };
        }

        let src_route_of_static = manifest
            .static_routes
            .get(route)
            .and_then(|r| r.src_route.as_deref());
        let non_dynamic_ssg = kind == Kind::Static && src_route_of_static.is_none();
        let localized = (non_dynamic_ssg && !manifest.is_locale_prefixed)
            || kind == Kind::Fallback
            || kind == Kind::Omitted;
        if localized {
            route_file = add_locale_or_default(&route_file, i18n, locale.as_deref());
        }

        let is_not_found = manifest.not_found_routes.iter().any(|r| r == route);

        let (expiration, src_route, data_route, initial_status, initial_headers) = match kind {
            Kind::Fallback | Kind::Blocking => {
                let lazy = match kind {
                    Kind::Fallback => &manifest.fallback_routes[route],
                    _ => &manifest.blocking_fallback_routes[route],
                };
                (Revalidate::After(1), None, lazy.data_route.clone(), None, IndexMap::new())
            }
            Kind::Omitted => (
                Revalidate::Never,
                Some(route.to_string()),
                manifest.omitted_routes[route].data_route.clone(),
                None,
                IndexMap::new(),
            ),
            Kind::Static => {
                let entry = &manifest.static_routes[route];
                (
                    entry.initial_revalidate,
                    entry.src_route.clone(),
                    entry.data_route.clone(),
                    entry.initial_status,
                    entry.initial_headers.clone(),
                )
            }
        };

        let not_found_page = add_locale_or_default("/404.html", i18n, locale.as_deref());
        let omitted_or_not_found = kind == Kind::Omitted || is_not_found;
        let html = match kind {
            Kind::Blocking => None,
            _ if is_not_found && !self.has_static_404 => None,
            Kind::Fallback => manifest.fallback_routes[route]
                .fallback
                .as_deref()
                .map(|page| self.file(&add_locale_or_default(page, i18n, locale.as_deref()))),
            _ if omitted_or_not_found => Some(self.file(&not_found_page)),
            _ => Some(self.file(&format!("{route_file}.html"))),
        };
        let json = match kind {
            Kind::Fallback | Kind::Blocking => None,
            _ if is_not_found && !self.has_static_404 => None,
            _ if omitted_or_not_found => Some(self.file(&not_found_page)),
            _ => Some(self.file(&format!("{route_file}.json"))),
        };

        let page_key = output_key(base, &route_file);
        let data_key = data_route.as_deref().map(|data_route| {
            let data_route = if non_dynamic_ssg || matches!(kind, Kind::Fallback | Kind::Omitted) {
                replace_suffix(
                    data_route,
                    &format!("{orig_route_file}.json"),
                    &format!("{route_file}.json"),
                )
            } else {
                data_route.to_string()
            };
            output_key(base, &data_route)
        });

        let lambda_key = output_key(
            base,
            src_route.as_deref().unwrap_or(orig_route_file.as_str()),
        );
        let lambda = self.lambdas.get(&lambda_key);

        let revalidates = expiration != Revalidate::Never;
        if !is_not_found && !revalidates {
            let serve_static = !self.can_use_preview_mode
                || (route == "/404" && !self.lambdas.contains_key(&page_key));
            if let (true, Some(html), Some(json)) = (serve_static, &html, &json) {
                self.outputs
                    .insert(page_key.clone(), Output::static_file(html, Some(HTML)));
                if let Some(data_key) = &data_key {
                    self.outputs
                        .insert(data_key.clone(), Output::static_file(json, Some(JSON)));
                }
            }
        }

        let not_found_preview = !revalidates && self.can_use_preview_mode && is_not_found;
        if !self.outputs.contains_key(&page_key) && (!is_not_found || revalidates || not_found_preview)
        {
            let lambda = lambda.ok_or_else(|| Error::MissingLambda {
                route: route_file.clone(),
            })?;

            let state = match (kind, is_not_found, expiration) {
                (Kind::Fallback, ..) => PrerenderState::Fallback,
                (Kind::Blocking, ..) => PrerenderState::BlockingFallback,
                (Kind::Omitted, ..) => PrerenderState::Omitted,
                (Kind::Static, true, _) => PrerenderState::NotFound,
                (Kind::Static, false, Revalidate::Never) => PrerenderState::Static,
                (Kind::Static, false, Revalidate::After(seconds)) => {
                    PrerenderState::Revalidating(seconds)
                }
            };

            let entry = PrerenderEntry {
                route: route.to_string(),
                src_route: src_route.clone(),
                state,
                expiration,
                lambda: lambda.clone(),
                fallback: html,
                group: self.group,
                bypass_token: manifest.bypass_token.clone(),
                allow_query: self.allow_query(src_route.as_deref().unwrap_or(route)),
                initial_status,
                initial_headers,
                locale: locale.clone(),
            };
            let data_entry = PrerenderEntry {
                fallback: json,
                ..entry.clone()
            };

            self.outputs
                .insert(page_key.clone(), Output::Prerender(entry.clone()));
            if let Some(data_key) = &data_key {
                self.outputs
                    .insert(data_key.clone(), Output::Prerender(data_entry.clone()));
            }
            self.group += 1;

            if let (Some(i18n), Kind::Blocking) = (i18n, kind) {
                for locale in &i18n.locales {
                    let locale_route_file = add_locale_or_default(&route_file, Some(i18n), Some(locale.as_str()));
                    let group = self.group;
                    self.outputs.insert(
                        output_key(base, &locale_route_file),
                        Output::Prerender(PrerenderEntry {
                            group,
                            locale: Some(locale.clone()),
                            ..entry.clone()
                        }),
                    );
                    if let Some(data_route) = &data_route {
                        let locale_data_route = replace_suffix(
                            data_route,
                            &format!("{orig_route_file}.json"),
                            &format!("{locale_route_file}.json"),
                        );
                        self.outputs.insert(
                            output_key(base, &locale_data_route),
                            Output::Prerender(PrerenderEntry {
                                group,
                                locale: Some(locale.clone()),
                                ..data_entry.clone()
                            }),
                        );
                    }
                    self.group += 1;
                }
            }
        }

        if localized && locale.is_none() {
            if let Some(i18n) = i18n {
                for other in i18n.locales.iter().filter(|l| **l != i18n.default_locale) {
                    self.route(route, kind, Some(other.as_str()))?;
                }
            }
        }

        Ok(())
    }

    /// Query keys that make distinct cache entries. The named route keys of
    /// the dynamic route, none for static pages, any when unknown.
    fn allow_query(&self, page: &str) -> Option<Vec<String>> {
        let route_keys = self
            .routes
            .dynamic_route(page)
            .and_then(|r| r.route_keys.as_ref());
        match route_keys {
            Some(keys) => Some(keys.values().cloned().collect()),
            None if !is_dynamic(page) => Some(vec![]),
            None => None,
        }
    }
}

fn replace_suffix(s: &str, from: &str, to: &str) -> String {
    match s.strip_suffix(from) {
        Some(head) => format!("{head}{to}"),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        add_locale_or_default, normalize_locale_path, prerender_pages, PrerenderClassifier,
        PrerenderState, Prerenders,
    };
    use crate::output::Output;
    use crate::Error;
    use lambdapack_manifest::{I18n, PrerenderedRoutes, Revalidate, Routes};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::collections::BTreeMap;

    const PAGES_DIR: &str = ".next/server/pages";

    fn routes(i18n: bool) -> Routes {
        let i18n = if i18n {
            r#", "i18n": { "locales": ["en", "fr"], "defaultLocale": "en" }"#
        } else {
            ""
        };
        Routes::from_slice(
            format!(
                r#"{{ "version": 3, "pages404": true, "basePath": "", "rewrites": [],
                     "dynamicRoutes": [
                        {{ "page": "/[id]", "regex": "^/([^/]+?)(?:/)?$",
                          "namedRegex": "^/(?<nxtPid>[^/]+?)(?:/)?$", "routeKeys": {{ "nxtPid": "nxtPid" }} }},
                        {{ "page": "/blog/[slug]", "regex": "^/blog/([^/]+?)(?:/)?$" }}
                     ]{i18n} }}"#
            )
            .as_bytes(),
        )
        .unwrap()
    }

    fn manifest(json: &str) -> PrerenderedRoutes {
        PrerenderedRoutes::from_slice(json.as_bytes()).expect("must parse")
    }

    fn lambdas(keys: &[&str]) -> BTreeMap<String, String> {
        keys.iter()
            .map(|k| (k.to_string(), format!("bundle-{k}")))
            .collect()
    }

    fn classify(
        manifest: &PrerenderedRoutes,
        routes: &Routes,
        lambdas: &BTreeMap<String, String>,
    ) -> Result<Prerenders, Error> {
        PrerenderClassifier::new(manifest, routes, lambdas, PAGES_DIR)
            .static_404(true)
            .classify()
    }

    #[test]
    fn revalidating_dynamic_page_and_data_share_a_bundle() {
        let manifest = manifest(
            r#"{ "version": 3, "routes": {
                "/[id]": { "initialRevalidateSeconds": 60, "srcRoute": null,
                           "dataRoute": "/_next/data/b1/[id].json" } } }"#,
        );
        let routes = routes(false);
        let lambdas = lambdas(&["[id]"]);
        let prerenders = classify(&manifest, &routes, &lambdas).unwrap();

        let page = prerenders.entry("[id]").expect("page output");
        let data = prerenders.entry("_next/data/b1/[id].json").expect("data output");
        assert_eq!(PrerenderState::Revalidating(60), page.state);
        assert_eq!(Revalidate::After(60), page.expiration);
        assert_eq!("bundle-[id]", page.lambda);
        assert_eq!(page.lambda, data.lambda);
        assert_eq!(page.group, data.group);
        assert_eq!(Some(".next/server/pages/[id].html".to_string()), page.fallback);
        assert_eq!(Some(".next/server/pages/[id].json".to_string()), data.fallback);
        assert_eq!(Some(vec!["nxtPid".to_string()]), page.allow_query);
    }

    #[test]
    fn unresolvable_lambda_is_fatal() {
        let manifest = manifest(
            r#"{ "version": 3, "routes": {
                "/about": { "initialRevalidateSeconds": 10, "srcRoute": null,
                            "dataRoute": "/_next/data/b1/about.json" } } }"#,
        );
        let err = classify(&manifest, &routes(false), &lambdas(&["index"])).unwrap_err();
        assert_eq!("MISSING_LAMBDA", err.code());
        assert!(matches!(err, Error::MissingLambda { route } if route == "/about"));
    }

    #[test]
    fn static_pages_expand_per_locale() {
        // v2 route keys carry no locale.
        let manifest = manifest(
            r#"{ "version": 2, "routes": {
                "/about": { "initialRevalidateSeconds": 30, "srcRoute": null,
                            "dataRoute": "/_next/data/b1/about.json" },
                "/": { "initialRevalidateSeconds": 30, "srcRoute": null,
                       "dataRoute": "/_next/data/b1/index.json" } } }"#,
        );
        let routes = routes(true);
        let prerenders = classify(&manifest, &routes, &lambdas(&["about", "index"])).unwrap();

        let keys: Vec<&str> = prerenders.iter().map(|(k, _)| k).collect();
        assert_eq!(
            vec![
                "en/about",
                "_next/data/b1/en/about.json",
                "fr/about",
                "_next/data/b1/fr/about.json",
                "en",
                "_next/data/b1/en.json",
                "fr",
                "_next/data/b1/fr.json",
            ],
            keys
        );

        let fr = prerenders.entry("fr/about").unwrap();
        assert_eq!(Some("fr".to_string()), fr.locale);
        assert_eq!(Some(".next/server/pages/fr/about.html".to_string()), fr.fallback);
        assert_eq!("bundle-about", fr.lambda);
        assert_eq!(Some(vec![]), fr.allow_query);

        let groups: Vec<u32> = prerenders
            .iter()
            .filter_map(|(_, o)| o.as_prerender())
            .map(|e| e.group)
            .collect();
        assert_eq!(vec![1, 1, 2, 2, 3, 3, 4, 4], groups);
    }

    #[test]
    fn blocking_routes_get_a_group_per_locale() {
        let manifest = manifest(
            r#"{ "version": 3, "routes": {}, "dynamicRoutes": {
                "/blog/[slug]": { "routeRegex": "^/blog/([^/]+?)(?:/)?$", "fallback": null,
                                  "dataRoute": "/_next/data/b1/blog/[slug].json" } } }"#,
        );
        let routes = routes(true);
        let prerenders = classify(&manifest, &routes, &lambdas(&["blog/[slug]"])).unwrap();

        let expect = [
            ("blog/[slug]", None, 1),
            ("en/blog/[slug]", Some("en"), 2),
            ("fr/blog/[slug]", Some("fr"), 3),
        ];
        for (key, locale, group) in expect {
            let entry = prerenders.entry(key).unwrap_or_else(|| panic!("{key} missing"));
            assert_eq!(PrerenderState::BlockingFallback, entry.state);
            assert_eq!(None, entry.fallback);
            assert_eq!(locale.map(str::to_string), entry.locale);
            assert_eq!(group, entry.group);
            // dynamic route without named keys: any query
            assert_eq!(None, entry.allow_query);
        }
        assert_eq!(2, prerenders.entry("_next/data/b1/en/blog/[slug].json").unwrap().group);
        assert_eq!(Revalidate::After(1), prerenders.entry("blog/[slug]").unwrap().expiration);
    }

    #[test]
    fn fallback_routes_use_their_fallback_page() {
        let manifest = manifest(
            r#"{ "version": 3, "routes": {}, "dynamicRoutes": {
                "/blog/[slug]": { "routeRegex": "^/blog/([^/]+?)(?:/)?$",
                                  "fallback": "/blog/[slug].html",
                                  "dataRoute": "/_next/data/b1/blog/[slug].json" } } }"#,
        );
        let routes = routes(false);
        let prerenders = classify(&manifest, &routes, &lambdas(&["blog/[slug]"])).unwrap();

        let page = prerenders.entry("blog/[slug]").unwrap();
        assert_eq!(PrerenderState::Fallback, page.state);
        assert_eq!(Some(".next/server/pages/blog/[slug].html".to_string()), page.fallback);
        assert_eq!(None, prerenders.entry("_next/data/b1/blog/[slug].json").unwrap().fallback);
    }

    #[rstest]
    #[case::preview_mode(true, false)]
    #[case::no_preview_mode(false, true)]
    fn static_output_without_preview_mode(#[case] preview: bool, #[case] expect_static: bool) {
        let manifest = manifest(
            r#"{ "version": 3, "routes": {
                "/about": { "initialRevalidateSeconds": false, "srcRoute": null,
                            "dataRoute": "/_next/data/b1/about.json" } } }"#,
        );
        let routes = routes(false);
        let lambdas = lambdas(&["about"]);
        let prerenders = PrerenderClassifier::new(&manifest, &routes, &lambdas, PAGES_DIR)
            .preview_mode(preview)
            .classify()
            .unwrap();

        match prerenders.get("about").unwrap() {
            Output::Static { file, .. } => {
                assert!(expect_static);
                assert_eq!(".next/server/pages/about.html", file);
            }
            Output::Prerender(entry) => {
                assert!(!expect_static);
                assert_eq!(PrerenderState::Static, entry.state);
            }
            Output::Lambda { .. } => panic!("unexpected lambda"),
        }
    }

    #[test]
    fn static_404_needs_no_bundle() {
        let manifest = manifest(
            r#"{ "version": 3, "routes": {
                "/404": { "initialRevalidateSeconds": false, "srcRoute": null,
                          "dataRoute": "/_next/data/b1/404.json" } } }"#,
        );
        let prerenders = classify(&manifest, &routes(false), &lambdas(&[])).unwrap();
        assert!(matches!(prerenders.get("404"), Some(Output::Static { .. })));
    }

    #[test]
    fn omitted_routes_need_preview_mode_and_404() {
        let json = r#"{ "version": 3, "routes": {}, "dynamicRoutes": {
            "/blog/[slug]": { "routeRegex": "^/blog/([^/]+?)(?:/)?$", "fallback": false,
                              "dataRoute": "/_next/data/b1/blog/[slug].json" } } }"#;
        let manifest = manifest(json);
        let routes = routes(false);
        let lambdas = lambdas(&["blog/[slug]"]);

        let prerenders = classify(&manifest, &routes, &lambdas).unwrap();
        let entry = prerenders.entry("blog/[slug]").unwrap();
        assert_eq!(PrerenderState::Omitted, entry.state);
        assert_eq!(Some("/blog/[slug]".to_string()), entry.src_route);
        assert_eq!(Some(".next/server/pages/404.html".to_string()), entry.fallback);

        let without_404 = PrerenderClassifier::new(&manifest, &routes, &lambdas, PAGES_DIR)
            .classify()
            .unwrap();
        assert!(without_404.is_empty());
    }

    #[test]
    fn not_found_routes_are_left_to_the_error_routes() {
        let manifest = manifest(
            r#"{ "version": 3, "notFoundRoutes": ["/gone"], "routes": {
                "/gone": { "initialRevalidateSeconds": false, "srcRoute": null,
                           "dataRoute": "/_next/data/b1/gone.json" },
                "/stale": { "initialRevalidateSeconds": 5, "srcRoute": null,
                            "dataRoute": "/_next/data/b1/stale.json" } } }"#,
        );
        let routes = routes(false);
        let lambdas = lambdas(&["gone", "stale"]);
        let prerenders = PrerenderClassifier::new(&manifest, &routes, &lambdas, PAGES_DIR)
            .preview_mode(false)
            .classify()
            .unwrap();
        assert!(prerenders.get("gone").is_none());
        assert!(prerenders.entry("stale").is_some());

        // With preview mode the not-found page can be revalidated on demand.
        let prerenders = classify(&manifest, &routes, &lambdas).unwrap();
        assert_eq!(PrerenderState::NotFound, prerenders.entry("gone").unwrap().state);
    }

    #[test]
    fn conflicting_routes_are_rejected() {
        let mut manifest = manifest(
            r#"{ "version": 3, "routes": {}, "dynamicRoutes": {
                "/[id]": { "routeRegex": "^/([^/]+?)(?:/)?$", "fallback": "/[id].html" } } }"#,
        );
        let lazy = manifest.fallback_routes["/[id]"].clone();
        manifest.blocking_fallback_routes.insert("/[id]".into(), lazy.clone());
        let err = classify(&manifest, &routes(false), &lambdas(&["[id]"])).unwrap_err();
        assert_eq!("NEXT_ISBLOCKING_ISFALLBACK", err.code());

        manifest.blocking_fallback_routes.clear();
        manifest.omitted_routes.insert("/[id]".into(), lazy);
        let err = classify(&manifest, &routes(false), &lambdas(&["[id]"])).unwrap_err();
        assert_eq!("NEXT_ISOMITTED_ISFALLBACK", err.code());
    }

    #[test]
    fn pages_rendered_through_the_manifest() {
        let manifest = manifest(
            r#"{ "version": 3, "routes": {
                "/en/about": { "initialRevalidateSeconds": false, "srcRoute": null },
                "/blog/hello": { "initialRevalidateSeconds": 1, "srcRoute": "/blog/[slug]" }
              }, "dynamicRoutes": {
                "/blog/[slug]": { "routeRegex": "^/blog/([^/]+?)(?:/)?$", "fallback": false },
                "/[id]": { "routeRegex": "^/([^/]+?)(?:/)?$", "fallback": null }
              } }"#,
        );
        let i18n = I18n {
            locales: vec!["en".into(), "fr".into()],
            default_locale: "en".into(),
            locale_detection: None,
        };

        let pages = prerender_pages(&manifest, Some(&i18n), true);
        assert_eq!(
            vec!["/[id]", "/about", "/blog/[slug]"],
            pages.iter().map(String::as_str).collect::<Vec<_>>()
        );
        let pages = prerender_pages(&manifest, Some(&i18n), false);
        assert!(pages.contains("/blog/[slug]"));
        assert!(!pages.contains("/blog/hello"));
    }

    #[rstest]
    #[case::prefixed("/fr/about", Some("fr"), "/about")]
    #[case::root("/fr", Some("fr"), "/")]
    #[case::case_insensitive("/FR/x", Some("fr"), "/x")]
    #[case::none("/about", None, "/about")]
    fn locale_paths(#[case] path: &str, #[case] locale: Option<&str>, #[case] rest: &str) {
        let locales = vec!["en".to_string(), "fr".to_string()];
        assert_eq!(
            (locale.map(str::to_string), rest.to_string()),
            normalize_locale_path(path, &locales)
        );
    }

    #[test]
    fn locale_or_default() {
        let i18n = I18n {
            locales: vec!["en".into(), "fr".into()],
            default_locale: "en".into(),
            locale_detection: None,
        };
        assert_eq!("/en/a", add_locale_or_default("/a", Some(&i18n), None));
        assert_eq!("/fr", add_locale_or_default("/index", Some(&i18n), Some("fr")));
        assert_eq!("/a", add_locale_or_default("/a", None, Some("fr")));
    }
}
