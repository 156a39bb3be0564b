use lambdapack_layer::{PseudoFile, PseudoLayer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::FunctionConfig;

/// Pages every pages-router bundle needs, whichever page it serves.
pub const INTERNAL_PAGES: [&str; 3] = ["/_app", "/_document", "/_error"];

/// The partition a page is grouped in. Partitions need different launchers
/// and are never mixed in one bundle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum PageKind {
    Page,
    /// App-directory pages and route handlers, served with response streaming.
    App,
    Api,
}

impl PageKind {
    /// Kind of a pages-router entry.
    pub fn of_pages_entry(page: &str) -> Self {
        if page == "/api" || page.starts_with("/api/") {
            PageKind::Api
        } else {
            PageKind::Page
        }
    }

    /// Route served by the page `id` of this kind.
    pub fn route(self, id: &str) -> String {
        match self {
            PageKind::App => app_route(id),
            PageKind::Page | PageKind::Api => id.to_string(),
        }
    }
}

/// A compiled server page, ready for grouping.
#[derive(Debug, Clone)]
pub struct Page {
    /// Page name as listed in the pages (or app-paths) manifest.
    pub id: String,
    pub kind: PageKind,
    /// Build-relative path of the compiled page file.
    pub output_path: String,
    pub output: Arc<PseudoFile>,
    /// Traced dependencies of the compiled page.
    pub layer: PseudoLayer,
    pub function: FunctionConfig,
    pub is_prerender: bool,
}

/// `/dashboard/page` -> `/dashboard`, `/page` -> `/`.
fn app_route(id: &str) -> String {
    let route = id
        .strip_suffix("/page")
        .or_else(|| id.strip_suffix("/route"))
        .unwrap_or(id);
    if route.is_empty() {
        "/".to_string()
    } else {
        route.to_string()
    }
}

/// Key of `route` in the output map, under `base_path`. Index routes drop
/// their `/index` unless nothing else is left.
pub fn output_key(base_path: &str, route: &str) -> String {
    let route = match route {
        "/" | "" => "/index",
        route => route,
    };
    let path = format!("{base_path}{route}");
    let path = match path.strip_suffix("/index") {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => path.as_str(),
    };
    path.trim_start_matches('/').to_string()
}

/// Whether any segment of `route` is a `[param]`.
pub fn is_dynamic(route: &str) -> bool {
    route
        .split('/')
        .any(|segment| segment.len() > 2 && segment.starts_with('[') && segment.ends_with(']'))
}

#[cfg(test)]
mod tests {
    use super::{app_route, is_dynamic, output_key, PageKind};
    use rstest::rstest;

    #[rstest]
    #[case::index("", "/", "index")]
    #[case::index_file("", "/index", "index")]
    #[case::base_index("/docs", "/", "docs")]
    #[case::base_page("/docs", "/en/about", "docs/en/about")]
    #[case::data("", "/_next/data/b1/index.json", "_next/data/b1/index.json")]
    fn output_keys(#[case] base: &str, #[case] route: &str, #[case] expected: &str) {
        assert_eq!(expected, output_key(base, route));
    }

    #[rstest]
    #[case::root("/page", "/")]
    #[case::page("/dashboard/page", "/dashboard")]
    #[case::handler("/api/hello/route", "/api/hello")]
    fn app_routes(#[case] id: &str, #[case] expected: &str) {
        assert_eq!(expected, app_route(id));
    }

    #[rstest]
    #[case::param("/blog/[slug]", true)]
    #[case::catch_all("/docs/[...path]", true)]
    #[case::optional("/[[...all]]", true)]
    #[case::plain("/about", false)]
    #[case::bracket_in_name("/a[b", false)]
    fn dynamic_routes(#[case] route: &str, #[case] expected: bool) {
        assert_eq!(expected, is_dynamic(route));
    }

    #[test]
    fn api_kind() {
        assert_eq!(PageKind::Api, PageKind::of_pages_entry("/api"));
        assert_eq!(PageKind::Api, PageKind::of_pages_entry("/api/users/[id]"));
        assert_eq!(PageKind::Page, PageKind::of_pages_entry("/apiary"));
    }
}
