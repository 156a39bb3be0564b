use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::version::{parse_versioned, ManifestVersion};
use crate::{Error, PRERENDER_MANIFEST};

/// Revalidation interval of a prerendered route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRevalidate", into = "RawRevalidate")]
pub enum Revalidate {
    /// Rendered once at build time (`false`).
    Never,
    After(u32),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawRevalidate {
    Flag(bool),
    Seconds(u32),
}

#[derive(Debug, thiserror::Error)]
#[error("revalidate must be false or a number of seconds")]
struct RevalidateTrue;

impl TryFrom<RawRevalidate> for Revalidate {
    type Error = RevalidateTrue;

    fn try_from(value: RawRevalidate) -> Result<Self, Self::Error> {
        match value {
            RawRevalidate::Flag(false) => Ok(Revalidate::Never),
            RawRevalidate::Flag(true) => Err(RevalidateTrue),
            RawRevalidate::Seconds(seconds) => Ok(Revalidate::After(seconds)),
        }
    }
}

impl From<Revalidate> for RawRevalidate {
    fn from(value: Revalidate) -> Self {
        match value {
            Revalidate::Never => RawRevalidate::Flag(false),
            Revalidate::After(seconds) => RawRevalidate::Seconds(seconds),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRoute {
    initial_revalidate_seconds: Revalidate,
    #[serde(default)]
    src_route: Option<String>,
    #[serde(default)]
    data_route: Option<String>,
    #[serde(default)]
    initial_status: Option<u16>,
    #[serde(default)]
    initial_headers: IndexMap<String, String>,
}

/// `fallback` of a dynamic route: a fallback page, or `false`.
/// `null` (blocking) is represented by the surrounding `Option`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum RawFallback {
    Page(String),
    Flag(bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDynamicRoute {
    route_regex: String,
    #[serde(default)]
    fallback: Option<RawFallback>,
    #[serde(default)]
    data_route: Option<String>,
    #[serde(default)]
    data_route_regex: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Preview {
    preview_mode_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrerenderCommon {
    #[serde(default)]
    routes: IndexMap<String, RawRoute>,
    #[serde(default)]
    dynamic_routes: IndexMap<String, RawDynamicRoute>,
    #[serde(default)]
    not_found_routes: Vec<String>,
    #[serde(default)]
    preview: Option<Preview>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrerenderManifest {
    V1 {
        version: ManifestVersion<1>,
        #[serde(flatten)]
        common: PrerenderCommon,
    },
    V2 {
        version: ManifestVersion<2>,
        #[serde(flatten)]
        common: PrerenderCommon,
    },
    V3 {
        version: ManifestVersion<3>,
        #[serde(flatten)]
        common: PrerenderCommon,
    },
    V4 {
        version: ManifestVersion<4>,
        #[serde(flatten)]
        common: PrerenderCommon,
    },
}

/// A route rendered at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticRoute {
    pub initial_revalidate: Revalidate,
    pub src_route: Option<String>,
    pub data_route: Option<String>,
    pub initial_status: Option<u16>,
    pub initial_headers: IndexMap<String, String>,
}

/// A dynamic route whose concrete paths are rendered on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LazyRoute {
    pub route_regex: String,
    /// The fallback page served while rendering, for fallback routes.
    pub fallback: Option<String>,
    pub data_route: Option<String>,
    pub data_route_regex: Option<String>,
}

/// Version-independent view of the prerender manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrerenderedRoutes {
    pub bypass_token: Option<String>,
    pub static_routes: IndexMap<String, StaticRoute>,
    pub blocking_fallback_routes: IndexMap<String, LazyRoute>,
    pub fallback_routes: IndexMap<String, LazyRoute>,
    pub omitted_routes: IndexMap<String, LazyRoute>,
    pub not_found_routes: Vec<String>,
    /// Route keys already carry their locale prefix.
    pub is_locale_prefixed: bool,
}

impl PrerenderManifest {
    pub fn from_slice(data: &[u8]) -> Result<Self, Error> {
        parse_versioned(PRERENDER_MANIFEST, &[1, 2, 3, 4], data)
    }

    pub fn version(&self) -> u8 {
        match self {
            PrerenderManifest::V1 { .. } => 1,
            PrerenderManifest::V2 { .. } => 2,
            PrerenderManifest::V3 { .. } => 3,
            PrerenderManifest::V4 { .. } => 4,
        }
    }

    pub fn into_routes(self) -> PrerenderedRoutes {
        let version = self.version();
        let common = match self {
            PrerenderManifest::V1 { common, .. }
            | PrerenderManifest::V2 { common, .. }
            | PrerenderManifest::V3 { common, .. }
            | PrerenderManifest::V4 { common, .. } => common,
        };

        let mut out = PrerenderedRoutes {
            // v1 predates preview mode.
            bypass_token: match version {
                1 => None,
                _ => common.preview.map(|p| p.preview_mode_id),
            },
            not_found_routes: match version {
                1 | 2 => vec![],
                _ => common.not_found_routes,
            },
            is_locale_prefixed: version > 2,
            ..Default::default()
        };

        for (route, raw) in common.routes {
            out.static_routes.insert(
                route,
                StaticRoute {
                    initial_revalidate: match raw.initial_revalidate_seconds {
                        Revalidate::Never => Revalidate::Never,
                        Revalidate::After(seconds) => Revalidate::After(seconds.max(1)),
                    },
                    src_route: raw.src_route,
                    data_route: raw.data_route,
                    initial_status: raw.initial_status,
                    initial_headers: raw.initial_headers,
                },
            );
        }

        for (route, raw) in common.dynamic_routes {
            let mut lazy = LazyRoute {
                route_regex: raw.route_regex,
                fallback: None,
                data_route: raw.data_route,
                data_route_regex: raw.data_route_regex,
            };
            match (version, raw.fallback) {
                (_, Some(RawFallback::Page(page))) => {
                    lazy.fallback = Some(page);
                    out.fallback_routes.insert(route, lazy);
                }
                // v1 has no omitted routes: anything without a page blocks.
                (1, _) | (_, None) => {
                    out.blocking_fallback_routes.insert(route, lazy);
                }
                (_, Some(RawFallback::Flag(_))) => {
                    out.omitted_routes.insert(route, lazy);
                }
            }
        }

        out
    }
}

impl PrerenderedRoutes {
    pub fn from_slice(data: &[u8]) -> Result<Self, Error> {
        Ok(PrerenderManifest::from_slice(data)?.into_routes())
    }
}
