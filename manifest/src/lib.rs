//! Versioned framework manifests.
//!
//! Each manifest is parsed into a tagged union over its known schema
//! versions (see [RoutesManifest], [PrerenderManifest] and
//! [RequiredServerFiles]) and then normalized into a single
//! version-independent shape. Unknown versions are rejected with
//! [Error::UnsupportedVersion] before any of the payload is interpreted.

mod errors;
mod pages;
mod prerender;
mod routes;
mod server_files;
mod version;

pub use errors::Error;
pub use pages::PagesManifest;
pub use prerender::{
    LazyRoute, PrerenderCommon, PrerenderManifest, PrerenderedRoutes, Revalidate, StaticRoute,
};
pub use routes::{
    retain_route_pages, DataRoute, DynamicRoute, Has, Header, HeaderRule, I18n, Redirect, Rewrite,
    Rewrites, RewritesV3, Routes, RoutesCommon, RoutesManifest,
};
pub use server_files::{RequiredServerFiles, ServerFilesConfig};
pub use version::ManifestVersion;

pub const ROUTES_MANIFEST: &str = "routes-manifest.json";
pub const PRERENDER_MANIFEST: &str = "prerender-manifest.json";
pub const REQUIRED_SERVER_FILES: &str = "required-server-files.json";
pub const PAGES_MANIFEST: &str = "server/pages-manifest.json";
pub const APP_PATHS_MANIFEST: &str = "server/app-paths-manifest.json";
