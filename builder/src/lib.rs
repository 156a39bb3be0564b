//! Turns a framework build output into function bundles and a routing table.
//!
//! The [Pipeline] drives everything: it parses the manifests, builds the
//! shared and per-page [PseudoLayer](lambdapack_layer::PseudoLayer)s, groups
//! pages into [LambdaGroup]s under the size [Budget], materializes one
//! [LambdaBundle] per group, classifies prerendered routes and finally
//! synthesizes the phase-ordered [RouteTable].

pub mod archive;
mod config;
pub mod diagnostics;
mod errors;
pub mod group;
pub mod materialize;
pub mod output;
pub mod page;
pub mod pipeline;
pub mod prerender;
pub mod routes;

#[cfg(test)]
mod fixtures;

pub use config::{BuildConfig, FunctionConfig, ProjectConfig};
pub use errors::Error;
pub use group::{Budget, LambdaGroup};
pub use materialize::{BundleFile, LambdaBundle, Materializer, OperationType};
pub use output::{BuildOutput, Output};
pub use page::{Page, PageKind};
pub use pipeline::{BuildInput, Pipeline};
pub use prerender::{PrerenderClassifier, PrerenderEntry, PrerenderState, Prerenders};
pub use routes::{Phase, Route, RouteRule, RouteTable, RouteTableBuilder};

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
