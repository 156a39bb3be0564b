//! The build's result: every output path and what serves it, the routing
//! table and the functions it references.

use indexmap::IndexMap;
use serde::Serialize;

use crate::materialize::OperationType;
use crate::prerender::{PrerenderEntry, Prerenders};
use crate::{Error, LambdaBundle, RouteTable};

pub const HTML: &str = "text/html; charset=utf-8";
pub const JSON: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Output {
    /// A file of the build served as is.
    #[serde(rename_all = "camelCase")]
    Static {
        file: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,
    },
    /// Served by the named function.
    Lambda { bundle: String },
    Prerender(PrerenderEntry),
}

impl Output {
    pub fn static_file(file: impl Into<String>, content_type: Option<&str>) -> Self {
        Output::Static {
            file: file.into(),
            content_type: content_type.map(str::to_string),
        }
    }

    pub fn as_prerender(&self) -> Option<&PrerenderEntry> {
        match self {
            Output::Prerender(entry) => Some(entry),
            Output::Static { .. } | Output::Lambda { .. } => None,
        }
    }
}

/// A function as the deployment sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionEntry {
    pub handler: String,
    pub runtime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<u32>,
    pub operation_type: OperationType,
    pub supports_response_streaming: bool,
    pub pages: Vec<String>,
}

impl From<&LambdaBundle> for FunctionEntry {
    fn from(bundle: &LambdaBundle) -> Self {
        Self {
            handler: bundle.handler.clone(),
            runtime: bundle.runtime.clone(),
            memory: bundle.function.memory,
            max_duration: bundle.function.max_duration,
            operation_type: bundle.operation_type,
            supports_response_streaming: bundle.supports_response_streaming,
            pages: bundle.pages.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildOutput {
    pub version: u8,
    pub routes: RouteTable,
    pub outputs: IndexMap<String, Output>,
    pub functions: IndexMap<String, FunctionEntry>,
}

impl BuildOutput {
    pub fn to_json(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec_pretty(self).map_err(|source| Error::Serialize {
            what: "config.json",
            source,
        })
    }
}

/// Collects outputs. A later output for a path replaces an earlier one, so
/// callers add in increasing priority: static files, lambdas, prerenders.
#[derive(Debug, Default)]
pub struct OutputBuilder {
    outputs: IndexMap<String, Output>,
    functions: IndexMap<String, FunctionEntry>,
}

impl OutputBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_static(&mut self, path: impl Into<String>, output: Output) -> &mut Self {
        self.outputs.insert(path.into(), output);
        self
    }

    /// Publishes `bundle` under each of the given output keys.
    pub fn add_lambda(
        &mut self,
        bundle: &LambdaBundle,
        keys: impl IntoIterator<Item = String>,
    ) -> &mut Self {
        for key in keys {
            self.outputs.insert(
                key,
                Output::Lambda {
                    bundle: bundle.name.clone(),
                },
            );
        }
        self.functions
            .insert(bundle.name.clone(), FunctionEntry::from(bundle));
        self
    }

    pub fn add_prerenders(&mut self, prerenders: Prerenders) -> &mut Self {
        self.outputs.extend(prerenders.into_outputs());
        self
    }

    pub fn finish(self, routes: RouteTable) -> BuildOutput {
        BuildOutput {
            version: 3,
            routes,
            outputs: self.outputs,
            functions: self.functions,
        }
    }
}
