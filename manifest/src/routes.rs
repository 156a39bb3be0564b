use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::version::{parse_versioned, ManifestVersion};
use crate::{Error, ROUTES_MANIFEST};

/// A request predicate attached to redirects, rewrites and headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Has {
    Header {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    Cookie {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    Query {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    Host {
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    pub source: String,
    pub destination: String,
    pub regex: String,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub permanent: Option<bool>,
    /// Framework-generated (trailing slash handling) rather than user-authored.
    #[serde(default)]
    pub internal: bool,
    #[serde(default)]
    pub locale: Option<bool>,
    #[serde(default)]
    pub has: Vec<Has>,
    #[serde(default)]
    pub missing: Vec<Has>,
}

impl Redirect {
    pub fn status(&self) -> u16 {
        match (self.status_code, self.permanent) {
            (Some(code), _) => code,
            (None, Some(true)) => 308,
            (None, _) => 307,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rewrite {
    pub source: String,
    pub destination: String,
    pub regex: String,
    #[serde(default)]
    pub has: Vec<Has>,
    #[serde(default)]
    pub missing: Vec<Has>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderRule {
    pub source: String,
    pub regex: String,
    pub headers: Vec<Header>,
    #[serde(default)]
    pub has: Vec<Has>,
    #[serde(default)]
    pub missing: Vec<Has>,
}

/// A page matched by a regex. Used for both dynamic and static routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicRoute {
    pub page: String,
    pub regex: String,
    #[serde(default)]
    pub named_regex: Option<String>,
    /// Named capture group -> query parameter.
    #[serde(default)]
    pub route_keys: Option<IndexMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRoute {
    pub page: String,
    pub data_route_regex: String,
    #[serde(default)]
    pub named_data_route_regex: Option<String>,
    #[serde(default)]
    pub route_keys: Option<IndexMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct I18n {
    pub locales: Vec<String>,
    pub default_locale: String,
    #[serde(default)]
    pub locale_detection: Option<bool>,
}

impl I18n {
    pub fn detects_locale(&self) -> bool {
        self.locale_detection != Some(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rewrites {
    #[serde(default)]
    pub before_files: Vec<Rewrite>,
    #[serde(default)]
    pub after_files: Vec<Rewrite>,
    #[serde(default)]
    pub fallback: Vec<Rewrite>,
}

/// Fields every routes-manifest version shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutesCommon {
    #[serde(default)]
    pub base_path: String,
    #[serde(default)]
    pub pages404: bool,
    #[serde(default)]
    pub redirects: Vec<Redirect>,
    #[serde(default)]
    pub headers: Vec<HeaderRule>,
    #[serde(default)]
    pub dynamic_routes: Vec<DynamicRoute>,
    #[serde(default)]
    pub static_routes: Vec<DynamicRoute>,
    #[serde(default)]
    pub data_routes: Vec<DataRoute>,
    #[serde(default)]
    pub i18n: Option<I18n>,
    #[serde(default)]
    pub case_sensitive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RewritesV3 {
    List(Vec<Rewrite>),
    Phased(Rewrites),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoutesManifest {
    V1 {
        version: ManifestVersion<1>,
        #[serde(default)]
        rewrites: Vec<Rewrite>,
        #[serde(flatten)]
        common: RoutesCommon,
    },
    V2 {
        version: ManifestVersion<2>,
        #[serde(default)]
        rewrites: Vec<Rewrite>,
        #[serde(flatten)]
        common: RoutesCommon,
    },
    V3 {
        version: ManifestVersion<3>,
        #[serde(default = "empty_rewrites")]
        rewrites: RewritesV3,
        #[serde(flatten)]
        common: RoutesCommon,
    },
}

fn empty_rewrites() -> RewritesV3 {
    RewritesV3::List(vec![])
}

impl RoutesManifest {
    pub fn from_slice(data: &[u8]) -> Result<Self, Error> {
        parse_versioned(ROUTES_MANIFEST, &[1, 2, 3], data)
    }

    pub fn version(&self) -> u8 {
        match self {
            RoutesManifest::V1 { .. } => 1,
            RoutesManifest::V2 { .. } => 2,
            RoutesManifest::V3 { .. } => 3,
        }
    }

    /// Normalizes into the version-independent [Routes].
    /// Unphased rewrite lists are treated as `afterFiles` rewrites.
    pub fn into_routes(self) -> Routes {
        let version = self.version();
        let (rewrites, common) = match self {
            RoutesManifest::V1 {
                rewrites, common, ..
            }
            | RoutesManifest::V2 {
                rewrites, common, ..
            } => (
                Rewrites {
                    after_files: rewrites,
                    ..Default::default()
                },
                common,
            ),
            RoutesManifest::V3 {
                rewrites, common, ..
            } => match rewrites {
                RewritesV3::Phased(rewrites) => (rewrites, common),
                RewritesV3::List(after_files) => (
                    Rewrites {
                        after_files,
                        ..Default::default()
                    },
                    common,
                ),
            },
        };

        Routes {
            version,
            rewrites,
            common,
        }
    }
}

/// A parsed routes manifest of any supported version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routes {
    pub version: u8,
    pub rewrites: Rewrites,
    pub common: RoutesCommon,
}

impl Routes {
    pub fn from_slice(data: &[u8]) -> Result<Self, Error> {
        Ok(RoutesManifest::from_slice(data)?.into_routes())
    }

    pub fn base_path(&self) -> &str {
        &self.common.base_path
    }

    pub fn i18n(&self) -> Option<&I18n> {
        self.common.i18n.as_ref()
    }

    pub fn dynamic_route(&self, page: &str) -> Option<&DynamicRoute> {
        self.common.dynamic_routes.iter().find(|r| r.page == page)
    }
}

/// Keeps only the `dynamicRoutes` and `staticRoutes` entries of a serialized
/// routes manifest whose page satisfies `keep`. Every other key, including
/// the ones [RoutesManifest] doesn't model, is written back untouched.
pub fn retain_route_pages(data: &[u8], keep: impl Fn(&str) -> bool) -> Result<Vec<u8>, Error> {
    let json = |source: serde_json::Error| Error::Json {
        manifest: ROUTES_MANIFEST,
        source,
    };

    let mut manifest: serde_json::Map<String, Value> = serde_json::from_slice(data).map_err(json)?;
    for key in ["dynamicRoutes", "staticRoutes"] {
        if let Some(Value::Array(entries)) = manifest.get_mut(key) {
            entries.retain(|entry| entry.get("page").and_then(Value::as_str).is_some_and(&keep));
        }
    }
    serde_json::to_vec(&manifest).map_err(json)
}
