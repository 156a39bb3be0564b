use serde::{Deserialize, Serialize};

use crate::Error;

/// A manifest `version` field that only deserializes from the value `V`.
/// Used as the discriminant of untagged, per-version manifest enums.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestVersion<const V: u8>;

#[derive(Debug, thiserror::Error)]
#[error("expected manifest version {expected}, got {actual}")]
struct VersionMismatch {
    expected: u8,
    actual: u64,
}

impl<'de, const V: u8> Deserialize<'de> for ManifestVersion<V> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = u64::deserialize(deserializer)?;
        if value == u64::from(V) {
            Ok(ManifestVersion::<V>)
        } else {
            Err(serde::de::Error::custom(VersionMismatch {
                expected: V,
                actual: value,
            }))
        }
    }
}

impl<const V: u8> Serialize for ManifestVersion<V> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(V)
    }
}

#[derive(Deserialize)]
struct VersionField {
    version: Option<serde_json::Value>,
}

/// Parses `data` as `T` after checking that its `version` field is one of
/// `supported`. Untagged version unions otherwise report a useless
/// "did not match any variant" error for unknown versions.
pub(crate) fn parse_versioned<T>(
    manifest: &'static str,
    supported: &[u8],
    data: &[u8],
) -> Result<T, Error>
where
    T: serde::de::DeserializeOwned,
{
    let json = |source| Error::Json { manifest, source };

    let field: VersionField = serde_json::from_slice(data).map_err(json)?;
    let version = field.version.ok_or(Error::MissingVersion { manifest })?;

    let known = version
        .as_u64()
        .is_some_and(|v| supported.iter().any(|s| u64::from(*s) == v));
    if !known {
        return Err(Error::UnsupportedVersion {
            manifest,
            version: version.to_string(),
        });
    }

    serde_json::from_slice(data).map_err(json)
}
