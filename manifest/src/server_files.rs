use serde::{Deserialize, Serialize};

use crate::version::{parse_versioned, ManifestVersion};
use crate::{Error, REQUIRED_SERVER_FILES};

/// The subset of the framework's runtime config the packager cares about.
/// Everything else is carried through untouched in `rest`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerFilesConfig {
    #[serde(default)]
    pub dist_dir: Option<String>,
    #[serde(default)]
    pub trailing_slash: bool,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequiredServerFiles {
    V1 {
        version: ManifestVersion<1>,
        #[serde(default)]
        config: ServerFilesConfig,
        #[serde(rename = "appDir")]
        app_dir: String,
        /// Build-output-relative files every bundle needs.
        files: Vec<String>,
        #[serde(default)]
        ignore: Vec<String>,
    },
}

impl RequiredServerFiles {
    pub fn from_slice(data: &[u8]) -> Result<Self, Error> {
        parse_versioned(REQUIRED_SERVER_FILES, &[1], data)
    }

    pub fn files(&self) -> &[String] {
        match self {
            RequiredServerFiles::V1 { files, .. } => files,
        }
    }

    pub fn ignore(&self) -> &[String] {
        match self {
            RequiredServerFiles::V1 { ignore, .. } => ignore,
        }
    }

    pub fn config(&self) -> &ServerFilesConfig {
        match self {
            RequiredServerFiles::V1 { config, .. } => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RequiredServerFiles;
    use crate::Error;

    #[test]
    fn parses_v1() {
        let data = br#"{
            "version": 1,
            "config": { "distDir": ".next", "trailingSlash": true, "poweredByHeader": false },
            "appDir": "/work/app",
            "files": [".next/routes-manifest.json", ".next/BUILD_ID"],
            "ignore": ["node_modules/next/dist/compiled/@ampproject/toolbox-optimizer/**/*"]
        }"#;
        let files = RequiredServerFiles::from_slice(data).expect("must parse");

        assert_eq!(2, files.files().len());
        assert_eq!(1, files.ignore().len());
        assert!(files.config().trailing_slash);
        assert_eq!(Some(".next"), files.config().dist_dir.as_deref());
        assert_eq!(
            Some(&serde_json::Value::Bool(false)),
            files.config().rest.get("poweredByHeader")
        );
    }

    #[test]
    fn rejects_v2() {
        let err = RequiredServerFiles::from_slice(br#"{ "version": 2, "files": [] }"#)
            .expect_err("must fail");
        assert!(matches!(err, Error::UnsupportedVersion { .. }));
    }
}
