use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{Error, PAGES_MANIFEST};

/// Page -> compiled file, relative to the server output directory.
/// The same shape is used for the app-paths manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PagesManifest(pub IndexMap<String, String>);

impl PagesManifest {
    pub fn from_slice(data: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(data).map_err(|source| Error::Json {
            manifest: PAGES_MANIFEST,
            source,
        })
    }

    pub fn get(&self, page: &str) -> Option<&str> {
        self.0.get(page).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Drops dynamic pages (`[param]` segments) for which `keep` is false.
    /// Static pages are always kept.
    pub fn retain_dynamic(&mut self, keep: impl Fn(&str) -> bool) {
        self.0.retain(|page, _| !is_dynamic(page) || keep(page));
    }
}

fn is_dynamic(page: &str) -> bool {
    page.contains('[') && page.contains(']')
}

#[cfg(test)]
mod tests {
    use super::PagesManifest;

    #[test]
    fn retain_dynamic_keeps_static_pages() {
        let mut manifest = PagesManifest::from_slice(
            br#"{
                "/_app": "pages/_app.js",
                "/about": "pages/about.html",
                "/[id]": "pages/[id].js",
                "/blog/[...slug]": "pages/blog/[...slug].js"
            }"#,
        )
        .unwrap();

        manifest.retain_dynamic(|page| page == "/[id]");

        assert_eq!(
            vec!["/_app", "/about", "/[id]"],
            manifest.iter().map(|(page, _)| page).collect::<Vec<_>>()
        );
    }
}
