use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Why the tracer included a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasonKind {
    Initial,
    Resolve,
    Dependency,
    Asset,
    SharedlibEmit,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reason {
    #[serde(rename = "type", default)]
    pub kinds: Vec<ReasonKind>,
    #[serde(default)]
    pub parents: BTreeSet<String>,
}

/// file -> the files that required it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReasonGraph(pub BTreeMap<String, Reason>);

impl ReasonGraph {
    pub fn get(&self, path: &str) -> Option<&Reason> {
        self.0.get(path)
    }

    /// Inverts the graph: for every file that has a parent, records it under
    /// each of its ancestors, transitively. Cycles are cut by a per-file
    /// seen-set. Initial entries without parents are skipped.
    pub fn files_by_parent<'a>(
        &self,
        files: impl IntoIterator<Item = &'a String>,
    ) -> BTreeMap<String, BTreeSet<String>> {
        let mut by_parent: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for file in files {
            let Some(reason) = self.0.get(file) else {
                continue;
            };
            if reason.parents.is_empty() {
                continue;
            }

            let mut seen = BTreeSet::new();
            let mut pending: Vec<&String> = reason.parents.iter().collect();
            while let Some(parent) = pending.pop() {
                if !seen.insert(parent) {
                    continue;
                }
                by_parent
                    .entry(parent.clone())
                    .or_default()
                    .insert(file.clone());
                if let Some(parent_reason) = self.0.get(parent) {
                    pending.extend(parent_reason.parents.iter());
                }
            }
        }

        by_parent
    }
}

/// The output of the dependency tracer for a set of entry modules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    pub file_list: BTreeSet<String>,
    #[serde(default)]
    pub reasons: ReasonGraph,
}

impl Trace {
    /// Maps every file of the trace to its transitive dependents.
    pub fn files_by_parent(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.reasons.files_by_parent(&self.file_list)
    }

    /// All traced files the given entries depend on, transitively. Entries
    /// themselves are not included.
    pub fn dependencies_of<'a>(
        &self,
        by_parent: &BTreeMap<String, BTreeSet<String>>,
        entries: impl IntoIterator<Item = &'a str>,
    ) -> BTreeSet<String> {
        entries
            .into_iter()
            .filter_map(|entry| by_parent.get(entry))
            .flatten()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Reason, ReasonKind, Trace};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn trace() -> Trace {
        serde_json::from_str(
            r#"{
                "fileList": [
                    "pages/a.js", "pages/b.js", "lib/shared.js",
                    "node_modules/x/index.js", "node_modules/x/data.json"
                ],
                "reasons": {
                    "pages/a.js": { "type": ["initial"], "parents": [] },
                    "pages/b.js": { "type": ["initial"], "parents": [] },
                    "lib/shared.js": { "type": ["dependency"], "parents": ["pages/a.js", "pages/b.js"] },
                    "node_modules/x/index.js": { "type": ["dependency"], "parents": ["lib/shared.js"] },
                    "node_modules/x/data.json": { "type": ["asset", "wasm"], "parents": ["node_modules/x/index.js"] }
                }
            }"#,
        )
        .expect("must parse")
    }

    #[test]
    fn parses_reason_kinds() {
        let trace = trace();
        let reason = trace.reasons.get("node_modules/x/data.json").unwrap();
        assert_eq!(vec![ReasonKind::Asset, ReasonKind::Other], reason.kinds);
        assert_eq!(
            vec![ReasonKind::Initial],
            trace.reasons.get("pages/a.js").unwrap().kinds
        );
    }

    #[test]
    fn propagates_to_all_ancestors() {
        let by_parent = trace().files_by_parent();

        let expected = set(&[
            "lib/shared.js",
            "node_modules/x/data.json",
            "node_modules/x/index.js",
        ]);
        assert_eq!(Some(&expected), by_parent.get("pages/a.js"));
        assert_eq!(Some(&expected), by_parent.get("pages/b.js"));
        assert_eq!(
            Some(&set(&["node_modules/x/data.json"])),
            by_parent.get("node_modules/x/index.js")
        );
        assert_eq!(None, by_parent.get("node_modules/x/data.json"));
    }

    #[test]
    fn cycles_terminate() {
        let mut trace = trace();
        // index.js <-> shared.js
        trace
            .reasons
            .0
            .get_mut("lib/shared.js")
            .unwrap()
            .parents
            .insert("node_modules/x/index.js".into());

        let by_parent = trace.files_by_parent();
        assert!(by_parent["lib/shared.js"].contains("lib/shared.js"));
        assert!(by_parent["pages/a.js"].contains("node_modules/x/data.json"));
    }

    #[test]
    fn dependencies_of_unions_entries() {
        let mut trace = trace();
        trace.file_list.insert("pages/c.js".into());
        trace.file_list.insert("lib/only-c.js".into());
        trace.reasons.0.insert(
            "lib/only-c.js".into(),
            Reason {
                kinds: vec![ReasonKind::Dependency],
                parents: set(&["pages/c.js"]),
            },
        );

        let by_parent = trace.files_by_parent();
        assert_eq!(set(&["lib/only-c.js"]), trace.dependencies_of(&by_parent, ["pages/c.js"]));
        assert_eq!(
            4,
            trace
                .dependencies_of(&by_parent, ["pages/a.js", "pages/c.js"])
                .len()
        );
    }
}
