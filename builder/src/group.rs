use lambdapack_layer::PseudoLayer;
use std::collections::BTreeSet;
use tracing::debug;

use crate::{FunctionConfig, Page, PageKind};

/// Compressed and uncompressed size limits of one bundle, each with a
/// reserve kept free for files added after grouping (launcher, manifests).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub compressed: u64,
    pub uncompressed: u64,
    pub compressed_reserve: u64,
    pub uncompressed_reserve: u64,
}

impl Budget {
    pub fn compressed_limit(&self) -> u64 {
        self.compressed.saturating_sub(self.compressed_reserve)
    }

    pub fn uncompressed_limit(&self) -> u64 {
        self.uncompressed.saturating_sub(self.uncompressed_reserve)
    }

    /// Whether a group of the given sizes may still grow to these sizes.
    /// Both limits are exclusive.
    pub fn fits(&self, compressed: u64, uncompressed: u64) -> bool {
        compressed < self.compressed_limit() && uncompressed < self.uncompressed_limit()
    }

    pub fn is_exceeded_by(&self, compressed: u64, uncompressed: u64) -> bool {
        compressed > self.compressed_limit() || uncompressed > self.uncompressed_limit()
    }
}

/// Pages sharing one bundle.
///
/// The layer holds only files not present in the shared initial layer,
/// including the compiled page files themselves. The byte totals include
/// the initial layer.
#[derive(Debug, Clone)]
pub struct LambdaGroup {
    pub pages: Vec<String>,
    pub kind: PageKind,
    pub function: FunctionConfig,
    pub is_prerender_group: bool,
    pub layer: PseudoLayer,
    pub compressed_bytes: u64,
    pub uncompressed_bytes: u64,
}

impl LambdaGroup {
    fn new(page: &Page, initial: &PseudoLayer) -> Self {
        Self {
            pages: vec![],
            kind: page.kind,
            function: page.function,
            is_prerender_group: page.is_prerender,
            layer: PseudoLayer::new(),
            compressed_bytes: initial.compressed_size(),
            uncompressed_bytes: initial.uncompressed_size(),
        }
    }

    pub fn memory(&self) -> Option<u32> {
        self.function.memory
    }

    pub fn max_duration(&self) -> Option<u32> {
        self.function.max_duration
    }

    pub fn is_streaming(&self) -> bool {
        self.kind == PageKind::App
    }

    pub fn is_api(&self) -> bool {
        self.kind == PageKind::Api
    }

    fn accepts(&self, page: &Page) -> bool {
        self.function == page.function && self.is_prerender_group == page.is_prerender
    }

    /// Totals the group would have after adding `pages`, without adding them.
    fn sizes_with(&self, pages: &[&Page], initial: &PseudoLayer) -> (u64, u64) {
        let (mut compressed, mut uncompressed) = (self.compressed_bytes, self.uncompressed_bytes);
        let mut pending = BTreeSet::new();

        for page in pages {
            let own = std::iter::once((page.output_path.as_str(), &page.output));
            for (path, file) in page.layer.iter().chain(own) {
                if initial.contains(path) || self.layer.contains(path) || !pending.insert(path) {
                    continue;
                }
                compressed += file.compressed_size();
                uncompressed += file.uncompressed_size();
            }
        }

        (compressed, uncompressed)
    }

    fn add(&mut self, page: &Page, internal: &[&Page], initial: &PseudoLayer) {
        for p in internal.iter().copied().chain(std::iter::once(page)) {
            let marginal: PseudoLayer = p
                .layer
                .iter()
                .filter(|(path, _)| !initial.contains(path))
                .map(|(path, file)| (path.to_string(), file.clone()))
                .collect();
            self.layer.merge(&marginal);
            // The compiled page isn't part of its own trace, charge it too.
            self.layer.insert(p.output_path.clone(), p.output.clone());
        }

        self.pages.push(page.id.clone());
        self.compressed_bytes = initial.compressed_size() + self.layer.compressed_size();
        self.uncompressed_bytes = initial.uncompressed_size() + self.layer.uncompressed_size();
    }
}

/// Assigns pages to groups, first-fit over groups in creation order.
///
/// Runs once per [PageKind] partition; the resulting lists are concatenated
/// (pages, then app, then API). Input order is preserved within each group.
pub struct GroupingEngine<'a> {
    initial: &'a PseudoLayer,
    internal: Vec<&'a Page>,
    budget: crate::Budget,
}

impl<'a> GroupingEngine<'a> {
    pub fn new(initial: &'a PseudoLayer, budget: crate::Budget) -> Self {
        Self {
            initial,
            internal: vec![],
            budget,
        }
    }

    /// Pages charged to every group of the pages partition.
    pub fn with_internal_pages(mut self, internal: Vec<&'a Page>) -> Self {
        self.internal = internal;
        self
    }

    pub fn group(&self, pages: &[Page]) -> Vec<LambdaGroup> {
        [PageKind::Page, PageKind::App, PageKind::Api]
            .into_iter()
            .flat_map(|kind| {
                let internal: &[&Page] = match kind {
                    PageKind::Page => &self.internal,
                    PageKind::App | PageKind::Api => &[],
                };
                self.group_partition(pages.iter().filter(move |p| p.kind == kind), internal)
            })
            .collect()
    }

    fn group_partition<'p>(
        &self,
        pages: impl Iterator<Item = &'p Page>,
        internal: &[&Page],
    ) -> Vec<LambdaGroup> {
        let mut groups: Vec<LambdaGroup> = Vec::new();

        for page in pages {
            let mut candidates: Vec<&Page> = internal.to_vec();
            candidates.push(page);

            let existing = groups.iter().position(|group| {
                if !group.accepts(page) {
                    return false;
                }
                let (compressed, uncompressed) = group.sizes_with(&candidates, self.initial);
                self.budget.fits(compressed, uncompressed)
            });

            let index = match existing {
                Some(index) => index,
                None => {
                    groups.push(LambdaGroup::new(page, self.initial));
                    groups.len() - 1
                }
            };

            let group = &mut groups[index];
            group.add(page, internal, self.initial);
            debug!(
                page = %page.id,
                group = index,
                compressed = group.compressed_bytes,
                uncompressed = group.uncompressed_bytes,
                "placed page"
            );
        }

        groups
    }
}
