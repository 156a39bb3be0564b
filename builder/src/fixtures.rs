use lambdapack_layer::fixtures::{noise, pseudo_file};
use lambdapack_layer::{PseudoFile, PseudoLayer};
use std::sync::Arc;

use crate::{FunctionConfig, Page, PageKind};

pub fn noise_file(len: u64, seed: u64) -> Arc<PseudoFile> {
    pseudo_file(&noise(len as usize, seed))
}

pub fn output_path(id: &str, kind: PageKind) -> String {
    let id = if id == "/" { "/index" } else { id };
    match kind {
        PageKind::App => format!(".next/server/app{id}.js"),
        PageKind::Page | PageKind::Api => format!(".next/server/pages{id}.js"),
    }
}

pub struct PageSpec {
    id: String,
    kind: PageKind,
    function: FunctionConfig,
    prerender: bool,
    deps: Vec<(String, Arc<PseudoFile>)>,
}

impl PageSpec {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: PageKind::of_pages_entry(id),
            function: FunctionConfig::default(),
            prerender: false,
            deps: vec![],
        }
    }

    pub fn kind(mut self, kind: PageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn function(mut self, function: FunctionConfig) -> Self {
        self.function = function;
        self
    }

    pub fn prerender(mut self) -> Self {
        self.prerender = true;
        self
    }

    pub fn dep(mut self, path: &str, file: Arc<PseudoFile>) -> Self {
        self.deps.push((path.to_string(), file));
        self
    }

    pub fn build(self) -> Page {
        let output = pseudo_file(format!("module.exports = {:?};\n", self.id).as_bytes());
        Page {
            output_path: output_path(&self.id, self.kind),
            output,
            layer: self.deps.into_iter().collect::<PseudoLayer>(),
            kind: self.kind,
            function: self.function,
            is_prerender: self.prerender,
            id: self.id,
        }
    }
}

pub fn page(id: &str, deps: &[(&str, Arc<PseudoFile>)]) -> Page {
    deps.iter()
        .fold(PageSpec::new(id), |spec, (path, file)| spec.dep(path, file.clone()))
        .build()
}
