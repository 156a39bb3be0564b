use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::instrument;

use crate::{Error, LayerCache, PseudoFile, PseudoLayer, TracedFile};

/// Turns sets of [TracedFile]s into [PseudoLayer]s.
///
/// Every file holds a permit of a counting semaphore, shared by all layers
/// built through the same builder, from its read until its compression on
/// the blocking pool is done. Pseudo-files are memoized in the build's [LayerCache], so a
/// path requested by several layers is read and compressed once.
#[derive(Debug, Clone)]
pub struct LayerBuilder {
    cache: Arc<LayerCache>,
    io_semaphore: Arc<Semaphore>,
}

impl LayerBuilder {
    pub fn new(cache: Arc<LayerCache>, max_concurrent_io: usize) -> Self {
        Self {
            cache,
            io_semaphore: Arc::new(Semaphore::new(max_concurrent_io.max(1))),
        }
    }

    pub fn cache(&self) -> &LayerCache {
        &self.cache
    }

    /// Builds a layer from `files`, keyed by output-relative path.
    #[instrument(skip_all, fields(files = files.len()), err)]
    pub async fn build_layer(
        &self,
        files: &BTreeMap<String, TracedFile>,
    ) -> Result<PseudoLayer, Error> {
        let entries = futures::future::try_join_all(files.iter().map(|(path, file)| async move {
            let pseudo_file = self.pseudo_file(path, file).await?;
            Ok::<_, Error>((path.clone(), pseudo_file))
        }))
        .await?;

        Ok(entries.into_iter().collect())
    }

    /// Returns the pseudo-file for `path`, building it on first request.
    pub async fn pseudo_file(
        &self,
        path: &str,
        file: &TracedFile,
    ) -> Result<Arc<PseudoFile>, Error> {
        let cell = self.cache.cell(path);
        let pseudo_file = cell
            .get_or_try_init(|| async { self.create(path, file).await.map(Arc::new) })
            .await?;
        Ok(pseudo_file.clone())
    }

    async fn create(&self, path: &str, file: &TracedFile) -> Result<PseudoFile, Error> {
        // Held until the file is compressed: at most `max_concurrent_io`
        // read buffers are alive at once.
        let permit = self.io_semaphore.clone().acquire_owned().await?;

        if file.is_symlink() {
            let target = file
                .read_link()
                .await
                .map_err(|e| Error::UnableToReadLink(path.to_owned(), e))?;
            return Ok(PseudoFile::symlink(file.clone(), target));
        }

        let data = file
            .read()
            .await
            .map_err(|e| Error::UnableToRead(path.to_owned(), e))?;

        let source = file.clone();
        let (compressed, _permit) =
            tokio::task::spawn_blocking(move || (PseudoFile::compress(source, &data), permit))
                .await?;
        compressed.map_err(|e| Error::UnableToCompress(path.to_owned(), e))
    }
}
