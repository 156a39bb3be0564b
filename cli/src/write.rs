use futures::future::try_join_all;
use lambdapack_builder::{archive, BuildOutput, LambdaBundle};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument, Span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::Error;

pub const CONFIG_FILE: &str = "config.json";
pub const FUNCTIONS_DIR: &str = "functions";

fn write_error(path: PathBuf) -> impl FnOnce(std::io::Error) -> Error {
    move |source| Error::Write { path, source }
}

/// Writes `config.json` into `dir` and, if `archives` is set, one
/// `functions/<name>.zip` per bundle.
#[instrument(
    skip_all,
    fields(dir = %dir.display(), bundles = bundles.len(), indicatif.pb_show = 1),
    err
)]
pub async fn write_output(
    dir: &Path,
    output: &BuildOutput,
    bundles: &[LambdaBundle],
    archives: bool,
) -> Result<(), Error> {
    let functions = dir.join(FUNCTIONS_DIR);
    tokio::fs::create_dir_all(&functions)
        .await
        .map_err(write_error(functions.clone()))?;

    let config = dir.join(CONFIG_FILE);
    tokio::fs::write(&config, output.to_json()?)
        .await
        .map_err(write_error(config))?;

    if !archives {
        return Ok(());
    }

    let span = Span::current();
    span.pb_set_style(&lambdapack_tracing::PB_PROGRESS_STYLE);
    span.pb_set_message("Writing function archives");
    span.pb_set_length(bundles.len() as u64);
    span.pb_start();

    try_join_all(bundles.iter().map(|bundle| {
        let path = functions.join(format!("{}.zip", bundle.name));
        let span = &span;
        async move {
            let file = tokio::fs::File::create(&path)
                .await
                .map_err(write_error(path.clone()))?;
            let mut out = BufWriter::new(file);
            let written = archive::write(bundle, &mut out)
                .await
                .map_err(write_error(path.clone()))?;
            out.flush().await.map_err(write_error(path.clone()))?;

            debug!(name = %bundle.name, bytes = written, "wrote function archive");
            span.pb_inc(1);
            Ok::<_, Error>(())
        }
    }))
    .await?;

    Ok(())
}
