//! The `lambdapack` command: reads a build output from disk, runs the
//! [Pipeline] and writes the result next to it.

use lambdapack_builder::{BuildOutput, Pipeline};
use std::io::Write;
use tracing::{info, instrument, Span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

pub mod args;
mod errors;
mod load;
mod write;

pub use args::Args;
pub use errors::Error;
pub use load::build_input;
pub use write::{write_output, CONFIG_FILE, FUNCTIONS_DIR};

/// Runs a whole build. Relative output paths are resolved against the
/// project root. Size tables go to `diagnostics`.
#[instrument(skip_all, fields(project = %args.project_dir.display(), indicatif.pb_show = 1), err)]
pub async fn run(
    args: &Args,
    diagnostics: impl Write + Send + 'static,
) -> Result<BuildOutput, Error> {
    let span = Span::current();
    span.pb_start();
    span.pb_set_style(&lambdapack_tracing::PB_SPINNER_STYLE);
    span.pb_set_message("Collecting build files…");
    let input = build_input(args).await?;

    span.pb_set_message("Building functions…");
    let (output, bundles) = Pipeline::new(args.build_config())
        .with_diagnostics(diagnostics)
        .run(input)
        .await?;

    span.pb_set_message("Writing output…");
    let dir = args.project_dir.join(&args.output);
    write_output(&dir, &output, &bundles, !args.no_archives).await?;
    info!(
        dir = %dir.display(),
        functions = output.functions.len(),
        outputs = output.outputs.len(),
        "build finished"
    );
    Ok(output)
}
