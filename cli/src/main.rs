use clap::Parser;
use lambdapack_cli::Args;
use lambdapack_tracing::TracingBuilder;
use tracing::error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut builder = TracingBuilder::default().level(args.log_level);
    if args.progress {
        builder = builder.enable_progressbar();
    }
    let handle = builder.build()?;

    if let Err(err) = lambdapack_cli::run(&args, handle.get_stderr_writer()).await {
        error!(code = err.code(), %err, "build failed");
        std::process::exit(1);
    }
    Ok(())
}
