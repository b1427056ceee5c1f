use anyhow::Result;
use clap::Parser;
use permeval::cli::{Command, RootArgs};
use permeval::workflow;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing();

    match args.command {
        Command::Classify(args) => workflow::run_classify(&args),
        Command::Extract(args) => workflow::run_extract(&args),
        Command::Status(args) => workflow::run_status(&args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
