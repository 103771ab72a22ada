// src/main.rs

use pipetree::pipeline::StageRegistry;
use pipetree::{cli, logging, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("pipetree error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;

    // Stage implementations are registered by the embedding application;
    // the bare binary starts from an empty registry.
    let registry = StageRegistry::new();

    let ok = run(args, &registry).await?;
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
