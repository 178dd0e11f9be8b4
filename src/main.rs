// src/main.rs

use dagrun::engine::RunOutcome;
use dagrun::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(RunOutcome::Completed) => {}
        Ok(RunOutcome::Failed) => std::process::exit(1),
        Ok(RunOutcome::Cancelled) => std::process::exit(130),
        Err(err) => {
            eprintln!("dagrun error: {err:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> dagrun::errors::Result<RunOutcome> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
