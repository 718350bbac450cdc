// src/main.rs

use tasktree::{DoneWith, cli, logging, run};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    match run_main().await {
        Ok(DoneWith::Success) => {}
        Ok(result) => {
            eprintln!("tasktree: run finished with {result}");
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("tasktree error: {err:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<DoneWith> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
