use anyhow::Result;
use ratchet::cli::run_cli;
use tracing::error;

#[tokio::main]
async fn main() -> Result<()> {
    run_cli()
        .await
        .inspect_err(|e| error!("Command failed {e:?}"))
}
