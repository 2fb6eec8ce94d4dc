use eyre::Result;
use structopt::StructOpt;
use tracing::metadata::LevelFilter;
use tracing_subscriber::EnvFilter;

use oblivrec_party::{run, PartyConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = PartyConfig::from_args();
    run(config).await?;
    Ok(())
}
