use clap::Parser;
use hub_relayer::cli::{Commands, RelayerCli};
use hub_relayer::observability::init_subscriber;
use tracing::info;

fn main() -> anyhow::Result<()> {
    let cli = RelayerCli::parse();
    match cli.command {
        Commands::Check(args) => {
            init_subscriber()?;
            let contents = std::fs::read_to_string(&args.config)?;
            let config = hub_relayer_core::parse_config(&contents)?;
            info!(
                header_sync_sections = config.header_sync.len(),
                submitter = config.submitter.is_some(),
                listener = config.listener.is_some(),
                "configuration is valid"
            );
            Ok(())
        }
    }
}
