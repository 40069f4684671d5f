mod cli;
mod logger;

use anyhow::Result;
use tracing::{error, info};

fn main() -> Result<()> {
    let cli = cli::parse();
    logger::init(cli.log_level())?;
    info!(args = ?std::env::args().collect::<Vec<_>>(), "agentbox start");

    match cli::run(cli) {
        Ok(result) => {
            info!("agentbox finished successfully");
            Ok(result)
        }
        Err(err) => {
            error!(error = ?err, "agentbox failed");
            Err(err)
        }
    }
}
