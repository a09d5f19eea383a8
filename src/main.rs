//! dashtap CLI entry point.

use dashtap::cli::{self, Cli};
use dashtap::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli::execute(cli).await
}
