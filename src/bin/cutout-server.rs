//! Cutout background removal server
//!
//! Serves `POST /cutout` with a precise (RMBG-1.4) and a fast (U2Net) backend.

use cutout::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}
