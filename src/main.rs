use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    skuflow_cli::cli::run().await
}
