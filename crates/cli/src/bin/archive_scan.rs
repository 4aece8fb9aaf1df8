use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    archive_cli::main_entry().await
}
