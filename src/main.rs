#[tokio::main]
async fn main() -> anyhow::Result<()> {
    opnfleet::bootstrapper::run().await
}
