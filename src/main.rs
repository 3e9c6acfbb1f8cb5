#[tokio::main]
async fn main() -> anyhow::Result<()> {
    knob_joiner::run().await
}
