//! Statement ledger HTTP server.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    statement_ledger::server::run().await
}
