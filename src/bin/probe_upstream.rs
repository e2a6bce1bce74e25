// Manual check of the configured upstream provider: lists the first page of
// an address and looks up its first transaction by id.
//
//   LOOKUP_MODE=blockcypher cargo run --bin probe_upstream -- <address>

use address_tx_cache::{
    config::Config,
    upstream::{self, UpstreamCursor},
    validate_address,
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let address = std::env::args()
        .nth(1)
        .ok_or("usage: probe_upstream <address>")?;
    validate_address(&address)?;

    let config = Config::from_env();
    let source = upstream::connect(&config)?;

    info!("Listing first page of {} from {}", address, source.name());
    let page = source.transactions(&address, UpstreamCursor::start()).await?;
    info!("Got {} transactions, next cursor {:?}", page.transactions.len(), page.next.position);

    for tx in page.transactions.iter().take(10) {
        info!("  {} height {:?} time {}", tx.txid, tx.blockheight, tx.timestamp);
    }

    if let Some(first) = page.transactions.first() {
        match source.transaction(&first.txid).await? {
            Some(tx) => info!("Lookup of {} ok: {} inputs, {} outputs", tx.txid, tx.vin.len(), tx.vout.len()),
            None => info!("Lookup of {} returned nothing", first.txid),
        }
    }

    Ok(())
}
