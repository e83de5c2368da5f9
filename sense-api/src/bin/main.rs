use clap::Parser;
use std::sync::Arc;

use sense_api::{config::ApiArgs, AppState};
use sense_broker::NatsChannel;
use sensedb::Store;

#[actix::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = ApiArgs::parse();

    let store = Store::open(&args.database_url).map_err(|e| {
        log::error!("Unable to open database {}: {e}", args.database_url);
        e
    })?;

    let nats = Arc::new(NatsChannel::new(&args.nats_url));
    nats.connect().await.map_err(|e| {
        log::error!("Unable to connect to NATS at {}: {e}", args.nats_url);
        e
    })?;

    let state = AppState::new(store, nats.clone());
    sense_api::serve(args.socket_addr(), state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Unable to listen for shutdown signal {e}");
        }
        log::info!("Shutting down");
    })
    .await?;

    nats.close().await?;
    Ok(())
}
