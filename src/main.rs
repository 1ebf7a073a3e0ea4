use std::sync::Arc;

use tracing::{error, info};

use lastpulse::config::Config;
use lastpulse::economy::settlement::Settlement;
use lastpulse::economy::store::MemoryStore;
use lastpulse::game::runner::{EndCallback, Engine};
use lastpulse::net::hub::Hub;
use lastpulse::net::protocol::ServerMessage;
use lastpulse::net::ws::{router, AppState};
use lastpulse::room::manager::Manager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        )
        .init();

    info!("Last Pulse Server v{}", env!("CARGO_PKG_VERSION"));

    let config = match Config::load() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!(err = %e, "configuration invalid");
            std::process::exit(1);
        }
    };
    info!(
        addr = %config.http_addr,
        env = %config.env,
        oracle = config.oracle.is_some(),
        "configuration loaded"
    );

    let rooms = Arc::new(Manager::new());
    let hub = Arc::new(Hub::new());
    let settlement = Arc::new(Settlement::new(MemoryStore::new()));

    // End-of-round handoff: post payouts/shards/war-chest deltas, then send
    // each player their results screen.
    let on_end: EndCallback = {
        let settlement = settlement.clone();
        let hub = hub.clone();
        Arc::new(move |summary| -> futures::future::BoxFuture<'static, ()> {
            let settlement = settlement.clone();
            let hub = hub.clone();
            Box::pin(async move {
                let results = settlement.settle(&summary);
                for (player_id, result) in results {
                    hub.send_to(
                        player_id,
                        ServerMessage::RoundResult {
                            placement: result.placement,
                            payout: result.payout,
                            shards: result.shards,
                        },
                    );
                }
            })
        })
    };

    let engine = Engine::new(
        rooms,
        hub.clone(),
        on_end,
        config.oracle.clone(),
        config.tier1_survival,
    );
    engine.ensure_rooms();

    let app = router(AppState {
        hub,
        engine: engine.clone(),
        config: config.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(addr = %config.http_addr, "server ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(err = %e, "shutdown signal handler failed");
            }
            info!("shutdown signal received");
        })
        .await?;

    engine.shutdown();
    info!("server stopped");
    Ok(())
}
