use ashva_core::MembershipEngine;
use chrono::Utc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Run the node deployment sweep every `interval` until the task is aborted
pub fn spawn_sweeper(engine: MembershipEngine, interval: Duration) -> JoinHandle<()> {
    info!("Node deployment sweep every {:?}", interval);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = engine.sweep_deployments(Utc::now()).await {
                error!("Node deployment sweep failed: {}", e);
            }
        }
    })
}
