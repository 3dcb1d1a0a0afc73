use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mount_control::events::{BroadcastSink, FanoutSink, MemorySink, TracingSink};
use mount_control::{Mount, MountConfig};

mod nats_telemetry;
mod routes;
mod stream;

use nats_telemetry::NatsEventSink;
use routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "mount_gateway=debug,mount_control=info,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MountConfig::from_env()?;
    tracing::info!("   Observer: {}", config.observer.label());

    // Event sinks: tracing, recent-log buffer, WebSocket fan-out, NATS
    let recent = Arc::new(MemorySink::new(config.events.recent_capacity));
    let live = Arc::new(BroadcastSink::new(config.events.channel_capacity));
    let (nats_sink, nats_publisher) = NatsEventSink::connect().await;
    let sink = FanoutSink::new()
        .with(Arc::new(TracingSink))
        .with(recent.clone())
        .with(live.clone())
        .with(Arc::new(nats_sink));

    tokio::spawn(async move {
        if let Err(e) = nats_publisher.run().await {
            tracing::error!("NATS publisher failed: {}", e);
        }
    });

    // Simulated actuators until a hardware driver is configured
    let mount = Mount::simulated(config, Arc::new(sink))?.spawn();

    let state = AppState {
        mount: mount.clone(),
        recent,
        live,
    };
    let app = routes::app(state);

    let port = std::env::var("MOUNT_GATEWAY_PORT")
        .or_else(|_| std::env::var("PORT"))
        .unwrap_or_else(|_| "21600".to_string());
    let addr = format!("0.0.0.0:{}", port);

    tracing::info!("Mount Gateway starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await?;

    mount.emergency_stop();
    mount.shutdown().await;
    Ok(())
}
