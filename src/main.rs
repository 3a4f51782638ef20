use anyhow::Result;
use hyperstats::*;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tikv_jemallocator::Jemalloc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;

    // Routing, streaming, game and DNS producers attach through the library API; the
    // standalone binary only has the host traffic meter.
    let producers = hub::Producers {
        traffic: app_config.traffic.enabled.then(|| {
            traffic_meter::TrafficMeter::new(app_config.traffic.exclude_interfaces.clone())
                .into_stream(app_config.traffic.sample_interval_ms)
        }),
        ..Default::default()
    };
    let hub = hub::Hub::start(&app_config.engine(), producers);

    let ws_connections = Arc::new(AtomicUsize::new(0));
    let app = routes::app(hub.bus(), ws_connections.clone());
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    let stats_log_interval =
        tokio::time::Duration::from_secs(app_config.monitoring.stats_log_interval_secs);
    let stats_bus = hub.bus();
    let stats_logger = tokio::spawn(async move {
        let mut tick = tokio::time::interval(stats_log_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            tracing::info!(
                ws_clients = ws_connections.load(std::sync::atomic::Ordering::Relaxed),
                consumers = stats_bus.consumer_count(),
                snapshots_published = stats_bus.published_count(),
                "app stats"
            );
        }
    });

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(_) => {
                        let _ = tokio::signal::ctrl_c().await;
                        return;
                    }
                };
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                let _ = tokio::signal::ctrl_c().await;
            }
        } => {
            tracing::info!("Received shutdown signal");
        }
    }

    stats_logger.abort();
    hub.shutdown().await?;
    Ok(())
}
