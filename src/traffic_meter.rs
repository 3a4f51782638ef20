// Host traffic meter via sysinfo: summed interface rates as TrafficSample events

use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use sysinfo::Networks;
use tokio::time::{Duration, interval};
use tracing::instrument;

use crate::models::TrafficSample;
use crate::subscribers::ProducerStream;

struct Totals {
    rx: u64,
    tx: u64,
    at: Instant,
}

pub struct TrafficMeter {
    networks: Arc<std::sync::Mutex<Networks>>,
    last: Arc<std::sync::Mutex<Option<Totals>>>,
    exclude: Arc<Vec<String>>,
    origin: Instant,
}

impl TrafficMeter {
    pub fn new(exclude_interfaces: Vec<String>) -> Self {
        Self {
            networks: Arc::new(std::sync::Mutex::new(Networks::new_with_refreshed_list())),
            last: Arc::new(std::sync::Mutex::new(None)),
            exclude: Arc::new(exclude_interfaces),
            origin: Instant::now(),
        }
    }

    /// Rates since the previous call; the first call reports 0 bytes/sec.
    #[instrument(skip(self), fields(repo = "traffic", operation = "sample"))]
    pub async fn sample(&self) -> anyhow::Result<TrafficSample> {
        let networks = self.networks.clone();
        let last = self.last.clone();
        let exclude = self.exclude.clone();
        let origin = self.origin;
        tokio::task::spawn_blocking(move || {
            let mut networks = networks
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo networks lock poisoned: {}", e))?;
            networks.refresh(true);
            let (rx, tx) = networks
                .list()
                .iter()
                .filter(|(name, _)| !exclude.iter().any(|x| x == *name))
                .fold((0u64, 0u64), |(rx, tx), (_, data)| {
                    (
                        rx.saturating_add(data.total_received()),
                        tx.saturating_add(data.total_transmitted()),
                    )
                });

            let now = Instant::now();
            let mut last = last
                .lock()
                .map_err(|e| anyhow::anyhow!("traffic totals lock poisoned: {}", e))?;
            let (rx_rate, tx_rate) = match last.as_ref() {
                Some(prev) => {
                    let dt_secs = now.duration_since(prev.at).as_secs_f64();
                    if dt_secs > 0.0 {
                        (
                            rx.saturating_sub(prev.rx) as f64 / dt_secs,
                            tx.saturating_sub(prev.tx) as f64 / dt_secs,
                        )
                    } else {
                        (0.0, 0.0)
                    }
                }
                None => (0.0, 0.0),
            };
            *last = Some(Totals { rx, tx, at: now });

            Ok(TrafficSample {
                timestamp_ms: now.duration_since(origin).as_millis() as u64,
                rx_bytes_per_sec: rx_rate,
                tx_bytes_per_sec: tx_rate,
            })
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }

    /// Samples every `interval_ms`. Failed samples are logged and skipped.
    pub fn into_stream(self, interval_ms: u64) -> ProducerStream<TrafficSample> {
        let mut tick = interval(Duration::from_millis(interval_ms.max(1)));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        stream::unfold((self, tick), |(meter, mut tick)| async move {
            loop {
                tick.tick().await;
                match meter.sample().await {
                    Ok(sample) => return Some((sample, (meter, tick))),
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            operation = "sample",
                            "traffic sample failed"
                        );
                    }
                }
            }
        })
        .boxed()
    }
}
