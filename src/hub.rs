// Composition root for the engine: aggregator task, warm-up ticker, one subscriber per
// producer, and the snapshot bus, all bound to one start/shutdown lifetime.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};

use crate::aggregator::{self, SnapshotAggregator};
use crate::burst::BurstDetector;
use crate::bus::{SnapshotBus, Subscription};
use crate::config::EngineConfig;
use crate::error::HubError;
use crate::gate::GateStats;
use crate::jitter::JitterHistoryBuffer;
use crate::models::{
    DnsRaceSample, GameSnapshot, HyperSnapshot, RouteSnapshot, StreamingSnapshot, TrafficSample,
};
use crate::subscribers::{self, ProducerStream};

/// Upstream producers. `None` means the producer is not initialized yet.
#[derive(Default)]
pub struct Producers {
    pub traffic: Option<ProducerStream<TrafficSample>>,
    pub routes: Option<ProducerStream<RouteSnapshot>>,
    pub streaming: Option<ProducerStream<StreamingSnapshot>>,
    pub game: Option<ProducerStream<GameSnapshot>>,
    pub dns: Option<ProducerStream<DnsRaceSample>>,
}

pub struct Hub {
    bus: SnapshotBus,
    burst: Arc<BurstDetector>,
    jitter: Arc<JitterHistoryBuffer>,
    supervisor: JoinHandle<()>,
    supervisor_stop_tx: oneshot::Sender<()>,
    aggregator: JoinHandle<GateStats>,
    aggregator_shutdown_tx: oneshot::Sender<()>,
}

impl Hub {
    /// Starts the aggregator, the warm-up ticker and a subscriber per initialized producer.
    pub fn start(config: &EngineConfig, producers: Producers) -> Self {
        let bus = SnapshotBus::new(config.bus());
        let aggregator = SnapshotAggregator::new(config, bus.clone());
        let burst = aggregator.burst_detector();
        let jitter = aggregator.jitter_history();

        let (inbox_tx, inbox_rx) = mpsc::channel(config.inbox_capacity.max(1));
        let (aggregator_shutdown_tx, aggregator_shutdown_rx) = oneshot::channel();
        let aggregator = aggregator::spawn(
            aggregator,
            inbox_rx,
            aggregator_shutdown_rx,
            config.stats_log_interval_secs,
        );

        let Producers {
            traffic,
            routes,
            streaming,
            game,
            dns,
        } = producers;
        let mut tasks = JoinSet::new();
        let mut started = 0;
        started += usize::from(subscribers::spawn_subscriber(&mut tasks, traffic, inbox_tx.clone()));
        started += usize::from(subscribers::spawn_subscriber(&mut tasks, routes, inbox_tx.clone()));
        started += usize::from(subscribers::spawn_subscriber(&mut tasks, streaming, inbox_tx.clone()));
        started += usize::from(subscribers::spawn_subscriber(&mut tasks, game, inbox_tx.clone()));
        started += usize::from(subscribers::spawn_subscriber(&mut tasks, dns, inbox_tx.clone()));
        subscribers::spawn_warmup_ticker(&mut tasks, config.warmup_tick_ms, inbox_tx);

        let (supervisor_stop_tx, supervisor_stop_rx) = oneshot::channel();
        let supervisor = tokio::spawn(supervise(tasks, supervisor_stop_rx));

        tracing::info!(
            subscribers = started,
            replay = config.replay_buffer,
            throttle_ms = config.throttle_threshold_ms,
            "Hub started"
        );

        Self {
            bus,
            burst,
            jitter,
            supervisor,
            supervisor_stop_tx,
            aggregator,
            aggregator_shutdown_tx,
        }
    }

    pub fn bus(&self) -> SnapshotBus {
        self.bus.clone()
    }

    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    pub fn current_snapshot(&self) -> Arc<HyperSnapshot> {
        self.bus.current_snapshot()
    }

    pub fn burst_detector(&self) -> Arc<BurstDetector> {
        self.burst.clone()
    }

    pub fn jitter_history(&self) -> Arc<JitterHistoryBuffer> {
        self.jitter.clone()
    }

    /// Cancels subscribers and the ticker, stops the aggregator after it drains its inbox,
    /// then closes the bus so consumer streams end.
    pub async fn shutdown(self) -> Result<GateStats, HubError> {
        let _ = self.supervisor_stop_tx.send(());
        if let Err(e) = self.supervisor.await {
            tracing::warn!(error = %e, "Subscriber supervisor failed");
        }
        let _ = self.aggregator_shutdown_tx.send(());
        let stats = self.aggregator.await;
        self.bus.close();
        let stats = stats?;
        tracing::info!(
            published = stats.published,
            throttled = stats.throttled,
            duplicates = stats.duplicates,
            suppressed = stats.suppressed,
            "Hub stopped"
        );
        Ok(stats)
    }
}

/// Reaps subscriber tasks as they end so a panicking producer is reported without
/// touching the others; aborts whatever is left on stop.
async fn supervise(mut tasks: JoinSet<()>, mut stop_rx: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            joined = tasks.join_next() => match joined {
                Some(Err(e)) if e.is_panic() => {
                    tracing::error!(error = %e, "Subscriber task panicked; other dimensions unaffected");
                }
                Some(_) => {}
                None => {
                    let _ = (&mut stop_rx).await;
                    break;
                }
            }
        }
    }
    tasks.shutdown().await;
    tracing::debug!("Subscribers stopped");
}
