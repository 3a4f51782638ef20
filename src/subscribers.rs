// Stream subscribers: one task per upstream producer, translating its events into
// aggregator updates. A bad event or a dead producer only affects its own dimension.

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant, interval_at};

use crate::aggregator::{Dimension, Update};
use crate::error::IngestError;
use crate::models::{DnsRaceSample, GameSnapshot, RouteSnapshot, StreamingSnapshot, TrafficSample};

/// Event stream from an upstream producer.
pub type ProducerStream<T> = BoxStream<'static, T>;

/// Producer event that maps onto exactly one aggregator dimension.
pub trait IntoUpdate: Send + 'static {
    const DIMENSION: Dimension;

    fn into_update(self) -> Result<Update, IngestError>;
}

impl IntoUpdate for TrafficSample {
    const DIMENSION: Dimension = Dimension::Throughput;

    fn into_update(self) -> Result<Update, IngestError> {
        Ok(Update::Traffic(self))
    }
}

impl IntoUpdate for RouteSnapshot {
    const DIMENSION: Dimension = Dimension::Routing;

    fn into_update(self) -> Result<Update, IngestError> {
        if self.outbound_tags.keys().any(|tag| tag.trim().is_empty()) {
            return Err(IngestError::BlankOutboundTag);
        }
        Ok(Update::Route(self))
    }
}

impl IntoUpdate for StreamingSnapshot {
    const DIMENSION: Dimension = Dimension::QuicDominance;

    fn into_update(self) -> Result<Update, IngestError> {
        if self.active_sessions.keys().any(|id| id.trim().is_empty()) {
            return Err(IngestError::BlankSessionId);
        }
        Ok(Update::Streaming(self))
    }
}

impl IntoUpdate for GameSnapshot {
    const DIMENSION: Dimension = Dimension::MultiPath;

    fn into_update(self) -> Result<Update, IngestError> {
        Ok(Update::Game(self))
    }
}

impl IntoUpdate for DnsRaceSample {
    const DIMENSION: Dimension = Dimension::DnsRace;

    fn into_update(self) -> Result<Update, IngestError> {
        if self.results.is_empty() {
            return Err(IngestError::EmptyDnsRace);
        }
        if let Some(index) = self
            .results
            .iter()
            .position(|r| r.resolver.trim().is_empty())
        {
            return Err(IngestError::BlankResolver { index });
        }
        Ok(Update::DnsRace(self))
    }
}

/// Adapts a tokio mpsc receiver into a producer stream.
pub fn from_receiver<T: Send + 'static>(rx: mpsc::Receiver<T>) -> ProducerStream<T> {
    stream::unfold(rx, |mut rx| async move {
        let item = rx.recv().await?;
        Some((item, rx))
    })
    .boxed()
}

/// Spawns the subscriber for one producer. A producer that is not initialized yet is
/// logged and left out; the aggregator keeps default values for its dimension.
pub fn spawn_subscriber<T: IntoUpdate>(
    tasks: &mut JoinSet<()>,
    source: Option<ProducerStream<T>>,
    inbox: mpsc::Sender<Update>,
) -> bool {
    let dimension = T::DIMENSION.as_str();
    let Some(stream) = source else {
        tracing::warn!(
            dimension,
            "Producer not initialized; dimension keeps default values"
        );
        return false;
    };
    tasks.spawn(run_subscriber(stream, inbox));
    tracing::debug!(dimension, "Subscriber started");
    true
}

async fn run_subscriber<T: IntoUpdate>(mut stream: ProducerStream<T>, inbox: mpsc::Sender<Update>) {
    let dimension = T::DIMENSION.as_str();
    let mut forwarded: u64 = 0;
    let mut rejected: u64 = 0;
    let mut overflowed: u64 = 0;

    // The only await is on the producer; a full inbox drops the update, and the
    // producer's next event for this dimension supersedes it.
    while let Some(event) = stream.next().await {
        match event.into_update() {
            Ok(update) => match inbox.try_send(update) {
                Ok(()) => forwarded += 1,
                Err(TrySendError::Full(_)) => {
                    overflowed += 1;
                    tracing::warn!(
                        dimension,
                        overflowed,
                        operation = "try_send",
                        "Aggregator inbox full; update dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(dimension, "Aggregator inbox closed");
                    break;
                }
            },
            Err(e) => {
                rejected += 1;
                tracing::warn!(
                    dimension,
                    error = %e,
                    operation = "into_update",
                    "Dropping malformed producer event"
                );
            }
        }
    }
    tracing::info!(
        dimension,
        forwarded,
        rejected,
        overflowed,
        "Producer stream ended"
    );
}

/// Periodic warm-up tick. The first tick fires one period after start.
pub fn spawn_warmup_ticker(tasks: &mut JoinSet<()>, tick_ms: u64, inbox: mpsc::Sender<Update>) {
    let period = Duration::from_millis(tick_ms.max(1));
    tasks.spawn(async move {
        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            match inbox.try_send(Update::WarmupTick) {
                Ok(()) => {}
                // the next tick recomputes from elapsed time
                Err(TrySendError::Full(_)) => tracing::debug!("Inbox full; warm-up tick skipped"),
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!("Warm-up ticker stopping; inbox closed");
                    break;
                }
            }
        }
    });
}
