// Snapshot bus: multi-consumer fan-out with replay and drop-oldest overflow.
// Publishing never blocks; each consumer drains its own bounded queue.

use futures_util::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use ringbuffer::{AllocRingBuffer, RingBuffer};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tokio::sync::Notify;

use crate::models::HyperSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// Most recent snapshots handed to a new consumer.
    pub replay: usize,
    /// Extra per-consumer room on top of the replay for bursts.
    pub extra_buffer: usize,
}

impl BusConfig {
    pub fn consumer_capacity(&self) -> usize {
        (self.replay + self.extra_buffer).max(1)
    }
}

struct ConsumerQueue {
    items: VecDeque<Arc<HyperSnapshot>>,
    dropped: u64,
    closed: bool,
}

struct ConsumerSlot {
    queue: Mutex<ConsumerQueue>,
    notify: Notify,
}

struct BusState {
    replay: AllocRingBuffer<Arc<HyperSnapshot>>,
    current: Arc<HyperSnapshot>,
    consumers: Vec<Weak<ConsumerSlot>>,
    published: u64,
    closed: bool,
}

/// Cheap to clone; all clones share the same consumers and replay buffer.
#[derive(Clone)]
pub struct SnapshotBus {
    config: BusConfig,
    state: Arc<Mutex<BusState>>,
}

impl SnapshotBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(BusState {
                replay: AllocRingBuffer::new(config.replay.max(1)),
                current: Arc::new(HyperSnapshot::default()),
                consumers: Vec::new(),
                published: 0,
                closed: false,
            })),
        }
    }

    /// Fans `snapshot` out to every live consumer. A full consumer queue loses its oldest
    /// item. Returns the number of consumers reached.
    pub fn publish(&self, snapshot: Arc<HyperSnapshot>) -> usize {
        let capacity = self.config.consumer_capacity();
        let mut state = self.state.lock();
        if state.closed {
            return 0;
        }
        state.replay.push(snapshot.clone());
        state.current = snapshot.clone();
        state.published += 1;

        let mut reached = 0;
        state.consumers.retain(|weak| {
            let Some(slot) = weak.upgrade() else {
                return false;
            };
            {
                let mut queue = slot.queue.lock();
                if queue.items.len() >= capacity {
                    queue.items.pop_front();
                    queue.dropped += 1;
                }
                queue.items.push_back(snapshot.clone());
            }
            slot.notify.notify_one();
            reached += 1;
            true
        });
        reached
    }

    /// New consumer, pre-loaded with up to `replay` most recent snapshots.
    pub fn subscribe(&self) -> Subscription {
        let mut state = self.state.lock();
        let mut items = VecDeque::with_capacity(self.config.consumer_capacity());
        if self.config.replay > 0 {
            items.extend(state.replay.to_vec());
        }
        let slot = Arc::new(ConsumerSlot {
            queue: Mutex::new(ConsumerQueue {
                items,
                dropped: 0,
                closed: state.closed,
            }),
            notify: Notify::new(),
        });
        if !state.closed {
            state.consumers.push(Arc::downgrade(&slot));
        }
        Subscription { slot }
    }

    /// Last published snapshot, or the default before the first publish.
    pub fn current_snapshot(&self) -> Arc<HyperSnapshot> {
        self.state.lock().current.clone()
    }

    pub fn consumer_count(&self) -> usize {
        let mut state = self.state.lock();
        state.consumers.retain(|w| w.strong_count() > 0);
        state.consumers.len()
    }

    pub fn published_count(&self) -> u64 {
        self.state.lock().published
    }

    /// Ends every consumer stream once its queue is drained; later publishes are ignored.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        for slot in state.consumers.drain(..).filter_map(|w| w.upgrade()) {
            slot.queue.lock().closed = true;
            slot.notify.notify_one();
        }
    }
}

/// One consumer's independent read cursor.
pub struct Subscription {
    slot: Arc<ConsumerSlot>,
}

impl Subscription {
    /// Next snapshot; `None` once the bus is closed and the queue is drained.
    pub async fn recv(&mut self) -> Option<Arc<HyperSnapshot>> {
        loop {
            {
                let mut queue = self.slot.queue.lock();
                if let Some(item) = queue.items.pop_front() {
                    return Some(item);
                }
                if queue.closed {
                    return None;
                }
            }
            self.slot.notify.notified().await;
        }
    }

    /// Non-waiting variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Option<Arc<HyperSnapshot>> {
        self.slot.queue.lock().items.pop_front()
    }

    /// Snapshots this consumer lost to overflow so far.
    pub fn dropped(&self) -> u64 {
        self.slot.queue.lock().dropped
    }

    pub fn pending(&self) -> usize {
        self.slot.queue.lock().items.len()
    }

    pub fn into_stream(self) -> BoxStream<'static, Arc<HyperSnapshot>> {
        stream::unfold(self, |mut sub| async move {
            let item = sub.recv().await?;
            Some((item, sub))
        })
        .boxed()
    }
}
