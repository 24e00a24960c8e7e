use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ode_ledger::{Ledger, LedgerEntry};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::FeedError;
use crate::protocol::FeedMessage;

/// Subscriber identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(pub uuid::Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Live feed configuration.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// Period of the ledger poll
    pub poll_interval: Duration,
    /// Per-subscriber buffer of undelivered messages
    pub channel_capacity: usize,
    /// Also poll as soon as this process appends to the ledger
    pub push_on_append: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            channel_capacity: 256,
            push_on_append: true,
        }
    }
}

/// Registry-side view of a subscriber.
struct Subscriber {
    /// Count of ledger entries already handed to `sender`
    position: usize,
    sender: mpsc::Sender<FeedMessage>,
}

/// Client-side handle returned by [`LiveFeed::subscribe`].
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<FeedMessage>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next message; `None` once the feed has dropped this subscriber.
    pub async fn recv(&mut self) -> Option<FeedMessage> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<FeedMessage> {
        self.receiver.try_recv().ok()
    }
}

/// Outcome of one poll.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PollReport {
    pub ledger_len: usize,
    /// `new` messages handed to subscriber channels
    pub delivered: usize,
    /// Subscribers whose buffer was full; retried next poll
    pub deferred: usize,
    /// Subscribers removed because their connection closed
    pub dropped: usize,
}

/// Tails the ledger and pushes newly appended entries to subscribers.
///
/// Each subscriber sees entries strictly in ledger order, each at most once
/// per delivery attempt; a slow or gone subscriber never holds up the others.
pub struct LiveFeed {
    ledger: Arc<Ledger>,
    config: FeedConfig,
    subscribers: Mutex<HashMap<SubscriberId, Subscriber>>,
}

impl LiveFeed {
    pub fn new(ledger: Arc<Ledger>, config: FeedConfig) -> Self {
        Self {
            ledger,
            config,
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot of the whole ledger plus a subscription positioned right
    /// after it.
    pub async fn subscribe(&self) -> Result<(Vec<LedgerEntry>, Subscription), FeedError> {
        // Holding the registry lock keeps a concurrent poll from running
        // between the snapshot and the registration.
        let mut subscribers = self.subscribers.lock().await;
        let snapshot = self.ledger.read_all().await?;

        let (sender, receiver) = mpsc::channel(self.config.channel_capacity.max(1));
        let id = SubscriberId::new();
        subscribers.insert(
            id,
            Subscriber {
                position: snapshot.len(),
                sender,
            },
        );
        debug!(subscriber = %id, position = snapshot.len(), "Subscriber registered");

        Ok((snapshot, Subscription { id, receiver }))
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.lock().await.remove(&id).is_some();
        if removed {
            debug!(subscriber = %id, "Subscriber removed");
        }
        removed
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Forward every entry each subscriber has not yet been sent.
    pub async fn poll(&self) -> Result<PollReport, FeedError> {
        let mut subscribers = self.subscribers.lock().await;
        let Some(base) = subscribers.values().map(|s| s.position).min() else {
            return Ok(PollReport::default());
        };

        let tail = self.ledger.read_from(base).await?;
        let ledger_len = base + tail.len();
        let mut report = PollReport {
            ledger_len,
            ..PollReport::default()
        };
        let mut closed = Vec::new();

        for (id, sub) in subscribers.iter_mut() {
            while sub.position < ledger_len {
                let entry = tail[sub.position - base].clone();
                match sub.sender.try_send(FeedMessage::New { entry }) {
                    Ok(()) => {
                        sub.position += 1;
                        report.delivered += 1;
                    }
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!(subscriber = %id, position = sub.position, "Subscriber buffer full, deferring");
                        report.deferred += 1;
                        break;
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        closed.push(*id);
                        break;
                    }
                }
            }
        }

        for id in closed {
            subscribers.remove(&id);
            warn!(error = %FeedError::SubscriberDelivery(id), "Dropping subscriber");
            report.dropped += 1;
        }

        if report.delivered > 0 {
            debug!(delivered = report.delivered, ledger_len, "Live feed poll delivered entries");
        }
        Ok(report)
    }

    /// Poll on the configured period until `shutdown` turns true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut appended = self.ledger.watch_appends();

        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            push_on_append = self.config.push_on_append,
            "Live feed started"
        );

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {}
                Ok(()) = appended.changed(), if self.config.push_on_append => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            if let Err(e) = self.poll().await {
                error!(error = %e, "Live feed poll failed");
            }
        }

        info!("Live feed stopped");
    }
}
