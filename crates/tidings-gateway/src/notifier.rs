/// Batching notifier with a rolling hash chain.
///
/// ```text
/// Idle --tick--> Collecting --(>=1 payload)--> Hashing --> Dispatching --> Idle
///                     |
///                     +--(nothing pending)--> Idle
/// ```
///
/// Hashing advances the chain head before any delivery I/O starts, so a
/// second tick that fires while the first is still dispatching chains onto
/// the new head. Delivery never feeds back into the chain: the chain records
/// what was emitted, not what was acknowledged.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use tidings_crypto::{GENESIS, generate_nonce, seal_envelope};
use tidings_store::{ChainHeadFile, ChannelStore, StoreError};
use tidings_types::events::FeedEvent;
use tidings_types::{
    ChannelIdentity, DeliveryOutcome, DeliveryStatus, DispatchReport, LookupKey,
    NotificationEnvelope,
};

use crate::channels::{DeliveryChannel, Route};
use crate::feed::EnvelopeFeed;
use crate::observer::{DeliveryObserver, TracingObserver};

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("Notifier lock poisoned")]
    Poisoned,

    #[error("Envelope serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Chain head error: {0}")]
    ChainHead(#[from] StoreError),
}

pub struct Notifier {
    writer_id: String,
    enabled: AtomicBool,
    pending: Mutex<Vec<Value>>,
    /// Hash of the last emitted envelope (the next envelope's parent).
    head: Mutex<String>,
    head_file: Option<ChainHeadFile>,
    store: Arc<ChannelStore>,
    routes: Vec<Route>,
    feed: Option<EnvelopeFeed>,
    observer: Arc<dyn DeliveryObserver>,
}

pub struct NotifierBuilder {
    writer_id: String,
    store: Arc<ChannelStore>,
    enabled: bool,
    routes: Vec<Route>,
    feed: Option<EnvelopeFeed>,
    observer: Arc<dyn DeliveryObserver>,
    head_file: Option<ChainHeadFile>,
}

impl NotifierBuilder {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn route(mut self, channel: Arc<dyn DeliveryChannel>, destinations: Vec<String>) -> Self {
        self.routes.push(Route::new(channel, destinations));
        self
    }

    pub fn feed(mut self, feed: EnvelopeFeed) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn DeliveryObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Persist the chain head here and resume from it on start.
    pub fn chain_head_file(mut self, file: ChainHeadFile) -> Self {
        self.head_file = Some(file);
        self
    }

    pub fn build(self) -> Result<Notifier, NotifierError> {
        let head = match &self.head_file {
            Some(file) => match file.load()? {
                Some(head) => {
                    info!(head = %head, path = %file.path().display(), "Resuming notification chain");
                    head
                }
                None => {
                    info!("No stored chain head, starting from genesis");
                    GENESIS.to_string()
                }
            },
            None => {
                warn!("Chain head is not persisted; this chain starts from genesis");
                GENESIS.to_string()
            }
        };

        Ok(Notifier {
            writer_id: self.writer_id,
            enabled: AtomicBool::new(self.enabled),
            pending: Mutex::new(Vec::new()),
            head: Mutex::new(head),
            head_file: self.head_file,
            store: self.store,
            routes: self.routes,
            feed: self.feed,
            observer: self.observer,
        })
    }
}

impl Notifier {
    pub fn builder(store: Arc<ChannelStore>, writer_id: impl Into<String>) -> NotifierBuilder {
        NotifierBuilder {
            writer_id: writer_id.into(),
            store,
            enabled: true,
            routes: Vec::new(),
            feed: None,
            observer: Arc::new(TracingObserver),
            head_file: None,
        }
    }

    pub fn writer_id(&self) -> &str {
        &self.writer_id
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
        info!(enabled, "Notifications toggled");
    }

    /// Queue a payload for the next envelope. Returns the pending count.
    pub fn enqueue(&self, payload: Value) -> Result<usize, NotifierError> {
        let mut pending = lock(&self.pending)?;
        pending.push(payload);
        Ok(pending.len())
    }

    pub fn pending_len(&self) -> Result<usize, NotifierError> {
        Ok(lock(&self.pending)?.len())
    }

    /// Current chain head: the parent hash the next envelope will carry.
    pub fn head(&self) -> Result<String, NotifierError> {
        Ok(lock(&self.head)?.clone())
    }

    /// Collecting + Hashing: drain the queue into a new envelope and advance
    /// the chain head. `None` when disabled or nothing is pending.
    ///
    /// Blocks on file I/O when a chain head file is configured.
    pub fn seal(&self) -> Result<Option<NotificationEnvelope>, NotifierError> {
        if !self.is_enabled() {
            return Ok(None);
        }

        // Holding the head across drain + hash keeps envelopes in queue order
        // and makes concurrent seals chain one after the other.
        let mut head = lock(&self.head)?;
        let messages = std::mem::take(&mut *lock(&self.pending)?);
        if messages.is_empty() {
            return Ok(None);
        }

        let envelope = match seal_envelope(messages, &self.writer_id, Utc::now(), generate_nonce(), &head) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("Failed to hash envelope: {}", e);
                return Err(e.into());
            }
        };

        // The stored head must never lag behind an emitted envelope, or a
        // restart would fork the chain. If it cannot be written, nothing is
        // emitted and the payloads go back to the front of the queue.
        if let Some(file) = &self.head_file {
            if let Err(e) = file.store(&envelope.hash) {
                error!(path = %file.path().display(), "Failed to persist chain head: {}", e);
                let mut pending = lock(&self.pending)?;
                let mut restored = envelope.messages;
                restored.append(&mut *pending);
                *pending = restored;
                return Err(e.into());
            }
        }
        *head = envelope.hash.clone();

        // Published under the head lock so the feed sees chain order.
        if let Some(feed) = &self.feed {
            feed.publish(&envelope);
            debug!(subscribers = feed.subscriber_count(), "Envelope published to feed");
        }

        info!(
            hash = %envelope.hash,
            parent = %envelope.parent_hash,
            messages = envelope.messages.len(),
            "Envelope sealed"
        );
        Ok(Some(envelope))
    }

    /// Subscribe to the envelope feed together with the head it starts
    /// from: the first envelope received names that head as its parent.
    /// `None` when no feed is configured.
    pub fn subscribe_feed(
        &self,
    ) -> Result<Option<(FeedEvent, broadcast::Receiver<FeedEvent>)>, NotifierError> {
        let Some(feed) = &self.feed else {
            return Ok(None);
        };
        let head = lock(&self.head)?;
        let rx = feed.subscribe();
        let ready = FeedEvent::Ready {
            writer: self.writer_id.clone(),
            head: head.clone(),
        };
        Ok(Some((ready, rx)))
    }

    /// Dispatching: hand the envelope to every routed destination.
    /// Failures are recorded per destination, never raised.
    pub async fn dispatch(&self, envelope: &NotificationEnvelope) -> DispatchReport {
        let mut resolved: HashMap<&str, Option<ChannelIdentity>> = HashMap::new();
        let mut outcomes = Vec::new();
        let mut sends = Vec::new();

        for route in &self.routes {
            for key in &route.destinations {
                let identity = resolved
                    .entry(key.as_str())
                    .or_insert_with(|| self.resolve(key))
                    .clone();
                match identity {
                    Some(identity) => {
                        sends.push(send_one(route.channel.as_ref(), key, identity, envelope));
                    }
                    None => outcomes.push(DeliveryOutcome {
                        channel: route.channel.name().to_string(),
                        destination: key.clone(),
                        channel_id: None,
                        status: DeliveryStatus::Unresolved,
                    }),
                }
            }
        }

        outcomes.extend(join_all(sends).await);

        let report = DispatchReport {
            envelope_hash: envelope.hash.clone(),
            message_count: envelope.messages.len(),
            dispatched_at: Utc::now(),
            outcomes,
        };
        self.observer.on_report(&report);
        report
    }

    /// One full cycle: seal, then dispatch if anything was sealed.
    pub async fn tick(&self) -> Result<Option<DispatchReport>, NotifierError> {
        match self.seal()? {
            Some(envelope) => Ok(Some(self.dispatch(&envelope).await)),
            None => Ok(None),
        }
    }

    fn resolve(&self, key: &str) -> Option<ChannelIdentity> {
        match self.store.lookup(LookupKey::parse(key)) {
            Ok(found) => found,
            Err(e) => {
                warn!(destination = key, "Channel store lookup failed: {}", e);
                None
            }
        }
    }
}

async fn send_one(
    channel: &dyn DeliveryChannel,
    key: &str,
    identity: ChannelIdentity,
    envelope: &NotificationEnvelope,
) -> DeliveryOutcome {
    let status = match channel.send(&identity, envelope).await {
        Ok(()) => DeliveryStatus::Delivered,
        Err(e) => DeliveryStatus::Failed {
            reason: e.to_string(),
        },
    };
    DeliveryOutcome {
        channel: channel.name().to_string(),
        destination: key.to_string(),
        channel_id: Some(identity.channel_id),
        status,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, NotifierError> {
    mutex.lock().map_err(|_| NotifierError::Poisoned)
}

/// Background task driving the notifier on a fixed interval.
///
/// Ticks are sealed one at a time on the blocking pool; each dispatch runs
/// as its own task so slow transports never delay the next tick. When
/// `shutdown` resolves, pending payloads are flushed in one last cycle.
pub async fn run_notify_loop(
    notifier: Arc<Notifier>,
    period: Duration,
    shutdown: impl Future<Output = ()>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;
    tokio::pin!(shutdown);

    info!(period_ms = period.as_millis() as u64, "Notification loop started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Some(envelope) = seal_blocking(&notifier).await {
                    let notifier = notifier.clone();
                    tokio::spawn(async move {
                        notifier.dispatch(&envelope).await;
                    });
                }
            }
            _ = &mut shutdown => break,
        }
    }

    if let Some(envelope) = seal_blocking(&notifier).await {
        let report = notifier.dispatch(&envelope).await;
        info!(hash = %report.envelope_hash, "Flushed pending notifications on shutdown");
    }
    info!("Notification loop stopped");
}

/// Run `seal` off the async workers; it may fsync the chain head file.
async fn seal_blocking(notifier: &Arc<Notifier>) -> Option<NotificationEnvelope> {
    let sealer = notifier.clone();
    match tokio::task::spawn_blocking(move || sealer.seal()).await {
        Ok(Ok(Some(envelope))) => Some(envelope),
        Ok(Ok(None)) => {
            debug!("Nothing to send");
            None
        }
        Ok(Err(e)) => {
            warn!("Notification tick failed: {}", e);
            None
        }
        Err(e) => {
            error!("spawn_blocking join error: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tidings_store::MemoryLog;

    fn notifier() -> Notifier {
        let store = Arc::new(ChannelStore::open(MemoryLog::new()).unwrap());
        Notifier::builder(store, "writer-test").build().unwrap()
    }

    #[test]
    fn empty_queue_seals_nothing() {
        let n = notifier();
        assert!(n.seal().unwrap().is_none());
        assert_eq!(n.head().unwrap(), GENESIS);
    }

    #[test]
    fn disabled_notifier_leaves_queue_untouched() {
        let n = notifier();
        n.enqueue(json!("m1")).unwrap();
        n.set_enabled(false);
        assert!(n.seal().unwrap().is_none());
        assert_eq!(n.pending_len().unwrap(), 1);
        assert_eq!(n.head().unwrap(), GENESIS);

        n.set_enabled(true);
        let env = n.seal().unwrap().unwrap();
        assert_eq!(env.messages, vec![json!("m1")]);
        assert_eq!(n.pending_len().unwrap(), 0);
    }

    #[test]
    fn seal_advances_head_and_keeps_order() {
        let n = notifier();
        n.enqueue(json!("a")).unwrap();
        n.enqueue(json!({"b": 2})).unwrap();
        let env = n.seal().unwrap().unwrap();
        assert_eq!(env.messages, vec![json!("a"), json!({"b": 2})]);
        assert_eq!(env.parent_hash, GENESIS);
        assert_eq!(env.writer, "writer-test");
        assert_eq!(n.head().unwrap(), env.hash);
    }

    #[test]
    fn head_file_is_written_and_resumed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.head");
        let store = Arc::new(ChannelStore::open(MemoryLog::new()).unwrap());

        let first = Notifier::builder(store.clone(), "w")
            .chain_head_file(ChainHeadFile::new(&path))
            .build()
            .unwrap();
        first.enqueue(json!("m1")).unwrap();
        let env = first.seal().unwrap().unwrap();
        drop(first);

        let second = Notifier::builder(store, "w")
            .chain_head_file(ChainHeadFile::new(&path))
            .build()
            .unwrap();
        assert_eq!(second.head().unwrap(), env.hash);
        second.enqueue(json!("m2")).unwrap();
        assert_eq!(second.seal().unwrap().unwrap().parent_hash, env.hash);
    }

    fn with_feed(feed: EnvelopeFeed) -> Notifier {
        let store = Arc::new(ChannelStore::open(MemoryLog::new()).unwrap());
        Notifier::builder(store, "writer-test").feed(feed).build().unwrap()
    }

    fn drain(rx: &mut broadcast::Receiver<FeedEvent>) -> Vec<NotificationEnvelope> {
        let mut envelopes = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                FeedEvent::Envelope(env) => envelopes.push(env),
                other => panic!("unexpected feed event: {:?}", other),
            }
        }
        envelopes
    }

    #[tokio::test]
    async fn feed_follows_chain_order_not_dispatch_order() {
        let n = with_feed(EnvelopeFeed::new(16));
        let (_, mut rx) = n.subscribe_feed().unwrap().unwrap();

        let mut sealed = Vec::new();
        for i in 0..3 {
            n.enqueue(json!(i)).unwrap();
            sealed.push(n.seal().unwrap().unwrap());
        }
        for env in sealed.iter().rev() {
            n.dispatch(env).await;
        }

        let received = drain(&mut rx);
        let hashes: Vec<&str> = received.iter().map(|e| e.hash.as_str()).collect();
        let expected: Vec<&str> = sealed.iter().map(|e| e.hash.as_str()).collect();
        assert_eq!(hashes, expected);
        assert_eq!(received[0].parent_hash, GENESIS);
    }

    #[test]
    fn feed_without_subscribers_or_config() {
        assert!(notifier().subscribe_feed().unwrap().is_none());

        let n = with_feed(EnvelopeFeed::new(4));
        n.enqueue(json!("unheard")).unwrap();
        assert!(n.seal().unwrap().is_some());
    }

    #[test]
    fn feed_subscription_starts_at_its_ready_head() {
        let n = Arc::new(with_feed(EnvelopeFeed::new(1024)));
        let sealer = {
            let n = n.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    n.enqueue(json!(i)).unwrap();
                    n.seal().unwrap();
                }
            })
        };

        std::thread::sleep(Duration::from_millis(2));
        let (ready, mut rx) = n.subscribe_feed().unwrap().unwrap();
        sealer.join().unwrap();

        let FeedEvent::Ready { writer, head } = ready else {
            panic!("subscription must start with a ready event");
        };
        assert_eq!(writer, "writer-test");

        // No gap and no duplicate between the announced head and the stream.
        let mut expected = head;
        for env in drain(&mut rx) {
            assert_eq!(env.parent_hash, expected);
            expected = env.hash;
        }
        assert_eq!(n.head().unwrap(), expected);
    }

    #[test]
    fn unwritable_head_file_blocks_emission_and_requeues() {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("state");
        let store = Arc::new(ChannelStore::open(MemoryLog::new()).unwrap());
        let n = Notifier::builder(store, "w")
            .chain_head_file(ChainHeadFile::new(&state_dir.join("chain.head")))
            .feed(EnvelopeFeed::new(16))
            .build()
            .unwrap();
        let (_, mut rx) = n.subscribe_feed().unwrap().unwrap();

        // A regular file where the head's directory should be.
        std::fs::write(&state_dir, b"in the way").unwrap();

        n.enqueue(json!("first")).unwrap();
        n.enqueue(json!("second")).unwrap();
        assert!(n.seal().is_err());
        assert_eq!(n.head().unwrap(), GENESIS);
        assert!(drain(&mut rx).is_empty());

        n.enqueue(json!("third")).unwrap();
        assert_eq!(n.pending_len().unwrap(), 3);

        std::fs::remove_file(&state_dir).unwrap();
        let env = n.seal().unwrap().unwrap();
        assert_eq!(env.messages, vec![json!("first"), json!("second"), json!("third")]);
        assert_eq!(env.parent_hash, GENESIS);
        assert_eq!(n.head().unwrap(), env.hash);
        assert_eq!(drain(&mut rx).len(), 1);
        assert_eq!(
            ChainHeadFile::new(&state_dir.join("chain.head")).load().unwrap().as_deref(),
            Some(env.hash.as_str())
        );
    }

    #[test]
    fn concurrent_seals_form_a_single_chain() {
        let n = Arc::new(notifier());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let n = n.clone();
                std::thread::spawn(move || {
                    let mut sealed = Vec::new();
                    for i in 0..25 {
                        n.enqueue(json!(format!("{}-{}", t, i))).unwrap();
                        if let Some(env) = n.seal().unwrap() {
                            sealed.push(env);
                        }
                    }
                    sealed
                })
            })
            .collect();

        let mut all: Vec<NotificationEnvelope> =
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        let total: usize = all.iter().map(|e| e.messages.len()).sum();
        assert_eq!(total, 200);

        // Every parent is used exactly once: the envelopes form one linear chain.
        let mut parents: Vec<&str> = all.iter().map(|e| e.parent_hash.as_str()).collect();
        parents.sort();
        parents.dedup();
        assert_eq!(parents.len(), all.len());

        // Walk it from genesis.
        let mut ordered = Vec::new();
        let mut expected = GENESIS.to_string();
        while let Some(pos) = all.iter().position(|e| e.parent_hash == expected) {
            let env = all.swap_remove(pos);
            expected = env.hash.clone();
            ordered.push(env);
        }
        assert!(all.is_empty());
        assert_eq!(n.head().unwrap(), expected);
        assert!(tidings_crypto::verify_chain(&ordered, GENESIS).is_valid());
    }
}
