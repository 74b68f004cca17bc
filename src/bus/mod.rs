// src/bus/mod.rs — Feedback bus: priority pub/sub between race components
//
// One bus per race, created and stopped by the arena that owns it. Messages
// queue by priority and are delivered by a background dispatch task (or an
// explicit `flush`). Handler failures are isolated per subscriber.

pub mod message;
pub mod queue;

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::infra::config::BusSection;
use crate::infra::errors::RaceError;

pub use message::{FeedbackMessage, MessageType, Payload, Priority, Target};
use queue::{PriorityQueue, PushOutcome};

pub type Handler = Arc<dyn Fn(&FeedbackMessage) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct BusConfig {
    pub queue_capacity: usize,
    pub dispatch_interval: Duration,
    pub batch_size: usize,
    pub history_size: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::from(&BusSection::default())
    }
}

impl From<&BusSection> for BusConfig {
    fn from(section: &BusSection) -> Self {
        Self {
            queue_capacity: section.queue_capacity.max(1),
            dispatch_interval: Duration::from_millis(section.dispatch_interval_ms.max(1)),
            batch_size: section.batch_size.max(1),
            history_size: section.history_size,
        }
    }
}

/// Who a subscription listens as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriberScope {
    /// Receives broadcasts and messages targeted at this agent id.
    Agent(String),
    /// Observer that receives every message regardless of target.
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeFilter {
    All,
    Only(Vec<MessageType>),
}

impl TypeFilter {
    pub fn only(message_type: MessageType) -> Self {
        TypeFilter::Only(vec![message_type])
    }

    fn matches(&self, message_type: MessageType) -> bool {
        match self {
            TypeFilter::All => true,
            TypeFilter::Only(types) => types.contains(&message_type),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PublishOptions {
    pub priority: Priority,
    pub iteration: u32,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            priority: Priority::Normal,
            iteration: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    pub published: u64,
    pub delivered: u64,
    pub evicted: u64,
    pub dropped: u64,
    pub handler_errors: u64,
}

struct Subscription {
    id: String,
    scope: SubscriberScope,
    filter: TypeFilter,
    handler: Handler,
}

impl Subscription {
    fn accepts(&self, message: &FeedbackMessage) -> bool {
        let in_scope = match &self.scope {
            SubscriberScope::Agent(agent_id) => message.target.includes(agent_id),
            SubscriberScope::Any => true,
        };
        in_scope && self.filter.matches(message.message_type())
    }
}

enum WaitMatcher {
    Type(MessageType),
    Iteration(u32),
}

struct Waiter {
    matcher: WaitMatcher,
    tx: oneshot::Sender<FeedbackMessage>,
}

impl Waiter {
    fn matches(&self, message: &FeedbackMessage) -> bool {
        match self.matcher {
            WaitMatcher::Type(t) => message.message_type() == t,
            WaitMatcher::Iteration(n) => matches!(
                message.payload,
                Payload::IterationComplete { iteration, .. } if iteration == n
            ),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct BusInner {
    config: BusConfig,
    queue: Mutex<PriorityQueue>,
    subscriptions: Mutex<Vec<Subscription>>,
    waiters: Mutex<Vec<Waiter>>,
    history: Mutex<VecDeque<FeedbackMessage>>,
    stats: Mutex<BusStats>,
    /// Held from drain to last delivery so one batch is in flight at a time.
    /// Handlers must not flush or tick the bus they are called from.
    dispatching: Mutex<()>,
}

impl BusInner {
    /// Deliver up to one batch. Returns the number of messages taken off the
    /// queue. Waits for any batch already being delivered.
    fn dispatch_tick(&self) -> usize {
        let _dispatching = lock(&self.dispatching);
        let batch = lock(&self.queue).drain_up_to(self.config.batch_size);
        let count = batch.len();
        for message in batch {
            self.deliver(message);
        }
        count
    }

    fn deliver(&self, message: FeedbackMessage) {
        // Snapshot handlers so they may publish or subscribe without deadlocking.
        let handlers: Vec<(String, Handler)> = lock(&self.subscriptions)
            .iter()
            .filter(|s| s.accepts(&message))
            .map(|s| (s.id.clone(), s.handler.clone()))
            .collect();

        let mut delivered = 0u64;
        let mut errors = 0u64;
        for (subscription_id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(&message))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    errors += 1;
                    tracing::warn!(
                        subscription = %subscription_id,
                        message_type = ?message.message_type(),
                        "Bus handler failed: {}",
                        e
                    );
                }
                Err(_) => {
                    errors += 1;
                    tracing::warn!(
                        subscription = %subscription_id,
                        message_type = ?message.message_type(),
                        "Bus handler panicked"
                    );
                }
            }
        }

        {
            let mut waiters = lock(&self.waiters);
            let mut i = 0;
            while i < waiters.len() {
                if waiters[i].tx.is_closed() {
                    waiters.swap_remove(i);
                } else if waiters[i].matches(&message) {
                    let waiter = waiters.swap_remove(i);
                    let _ = waiter.tx.send(message.clone());
                } else {
                    i += 1;
                }
            }
        }

        {
            let mut stats = lock(&self.stats);
            stats.delivered += delivered;
            stats.handler_errors += errors;
        }

        if self.config.history_size > 0 {
            let mut history = lock(&self.history);
            if history.len() >= self.config.history_size {
                history.pop_front();
            }
            history.push_back(message);
        }
    }
}

struct DispatchTask {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

pub struct FeedbackBus {
    inner: Arc<BusInner>,
    task: Mutex<Option<DispatchTask>>,
}

impl FeedbackBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                queue: Mutex::new(PriorityQueue::new(config.queue_capacity)),
                subscriptions: Mutex::new(Vec::new()),
                waiters: Mutex::new(Vec::new()),
                history: Mutex::new(VecDeque::new()),
                stats: Mutex::new(BusStats::default()),
                dispatching: Mutex::new(()),
                config,
            }),
            task: Mutex::new(None),
        }
    }

    pub fn subscribe(
        &self,
        scope: SubscriberScope,
        filter: TypeFilter,
        handler: Handler,
    ) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        lock(&self.inner.subscriptions).push(Subscription {
            id: id.clone(),
            scope,
            filter,
            handler,
        });
        id
    }

    /// Returns false when no subscription had this id.
    pub fn unsubscribe(&self, subscription_id: &str) -> bool {
        let mut subs = lock(&self.inner.subscriptions);
        let before = subs.len();
        subs.retain(|s| s.id != subscription_id);
        subs.len() != before
    }

    pub fn subscription_count(&self) -> usize {
        lock(&self.inner.subscriptions).len()
    }

    /// Enqueue a message and return its id. A full queue evicts its oldest
    /// lowest-priority entry, or drops this message if everything queued
    /// outranks it.
    pub fn publish(
        &self,
        source: &str,
        target: Target,
        payload: Payload,
        options: PublishOptions,
    ) -> String {
        let mut message = FeedbackMessage::new(source, target, payload);
        message.priority = options.priority;
        message.iteration = options.iteration;
        let id = message.id.clone();

        let outcome = lock(&self.inner.queue).push(message);
        let mut stats = lock(&self.inner.stats);
        stats.published += 1;
        match outcome {
            PushOutcome::Enqueued => {}
            PushOutcome::Evicted(old) => {
                stats.evicted += 1;
                tracing::debug!(
                    evicted_id = %old.id,
                    evicted_type = ?old.message_type(),
                    "Bus queue full, evicted oldest low-priority message"
                );
            }
            PushOutcome::Dropped(msg) => {
                stats.dropped += 1;
                tracing::warn!(
                    message_type = ?msg.message_type(),
                    priority = ?msg.priority,
                    "Bus queue full of higher-priority messages, dropped incoming"
                );
            }
        }
        id
    }

    /// Run one dispatch batch now.
    pub fn dispatch_tick(&self) -> usize {
        self.inner.dispatch_tick()
    }

    /// Deliver everything currently queued, including messages published by
    /// handlers during the flush. Returns only after a batch the dispatch
    /// loop already took off the queue has been delivered too.
    pub fn flush(&self) -> usize {
        let mut total = 0;
        loop {
            let n = self.inner.dispatch_tick();
            if n == 0 {
                return total;
            }
            total += n;
        }
    }

    pub fn queue_len(&self) -> usize {
        lock(&self.inner.queue).len()
    }

    /// Resolve with the next delivered message of `message_type`.
    pub async fn wait_for(
        &self,
        message_type: MessageType,
        timeout: Duration,
    ) -> Result<FeedbackMessage, RaceError> {
        self.wait(
            WaitMatcher::Type(message_type),
            timeout,
            format!("wait for {:?}", message_type),
        )
        .await
    }

    /// Resolve with the `IterationComplete` message for `iteration`.
    pub async fn wait_for_iteration(
        &self,
        iteration: u32,
        timeout: Duration,
    ) -> Result<FeedbackMessage, RaceError> {
        self.wait(
            WaitMatcher::Iteration(iteration),
            timeout,
            format!("wait for iteration {}", iteration),
        )
        .await
    }

    async fn wait(
        &self,
        matcher: WaitMatcher,
        timeout: Duration,
        operation: String,
    ) -> Result<FeedbackMessage, RaceError> {
        let (tx, rx) = oneshot::channel();
        lock(&self.inner.waiters).push(Waiter { matcher, tx });
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => Err(RaceError::Other(anyhow::anyhow!(
                "{operation}: bus dropped the waiter"
            ))),
            Err(_) => Err(RaceError::Timeout {
                operation,
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Delivered messages, oldest first.
    pub fn history(&self) -> Vec<FeedbackMessage> {
        lock(&self.inner.history).iter().cloned().collect()
    }

    pub fn stats(&self) -> BusStats {
        lock(&self.inner.stats).clone()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.task).is_some()
    }

    /// Spawn the dispatch loop. Calling again while running is a no-op.
    pub fn start(&self) {
        let mut task = lock(&self.task);
        if task.is_some() {
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(inner.config.dispatch_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::debug!(
                interval_ms = inner.config.dispatch_interval.as_millis() as u64,
                "Feedback bus dispatch loop started"
            );
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        inner.dispatch_tick();
                    }
                    _ = shutdown_rx.changed() => {
                        tracing::debug!("Feedback bus dispatch loop stopped");
                        break;
                    }
                }
            }
        });

        *task = Some(DispatchTask {
            handle,
            shutdown_tx,
        });
    }

    /// Stop the dispatch loop and wait for it to exit. Idempotent.
    pub async fn stop(&self) {
        let task = lock(&self.task).take();
        if let Some(task) = task {
            let _ = task.shutdown_tx.send(true);
            let _ = task.handle.await;
        }
    }
}

impl Drop for FeedbackBus {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.task).take() {
            task.handle.abort();
        }
    }
}
