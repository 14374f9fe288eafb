use std::{
    mem,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use futures::{Stream, StreamExt};
use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};

use super::changes::ChangeEvent;

type Handler = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

#[derive(Clone)]
enum Sink {
    Channel(UnboundedSender<ChangeEvent>),
    Handler(Handler),
}

impl Sink {
    /// Returns `false` once the receiving side is gone.
    fn deliver(&self, event: &ChangeEvent) -> bool {
        match self {
            Self::Channel(sender) => sender.send(event.clone()).is_ok(),
            Self::Handler(handler) => {
                handler(event);
                true
            }
        }
    }
}

struct Subscriber {
    id: usize,
    sink: Sink,
}

struct StreamInner {
    subscribers: Mutex<Vec<Subscriber>>,
    delivery: ReentrantMutex<()>,
    closed: AtomicBool,
    next_id: AtomicUsize,
}

impl StreamInner {
    fn unsubscribe(&self, id: usize) {
        self.subscribers.lock().retain(|sub| sub.id != id);
    }
}

/// Multi-subscriber change stream with a once-only completion step.
///
/// Deliveries and completion are serialised, so no subscriber observes an
/// event after [`ChangeEvent::Completed`]. Handlers run on the publishing
/// task and may subscribe, unsubscribe or complete the stream re-entrantly.
#[derive(Clone)]
pub struct ChangeStream {
    inner: Arc<StreamInner>,
}

impl ChangeStream {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StreamInner {
                subscribers: Mutex::new(Vec::new()),
                delivery: ReentrantMutex::new(()),
                closed: AtomicBool::new(false),
                next_id: AtomicUsize::new(1),
            }),
        }
    }

    /// Subscribes with a channel receiver.
    ///
    /// After completion the returned subscription yields nothing.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let guard = self.register(Sink::Channel(tx));
        Subscription {
            guard,
            receiver: Some(rx),
        }
    }

    /// Subscribes a callback invoked for every event.
    pub fn subscribe_with<F>(&self, handler: F) -> HandlerSubscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        HandlerSubscription {
            guard: self.register(Sink::Handler(Arc::new(handler))),
        }
    }

    fn register(&self, sink: Sink) -> SubscriptionGuard {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let mut subscribers = self.inner.subscribers.lock();
        if !self.inner.closed.load(Ordering::Acquire) {
            subscribers.push(Subscriber { id, sink });
            debug!(id, "Change stream subscriber added");
        }

        SubscriptionGuard {
            id,
            stream: Arc::downgrade(&self.inner),
        }
    }

    /// Delivers `event` to every current subscriber. Returns the number of
    /// subscribers reached; zero once completed.
    pub fn publish(&self, event: &ChangeEvent) -> usize {
        let _delivery = self.inner.delivery.lock();
        if self.inner.closed.load(Ordering::Acquire) {
            return 0;
        }

        let sinks: Vec<(usize, Sink)> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .map(|sub| (sub.id, sub.sink.clone()))
            .collect();

        let mut dead = Vec::new();
        let mut reached = 0;
        for (id, sink) in sinks {
            if sink.deliver(event) {
                reached += 1;
            } else {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            self.inner
                .subscribers
                .lock()
                .retain(|sub| !dead.contains(&sub.id));
        }

        reached
    }

    /// Marks the stream complete, delivering [`ChangeEvent::Completed`] to
    /// every subscriber and dropping them.
    ///
    /// Only the first call has an effect and returns `true`. Every call
    /// returns after completion has been delivered.
    pub fn complete(&self) -> bool {
        let _delivery = self.inner.delivery.lock();
        if self
            .inner
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let subscribers = mem::take(&mut *self.inner.subscribers.lock());
        let count = subscribers.len();
        for subscriber in subscribers {
            subscriber.sink.deliver(&ChangeEvent::Completed);
        }

        info!(subscribers = count, "Change stream completed");
        true
    }

    pub fn is_completed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

impl Default for ChangeStream {
    fn default() -> Self {
        Self::new()
    }
}

struct SubscriptionGuard {
    id: usize,
    stream: Weak<StreamInner>,
}

impl SubscriptionGuard {
    fn unsubscribe(&self) {
        if let Some(stream) = self.stream.upgrade() {
            stream.unsubscribe(self.id);
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Channel-backed subscription. Unsubscribes when dropped.
pub struct Subscription {
    guard: SubscriptionGuard,
    receiver: Option<UnboundedReceiver<ChangeEvent>>,
}

impl Subscription {
    /// Waits for the next event. Returns `None` after completion or unsubscribe
    /// once buffered events are drained.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.as_mut()?.recv().await
    }

    /// Next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        let receiver = self.receiver.as_mut()?;
        match receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Stops delivery. Idempotent.
    pub fn unsubscribe(&self) {
        self.guard.unsubscribe();
    }

    /// Converts into a `Stream` of events; the subscription lives as long as the stream.
    pub fn into_stream(self) -> impl Stream<Item = ChangeEvent> {
        let Subscription { guard, receiver } = self;

        futures::stream::unfold(
            (receiver.map(UnboundedReceiverStream::new), guard),
            |(mut receiver, guard)| async move {
                let event = receiver.as_mut()?.next().await?;
                Some((event, (receiver, guard)))
            },
        )
    }
}

/// Callback-backed subscription. Unsubscribes when dropped.
pub struct HandlerSubscription {
    guard: SubscriptionGuard,
}

impl HandlerSubscription {
    /// Stops delivery. Idempotent.
    pub fn unsubscribe(&self) {
        self.guard.unsubscribe();
    }
}
