//! Broadcast output stream of a coordinator.
//!
//! The coordinator owns the only [`ResourceEmitter`]; everything outside the
//! crate only ever sees a read-only [`ResourceStream`] handle. Each subscriber
//! gets its own unbounded queue, so a slow consumer never drops emissions and
//! never slows the others down.
//!
//! Only the emitter keeps the subscriber list alive. Once it is dropped every
//! subscription drains its buffer and then ends, however many
//! [`ResourceStream`] clones are still around.

use futures::Stream;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::trace;

use crate::resource::Resource;

struct Shared<T> {
  subscribers: Vec<mpsc::UnboundedSender<Resource<T>>>,
  latest: Option<Resource<T>>,
}

fn lock<T>(shared: &Mutex<Shared<T>>) -> MutexGuard<'_, Shared<T>> {
  // Emission never panics while holding the lock, so poison carries no torn state
  shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Write side of the output stream.
pub(crate) struct ResourceEmitter<T> {
  shared: Arc<Mutex<Shared<T>>>,
}

impl<T: Clone> ResourceEmitter<T> {
  pub(crate) fn new() -> Self {
    Self {
      shared: Arc::new(Mutex::new(Shared {
        subscribers: Vec::new(),
        latest: None,
      })),
    }
  }

  /// Deliver `resource` to every live subscriber.
  ///
  /// Subscribers that have gone away are pruned here.
  pub(crate) fn emit(&self, resource: Resource<T>) {
    let mut shared = lock(&self.shared);
    shared
      .subscribers
      .retain(|tx| tx.send(resource.clone()).is_ok());
    trace!(
      state = resource.state_name(),
      subscribers = shared.subscribers.len(),
      "emitted resource state"
    );
    shared.latest = Some(resource);
  }

  pub(crate) fn stream(&self) -> ResourceStream<T> {
    ResourceStream {
      shared: Arc::downgrade(&self.shared),
    }
  }
}

/// Read-only, cloneable handle to a coordinator's output.
///
/// Subscriptions receive emissions made after they were created. Nothing is
/// replayed; use [`ResourceStream::latest`] to peek at the last emission.
pub struct ResourceStream<T> {
  shared: Weak<Mutex<Shared<T>>>,
}

impl<T> Clone for ResourceStream<T> {
  fn clone(&self) -> Self {
    Self {
      shared: Weak::clone(&self.shared),
    }
  }
}

impl<T: Clone> ResourceStream<T> {
  /// Start receiving emissions from now on.
  ///
  /// Subscribing after the coordinator is gone yields a subscription that
  /// ends immediately.
  pub fn subscribe(&self) -> Subscription<T> {
    let (tx, rx) = mpsc::unbounded_channel();
    if let Some(shared) = self.shared.upgrade() {
      lock(&shared).subscribers.push(tx);
    }
    Subscription { rx }
  }

  /// The most recent emission, if any. `None` once the coordinator is gone.
  pub fn latest(&self) -> Option<Resource<T>> {
    let shared = self.shared.upgrade()?;
    let latest = lock(&shared).latest.clone();
    latest
  }

  pub fn subscriber_count(&self) -> usize {
    let Some(shared) = self.shared.upgrade() else {
      return 0;
    };
    let count = lock(&shared)
      .subscribers
      .iter()
      .filter(|tx| !tx.is_closed())
      .count();
    count
  }
}

/// One consumer's view of the output stream.
///
/// Dropping it unsubscribes.
pub struct Subscription<T> {
  rx: mpsc::UnboundedReceiver<Resource<T>>,
}

impl<T> Subscription<T> {
  /// Wait for the next emission.
  ///
  /// Returns `None` once the coordinator and all of its in-flight work are gone.
  pub async fn recv(&mut self) -> Option<Resource<T>> {
    self.rx.recv().await
  }

  /// Take an already-buffered emission without waiting.
  pub fn try_recv(&mut self) -> Option<Resource<T>> {
    self.rx.try_recv().ok()
  }
}

impl<T> Stream for Subscription<T> {
  type Item = Resource<T>;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    self.rx.poll_recv(cx)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use futures::StreamExt;

  #[test]
  fn test_emit_without_subscribers() {
    let emitter = ResourceEmitter::new();
    emitter.emit(Resource::success(1));
    assert_eq!(emitter.stream().latest(), Some(Resource::success(1)));
  }

  #[tokio::test]
  async fn test_all_subscribers_receive_emissions() {
    let emitter = ResourceEmitter::new();
    let stream = emitter.stream();
    let mut first = stream.subscribe();
    let mut second = stream.subscribe();

    emitter.emit(Resource::loading(None));
    emitter.emit(Resource::success(42));

    for sub in [&mut first, &mut second] {
      assert_eq!(sub.recv().await, Some(Resource::loading(None)));
      assert_eq!(sub.recv().await, Some(Resource::success(42)));
    }
  }

  #[tokio::test]
  async fn test_late_subscriber_gets_no_history() {
    let emitter = ResourceEmitter::new();
    let stream = emitter.stream();

    emitter.emit(Resource::success(1));
    let mut late = stream.subscribe();
    assert_eq!(late.try_recv(), None);
    assert_eq!(stream.latest(), Some(Resource::success(1)));

    emitter.emit(Resource::success(2));
    assert_eq!(late.recv().await, Some(Resource::success(2)));
  }

  #[test]
  fn test_dropped_subscribers_are_pruned() {
    let emitter = ResourceEmitter::<i32>::new();
    let stream = emitter.stream();
    let kept = stream.subscribe();
    let dropped = stream.subscribe();
    assert_eq!(stream.subscriber_count(), 2);

    drop(dropped);
    emitter.emit(Resource::success(3));
    assert_eq!(lock(&emitter.shared).subscribers.len(), 1);
    drop(kept);
  }

  #[tokio::test]
  async fn test_subscription_ends_when_emitter_drops_despite_live_handles() {
    let emitter = ResourceEmitter::new();
    let stream = emitter.stream();
    let kept_handle = stream.clone();
    let mut sub = stream.subscribe();

    emitter.emit(Resource::success(5));
    drop(emitter);

    assert_eq!(sub.recv().await, Some(Resource::success(5)));
    assert_eq!(sub.recv().await, None);
    assert_eq!(kept_handle.latest(), None);
    assert_eq!(kept_handle.subscriber_count(), 0);

    let mut after = kept_handle.subscribe();
    assert_eq!(after.recv().await, None);
  }

  #[tokio::test]
  async fn test_unbounded_buffer_for_slow_consumer() {
    let emitter = ResourceEmitter::new();
    let mut sub = emitter.stream().subscribe();

    for n in 0..10_000 {
      emitter.emit(Resource::success(n));
    }
    drop(emitter);

    let received: Vec<_> = (&mut sub).collect().await;
    assert_eq!(received.len(), 10_000);
    assert_eq!(received.last(), Some(&Resource::success(9_999)));
  }
}
