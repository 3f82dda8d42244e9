//! Coordinator that reconciles a local store with a remote source.

use color_eyre::{eyre::eyre, Report};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::context::{self, AbortOnDrop, ExecutionContexts};
use super::stream::{ResourceEmitter, ResourceStream, Subscription};
use super::traits::BoundResource;
use crate::config::CoordinatorConfig;
use crate::resource::Resource;

/// Drives one bound resource.
///
/// Construction starts observing the local store right away:
/// 1. Each stored value goes through `should_refresh`
/// 2. Fresh values are emitted as `Success`
/// 3. Stale values start a fetch cycle: `Loading`, fetch, persist, re-read,
///    then `Success` with the re-read value (or `Error` if the fetch failed)
///
/// Observers never see the raw fetched value, only what the store hands back
/// after persisting it.
///
/// Dropping the coordinator stops the local observation. Fetch cycles already
/// in flight still run to completion.
pub struct Coordinator<R: BoundResource> {
  inner: Arc<Inner<R>>,
  observer: JoinHandle<()>,
}

struct Inner<R: BoundResource> {
  resource: R,
  contexts: ExecutionContexts,
  config: CoordinatorConfig,
  emitter: ResourceEmitter<R::Stored>,
  /// Last value observed from the local store
  last_known: Mutex<Option<R::Stored>>,
  /// Held for a whole fetch cycle when single-flight is enabled
  flight: tokio::sync::Mutex<()>,
}

impl<R: BoundResource> Coordinator<R> {
  /// Create a coordinator and start observing the local store.
  ///
  /// Subscribe before the origin runtime gets a chance to run the observer, or
  /// use [`Coordinator::start_subscribed`] to be sure no emission is missed.
  pub fn new(resource: R, contexts: ExecutionContexts, config: CoordinatorConfig) -> Self {
    let inner = Inner::new(resource, contexts, config);
    let observer = Inner::start(&inner);
    Self { inner, observer }
  }

  /// Create a coordinator with a subscription registered before it starts.
  pub fn start_subscribed(
    resource: R,
    contexts: ExecutionContexts,
    config: CoordinatorConfig,
  ) -> (Self, Subscription<R::Stored>) {
    let inner = Inner::new(resource, contexts, config);
    let subscription = inner.emitter.stream().subscribe();
    let observer = Inner::start(&inner);
    (Self { inner, observer }, subscription)
  }

  /// Run one fetch cycle: `Loading`, fetch, persist, re-read, terminal state.
  ///
  /// The returned handle resolves once the cycle has emitted its terminal state
  /// (or stalled on a storage failure).
  pub fn trigger_fetch(&self) -> JoinHandle<()> {
    Inner::spawn_cycle(&self.inner)
  }

  /// Read-only handle to the output stream.
  pub fn output(&self) -> ResourceStream<R::Stored> {
    self.inner.emitter.stream()
  }

  pub fn subscribe(&self) -> Subscription<R::Stored> {
    self.inner.emitter.stream().subscribe()
  }

  /// The most recent emission, if any.
  pub fn latest(&self) -> Option<Resource<R::Stored>> {
    self.inner.emitter.stream().latest()
  }

  pub fn resource(&self) -> &R {
    &self.inner.resource
  }

  pub fn config(&self) -> &CoordinatorConfig {
    &self.inner.config
  }

  /// Stop observing the local store.
  pub fn shutdown(&self) {
    debug!("stopping local observation");
    self.observer.abort();
  }
}

impl<R: BoundResource> Drop for Coordinator<R> {
  fn drop(&mut self) {
    self.observer.abort();
  }
}

impl<R: BoundResource> Inner<R> {
  fn new(resource: R, contexts: ExecutionContexts, config: CoordinatorConfig) -> Arc<Self> {
    Arc::new(Self {
      resource,
      contexts,
      config,
      emitter: ResourceEmitter::new(),
      last_known: Mutex::new(None),
      flight: tokio::sync::Mutex::new(()),
    })
  }

  fn start(inner: &Arc<Self>) -> JoinHandle<()> {
    let inner = Arc::clone(inner);
    let origin = inner.contexts.origin().clone();
    origin.spawn(inner.observe_local())
  }

  fn spawn_cycle(inner: &Arc<Self>) -> JoinHandle<()> {
    let inner = Arc::clone(inner);
    let origin = inner.contexts.origin().clone();
    origin.spawn(inner.run_cycle())
  }

  async fn observe_local(self: Arc<Self>) {
    let (mut values, _pump) = self.subscribe_local();

    while let Some(next) = values.recv().await {
      match next {
        Ok(value) => {
          self.remember(&value);
          if self.resource.should_refresh(&value) {
            debug!("stored value needs refresh");
            Self::spawn_cycle(&self);
          } else {
            self.emitter.emit(Resource::success(value));
          }
        }
        Err(err) => {
          self.local_read_failed(err);
          break;
        }
      }
    }

    debug!("local observation ended");
  }

  async fn run_cycle(self: Arc<Self>) {
    let _flight = if self.config.single_flight {
      Some(self.flight.lock().await)
    } else {
      None
    };

    self.emitter.emit(Resource::loading(self.cached()));

    let fetch = self.resource.fetch_remote();
    let fetched = match self.contexts.network_io().spawn(fetch).await {
      Ok(result) => result,
      Err(e) => Err(eyre!("Fetch task did not complete: {}", e)),
    };

    let remote = match fetched {
      Ok(remote) => remote,
      Err(err) => {
        warn!(error = %err, "remote fetch failed");
        self.resource.on_fetch_failed(&err);
        self
          .emitter
          .emit(Resource::error(err.to_string(), self.cached()));
        return;
      }
    };

    // The re-read below must observe this write
    let writer = Arc::clone(&self);
    let persisted = match self
      .contexts
      .write()
      .spawn_blocking(move || writer.resource.persist(remote))
      .await
    {
      Ok(result) => result,
      Err(e) => Err(eyre!("Persist task did not complete: {}", e)),
    };

    if let Err(err) = persisted {
      self.resource.on_persist_failed(&err);
      self.surface(err);
      return;
    }

    let (mut values, _pump) = self.subscribe_local();
    match values.recv().await {
      Some(Ok(value)) => {
        self.remember(&value);
        self.emitter.emit(Resource::success(value));
      }
      Some(Err(err)) => self.local_read_failed(err),
      None => self.local_read_failed(eyre!("Local store ended without a value after persist")),
    }
  }

  fn subscribe_local(
    &self,
  ) -> (
    tokio::sync::mpsc::UnboundedReceiver<color_eyre::Result<R::Stored>>,
    AbortOnDrop,
  ) {
    context::pump(self.resource.load_from_local(), self.contexts.local_io())
  }

  fn local_read_failed(&self, err: Report) {
    self.resource.on_local_read_failed(&err);
    self.surface(err);
  }

  fn surface(&self, err: Report) {
    if self.config.surface_storage_errors {
      self
        .emitter
        .emit(Resource::error(err.to_string(), self.cached()));
    }
  }

  fn remember(&self, value: &R::Stored) {
    *self
      .last_known
      .lock()
      .unwrap_or_else(PoisonError::into_inner) = Some(value.clone());
  }

  /// Value to attach to `Loading` and `Error` emissions.
  fn cached(&self) -> Option<R::Stored> {
    if !self.config.carry_cached_value {
      return None;
    }
    self
      .last_known
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }
}
