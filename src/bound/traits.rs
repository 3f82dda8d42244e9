//! The capability set a coordinator needs from its collaborators.

use color_eyre::{Report, Result};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tracing::error;

/// A value that lives in a local store and is refreshed from a remote source.
///
/// `Stored` is what the local store hands back and what observers see.
/// `Remote` is what the network returns; it only ever reaches `persist`.
/// Model an empty store by choosing `Stored = Option<_>`.
pub trait BoundResource: Send + Sync + 'static {
  type Stored: Clone + Send + Sync + 'static;
  type Remote: Send + 'static;

  /// Observe the persisted value.
  ///
  /// The stream may emit many times over its lifetime (for example after each
  /// write). It is polled on the local I/O context.
  fn load_from_local(&self) -> BoxStream<'static, Result<Self::Stored>>;

  /// Decide whether `stored` needs a refresh from the network.
  ///
  /// Evaluated on the origin context; must not do I/O.
  fn should_refresh(&self, stored: &Self::Stored) -> bool;

  /// Fetch the value from the remote source. Polled on the network context.
  fn fetch_remote(&self) -> BoxFuture<'static, Result<Self::Remote>>;

  /// Write a fetched value into the local store.
  ///
  /// Runs as a blocking call on the write context and must be finished when it
  /// returns.
  fn persist(&self, value: Self::Remote) -> Result<()>;

  /// Called before a fetch failure is emitted. Hook for cache invalidation or
  /// scheduling a retry.
  fn on_fetch_failed(&self, _error: &Report) {}

  /// Called when a local read yields an error. The failing subscription ends.
  fn on_local_read_failed(&self, error: &Report) {
    error!(error = %error, "local read failed");
  }

  /// Called when `persist` fails. The cycle stops without re-reading.
  fn on_persist_failed(&self, error: &Report) {
    error!(error = %error, "persisting fetched value failed");
  }
}
