//! A ready-made bound resource: one URL cached under one store key.

use color_eyre::{Report, Result};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;
use url::Url;

use super::client::HttpSource;
use crate::bound::BoundResource;
use crate::cache::{SqliteStore, StalePolicy, StoredDocument};

/// Store key for a URL.
///
/// SHA-256 of the URL without its fragment, so equivalent spellings of the
/// same URL share one document.
pub fn url_key(url: &Url) -> String {
  let mut normalized = url.clone();
  normalized.set_fragment(None);

  let mut hasher = Sha256::new();
  hasher.update(b"GET ");
  hasher.update(normalized.as_str().as_bytes());
  hex::encode(hasher.finalize())
}

/// JSON document fetched from an [`HttpSource`] and kept in a [`SqliteStore`].
pub struct JsonEndpoint<T> {
  source: HttpSource,
  store: Arc<SqliteStore>,
  key: String,
  policy: StalePolicy,
  follow_updates: bool,
  _marker: PhantomData<fn() -> T>,
}

impl<T> JsonEndpoint<T> {
  /// Bind `source` to its default key (see [`url_key`]).
  pub fn new(source: HttpSource, store: Arc<SqliteStore>, policy: StalePolicy) -> Self {
    let key = url_key(source.url());
    Self {
      source,
      store,
      key,
      policy,
      follow_updates: false,
      _marker: PhantomData,
    }
  }

  pub fn with_key(mut self, key: impl Into<String>) -> Self {
    self.key = key.into();
    self
  }

  /// Keep observing the store after the first read.
  ///
  /// Every later write to the key is re-evaluated against the policy, so a
  /// policy that considers fresh writes stale will refetch forever.
  pub fn follow_updates(mut self, follow: bool) -> Self {
    self.follow_updates = follow;
    self
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  pub fn source(&self) -> &HttpSource {
    &self.source
  }
}

impl<T> BoundResource for JsonEndpoint<T>
where
  T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
  type Stored = Option<StoredDocument<T>>;
  type Remote = T;

  fn load_from_local(&self) -> BoxStream<'static, Result<Self::Stored>> {
    if self.follow_updates {
      return self.store.watch(&self.key);
    }

    let store = Arc::clone(&self.store);
    let key = self.key.clone();
    stream::once(async move { store.load::<T>(&key).await }).boxed()
  }

  fn should_refresh(&self, stored: &Self::Stored) -> bool {
    self.policy.should_refresh(stored.as_ref())
  }

  fn fetch_remote(&self) -> BoxFuture<'static, Result<T>> {
    let source = self.source.clone();
    async move { source.fetch_json::<T>().await }.boxed()
  }

  fn persist(&self, value: T) -> Result<()> {
    self.store.put(&self.key, &value)
  }

  fn on_fetch_failed(&self, error: &Report) {
    warn!(url = %self.source.url(), key = %self.key, error = %error, "fetch failed, keeping stored document");
  }
}
