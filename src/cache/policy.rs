//! Staleness predicates for stored documents.

use chrono::{DateTime, Duration, Utc};

use super::storage::StoredDocument;

/// Decides whether a stored document should be refreshed from the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StalePolicy {
  /// Refresh on every observation
  Always,
  /// Never refresh; serve whatever is stored
  Never,
  /// Refresh only when nothing is stored
  WhenMissing,
  /// Refresh when nothing is stored or the document is older than this
  OlderThan(Duration),
}

impl StalePolicy {
  /// Policy for a maximum document age in seconds.
  pub fn max_age_secs(secs: u64) -> Self {
    let secs = i64::try_from(secs).unwrap_or(i64::MAX);
    StalePolicy::OlderThan(Duration::try_seconds(secs).unwrap_or(Duration::MAX))
  }

  pub fn should_refresh<T>(&self, stored: Option<&StoredDocument<T>>) -> bool {
    self.should_refresh_at(stored, Utc::now())
  }

  /// Same as [`StalePolicy::should_refresh`], evaluated at `now`.
  pub fn should_refresh_at<T>(&self, stored: Option<&StoredDocument<T>>, now: DateTime<Utc>) -> bool {
    match (self, stored) {
      (StalePolicy::Always, _) => true,
      (StalePolicy::Never, _) => false,
      (_, None) => true,
      (StalePolicy::WhenMissing, Some(_)) => false,
      (StalePolicy::OlderThan(max_age), Some(doc)) => now - doc.stored_at > *max_age,
    }
  }
}

impl Default for StalePolicy {
  fn default() -> Self {
    StalePolicy::OlderThan(Duration::minutes(5))
  }
}
