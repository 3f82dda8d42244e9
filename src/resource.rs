//! Lifecycle states emitted by a bound resource.
//!
//! Every emission on a coordinator's output stream is a fresh `Resource<T>`.
//!
//! ```ignore
//! match resource {
//!     Resource::Loading(cached) => render_spinner(cached.as_ref()),
//!     Resource::Success(data) => render_data(data),
//!     Resource::Error { message, .. } => render_error(message),
//! }
//! ```

use serde::Serialize;
use std::fmt;

/// The state of a bound resource at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "payload", rename_all = "lowercase")]
pub enum Resource<T> {
  /// A fetch is in flight, optionally carrying the last cached value
  Loading(Option<T>),
  /// The canonical value read back from local storage
  Success(T),
  /// A fetch (or, when surfaced, a storage step) failed
  Error {
    message: String,
    data: Option<T>,
  },
}

impl<T> Resource<T> {
  pub fn loading(data: Option<T>) -> Self {
    Resource::Loading(data)
  }

  pub fn success(data: T) -> Self {
    Resource::Success(data)
  }

  pub fn error(message: impl Into<String>, data: Option<T>) -> Self {
    Resource::Error {
      message: message.into(),
      data,
    }
  }

  pub fn is_loading(&self) -> bool {
    matches!(self, Resource::Loading(_))
  }

  pub fn is_success(&self) -> bool {
    matches!(self, Resource::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, Resource::Error { .. })
  }

  /// Loading is the only non-terminal state of a cycle.
  pub fn is_terminal(&self) -> bool {
    !self.is_loading()
  }

  /// The carried value, whichever state this is.
  pub fn data(&self) -> Option<&T> {
    match self {
      Resource::Loading(data) => data.as_ref(),
      Resource::Success(data) => Some(data),
      Resource::Error { data, .. } => data.as_ref(),
    }
  }

  pub fn into_data(self) -> Option<T> {
    match self {
      Resource::Loading(data) => data,
      Resource::Success(data) => Some(data),
      Resource::Error { data, .. } => data,
    }
  }

  pub fn error_message(&self) -> Option<&str> {
    match self {
      Resource::Error { message, .. } => Some(message),
      _ => None,
    }
  }

  /// Transform the carried value, keeping the state.
  pub fn map<U, F>(self, f: F) -> Resource<U>
  where
    F: FnOnce(T) -> U,
  {
    match self {
      Resource::Loading(data) => Resource::Loading(data.map(f)),
      Resource::Success(data) => Resource::Success(f(data)),
      Resource::Error { message, data } => Resource::Error {
        message,
        data: data.map(f),
      },
    }
  }

  /// Short state name, used in log fields.
  pub fn state_name(&self) -> &'static str {
    match self {
      Resource::Loading(_) => "loading",
      Resource::Success(_) => "success",
      Resource::Error { .. } => "error",
    }
  }
}

impl<T: fmt::Debug> fmt::Display for Resource<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Resource::Loading(None) => write!(f, "loading"),
      Resource::Loading(Some(data)) => write!(f, "loading (cached: {:?})", data),
      Resource::Success(data) => write!(f, "success: {:?}", data),
      Resource::Error {
        message,
        data: None,
      } => write!(f, "error: {}", message),
      Resource::Error {
        message,
        data: Some(data),
      } => write!(f, "error: {} (cached: {:?})", message, data),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_state_predicates() {
    let loading: Resource<i32> = Resource::loading(None);
    assert!(loading.is_loading());
    assert!(!loading.is_terminal());
    assert_eq!(loading.data(), None);

    let success = Resource::success(42);
    assert!(success.is_success());
    assert!(success.is_terminal());
    assert_eq!(success.data(), Some(&42));

    let error: Resource<i32> = Resource::error("timeout", Some(10));
    assert!(error.is_error());
    assert_eq!(error.error_message(), Some("timeout"));
    assert_eq!(error.into_data(), Some(10));
  }

  #[test]
  fn test_map_keeps_state() {
    let mapped = Resource::error("boom", Some(2)).map(|n: i32| n * 10);
    assert_eq!(mapped, Resource::error("boom", Some(20)));

    let mapped = Resource::Loading(None::<i32>).map(|n| n + 1);
    assert_eq!(mapped, Resource::Loading(None));
  }

  #[test]
  fn test_display() {
    assert_eq!(Resource::<i32>::loading(None).to_string(), "loading");
    assert_eq!(Resource::success(42).to_string(), "success: 42");
    assert_eq!(
      Resource::<i32>::error("timeout", None).to_string(),
      "error: timeout"
    );
  }

  #[test]
  fn test_serializes_tagged() {
    let json = serde_json::to_value(Resource::success(7)).unwrap();
    assert_eq!(json["state"], "success");
    assert_eq!(json["payload"], 7);

    let json = serde_json::to_value(Resource::<i32>::error("timeout", None)).unwrap();
    assert_eq!(json["state"], "error");
    assert_eq!(json["payload"]["message"], "timeout");
    assert!(json["payload"]["data"].is_null());
  }
}
