//! Execution contexts a coordinator schedules its work on.

use color_eyre::{eyre::eyre, Result};
use futures::stream::{BoxStream, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// The runtimes a coordinator runs on.
///
/// - `origin`: observation and fetch cycles, `should_refresh`, emissions
/// - `local_io`: polling of local store streams
/// - `network_io`: polling of remote fetches
/// - `write`: blocking `persist` calls
///
/// All four may be the same runtime. Splitting them lets slow disk or network
/// work stay off the runtime that consumers observe on.
#[derive(Debug, Clone)]
pub struct ExecutionContexts {
  origin: Handle,
  local_io: Handle,
  network_io: Handle,
  write: Handle,
}

impl ExecutionContexts {
  pub fn new(origin: Handle, local_io: Handle, network_io: Handle, write: Handle) -> Self {
    Self {
      origin,
      local_io,
      network_io,
      write,
    }
  }

  /// Use the runtime we are currently running on for every context.
  pub fn current() -> Result<Self> {
    let handle = Handle::try_current()
      .map_err(|e| eyre!("No tokio runtime available for execution contexts: {}", e))?;
    Ok(Self::uniform(handle))
  }

  /// Use one runtime for every context.
  pub fn uniform(handle: Handle) -> Self {
    Self {
      origin: handle.clone(),
      local_io: handle.clone(),
      network_io: handle.clone(),
      write: handle,
    }
  }

  pub fn with_origin(mut self, handle: Handle) -> Self {
    self.origin = handle;
    self
  }

  pub fn with_local_io(mut self, handle: Handle) -> Self {
    self.local_io = handle;
    self
  }

  pub fn with_network_io(mut self, handle: Handle) -> Self {
    self.network_io = handle;
    self
  }

  pub fn with_write(mut self, handle: Handle) -> Self {
    self.write = handle;
    self
  }

  pub fn origin(&self) -> &Handle {
    &self.origin
  }

  pub fn local_io(&self) -> &Handle {
    &self.local_io
  }

  pub fn network_io(&self) -> &Handle {
    &self.network_io
  }

  pub fn write(&self) -> &Handle {
    &self.write
  }
}

/// Aborts the wrapped task when dropped.
pub(crate) struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
  fn drop(&mut self) {
    self.0.abort();
  }
}

/// Poll `stream` on `on` and forward its items through an unbounded channel.
///
/// The pump stops when the stream ends, when the receiver is dropped, or when
/// the returned guard is dropped.
pub(crate) fn pump<T: Send + 'static>(
  mut stream: BoxStream<'static, T>,
  on: &Handle,
) -> (mpsc::UnboundedReceiver<T>, AbortOnDrop) {
  let (tx, rx) = mpsc::unbounded_channel();

  let task = on.spawn(async move {
    while let Some(item) = stream.next().await {
      if tx.send(item).is_err() {
        break;
      }
    }
  });

  (rx, AbortOnDrop(task))
}

#[cfg(test)]
mod tests {
  use super::*;
  use futures::stream;

  #[tokio::test]
  async fn test_current_uses_running_runtime() {
    let contexts = ExecutionContexts::current().unwrap();
    let value = contexts.write().spawn(async { 7 }).await.unwrap();
    assert_eq!(value, 7);
  }

  #[test]
  fn test_current_outside_runtime_fails() {
    assert!(ExecutionContexts::current().is_err());
  }

  #[tokio::test]
  async fn test_pump_forwards_all_items() {
    let (mut rx, _guard) = pump(stream::iter(vec![1, 2, 3]).boxed(), &Handle::current());

    let mut received = Vec::new();
    while let Some(item) = rx.recv().await {
      received.push(item);
    }
    assert_eq!(received, vec![1, 2, 3]);
  }

  #[tokio::test]
  async fn test_dropping_guard_stops_pump() {
    let (mut rx, guard) = pump(stream::pending::<i32>().boxed(), &Handle::current());
    drop(guard);

    // The aborted task drops its sender, closing the channel
    assert_eq!(rx.recv().await, None);
  }
}
