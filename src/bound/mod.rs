//! Cache-then-network coordination.
//!
//! A [`Coordinator`] observes a local store through a [`BoundResource`],
//! fetches from the remote source when the stored value is stale, writes the
//! result back, and reports progress as [`Resource`](crate::Resource) states
//! on a broadcast stream.

mod context;
mod coordinator;
mod stream;
mod traits;

pub use context::ExecutionContexts;
pub use coordinator::Coordinator;
pub use stream::{ResourceStream, Subscription};
pub use traits::BoundResource;
