//! Cache-then-network resource coordination.
//!
//! A [`Coordinator`] keeps a local store and a remote source in step for one
//! bound resource and reports progress as [`Resource`] states. Implement
//! [`BoundResource`] for your own storage and transport, or use
//! [`JsonEndpoint`] to cache a JSON URL in the bundled [`SqliteStore`].

pub mod bound;
pub mod cache;
pub mod config;
pub mod http;
pub mod logging;
pub mod resource;

pub use bound::{BoundResource, Coordinator, ExecutionContexts, ResourceStream, Subscription};
pub use cache::{SqliteStore, StalePolicy, StoredDocument};
pub use config::{Config, CoordinatorConfig};
pub use http::{HttpSource, JsonEndpoint};
pub use resource::Resource;
