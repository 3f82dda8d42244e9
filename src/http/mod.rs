//! Network collaborator: a JSON-over-HTTP source and the bound resource that
//! pairs it with the SQLite store.

mod client;
mod endpoint;

pub use client::HttpSource;
pub use endpoint::{url_key, JsonEndpoint};
