//! Local storage collaborator: a SQLite document store plus staleness
//! predicates for deciding when a stored document needs a refresh.

mod policy;
mod storage;

pub use policy::StalePolicy;
pub use storage::{SqliteStore, StoredDocument};
