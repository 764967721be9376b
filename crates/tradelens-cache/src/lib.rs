pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use error::CacheError;
pub use memory::{CacheEntry, MemoryCache};
pub use sqlite::SqliteStore;
pub use store::CacheStore;
