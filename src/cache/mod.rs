//! Best-effort response cache.
//!
//! # Data Flow
//! ```text
//! GET request, resolved target
//!     → gateway.rs lookup → Hit (return immediately) | Miss
//!
//! GET + 200 response
//!     → gateway.rs store (spawned, never awaited by the response path)
//!     → CacheStore::put (memory.rs in-process, or any other store)
//! ```
//!
//! # Design Decisions
//! - Every store failure degrades to a miss or a logged no-op
//! - Entries carry a short `max-age`; the store honors it and evicts on its own

pub mod gateway;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::proxy::ProxyResponse;

pub use gateway::{CacheGateway, CacheLookup};
pub use memory::MemoryCacheStore;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache is full ({0} entries)")]
    Full(usize),

    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Key → response store backing the gateway.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<ProxyResponse>, CacheError>;

    async fn put(&self, key: &str, response: ProxyResponse) -> Result<(), CacheError>;
}
