//! The store protocol the engine speaks: a source side (listing, type
//! introspection, per-type bulk reads, TTL) and a target side (delete,
//! per-type bulk writes, expiration).

pub mod memory;
pub mod remote;

use async_trait::async_trait;

pub use memory::MemoryStore;
pub use remote::{RemoteStore, ServerInfo};

/// TTL reply for a key that does not exist.
pub const TTL_MISSING: i64 = -2;

#[async_trait]
pub trait Store: Send {
    /// One step of a cursor scan. Returns the next cursor (`0` when the scan
    /// is complete) and the keys matching `pattern` in this batch. A key may
    /// be reported more than once across batches.
    async fn scan(&mut self, cursor: u64, pattern: &str, count: usize) -> crate::Result<(u64, Vec<String>)>;

    /// The type name reported by the store, `"none"` for a missing key.
    async fn key_type(&mut self, key: &str) -> crate::Result<String>;

    async fn get(&mut self, key: &str) -> crate::Result<Option<String>>;

    async fn hgetall(&mut self, key: &str) -> crate::Result<Vec<(String, String)>>;

    /// The whole list, head first.
    async fn lrange_all(&mut self, key: &str) -> crate::Result<Vec<String>>;

    async fn smembers(&mut self, key: &str) -> crate::Result<Vec<String>>;

    /// Every member with its score, lowest score first.
    async fn zrange_withscores(&mut self, key: &str) -> crate::Result<Vec<(String, f64)>>;

    /// Seconds to live: `-1` without expiration, `-2` when the key is missing.
    async fn ttl(&mut self, key: &str) -> crate::Result<i64>;

    async fn del(&mut self, key: &str) -> crate::Result<bool>;

    async fn set(&mut self, key: &str, value: &str) -> crate::Result<()>;

    async fn hset(&mut self, key: &str, fields: &[(String, String)]) -> crate::Result<()>;

    async fn rpush(&mut self, key: &str, items: &[String]) -> crate::Result<()>;

    async fn sadd(&mut self, key: &str, members: &[String]) -> crate::Result<()>;

    async fn zadd(&mut self, key: &str, members: &[(String, f64)]) -> crate::Result<()>;

    async fn expire(&mut self, key: &str, seconds: u64) -> crate::Result<bool>;
}
