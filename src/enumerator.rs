use std::collections::HashSet;
use tracing::debug;
use crate::store::Store;

pub const DEFAULT_SCAN_COUNT: usize = 500;

/// Lists keys matching a glob pattern. Keys are walked with a cursor scan so
/// only one batch is held at a time.
#[derive(Debug, Clone)]
pub struct KeyEnumerator {
    pattern: String,
    count: usize,
}

/// A cursor over the keys of one pattern. It holds no store, so the caller
/// may use the store between batches. Restart by creating a new one.
#[derive(Debug, Clone)]
pub struct KeyScan {
    pattern: String,
    count: usize,
    cursor: u64,
    done: bool,
}

impl KeyEnumerator {
    pub fn new(pattern: impl ToString) -> KeyEnumerator {
        KeyEnumerator {
            pattern: pattern.to_string(),
            count: DEFAULT_SCAN_COUNT,
        }
    }

    pub fn with_count(mut self, count: usize) -> KeyEnumerator {
        self.count = count.max(1);
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn scan(&self) -> KeyScan {
        KeyScan {
            pattern: self.pattern.clone(),
            count: self.count,
            cursor: 0,
            done: false,
        }
    }

    /// Every matching key, each once, in scan order. Empty when nothing
    /// matches.
    pub async fn list<S: Store + ?Sized>(&self, store: &mut S) -> crate::Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut keys = vec![];
        let mut scan = self.scan();
        while let Some(batch) = scan.next_batch(store).await? {
            keys.extend(batch.into_iter().filter(|key| seen.insert(key.clone())));
        }
        debug!(pattern = %self.pattern, count = keys.len(), "keys listed");
        Ok(keys)
    }
}

impl KeyScan {
    /// The next batch of keys, or `None` once the scan is complete. Batches
    /// may be empty and keys may repeat across batches.
    pub async fn next_batch<S: Store + ?Sized>(&mut self, store: &mut S) -> crate::Result<Option<Vec<String>>> {
        if self.done {
            return Ok(None);
        }
        let (next, keys) = store.scan(self.cursor, &self.pattern, self.count).await?;
        self.cursor = next;
        self.done = next == 0;
        Ok(Some(keys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn pattern_filtering() {
        let mut store = MemoryStore::new();
        store.set("cliente:1", "a").await.unwrap();
        store.set("token:1", "b").await.unwrap();
        let keys = KeyEnumerator::new("cliente:*").list(&mut store).await.unwrap();
        assert_eq!(keys, vec!["cliente:1"]);
    }

    #[tokio::test]
    async fn no_match_is_empty() {
        let mut store = MemoryStore::new();
        store.set("token:1", "b").await.unwrap();
        let keys = KeyEnumerator::new("cliente:*").list(&mut store).await.unwrap();
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn batches_are_bounded() {
        let mut store = MemoryStore::new();
        for i in 0..25 {
            store.set(&format!("k:{:02}", i), "v").await.unwrap();
        }
        let enumerator = KeyEnumerator::new("*").with_count(10);
        let mut scan = enumerator.scan();
        let mut sizes = vec![];
        while let Some(batch) = scan.next_batch(&mut store).await.unwrap() {
            sizes.push(batch.len());
        }
        assert_eq!(sizes, vec![10, 10, 5]);
        assert!(scan.next_batch(&mut store).await.unwrap().is_none());
    }
}
