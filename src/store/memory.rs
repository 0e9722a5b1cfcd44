use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use crate::error::Error;
use crate::store::{Store, TTL_MISSING};
use crate::types::NO_EXPIRY;
use crate::utils::glob;

#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    String(String),
    Hash(BTreeMap<String, String>),
    List(Vec<String>),
    Set(BTreeSet<String>),
    SortedSet(HashMap<String, f64>),
}

impl DataType {
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            DataType::String(_) => "string",
            DataType::Hash(_) => "hash",
            DataType::List(_) => "list",
            DataType::Set(_) => "set",
            DataType::SortedSet(_) => "zset",
        }
    }
}

/// An in-process keyspace with the same typed semantics as a Redis
/// database. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shard: Arc<Shard>,
}

#[derive(Debug, Default)]
struct Shard {
    kv: RwLock<KV>,
}

#[derive(Debug, Default)]
struct KV {
    entries: HashMap<String, Entry>,
    expirations: BTreeSet<(Instant, String)>,
    /// Open scans: cursor to the last key the scan has walked past.
    scans: HashMap<u64, String>,
    last_cursor: u64,
}

#[derive(Debug)]
struct Entry {
    data: DataType,
    expiration: Option<Instant>,
}

fn wrong_type() -> Error {
    Error::Server("WRONGTYPE Operation against a key holding the wrong kind of value".into())
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let mut kv = self.shard.kv.write().await;
        kv.purge_expired_keys();
        kv.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// A copy of the value at `key`, if live.
    pub async fn value(&self, key: &str) -> Option<DataType> {
        let mut kv = self.shard.kv.write().await;
        kv.purge_expired_keys();
        kv.entries.get(key).map(|entry| entry.data.clone())
    }

    /// Store `value` at `key`, replacing what was there.
    pub async fn insert(&self, key: &str, value: DataType, expire: Option<Duration>) {
        let mut kv = self.shard.kv.write().await;
        kv.remove(key);
        let expiration = expire.map(|duration| Instant::now() + duration);
        kv.entries.insert(key.to_string(), Entry { data: value, expiration });
        if let Some(when) = expiration {
            kv.expirations.insert((when, key.to_string()));
        }
    }

    async fn read<T>(&self, key: &str, f: impl FnOnce(Option<&DataType>) -> crate::Result<T>) -> crate::Result<T> {
        let mut kv = self.shard.kv.write().await;
        kv.purge_expired_keys();
        f(kv.entries.get(key).map(|entry| &entry.data))
    }

    /// Fetch the entry at `key`, creating it with `empty` when missing, and
    /// hand its data to `f`.
    async fn write<T>(
        &self,
        key: &str,
        empty: DataType,
        f: impl FnOnce(&mut DataType) -> crate::Result<T>,
    ) -> crate::Result<T> {
        let mut kv = self.shard.kv.write().await;
        kv.purge_expired_keys();
        let entry = kv.entries.entry(key.to_string()).or_insert(Entry {
            data: empty.clone(),
            expiration: None,
        });
        if entry.data.type_name() != empty.type_name() {
            return Err(wrong_type());
        }
        f(&mut entry.data)
    }
}

impl KV {
    fn remove(&mut self, key: &str) -> bool {
        if let Some(entry) = self.entries.remove(key) {
            if let Some(when) = entry.expiration {
                self.expirations.remove(&(when, key.to_string()));
            }
            true
        } else {
            false
        }
    }

    fn purge_expired_keys(&mut self) {
        let now = Instant::now();
        while let Some((when, key)) = self.expirations.iter().next().cloned() {
            if when > now {
                return;
            }
            self.entries.remove(&key);
            self.expirations.remove(&(when, key));
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn scan(&mut self, cursor: u64, pattern: &str, count: usize) -> crate::Result<(u64, Vec<String>)> {
        let regex = glob::to_regex(pattern).map_err(|e| Error::Server(format!("ERR invalid pattern: {}", e)))?;
        let mut guard = self.shard.kv.write().await;
        let kv = &mut *guard;
        kv.purge_expired_keys();
        // resume after the last key walked past, not at a position
        let after = match cursor {
            0 => None,
            id => Some(kv.scans.remove(&id).ok_or_else(|| Error::Server("ERR invalid cursor".into()))?),
        };
        let mut keys: Vec<&String> = kv
            .entries
            .keys()
            .filter(|key| after.as_ref().map_or(true, |after| *key > after))
            .collect();
        keys.sort();
        let more = keys.len() > count.max(1);
        keys.truncate(count.max(1));
        let last = keys.last().map(|key| key.to_string());
        let batch = keys
            .into_iter()
            .filter(|key| regex.is_match(key))
            .cloned()
            .collect();
        let next = match last {
            Some(last) if more => {
                kv.last_cursor += 1;
                kv.scans.insert(kv.last_cursor, last);
                kv.last_cursor
            }
            _ => 0,
        };
        Ok((next, batch))
    }

    async fn key_type(&mut self, key: &str) -> crate::Result<String> {
        self.read(key, |data| Ok(data.map(|d| d.type_name()).unwrap_or("none").to_string())).await
    }

    async fn get(&mut self, key: &str) -> crate::Result<Option<String>> {
        self.read(key, |data| match data {
            None => Ok(None),
            Some(DataType::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type()),
        })
        .await
    }

    async fn hgetall(&mut self, key: &str) -> crate::Result<Vec<(String, String)>> {
        self.read(key, |data| match data {
            None => Ok(vec![]),
            Some(DataType::Hash(h)) => Ok(h.iter().map(|(f, v)| (f.clone(), v.clone())).collect()),
            Some(_) => Err(wrong_type()),
        })
        .await
    }

    async fn lrange_all(&mut self, key: &str) -> crate::Result<Vec<String>> {
        self.read(key, |data| match data {
            None => Ok(vec![]),
            Some(DataType::List(l)) => Ok(l.clone()),
            Some(_) => Err(wrong_type()),
        })
        .await
    }

    async fn smembers(&mut self, key: &str) -> crate::Result<Vec<String>> {
        self.read(key, |data| match data {
            None => Ok(vec![]),
            Some(DataType::Set(s)) => Ok(s.iter().cloned().collect()),
            Some(_) => Err(wrong_type()),
        })
        .await
    }

    async fn zrange_withscores(&mut self, key: &str) -> crate::Result<Vec<(String, f64)>> {
        self.read(key, |data| match data {
            None => Ok(vec![]),
            Some(DataType::SortedSet(z)) => {
                let mut members: Vec<(String, f64)> = z.iter().map(|(m, s)| (m.clone(), *s)).collect();
                // ties on score are broken by member, as Redis does
                members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
                Ok(members)
            }
            Some(_) => Err(wrong_type()),
        })
        .await
    }

    async fn ttl(&mut self, key: &str) -> crate::Result<i64> {
        let mut kv = self.shard.kv.write().await;
        kv.purge_expired_keys();
        Ok(match kv.entries.get(key) {
            None => TTL_MISSING,
            Some(Entry { expiration: None, .. }) => NO_EXPIRY,
            Some(Entry { expiration: Some(when), .. }) => {
                let ms = when.saturating_duration_since(Instant::now()).as_millis() as i64;
                (ms + 500) / 1000
            }
        })
    }

    async fn del(&mut self, key: &str) -> crate::Result<bool> {
        let mut kv = self.shard.kv.write().await;
        kv.purge_expired_keys();
        Ok(kv.remove(key))
    }

    async fn set(&mut self, key: &str, value: &str) -> crate::Result<()> {
        self.insert(key, DataType::String(value.to_string()), None).await;
        Ok(())
    }

    async fn hset(&mut self, key: &str, fields: &[(String, String)]) -> crate::Result<()> {
        if fields.is_empty() {
            return Err(Error::Server("ERR wrong number of arguments for 'hset' command".into()));
        }
        self.write(key, DataType::Hash(BTreeMap::new()), |data| {
            if let DataType::Hash(h) = data {
                h.extend(fields.iter().cloned());
            }
            Ok(())
        })
        .await
    }

    async fn rpush(&mut self, key: &str, items: &[String]) -> crate::Result<()> {
        if items.is_empty() {
            return Err(Error::Server("ERR wrong number of arguments for 'rpush' command".into()));
        }
        self.write(key, DataType::List(vec![]), |data| {
            if let DataType::List(l) = data {
                l.extend(items.iter().cloned());
            }
            Ok(())
        })
        .await
    }

    async fn sadd(&mut self, key: &str, members: &[String]) -> crate::Result<()> {
        if members.is_empty() {
            return Err(Error::Server("ERR wrong number of arguments for 'sadd' command".into()));
        }
        self.write(key, DataType::Set(BTreeSet::new()), |data| {
            if let DataType::Set(s) = data {
                s.extend(members.iter().cloned());
            }
            Ok(())
        })
        .await
    }

    async fn zadd(&mut self, key: &str, members: &[(String, f64)]) -> crate::Result<()> {
        if members.is_empty() {
            return Err(Error::Server("ERR wrong number of arguments for 'zadd' command".into()));
        }
        if members.iter().any(|(_, score)| score.is_nan()) {
            return Err(Error::Server("ERR value is not a valid float".into()));
        }
        self.write(key, DataType::SortedSet(HashMap::new()), |data| {
            if let DataType::SortedSet(z) = data {
                z.extend(members.iter().cloned());
            }
            Ok(())
        })
        .await
    }

    async fn expire(&mut self, key: &str, seconds: u64) -> crate::Result<bool> {
        let mut kv = self.shard.kv.write().await;
        kv.purge_expired_keys();
        let when = Instant::now() + Duration::from_secs(seconds);
        let prev = match kv.entries.get_mut(key) {
            Some(entry) => entry.expiration.replace(when),
            None => return Ok(false),
        };
        if let Some(prev) = prev {
            // clear expiration
            kv.expirations.remove(&(prev, key.to_string()));
        }
        kv.expirations.insert((when, key.to_string()));
        Ok(true)
    }
}
