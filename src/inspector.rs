use tracing::warn;
use crate::enumerator::KeyEnumerator;
use crate::resolver;
use crate::store::Store;
use crate::types::KeyRecord;
use crate::utils::sync::Notifier;

/// Read-only listing: every key matching the enumerator's pattern, resolved,
/// in enumeration order. Keys that vanish or cannot be read are left out.
/// When `shutdown` fires, the keys resolved so far are returned.
pub async fn inspect<S: Store + ?Sized>(
    store: &mut S,
    enumerator: &KeyEnumerator,
    shutdown: Option<&Notifier>,
) -> crate::Result<Vec<KeyRecord>> {
    let keys = enumerator.list(store).await?;
    let mut records = Vec::with_capacity(keys.len());
    for key in keys {
        if shutdown.map_or(false, Notifier::is_notified) {
            warn!(listed = records.len(), "interrupted, stopping listing");
            break;
        }
        match resolver::resolve(store, &key).await {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!(%key, error = %e, "skipping key"),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{StringValue, Value};

    #[tokio::test]
    async fn lists_matching_keys_in_order() {
        let mut store = MemoryStore::new();
        store.set("cliente:2", "b").await.unwrap();
        store.set("cliente:1", "a").await.unwrap();
        store.rpush("token:1", &["t".into()]).await.unwrap();
        let records = inspect(&mut store, &KeyEnumerator::new("cliente:*"), None).await.unwrap();
        assert_eq!(
            records.iter().map(|r| r.key.as_str()).collect::<Vec<_>>(),
            vec!["cliente:1", "cliente:2"]
        );
        assert_eq!(records[0].value, Value::String(StringValue::Raw("a".into())));
    }

    #[tokio::test]
    async fn does_not_modify_the_store() {
        let mut store = MemoryStore::new();
        store.set("k", "v").await.unwrap();
        store.expire("k", 100).await.unwrap();
        inspect(&mut store, &KeyEnumerator::new("*"), None).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert!(store.ttl("k").await.unwrap() > 0);
    }

    #[tokio::test]
    async fn stops_when_interrupted() {
        let mut store = MemoryStore::new();
        store.set("k", "v").await.unwrap();
        let shutdown = Notifier::new();
        shutdown.notify_all();
        let records = inspect(&mut store, &KeyEnumerator::new("*"), Some(&shutdown)).await.unwrap();
        assert!(records.is_empty());
    }
}
