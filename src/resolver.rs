use tracing::debug;
use crate::error::Error;
use crate::store::{Store, TTL_MISSING};
use crate::types::{KeyRecord, StringValue, TypeTag, Value};

/// Read a key's type, value and remaining TTL.
///
/// Returns `Ok(None)` when the key disappeared between listing and reading
/// (expired or deleted meanwhile). A type outside the five supported ones is
/// `Error::UnsupportedType`.
pub async fn resolve<S: Store + ?Sized>(store: &mut S, key: &str) -> crate::Result<Option<KeyRecord>> {
    match fetch(store, key).await {
        Ok(record) => Ok(Some(record)),
        Err(Error::KeyVanished(_)) => {
            debug!(%key, "key vanished before it could be read");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

async fn fetch<S: Store + ?Sized>(store: &mut S, key: &str) -> crate::Result<KeyRecord> {
    let vanished = || Error::KeyVanished(key.to_string());

    let type_name = store.key_type(key).await?;
    if type_name == "none" {
        return Err(vanished());
    }
    let tag: TypeTag = type_name.parse().map_err(|type_name| Error::UnsupportedType {
        key: key.to_string(),
        type_name,
    })?;

    let value = match tag {
        TypeTag::String => {
            let raw = store.get(key).await?.ok_or_else(vanished)?;
            Value::String(StringValue::from_store(raw))
        }
        TypeTag::Hash => Value::Hash(store.hgetall(key).await?),
        TypeTag::List => Value::List(store.lrange_all(key).await?),
        TypeTag::Set => Value::Set(store.smembers(key).await?),
        TypeTag::SortedSet => Value::SortedSet(store.zrange_withscores(key).await?),
    };
    // the store has no empty containers; an empty read means the key is gone
    if value.is_empty() {
        return Err(vanished());
    }

    let ttl = store.ttl(key).await?;
    if ttl == TTL_MISSING {
        return Err(vanished());
    }
    Ok(KeyRecord::new(key, value, ttl))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::NO_EXPIRY;
    use serde_json::json;

    #[tokio::test]
    async fn resolves_each_type() {
        let mut store = MemoryStore::new();
        store.set("texto", "olá").await.unwrap();
        store.set("doc", r#"{"id":1}"#).await.unwrap();
        store.hset("h", &[("b".into(), "2".into()), ("a".into(), "1".into())]).await.unwrap();
        store.rpush("l", &["x".into(), "y".into()]).await.unwrap();
        store.sadd("s", &["m".into()]).await.unwrap();
        store.zadd("z", &[("b".into(), 2.0), ("a".into(), 1.0)]).await.unwrap();

        let texto = resolve(&mut store, "texto").await.unwrap().unwrap();
        assert_eq!(texto.value, Value::String(StringValue::Raw("olá".into())));
        assert_eq!(texto.ttl_seconds, NO_EXPIRY);

        let doc = resolve(&mut store, "doc").await.unwrap().unwrap();
        assert_eq!(doc.value, Value::String(StringValue::Document(json!({"id": 1}))));

        let h = resolve(&mut store, "h").await.unwrap().unwrap();
        assert_eq!(h.type_tag(), TypeTag::Hash);
        assert_eq!(h.value.len(), 2);

        let l = resolve(&mut store, "l").await.unwrap().unwrap();
        assert_eq!(l.value, Value::List(vec!["x".into(), "y".into()]));

        let s = resolve(&mut store, "s").await.unwrap().unwrap();
        assert_eq!(s.value, Value::Set(vec!["m".into()]));

        let z = resolve(&mut store, "z").await.unwrap().unwrap();
        assert_eq!(z.value, Value::SortedSet(vec![("a".into(), 1.0), ("b".into(), 2.0)]));
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let mut store = MemoryStore::new();
        assert!(resolve(&mut store, "nada").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn captures_remaining_ttl() {
        let mut store = MemoryStore::new();
        store.set("sessao", "abc").await.unwrap();
        store.expire("sessao", 30).await.unwrap();
        let record = resolve(&mut store, "sessao").await.unwrap().unwrap();
        assert!((29..=30).contains(&record.ttl_seconds));
    }
}
