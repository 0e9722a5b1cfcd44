use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use serde::{Deserialize, Serialize};

/// TTL reported for keys without an expiration.
pub const NO_EXPIRY: i64 = -1;

/// The five key types a snapshot can carry. Serialized with the names the
/// store reports from `TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "hash")]
    Hash,
    #[serde(rename = "list")]
    List,
    #[serde(rename = "set")]
    Set,
    #[serde(rename = "zset")]
    SortedSet,
}

impl TypeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::String => "string",
            TypeTag::Hash => "hash",
            TypeTag::List => "list",
            TypeTag::Set => "set",
            TypeTag::SortedSet => "zset",
        }
    }
}

impl FromStr for TypeTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(TypeTag::String),
            "hash" => Ok(TypeTag::Hash),
            "list" => Ok(TypeTag::List),
            "set" => Ok(TypeTag::Set),
            "zset" => Ok(TypeTag::SortedSet),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A string value either kept verbatim or, when it held a JSON document,
/// in parsed form so snapshots stay readable.
#[derive(Debug, Clone, PartialEq)]
pub enum StringValue {
    Raw(String),
    Document(serde_json::Value),
}

impl StringValue {
    /// Classify text read from the store. Only JSON objects and arrays whose
    /// compact form reproduces `raw` exactly become documents, so writing a
    /// document back yields the same bytes.
    pub fn from_store(raw: String) -> StringValue {
        let trimmed = raw.trim_start();
        if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
            return StringValue::Raw(raw);
        }
        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(doc) if serde_json::to_string(&doc).map(|s| s == raw).unwrap_or(false) => {
                StringValue::Document(doc)
            }
            _ => StringValue::Raw(raw),
        }
    }

    /// The text written to the store.
    pub fn to_store(&self) -> crate::Result<String> {
        match self {
            StringValue::Raw(raw) => Ok(raw.clone()),
            StringValue::Document(doc) => Ok(serde_json::to_string(doc)?),
        }
    }
}

/// A key's value in its type's native shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(StringValue),
    Hash(Vec<(String, String)>),          // field, value
    List(Vec<String>),
    Set(Vec<String>),
    SortedSet(Vec<(String, f64)>),        // member, score; ascending score
}

impl Value {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::String(_) => TypeTag::String,
            Value::Hash(_) => TypeTag::Hash,
            Value::List(_) => TypeTag::List,
            Value::Set(_) => TypeTag::Set,
            Value::SortedSet(_) => TypeTag::SortedSet,
        }
    }

    /// Number of elements for containers, 1 for strings.
    pub fn len(&self) -> usize {
        match self {
            Value::String(_) => 1,
            Value::Hash(v) => v.len(),
            Value::List(v) | Value::Set(v) => v.len(),
            Value::SortedSet(v) => v.len(),
        }
    }

    /// Containers with no elements cannot exist at a key.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One captured key. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyRecord {
    pub key: String,
    pub value: Value,
    pub ttl_seconds: i64,
}

impl KeyRecord {
    pub fn new(key: impl ToString, value: Value, ttl_seconds: i64) -> KeyRecord {
        KeyRecord {
            key: key.to_string(),
            value,
            ttl_seconds,
        }
    }

    pub fn persistent(key: impl ToString, value: Value) -> KeyRecord {
        KeyRecord::new(key, value, NO_EXPIRY)
    }

    pub fn type_tag(&self) -> TypeTag {
        self.value.type_tag()
    }

    /// Expiration to apply on restore, relative to the moment of restore.
    /// Only a positive TTL yields one.
    pub fn expiry(&self) -> Option<Duration> {
        if self.ttl_seconds > 0 {
            Some(Duration::from_secs(self.ttl_seconds as u64))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compact_json_becomes_document() {
        let v = StringValue::from_store(r#"{"nome":"Ana","dividas":[1,2]}"#.to_string());
        assert_eq!(v, StringValue::Document(json!({"nome": "Ana", "dividas": [1, 2]})));
        assert_eq!(v.to_store().unwrap(), r#"{"nome":"Ana","dividas":[1,2]}"#);
    }

    #[test]
    fn non_canonical_json_stays_raw() {
        let raw = r#"{"nome": "Ana"}"#.to_string();
        assert_eq!(StringValue::from_store(raw.clone()), StringValue::Raw(raw));
    }

    #[test]
    fn scalars_stay_raw() {
        for raw in ["123", "true", "null", "hello", "\"quoted\"", ""] {
            assert_eq!(StringValue::from_store(raw.to_string()), StringValue::Raw(raw.to_string()));
        }
    }

    #[test]
    fn type_names() {
        assert_eq!("zset".parse::<TypeTag>().unwrap(), TypeTag::SortedSet);
        assert_eq!("stream".parse::<TypeTag>(), Err("stream".to_string()));
        assert_eq!(TypeTag::Hash.to_string(), "hash");
    }

    #[test]
    fn expiry_only_for_positive_ttl() {
        let v = Value::List(vec!["a".into()]);
        assert_eq!(KeyRecord::new("k", v.clone(), 30).expiry(), Some(Duration::from_secs(30)));
        assert_eq!(KeyRecord::new("k", v.clone(), 0).expiry(), None);
        assert_eq!(KeyRecord::persistent("k", v).expiry(), None);
    }

    #[test]
    fn empty_containers() {
        assert!(Value::Set(vec![]).is_empty());
        assert!(!Value::String(StringValue::Raw(String::new())).is_empty());
    }
}
