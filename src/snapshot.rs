//! The snapshot document: a JSON object keyed by key name, each entry
//! `{"tipo": <type>, "valor": <value>, "ttl": <seconds>}`.
//!
//! Value shapes per type:
//!
//! * `string`: a JSON string for raw text, any other JSON value for a
//!   parsed document
//! * `hash`: an object of field to string
//! * `list`, `set`: an array of strings
//! * `zset`: an array of `[member, score]` pairs, lowest score first;
//!   infinite scores are written as `"inf"` / `"-inf"`

use std::collections::HashMap;
use serde_json::{Map, Number, Value as Json};
use crate::error::Error;
use crate::types::{KeyRecord, StringValue, TypeTag, Value};

const FIELD_TYPE: &str = "tipo";
const FIELD_VALUE: &str = "valor";
const FIELD_TTL: &str = "ttl";

/// Key used in errors about the document as a whole.
pub const ROOT: &str = "$";

/// An ordered set of records with unique keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    records: Vec<KeyRecord>,
    index: HashMap<String, usize>,
}

/// Result of a lenient decode: the well-formed records plus one
/// `MalformedSnapshot` error per rejected entry.
#[derive(Debug, Default)]
pub struct Decoded {
    pub snapshot: Snapshot,
    pub rejected: Vec<Error>,
}

impl Snapshot {
    pub fn new() -> Snapshot {
        Snapshot::default()
    }

    /// Add a record. A record for a key already present replaces it in place.
    pub fn insert(&mut self, record: KeyRecord) {
        match self.index.get(&record.key) {
            Some(&i) => self.records[i] = record,
            None => {
                self.index.insert(record.key.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&KeyRecord> {
        self.index.get(key).map(|&i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyRecord> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<KeyRecord> {
        self.records
    }

    /// Pretty-printed JSON. Same records in the same order give the same
    /// bytes.
    pub fn encode(&self) -> crate::Result<Vec<u8>> {
        let mut root = Map::with_capacity(self.records.len());
        for record in &self.records {
            root.insert(record.key.clone(), encode_record(record)?);
        }
        Ok(serde_json::to_vec_pretty(&Json::Object(root))?)
    }

    /// Decode a whole document, failing on the first malformed entry.
    pub fn decode(bytes: &[u8]) -> crate::Result<Snapshot> {
        let decoded = Snapshot::decode_lenient(bytes)?;
        match decoded.rejected.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(decoded.snapshot),
        }
    }

    /// Decode a document, setting aside malformed entries instead of failing.
    /// Only input that is not a JSON object is an error.
    pub fn decode_lenient(bytes: &[u8]) -> crate::Result<Decoded> {
        let root: Json = serde_json::from_slice(bytes).map_err(|e| Error::malformed(ROOT, e))?;
        let entries = match root {
            Json::Object(entries) => entries,
            other => return Err(Error::malformed(ROOT, format!("expected an object, got {}", kind(&other)))),
        };
        let mut decoded = Decoded::default();
        for (key, entry) in entries {
            match decode_record(&key, entry) {
                Ok(record) => decoded.snapshot.insert(record),
                Err(err) => decoded.rejected.push(err),
            }
        }
        Ok(decoded)
    }
}

impl FromIterator<KeyRecord> for Snapshot {
    fn from_iter<I: IntoIterator<Item = KeyRecord>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for record in iter {
            snapshot.insert(record);
        }
        snapshot
    }
}

fn encode_record(record: &KeyRecord) -> crate::Result<Json> {
    let mut entry = Map::with_capacity(3);
    entry.insert(FIELD_TYPE.into(), Json::String(record.type_tag().as_str().into()));
    entry.insert(FIELD_VALUE.into(), encode_value(&record.key, &record.value)?);
    entry.insert(FIELD_TTL.into(), Json::from(record.ttl_seconds));
    Ok(Json::Object(entry))
}

/// The JSON shape of a value, as listed in the module docs.
pub fn encode_value(key: &str, value: &Value) -> crate::Result<Json> {
    Ok(match value {
        Value::String(StringValue::Raw(raw)) => Json::String(raw.clone()),
        Value::String(StringValue::Document(doc)) => doc.clone(),
        Value::Hash(fields) => Json::Object(
            fields
                .iter()
                .map(|(field, value)| (field.clone(), Json::String(value.clone())))
                .collect(),
        ),
        Value::List(items) | Value::Set(items) => {
            Json::Array(items.iter().cloned().map(Json::String).collect())
        }
        Value::SortedSet(members) => Json::Array(
            members
                .iter()
                .map(|(member, score)| -> crate::Result<Json> {
                    Ok(Json::Array(vec![Json::String(member.clone()), encode_score(key, *score)?]))
                })
                .collect::<crate::Result<Vec<_>>>()?,
        ),
    })
}

fn encode_score(key: &str, score: f64) -> crate::Result<Json> {
    if score.is_infinite() {
        return Ok(Json::String(if score > 0.0 { "inf" } else { "-inf" }.into()));
    }
    Number::from_f64(score)
        .map(Json::Number)
        .ok_or_else(|| Error::malformed(key, "score is NaN"))
}

fn decode_record(key: &str, entry: Json) -> crate::Result<KeyRecord> {
    let mut entry = match entry {
        Json::Object(entry) => entry,
        other => return Err(Error::malformed(key, format!("expected an object, got {}", kind(&other)))),
    };
    let missing = |field: &str| Error::malformed(key, format!("missing `{}`", field));

    let tag = match entry.remove(FIELD_TYPE).ok_or_else(|| missing(FIELD_TYPE))? {
        Json::String(name) => name
            .parse::<TypeTag>()
            .map_err(|name| Error::malformed(key, format!("unknown type `{}`", name)))?,
        other => return Err(Error::malformed(key, format!("`{}` must be a string, got {}", FIELD_TYPE, kind(&other)))),
    };
    let value = entry.remove(FIELD_VALUE).ok_or_else(|| missing(FIELD_VALUE))?;
    let ttl = entry
        .remove(FIELD_TTL)
        .ok_or_else(|| missing(FIELD_TTL))?
        .as_i64()
        .ok_or_else(|| Error::malformed(key, format!("`{}` must be an integer", FIELD_TTL)))?;

    Ok(KeyRecord::new(key, decode_value(key, tag, value)?, ttl))
}

/// Check `value` against the declared type and convert it.
pub fn decode_value(key: &str, tag: TypeTag, value: Json) -> crate::Result<Value> {
    let shape = |expected: &str, got: &Json| {
        Error::malformed(key, format!("`{}` value must be {}, got {}", tag, expected, kind(got)))
    };

    match tag {
        TypeTag::String => Ok(Value::String(match value {
            Json::String(raw) => StringValue::Raw(raw),
            doc => StringValue::Document(doc),
        })),
        TypeTag::Hash => match value {
            Json::Object(fields) => fields
                .into_iter()
                .map(|(field, value)| match value {
                    Json::String(s) => Ok((field, s)),
                    other => Err(shape("an object of strings", &other)),
                })
                .collect::<crate::Result<Vec<_>>>()
                .map(Value::Hash),
            other => Err(shape("an object", &other)),
        },
        TypeTag::List | TypeTag::Set => {
            let items = match value {
                Json::Array(items) => items
                    .into_iter()
                    .map(|item| match item {
                        Json::String(s) => Ok(s),
                        other => Err(shape("an array of strings", &other)),
                    })
                    .collect::<crate::Result<Vec<_>>>()?,
                other => return Err(shape("an array", &other)),
            };
            Ok(if tag == TypeTag::List { Value::List(items) } else { Value::Set(items) })
        }
        TypeTag::SortedSet => match value {
            Json::Array(pairs) => pairs
                .into_iter()
                .map(|pair| match pair {
                    Json::Array(mut pair) if pair.len() == 2 => {
                        let score = decode_score(&pair[1]).ok_or_else(|| shape("[member, score] pairs", &pair[1]))?;
                        match pair.swap_remove(0) {
                            Json::String(member) => Ok((member, score)),
                            other => Err(shape("[member, score] pairs", &other)),
                        }
                    }
                    other => Err(shape("[member, score] pairs", &other)),
                })
                .collect::<crate::Result<Vec<_>>>()
                .map(Value::SortedSet),
            other => Err(shape("an array", &other)),
        },
    }
}

fn decode_score(score: &Json) -> Option<f64> {
    match score {
        Json::Number(n) => n.as_f64(),
        Json::String(s) => match s.as_str() {
            "inf" | "+inf" => Some(f64::INFINITY),
            "-inf" => Some(f64::NEG_INFINITY),
            _ => None,
        },
        _ => None,
    }
}

fn kind(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Snapshot {
        vec![
            KeyRecord::persistent("texto", Value::String(StringValue::Raw("42".into()))),
            KeyRecord::persistent("cliente:1", Value::String(StringValue::Document(json!({"nome": "Ana", "ativo": true})))),
            KeyRecord::persistent("h", Value::Hash(vec![("z".into(), "1".into()), ("a".into(), "2".into())])),
            KeyRecord::persistent("fila", Value::List(vec!["c".into(), "a".into(), "b".into()])),
            KeyRecord::persistent("tags", Value::Set(vec!["x".into(), "y".into()])),
            KeyRecord::persistent("rank", Value::SortedSet(vec![("a".into(), 1.0), ("b".into(), 2.5), ("c".into(), f64::INFINITY)])),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn round_trip() {
        let snapshot = sample();
        let decoded = Snapshot::decode(&snapshot.encode().unwrap()).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn encoding_is_deterministic() {
        assert_eq!(sample().encode().unwrap(), sample().encode().unwrap());
    }

    #[test]
    fn entry_layout() {
        let snapshot: Snapshot = vec![KeyRecord::new("sessao", Value::List(vec!["a".into()]), 30)].into_iter().collect();
        let text = String::from_utf8(snapshot.encode().unwrap()).unwrap();
        let tipo = text.find("\"tipo\"").unwrap();
        let valor = text.find("\"valor\"").unwrap();
        let ttl = text.find("\"ttl\"").unwrap();
        assert!(tipo < valor && valor < ttl);
        let doc: Json = serde_json::from_str(&text).unwrap();
        assert_eq!(doc, json!({"sessao": {"tipo": "list", "valor": ["a"], "ttl": 30}}));
    }

    #[test]
    fn reads_documents_written_by_other_tools() {
        let doc = br#"{
            "contador": {"tipo": "string", "valor": 7, "ttl": -1, "extra": "ignored"},
            "rank": {"tipo": "zset", "valor": [["a", 1], ["b", 2.0]], "ttl": 120}
        }"#;
        let snapshot = Snapshot::decode(doc).unwrap();
        assert_eq!(
            snapshot.get("contador").unwrap().value,
            Value::String(StringValue::Document(json!(7)))
        );
        let rank = snapshot.get("rank").unwrap();
        assert_eq!(rank.value, Value::SortedSet(vec![("a".into(), 1.0), ("b".into(), 2.0)]));
        assert_eq!(rank.ttl_seconds, 120);
    }

    #[test]
    fn top_level_must_be_object() {
        for doc in [&b"[1, 2]"[..], &b"\"x\""[..], &b"not json"[..]] {
            match Snapshot::decode_lenient(doc) {
                Err(Error::MalformedSnapshot { key, .. }) => assert_eq!(key, ROOT),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn malformed_entries() {
        let cases: Vec<(&str, Json)> = vec![
            ("missing tipo", json!({"valor": "x", "ttl": -1})),
            ("missing valor", json!({"tipo": "string", "ttl": -1})),
            ("missing ttl", json!({"tipo": "string", "valor": "x"})),
            ("bad tipo", json!({"tipo": "stream", "valor": [], "ttl": -1})),
            ("ttl not int", json!({"tipo": "string", "valor": "x", "ttl": "soon"})),
            ("zset triple", json!({"tipo": "zset", "valor": [["a", 1, 2]], "ttl": -1})),
            ("zset bad score", json!({"tipo": "zset", "valor": [["a", "high"]], "ttl": -1})),
            ("list of numbers", json!({"tipo": "list", "valor": [1, 2], "ttl": -1})),
            ("hash as array", json!({"tipo": "hash", "valor": ["a"], "ttl": -1})),
            ("entry not object", json!("x")),
        ];
        for (name, entry) in cases {
            let doc = serde_json::to_vec(&json!({ "k": entry })).unwrap();
            match Snapshot::decode(&doc) {
                Err(Error::MalformedSnapshot { key, .. }) => assert_eq!(key, "k", "{}", name),
                other => panic!("{}: unexpected {:?}", name, other),
            }
        }
    }

    #[test]
    fn lenient_decode_isolates_bad_entries() {
        let doc = serde_json::to_vec(&json!({
            "a": {"tipo": "string", "valor": "1", "ttl": -1},
            "b": {"tipo": "set", "valor": "oops", "ttl": -1},
            "c": {"tipo": "list", "valor": ["x"], "ttl": -1},
        }))
        .unwrap();
        let decoded = Snapshot::decode_lenient(&doc).unwrap();
        assert_eq!(decoded.snapshot.iter().map(|r| r.key.as_str()).collect::<Vec<_>>(), vec!["a", "c"]);
        assert_eq!(decoded.rejected.len(), 1);
    }

    #[test]
    fn nan_score_cannot_be_encoded() {
        let snapshot: Snapshot = vec![KeyRecord::persistent("z", Value::SortedSet(vec![("a".into(), f64::NAN)]))]
            .into_iter()
            .collect();
        assert!(snapshot.encode().is_err());
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut snapshot = sample();
        let len = snapshot.len();
        snapshot.insert(KeyRecord::persistent("h", Value::List(vec!["n".into()])));
        assert_eq!(snapshot.len(), len);
        assert_eq!(snapshot.iter().nth(2).unwrap().type_tag(), TypeTag::List);
    }
}
