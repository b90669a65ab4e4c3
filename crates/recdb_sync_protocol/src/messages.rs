//! Wire queries and responses.

use crate::error::{ProtocolError, ProtocolResult};
use crate::type_index::TypeIndex;
use recdb_codec::{from_json, to_canonical_json, Value};
use std::collections::BTreeMap;

/// A query POSTed to the authoritative store.
///
/// Every body carries a `query` discriminator; the remaining fields
/// depend on the query.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Fetch the authoritative content hash.
    Hash,
    /// Insert one record into the authoritative set.
    Add {
        /// The record's type.
        type_name: String,
        /// The record's canonical literal.
        instance: Value,
    },
    /// Replace one authoritative record.
    Edit {
        /// The record's type.
        type_name: String,
        /// The record's canonical literal.
        instance: Value,
    },
    /// Tombstone one authoritative record.
    Delete {
        /// The record's type.
        type_name: String,
        /// The tombstone literal carrying the deletion timestamp.
        instance: Value,
    },
    /// Three-way merge of the client's delta against the authoritative
    /// set.
    Reconcile {
        /// The client's last successful sync timestamp.
        sync: u64,
        /// The client's delta.
        instances: TypeIndex,
    },
    /// Apply conflict resolutions chosen by the client.
    Resolve {
        /// The chosen version per conflicted record.
        choices: ChoiceIndex,
    },
}

impl Query {
    /// The query's wire name.
    pub fn name(&self) -> &'static str {
        match self {
            Query::Hash => "hash",
            Query::Add { .. } => "add",
            Query::Edit { .. } => "edit",
            Query::Delete { .. } => "delete",
            Query::Reconcile { .. } => "reconcile",
            Query::Resolve { .. } => "resolve",
        }
    }

    /// Encodes the query body.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut fields = vec![("query".to_string(), Value::from(self.name()))];
        match self {
            Query::Hash => {}
            Query::Add {
                type_name,
                instance,
            }
            | Query::Edit {
                type_name,
                instance,
            }
            | Query::Delete {
                type_name,
                instance,
            } => {
                fields.push(("type".to_string(), Value::from(type_name.as_str())));
                fields.push(("instance".to_string(), instance.clone()));
            }
            Query::Reconcile { sync, instances } => {
                #[allow(clippy::cast_possible_wrap)]
                let data = Value::Object(vec![
                    ("sync".to_string(), Value::from(*sync as i64)),
                    ("instances".to_string(), instances.to_value()),
                ]);
                fields.push(("data".to_string(), data));
            }
            Query::Resolve { choices } => {
                fields.push(("data".to_string(), choices.to_value()));
            }
        }
        Ok(to_canonical_json(&Value::Object(fields))?)
    }

    /// Decodes a query body.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let body = from_json(bytes)?;
        let name = body
            .get("query")
            .and_then(Value::as_text)
            .ok_or_else(|| ProtocolError::missing_field("query"))?;

        match name {
            "hash" => Ok(Query::Hash),
            "add" | "edit" | "delete" => {
                let type_name = body
                    .get("type")
                    .and_then(Value::as_text)
                    .ok_or_else(|| ProtocolError::missing_field("type"))?
                    .to_string();
                let instance = body
                    .get("instance")
                    .ok_or_else(|| ProtocolError::missing_field("instance"))?
                    .clone();
                Ok(match name {
                    "add" => Query::Add {
                        type_name,
                        instance,
                    },
                    "edit" => Query::Edit {
                        type_name,
                        instance,
                    },
                    _ => Query::Delete {
                        type_name,
                        instance,
                    },
                })
            }
            "reconcile" => {
                let data = body
                    .get("data")
                    .ok_or_else(|| ProtocolError::missing_field("data"))?;
                let sync = data
                    .get("sync")
                    .and_then(Value::as_i64)
                    .filter(|s| *s >= 0)
                    .ok_or_else(|| {
                        ProtocolError::invalid_field("sync", "expected a non-negative integer")
                    })?;
                let instances = data
                    .get("instances")
                    .map(TypeIndex::from_value)
                    .transpose()?
                    .unwrap_or_default();
                #[allow(clippy::cast_sign_loss)]
                let sync = sync as u64;
                Ok(Query::Reconcile { sync, instances })
            }
            "resolve" => {
                let data = body
                    .get("data")
                    .ok_or_else(|| ProtocolError::missing_field("data"))?;
                Ok(Query::Resolve {
                    choices: ChoiceIndex::from_value(data)?,
                })
            }
            other => Err(ProtocolError::UnknownQuery {
                name: other.to_string(),
            }),
        }
    }
}

/// The chosen version per conflicted record: type → id → literal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChoiceIndex {
    choices: BTreeMap<String, BTreeMap<u64, Value>>,
}

impl ChoiceIndex {
    /// Creates an empty choice index.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if no choice was recorded.
    pub fn is_empty(&self) -> bool {
        self.choices.values().all(BTreeMap::is_empty)
    }

    /// Records the chosen version for one conflicted record.
    pub fn choose(&mut self, type_name: &str, id: u64, version: Value) {
        self.choices
            .entry(type_name.to_string())
            .or_default()
            .insert(id, version);
    }

    /// Iterates over types and their chosen versions.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeMap<u64, Value>)> {
        self.choices.iter().filter(|(_, ids)| !ids.is_empty())
    }

    /// The wire form.
    pub fn to_value(&self) -> Value {
        let fields = self
            .iter()
            .map(|(type_name, ids)| {
                let entries = ids
                    .iter()
                    .map(|(id, version)| (id.to_string(), version.clone()))
                    .collect();
                (type_name.clone(), Value::Object(entries))
            })
            .collect();
        Value::Object(fields)
    }

    /// Parses the wire form.
    pub fn from_value(value: &Value) -> ProtocolResult<Self> {
        let types = value
            .as_object()
            .ok_or_else(|| ProtocolError::invalid_field("data", "expected an object"))?;

        let mut index = ChoiceIndex::new();
        for (type_name, entries) in types {
            let entries = entries.as_object().ok_or_else(|| {
                ProtocolError::invalid_field(type_name.clone(), "expected an object of versions")
            })?;
            for (key, version) in entries {
                let id = key.parse::<u64>().map_err(|_| ProtocolError::InvalidId {
                    key: key.clone(),
                })?;
                index.choose(type_name, id, version.clone());
            }
        }
        Ok(index)
    }
}

/// The `reconcile`/`resolve` response: the post-merge authoritative
/// hash and the delta the client must apply.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileResponse {
    /// Post-merge authoritative content hash.
    pub hash: String,
    /// Server-side changes and conflicts for the client.
    pub data: TypeIndex,
}

impl ReconcileResponse {
    /// Encodes the response body.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let fields = vec![
            ("hash".to_string(), Value::from(self.hash.as_str())),
            ("data".to_string(), self.data.to_value()),
        ];
        Ok(to_canonical_json(&Value::Object(fields))?)
    }

    /// Decodes the response body.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let body = from_json(bytes)?;
        let hash = body
            .get("hash")
            .and_then(Value::as_text)
            .ok_or_else(|| ProtocolError::missing_field("hash"))?
            .to_string();
        let data = body
            .get("data")
            .map(TypeIndex::from_value)
            .transpose()?
            .unwrap_or_default();
        Ok(Self { hash, data })
    }
}

/// Encodes the bare-string response of `hash`/`add`/`edit`/`delete`.
pub fn encode_hash_response(hash: &str) -> ProtocolResult<Vec<u8>> {
    Ok(to_canonical_json(&Value::from(hash))?)
}

/// Decodes the bare-string response of `hash`/`add`/`edit`/`delete`.
pub fn decode_hash_response(bytes: &[u8]) -> ProtocolResult<String> {
    from_json(bytes)?
        .as_text()
        .map(str::to_string)
        .ok_or_else(|| ProtocolError::invalid_field("response", "expected a string"))
}
