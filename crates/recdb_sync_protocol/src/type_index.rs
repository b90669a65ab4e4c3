//! Nested delta maps exchanged over the wire.

use crate::error::{ProtocolError, ProtocolResult};
use crate::rank::Rank;
use recdb_codec::Value;
use std::collections::BTreeMap;

/// Per-rank record maps for one type.
///
/// Keys are record identities (creation timestamps); values are the
/// records' canonical object literals: tombstone literals under
/// `deleted`, and the competing versions (server first, then client)
/// under `conflict`. Empty ranks are pruned from the wire form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankIndex {
    /// Records created since the reference timestamp.
    pub new: BTreeMap<u64, Value>,
    /// Records modified since the reference timestamp.
    pub modified: BTreeMap<u64, Value>,
    /// Tombstones of records deleted since the reference timestamp.
    pub deleted: BTreeMap<u64, Value>,
    /// Competing versions per record, server version first.
    pub conflict: BTreeMap<u64, Vec<Value>>,
}

impl RankIndex {
    /// Creates an empty rank index.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if every rank is empty.
    pub fn is_empty(&self) -> bool {
        self.new.is_empty()
            && self.modified.is_empty()
            && self.deleted.is_empty()
            && self.conflict.is_empty()
    }

    /// Total number of entries across all ranks.
    pub fn len(&self) -> usize {
        self.new.len() + self.modified.len() + self.deleted.len() + self.conflict.len()
    }

    /// Returns true if any rank holds the given identity.
    pub fn holds_id(&self, id: u64) -> bool {
        self.new.contains_key(&id)
            || self.modified.contains_key(&id)
            || self.deleted.contains_key(&id)
            || self.conflict.contains_key(&id)
    }

    /// The literal reported for an identity under `new`, `modified` or
    /// `deleted`, if any.
    pub fn version_of(&self, id: u64) -> Option<&Value> {
        self.new
            .get(&id)
            .or_else(|| self.modified.get(&id))
            .or_else(|| self.deleted.get(&id))
    }

    /// The wire form, with empty ranks pruned.
    pub fn to_value(&self) -> Value {
        let mut ranks = Vec::new();
        for rank in [Rank::New, Rank::Modified, Rank::Deleted] {
            let entries = match rank {
                Rank::New => &self.new,
                Rank::Modified => &self.modified,
                _ => &self.deleted,
            };
            if entries.is_empty() {
                continue;
            }
            let fields = entries
                .iter()
                .map(|(id, literal)| (id.to_string(), literal.clone()))
                .collect();
            ranks.push((rank.as_str().to_string(), Value::Object(fields)));
        }
        if !self.conflict.is_empty() {
            let fields = self
                .conflict
                .iter()
                .map(|(id, versions)| (id.to_string(), Value::Array(versions.clone())))
                .collect();
            ranks.push((Rank::Conflict.as_str().to_string(), Value::Object(fields)));
        }
        Value::Object(ranks)
    }

    /// Parses the wire form.
    pub fn from_value(value: &Value) -> ProtocolResult<Self> {
        let ranks = value
            .as_object()
            .ok_or_else(|| ProtocolError::invalid_field("rank index", "expected an object"))?;

        let mut index = RankIndex::new();
        for (rank_name, entries) in ranks {
            let rank = Rank::parse(rank_name)?;
            let entries = entries.as_object().ok_or_else(|| {
                ProtocolError::invalid_field(rank_name.clone(), "expected an object of records")
            })?;

            for (key, literal) in entries {
                let id = parse_id(key)?;
                match rank {
                    Rank::New => {
                        index.new.insert(id, literal.clone());
                    }
                    Rank::Modified => {
                        index.modified.insert(id, literal.clone());
                    }
                    Rank::Deleted => {
                        index.deleted.insert(id, literal.clone());
                    }
                    Rank::Conflict => {
                        let versions = literal.as_array().ok_or_else(|| {
                            ProtocolError::invalid_field(
                                key.clone(),
                                "conflict entry must be an array of versions",
                            )
                        })?;
                        index.conflict.insert(id, versions.to_vec());
                    }
                }
            }
        }
        Ok(index)
    }
}

/// The per-type delta map: type name → rank → id → record.
///
/// Types with no entries are pruned from the wire form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeIndex {
    types: BTreeMap<String, RankIndex>,
}

impl TypeIndex {
    /// Creates an empty type index.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if no type holds any entry.
    pub fn is_empty(&self) -> bool {
        self.types.values().all(RankIndex::is_empty)
    }

    /// Total number of record entries across all types and ranks.
    pub fn len(&self) -> usize {
        self.types.values().map(RankIndex::len).sum()
    }

    /// The rank index of a type, if present.
    pub fn get(&self, type_name: &str) -> Option<&RankIndex> {
        self.types.get(type_name)
    }

    /// The rank index of a type, created on demand.
    pub fn entry(&mut self, type_name: &str) -> &mut RankIndex {
        self.types.entry(type_name.to_string()).or_default()
    }

    /// Iterates over non-empty types and their rank indexes.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &RankIndex)> {
        self.types.iter().filter(|(_, ranks)| !ranks.is_empty())
    }

    /// True if any type's conflict rank is non-empty.
    pub fn has_conflicts(&self) -> bool {
        self.types.values().any(|ranks| !ranks.conflict.is_empty())
    }

    /// The wire form, with empty types and ranks pruned.
    pub fn to_value(&self) -> Value {
        let fields = self
            .iter()
            .map(|(type_name, ranks)| (type_name.clone(), ranks.to_value()))
            .collect();
        Value::Object(fields)
    }

    /// Parses the wire form.
    pub fn from_value(value: &Value) -> ProtocolResult<Self> {
        let types = value
            .as_object()
            .ok_or_else(|| ProtocolError::invalid_field("instances", "expected an object"))?;

        let mut index = TypeIndex::new();
        for (type_name, ranks) in types {
            let ranks = RankIndex::from_value(ranks)?;
            if !ranks.is_empty() {
                index.types.insert(type_name.clone(), ranks);
            }
        }
        Ok(index)
    }
}

fn parse_id(key: &str) -> ProtocolResult<u64> {
    key.parse::<u64>().map_err(|_| ProtocolError::InvalidId {
        key: key.to_string(),
    })
}
