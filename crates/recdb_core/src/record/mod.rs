//! Record model: intrinsic fields, payloads, tombstones, type registry.

mod payload;
mod registry;

pub use payload::{GenericPayload, Payload};
pub use registry::{PayloadParser, TypeRegistry};

use crate::clock::{RecordId, Timestamp, NEVER};
use crate::error::{CoreError, CoreResult};
use recdb_codec::{CodecResult, Value};
use std::fmt;

/// Canonical field name for a record's creation timestamp.
pub const FIELD_CREATED: &str = "_created";
/// Canonical field name for a record's modification timestamp.
pub const FIELD_MODIFIED: &str = "_modified";
/// Canonical field name for a tombstone's deletion timestamp.
pub const FIELD_DELETED: &str = "_deleted";

/// A typed record with intrinsic timestamps and an application payload.
///
/// `created` doubles as the record's identity and is immutable after
/// first save; `modified` is zero until the record is edited.
pub struct Record {
    created: RecordId,
    modified: Timestamp,
    payload: Box<dyn Payload>,
}

impl Record {
    /// Creates a record that has not been saved yet (`created == 0`).
    pub fn new(payload: Box<dyn Payload>) -> Self {
        Self {
            created: NEVER,
            modified: NEVER,
            payload,
        }
    }

    /// Creates a record with explicit intrinsic timestamps.
    pub fn with_timestamps(
        created: RecordId,
        modified: Timestamp,
        payload: Box<dyn Payload>,
    ) -> Self {
        Self {
            created,
            modified,
            payload,
        }
    }

    /// The record's identity (creation timestamp), 0 before first save.
    pub fn created(&self) -> RecordId {
        self.created
    }

    /// The modification timestamp, 0 if never modified.
    pub fn modified(&self) -> Timestamp {
        self.modified
    }

    /// The configured type this record belongs to.
    pub fn type_name(&self) -> &str {
        self.payload.type_name()
    }

    /// The application payload.
    pub fn payload(&self) -> &dyn Payload {
        self.payload.as_ref()
    }

    /// Assigns the record's identity. Done once, by `save`.
    pub fn set_created(&mut self, created: RecordId) {
        self.created = created;
    }

    /// Stamps the record as modified. Done by `edit`.
    pub fn set_modified(&mut self, modified: Timestamp) {
        self.modified = modified;
    }

    /// Replaces the payload, keeping intrinsic fields.
    pub fn set_payload(&mut self, payload: Box<dyn Payload>) {
        self.payload = payload;
    }

    /// The record's canonical object literal.
    ///
    /// `_created` first, `_modified` second when nonzero, then the
    /// payload fields in their canonical order.
    #[allow(clippy::cast_possible_wrap)]
    pub fn to_canonical(&self) -> CodecResult<Value> {
        let payload_fields = self.payload.canonical_fields()?;
        let mut fields = Vec::with_capacity(payload_fields.len() + 2);
        fields.push((FIELD_CREATED.to_string(), Value::from(self.created as i64)));
        if self.modified != NEVER {
            fields.push((FIELD_MODIFIED.to_string(), Value::from(self.modified as i64)));
        }
        fields.extend(payload_fields);
        Ok(Value::Object(fields))
    }
}

impl Clone for Record {
    fn clone(&self) -> Self {
        Self {
            created: self.created,
            modified: self.modified,
            payload: self.payload.boxed_clone(),
        }
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.created == other.created
            && self.modified == other.modified
            && self.payload.payload_eq(other.payload.as_ref())
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("type", &self.type_name())
            .field("created", &self.created)
            .field("modified", &self.modified)
            .field("payload", &self.payload.display())
            .finish()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}: {}", self.type_name(), self.created, self.payload.display())
    }
}

/// The compact remainder of a deleted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tombstone {
    /// Identity of the deleted record.
    pub created: RecordId,
    /// When the deletion happened.
    pub deleted: Timestamp,
}

impl Tombstone {
    /// Creates a tombstone.
    pub fn new(created: RecordId, deleted: Timestamp) -> Self {
        Self { created, deleted }
    }

    /// The tombstone's canonical object literal `{_created, _deleted}`.
    #[allow(clippy::cast_possible_wrap)]
    pub fn to_canonical(&self) -> Value {
        Value::Object(vec![
            (FIELD_CREATED.to_string(), Value::from(self.created as i64)),
            (FIELD_DELETED.to_string(), Value::from(self.deleted as i64)),
        ])
    }

    /// Parses a tombstone from its canonical literal.
    pub fn from_canonical(value: &Value) -> CoreResult<Self> {
        let created = timestamp_field(value, FIELD_CREATED)?
            .ok_or_else(|| CoreError::invalid_record("tombstone missing _created"))?;
        let deleted = timestamp_field(value, FIELD_DELETED)?
            .ok_or_else(|| CoreError::invalid_record("tombstone missing _deleted"))?;
        if created == NEVER || deleted == NEVER {
            return Err(CoreError::invalid_record("tombstone timestamps must be nonzero"));
        }
        Ok(Self { created, deleted })
    }
}

/// Returns true if the canonical literal is a tombstone.
pub fn is_tombstone_literal(value: &Value) -> bool {
    value.get(FIELD_DELETED).is_some()
}

/// Reads an optional timestamp field from a canonical literal.
pub(crate) fn timestamp_field(value: &Value, name: &str) -> CoreResult<Option<Timestamp>> {
    match value.get(name) {
        None => Ok(None),
        Some(field) => {
            let n = field
                .as_i64()
                .filter(|n| *n >= 0)
                .ok_or_else(|| {
                    CoreError::invalid_record(format!("{name} must be a non-negative integer"))
                })?;
            Ok(Some(n as Timestamp))
        }
    }
}
