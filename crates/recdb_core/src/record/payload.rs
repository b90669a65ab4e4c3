//! Record payload abstraction.

use crate::error::CoreResult;
use recdb_codec::{CodecResult, Value};

/// Application data carried by a record.
///
/// Payloads are polymorphic over the type set the store is configured
/// with. Implementations provide the canonical field list (the part of
/// the record's wire form after the intrinsic fields), equality, and a
/// display string. Dispatch is dynamic; payload methods only run on
/// the sync path, not in inner loops.
pub trait Payload: Send + Sync {
    /// The configured type name this payload belongs to.
    fn type_name(&self) -> &str;

    /// The payload's fields in their canonical order.
    ///
    /// Field names must not collide with the intrinsic `_created`,
    /// `_modified` and `_deleted` names, and the order must be stable
    /// across calls: the canonical serialization is the hash pre-image.
    fn canonical_fields(&self) -> CodecResult<Vec<(String, Value)>>;

    /// A stable human-readable description of this payload.
    fn display(&self) -> String;

    /// Clones this payload behind a fresh box.
    fn boxed_clone(&self) -> Box<dyn Payload>;

    /// Equality modulo intrinsic fields.
    ///
    /// The default compares type names and canonical fields, which is
    /// correct for any payload whose canonical form is faithful.
    fn payload_eq(&self, other: &dyn Payload) -> bool {
        self.type_name() == other.type_name()
            && matches!(
                (self.canonical_fields(), other.canonical_fields()),
                (Ok(a), Ok(b)) if a == b
            )
    }
}

/// A payload that carries its canonical fields verbatim.
///
/// This is the payload used where no concrete Rust type is registered
/// for a record type, notably on the authoritative side, which stores
/// and merges records without interpreting them.
#[derive(Debug, Clone)]
pub struct GenericPayload {
    type_name: String,
    fields: Vec<(String, Value)>,
}

impl GenericPayload {
    /// Creates a generic payload from canonical fields.
    pub fn new(type_name: impl Into<String>, fields: Vec<(String, Value)>) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
        }
    }

    /// Parses a generic payload, keeping the fields as-is.
    pub fn parse(type_name: &str, fields: &[(String, Value)]) -> CoreResult<Box<dyn Payload>> {
        Ok(Box::new(Self::new(type_name, fields.to_vec())))
    }

    /// Returns the carried fields.
    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }
}

impl Payload for GenericPayload {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn canonical_fields(&self) -> CodecResult<Vec<(String, Value)>> {
        Ok(self.fields.clone())
    }

    fn display(&self) -> String {
        let names: Vec<&str> = self.fields.iter().map(|(k, _)| k.as_str()).collect();
        format!("{}({})", self.type_name, names.join(","))
    }

    fn boxed_clone(&self) -> Box<dyn Payload> {
        Box::new(self.clone())
    }
}
