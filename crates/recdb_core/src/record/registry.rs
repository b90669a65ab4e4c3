//! Type registry: reconstruction of payloads from canonical form.

use crate::error::{CoreError, CoreResult};
use crate::record::payload::{GenericPayload, Payload};
use crate::record::{timestamp_field, Record, FIELD_CREATED, FIELD_MODIFIED};
use recdb_codec::Value;
use std::collections::HashMap;

/// Parser from canonical payload fields to a boxed payload.
pub type PayloadParser =
    Box<dyn Fn(&str, &[(String, Value)]) -> CoreResult<Box<dyn Payload>> + Send + Sync>;

/// The configured type set of a store.
///
/// Maps type names to payload parsers and fixes the canonical order of
/// type names. Built once at construction; the store and the canonical
/// serialization both follow the registration order.
pub struct TypeRegistry {
    order: Vec<String>,
    parsers: HashMap<String, PayloadParser>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            parsers: HashMap::new(),
        }
    }

    /// Creates a registry where every listed type round-trips through
    /// [`GenericPayload`], in the given canonical order.
    ///
    /// This is what the authoritative side uses: it merges records
    /// without interpreting their payloads.
    pub fn generic(type_names: &[&str]) -> Self {
        let mut registry = Self::new();
        for name in type_names {
            registry.order.push((*name).to_string());
            registry.parsers.insert(
                (*name).to_string(),
                Box::new(|type_name, fields| GenericPayload::parse(type_name, fields)),
            );
        }
        registry
    }

    /// Registers a type with its payload parser. Types are serialized
    /// in registration order.
    ///
    /// # Errors
    ///
    /// Fails if the type name was already registered.
    pub fn register(
        &mut self,
        type_name: impl Into<String>,
        parser: PayloadParser,
    ) -> CoreResult<()> {
        let type_name = type_name.into();
        if self.parsers.contains_key(&type_name) {
            return Err(CoreError::invalid_record(format!(
                "type {type_name:?} registered twice"
            )));
        }
        self.order.push(type_name.clone());
        self.parsers.insert(type_name, parser);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    ///
    /// # Panics
    ///
    /// Panics if the type name was already registered; duplicate
    /// registration is a construction bug, not a runtime condition.
    #[must_use]
    pub fn with_type(mut self, type_name: impl Into<String>, parser: PayloadParser) -> Self {
        let type_name = type_name.into();
        assert!(
            !self.parsers.contains_key(&type_name),
            "type {type_name:?} registered twice"
        );
        self.order.push(type_name.clone());
        self.parsers.insert(type_name, parser);
        self
    }

    /// The configured type names, in canonical order.
    pub fn type_names(&self) -> &[String] {
        &self.order
    }

    /// Returns true if the type is configured.
    pub fn contains(&self, type_name: &str) -> bool {
        self.parsers.contains_key(type_name)
    }

    /// Parses a payload of the given type from canonical fields.
    pub fn parse_payload(
        &self,
        type_name: &str,
        fields: &[(String, Value)],
    ) -> CoreResult<Box<dyn Payload>> {
        let parser = self
            .parsers
            .get(type_name)
            .ok_or_else(|| CoreError::unknown_type(type_name))?;
        parser(type_name, fields)
    }

    /// Reconstructs a full record from its canonical object literal.
    pub fn record_from_canonical(&self, type_name: &str, value: &Value) -> CoreResult<Record> {
        let fields = value
            .as_object()
            .ok_or_else(|| CoreError::invalid_record("record literal must be an object"))?;

        let created = timestamp_field(value, FIELD_CREATED)?
            .filter(|c| *c > 0)
            .ok_or_else(|| CoreError::invalid_record("record missing _created"))?;
        let modified = timestamp_field(value, FIELD_MODIFIED)?.unwrap_or(0);
        if modified != 0 && modified <= created {
            return Err(CoreError::invalid_record(
                "_modified must exceed _created when set",
            ));
        }

        let payload_fields: Vec<(String, Value)> = fields
            .iter()
            .filter(|(name, _)| name != FIELD_CREATED && name != FIELD_MODIFIED)
            .cloned()
            .collect();

        let payload = self.parse_payload(type_name, &payload_fields)?;
        Ok(Record::with_timestamps(created, modified, payload))
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.order)
            .finish_non_exhaustive()
    }
}
