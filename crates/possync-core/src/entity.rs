//! Entity types and batches
//!
//! An entity type is a named category of business record (products,
//! customers, sales, ...) that syncs as an independent unit. Records
//! themselves are opaque JSON objects keyed by their `id` field.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named category of business record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(String);

impl EntityType {
    pub const PRODUCTS: &'static str = "products";
    pub const CUSTOMERS: &'static str = "customers";
    pub const SALES: &'static str = "sales";

    /// Create an entity type from its tag (normalized to lowercase)
    pub fn new(tag: impl AsRef<str>) -> Self {
        Self(tag.as_ref().trim().to_ascii_lowercase())
    }

    pub fn products() -> Self {
        Self::new(Self::PRODUCTS)
    }

    pub fn customers() -> Self {
        Self::new(Self::CUSTOMERS)
    }

    pub fn sales() -> Self {
        Self::new(Self::SALES)
    }

    /// The raw tag used on the wire (`products`)
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human-facing label used in error messages (`Products`)
    pub fn label(&self) -> String {
        let mut chars = self.0.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityType {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

/// Ordered registry of the entity types that participate in sync
///
/// Order only affects log readability; each entity type syncs independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRegistry {
    entities: Vec<EntityType>,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self {
            entities: vec![
                EntityType::products(),
                EntityType::customers(),
                EntityType::sales(),
            ],
        }
    }
}

impl EntityRegistry {
    /// An empty registry
    pub fn empty() -> Self {
        Self {
            entities: Vec::new(),
        }
    }

    /// Append an entity type (ignored if already tracked)
    pub fn with(mut self, entity: impl Into<EntityType>) -> Self {
        self.register(entity);
        self
    }

    /// Register an entity type, returning false if it was already tracked
    pub fn register(&mut self, entity: impl Into<EntityType>) -> bool {
        let entity = entity.into();
        if entity.as_str().is_empty() || self.contains(&entity) {
            return false;
        }
        self.entities.push(entity);
        true
    }

    pub fn contains(&self, entity: &EntityType) -> bool {
        self.entities.iter().any(|e| e == entity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityType> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// The set of not-yet-synced records of one entity type
///
/// Materialized on demand from a gateway for the duration of one sync phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityBatch {
    #[serde(skip)]
    pub entity_type: Option<EntityType>,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub data: Vec<Value>,
}

impl EntityBatch {
    pub fn new(entity_type: EntityType, data: Vec<Value>) -> Self {
        Self {
            entity_type: Some(entity_type),
            count: data.len(),
            data,
        }
    }

    pub fn empty(entity_type: EntityType) -> Self {
        Self::new(entity_type, Vec::new())
    }

    /// Tag a batch decoded from the wire with its entity type
    ///
    /// The count is taken from the records actually received, so totals
    /// always reflect what was transferred.
    pub fn tagged(mut self, entity_type: EntityType) -> Self {
        self.entity_type = Some(entity_type);
        self.count = self.data.len();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Ids of the records in this batch, in order (records without an id are skipped)
    pub fn record_ids(&self) -> Vec<String> {
        self.data.iter().filter_map(record_id).collect()
    }
}

/// Extract a record's id as a string
///
/// Accepts string and numeric ids; anything else has no usable id.
pub fn record_id(record: &Value) -> Option<String> {
    match record.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
