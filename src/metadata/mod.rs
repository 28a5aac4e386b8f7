//! Entity metadata: which table backs an entity and which column backs each
//! attribute.

use serde::{Deserialize, Serialize};

/// Alias binding for the entities of one query.
pub mod alias;

pub use alias::AliasContext;

/// Source of entity-to-table mappings.
pub trait EntityMetadata {
    /// Look up an entity by name.
    fn entity(&self, name: &str) -> Option<&EntityDef>;

    /// Stable description of the metadata, used to key cached translations.
    /// Providers returning `None` are never cached.
    fn fingerprint(&self) -> Option<String> {
        None
    }
}

/// One attribute of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDef {
    /// Attribute name used in traces.
    pub name: String,
    /// Backing column.
    pub column: String,
}

/// An entity and the table that stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDef {
    /// Entity name used in bindings.
    pub name: String,
    /// Backing table.
    pub table: String,
    /// Attributes in declaration order.
    pub attributes: Vec<AttributeDef>,
}

impl EntityDef {
    /// Column backing `attribute`.
    pub fn column(&self, attribute: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|def| def.name == attribute)
            .map(|def| def.column.as_str())
    }
}

/// In-memory metadata loaded from JSON.
///
/// ```json
/// {"entities": [{"name": "person", "table": "person",
///   "attributes": [{"name": "id", "column": "id"}]}]}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Known entities.
    pub entities: Vec<EntityDef>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load entities from a JSON string. Entities already present are replaced.
    pub fn load_from_json(&mut self, json: &str) -> Result<(), String> {
        let parsed: Catalog =
            serde_json::from_str(json).map_err(|e| format!("Invalid catalog JSON: {e}"))?;
        for entity in parsed.entities {
            self.register(entity);
        }
        Ok(())
    }

    /// Add or replace an entity.
    pub fn register(&mut self, entity: EntityDef) {
        match self.entities.iter_mut().find(|e| e.name == entity.name) {
            Some(existing) => *existing = entity,
            None => self.entities.push(entity),
        }
    }
}

impl EntityMetadata for Catalog {
    fn entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.iter().find(|entity| entity.name == name)
    }

    fn fingerprint(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}
