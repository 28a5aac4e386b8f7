use crate::error::{Result, TranslationError};
use crate::expr::{AttributePath, ColumnRef};
use crate::metadata::{EntityDef, EntityMetadata};
use crate::trace::EntityBinding;

/// A declared entity together with its metadata.
#[derive(Debug, Clone, Copy)]
pub struct BoundEntity<'m> {
    /// Variable name, used as the SQL alias.
    pub alias: &'m str,
    /// Metadata of the bound entity.
    pub def: &'m EntityDef,
}

/// Aliases of the entities declared for one query, in declaration order.
#[derive(Debug, Clone)]
pub struct AliasContext<'m> {
    entries: Vec<BoundEntity<'m>>,
}

impl<'m> AliasContext<'m> {
    /// Look up every binding through `metadata`.
    pub fn bind<M>(bindings: &'m [EntityBinding], metadata: &'m M) -> Result<Self>
    where
        M: EntityMetadata + ?Sized,
    {
        if bindings.is_empty() {
            return Err(TranslationError::MalformedTrace(
                "no entities declared".to_string(),
            ));
        }

        let mut entries: Vec<BoundEntity<'m>> = Vec::with_capacity(bindings.len());
        for binding in bindings {
            if binding.variable.is_empty() {
                return Err(TranslationError::MalformedTrace(format!(
                    "entity '{}' is bound to an empty variable name",
                    binding.entity
                )));
            }
            if entries.iter().any(|entry| entry.alias == binding.variable) {
                return Err(TranslationError::MalformedTrace(format!(
                    "variable '{}' is declared twice",
                    binding.variable
                )));
            }
            let def = metadata
                .entity(&binding.entity)
                .ok_or_else(|| TranslationError::UnknownEntity(binding.entity.clone()))?;
            entries.push(BoundEntity {
                alias: &binding.variable,
                def,
            });
        }
        Ok(Self { entries })
    }

    /// Declaration index of `variable`.
    pub fn index_of(&self, variable: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.alias == variable)
    }

    /// Entity declared at `index`.
    pub fn get(&self, index: usize) -> Option<&BoundEntity<'m>> {
        self.entries.get(index)
    }

    /// The base relation: the first declared entity.
    pub fn base(&self) -> &BoundEntity<'m> {
        &self.entries[0]
    }

    /// All entities, in declaration order.
    pub fn entries(&self) -> &[BoundEntity<'m>] {
        &self.entries
    }

    /// Check that `variable` is declared and return its alias.
    pub fn alias(&self, variable: &str) -> Result<&'m str> {
        self.index_of(variable)
            .map(|index| self.entries[index].alias)
            .ok_or_else(|| {
                TranslationError::MalformedTrace(format!("variable '{variable}' is not declared"))
            })
    }

    /// Resolve an attribute path to its column.
    pub fn resolve(&self, path: &AttributePath) -> Result<ColumnRef> {
        self.resolve_indexed(path).map(|(_, column)| column)
    }

    /// Resolve an attribute path to the declaration index of its entity and
    /// its column.
    pub fn resolve_indexed(&self, path: &AttributePath) -> Result<(usize, ColumnRef)> {
        let index = self.index_of(&path.variable).ok_or_else(|| unknown(path))?;
        let entry = self.entries[index];
        let column = entry.def.column(&path.attribute).ok_or_else(|| unknown(path))?;
        Ok((index, ColumnRef::new(entry.alias, column)))
    }
}

fn unknown(path: &AttributePath) -> TranslationError {
    TranslationError::UnknownAttribute {
        variable: path.variable.clone(),
        attribute: path.attribute.clone(),
    }
}
