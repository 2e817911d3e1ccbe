//! Entity metadata: lifecycle state, record traits and the static mapping tables.
//!
//! Every persistible type declares an [`EntityMapping`] constant. Mappings are
//! registered once in a [`MappingRegistry`] at startup and looked up by type
//! name when a record is written.

use std::collections::HashMap;

use sea_orm::{DbErr, QueryResult};

use super::params::ParamValue;
use crate::error::{AppError, AppResult};

/// Lifecycle status derived from an entity's identity and delete mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntityStatus {
    /// Persisted entity, writes become updates.
    #[default]
    Unknown,
    InsertPending,
    DeletePending,
}

/// Identity and delete mark shared by every entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityState {
    id: i32,
    delete_pending: bool,
}

impl EntityState {
    pub fn new(id: i32) -> Self {
        Self {
            id,
            delete_pending: false,
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn set_id(&mut self, id: i32) {
        self.id = id;
    }

    pub fn mark_deleted(&mut self) {
        self.delete_pending = true;
    }

    /// DeletePending once marked, InsertPending while unsaved, Unknown otherwise.
    pub fn status(&self) -> EntityStatus {
        if self.delete_pending {
            EntityStatus::DeletePending
        } else if self.id == 0 {
            EntityStatus::InsertPending
        } else {
            EntityStatus::Unknown
        }
    }
}

/// Column description for one mapped property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMapping {
    pub property: &'static str,
    column: Option<&'static str>,
    pub identity: bool,
    /// Parent type this column holds the identity of.
    pub references: Option<&'static str>,
}

impl ColumnMapping {
    pub const fn new(property: &'static str) -> Self {
        Self {
            property,
            column: None,
            identity: false,
            references: None,
        }
    }

    pub const fn column(mut self, column: &'static str) -> Self {
        self.column = Some(column);
        self
    }

    pub const fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    pub const fn references(mut self, parent_type: &'static str) -> Self {
        self.references = Some(parent_type);
        self
    }

    /// Column name, defaulting to the property name.
    pub fn name(&self) -> &'static str {
        self.column.unwrap_or(self.property)
    }
}

/// Child collection cascaded after the owning entity is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildBinding {
    pub child_type: &'static str,
    /// Child property receiving the parent's identity.
    pub foreign_key: &'static str,
}

/// Static mapping between an entity type and its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityMapping {
    pub type_name: &'static str,
    pub table: &'static str,
    pub id_column: &'static str,
    pub columns: &'static [ColumnMapping],
    pub children: &'static [ChildBinding],
}

impl EntityMapping {
    pub fn column(&self, property: &str) -> Option<&ColumnMapping> {
        self.columns.iter().find(|c| c.property == property)
    }

    /// Property that receives the identity of a saved child's parent.
    pub fn child_foreign_key(&self, child: &EntityMapping) -> Option<&'static str> {
        self.children
            .iter()
            .find(|b| b.child_type == child.type_name)
            .map(|b| b.foreign_key)
            .or_else(|| {
                child
                    .columns
                    .iter()
                    .find(|c| c.references == Some(self.type_name))
                    .map(|c| c.property)
            })
    }
}

/// Object-safe view of a persistible entity used by the write path.
pub trait Record: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn state(&self) -> &EntityState;

    fn state_mut(&mut self) -> &mut EntityState;

    /// Values keyed by property name, in any order.
    fn values(&self) -> Vec<(&'static str, ParamValue)>;

    /// Store a parent identity into a foreign-key property.
    fn set_foreign_key(&mut self, _property: &str, _parent_id: i32) {}

    /// Child entities cascaded on save.
    fn children_mut(&mut self) -> Vec<&mut dyn Record> {
        Vec::new()
    }

    fn id(&self) -> i32 {
        self.state().id()
    }

    fn set_id(&mut self, id: i32) {
        self.state_mut().set_id(id);
    }

    fn status(&self) -> EntityStatus {
        self.state().status()
    }

    fn mark_deleted(&mut self) {
        self.state_mut().mark_deleted();
    }
}

/// A record that can be loaded from a row.
pub trait Entity: Record + Sized {
    const TYPE_NAME: &'static str;

    fn from_row(row: &QueryResult) -> Result<Self, DbErr>;
}

/// Entities are equal when both identity and concrete type match.
pub fn same_entity(a: &dyn Record, b: &dyn Record) -> bool {
    a.id() == b.id() && a.type_name() == b.type_name()
}

/// Mapping tables keyed by type name, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct MappingRegistry {
    mappings: HashMap<&'static str, &'static EntityMapping>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the engine's own versioning entities.
    pub fn standard() -> Self {
        Self::new()
            .register(&super::system_versioning::MAPPING)
            .register(&super::system_versioning_log::MAPPING)
    }

    pub fn register(mut self, mapping: &'static EntityMapping) -> Self {
        self.mappings.insert(mapping.type_name, mapping);
        self
    }

    /// Look up a mapping; a missing one is a programming error.
    pub fn get(&self, type_name: &str) -> AppResult<&'static EntityMapping> {
        self.mappings
            .get(type_name)
            .copied()
            .ok_or_else(|| AppError::Mapping(type_name.to_string()))
    }
}
