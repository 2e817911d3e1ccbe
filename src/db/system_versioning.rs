//! Record of an applied versioning script.

use chrono::NaiveDateTime;
use sea_orm::{DbErr, QueryResult};

use super::broker::EntityBroker;
use super::mapping::{ColumnMapping, Entity, EntityMapping, EntityState, Record};
use super::params::ParamValue;

pub static MAPPING: EntityMapping = EntityMapping {
    type_name: SystemVersioning::TYPE_NAME,
    table: "system_versioning",
    id_column: "scriptid",
    columns: &[
        ColumnMapping::new("ScriptId").column("scriptid").identity(),
        ColumnMapping::new("Name").column("name"),
        ColumnMapping::new("Version").column("version"),
        ColumnMapping::new("CreationDate").column("creationday"),
        ColumnMapping::new("ImpactedDate").column("impactedday"),
    ],
    children: &[],
};

/// One row of `system_versioning`; the identity is the script id.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemVersioning {
    state: EntityState,
    pub name: String,
    pub version: i32,
    pub creation_date: NaiveDateTime,
    pub impacted_date: NaiveDateTime,
}

impl SystemVersioning {
    pub fn script_id(&self) -> i32 {
        self.state.id()
    }
}

impl Record for SystemVersioning {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn state(&self) -> &EntityState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut EntityState {
        &mut self.state
    }

    fn values(&self) -> Vec<(&'static str, ParamValue)> {
        vec![
            ("ScriptId", self.script_id().into()),
            ("Name", self.name.clone().into()),
            ("Version", self.version.into()),
            ("CreationDate", self.creation_date.into()),
            ("ImpactedDate", self.impacted_date.into()),
        ]
    }
}

impl Entity for SystemVersioning {
    const TYPE_NAME: &'static str = "SystemVersioning";

    fn from_row(row: &QueryResult) -> Result<Self, DbErr> {
        Ok(Self {
            state: EntityState::new(row.try_get("", "scriptid")?),
            name: row.try_get("", "name")?,
            version: row.try_get("", "version")?,
            creation_date: row.try_get("", "creationday")?,
            impacted_date: row.try_get("", "impactedday")?,
        })
    }
}

pub type SystemVersioningBroker = EntityBroker<SystemVersioning>;
