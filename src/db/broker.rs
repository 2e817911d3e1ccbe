//! Generic entity broker: typed reads and lifecycle-driven writes over the
//! static mapping tables.

use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use sea_orm::{DatabaseTransaction, DbBackend, QueryResult};
use tracing::{debug, warn};

use super::executor::CommandExecutor;
use super::mapping::{Entity, EntityMapping, EntityStatus, MappingRegistry, Record, same_entity};
use super::params::{Params, quote_literal};
use crate::config::defaults;
use crate::error::{AppError, AppResult};
use crate::models::{FailureKind, OperationResult};

/// Placeholder replaced by the value list in custom IN queries.
pub const IN_CLAUSE_VALUES_PLACEHOLDER: &str = ":values:";

/// Column names quoted before use in synthesized commands.
const RESERVED_WORDS: &[&str] = &["order", "group"];

/// A value that can appear in an inline `IN (...)` list.
pub trait InClauseValue: PartialEq + Clone {
    fn to_sql_literal(&self) -> String;
}

impl InClauseValue for i32 {
    fn to_sql_literal(&self) -> String {
        self.to_string()
    }
}

impl InClauseValue for i64 {
    fn to_sql_literal(&self) -> String {
        self.to_string()
    }
}

impl InClauseValue for String {
    fn to_sql_literal(&self) -> String {
        quote_literal(self)
    }
}

impl InClauseValue for &str {
    fn to_sql_literal(&self) -> String {
        quote_literal(self)
    }
}

/// Split values into lookup steps of at most `step` entries.
///
/// Each step is deduplicated on its own and rendered as SQL literals.
pub fn partition_in_steps<V: InClauseValue>(values: &[V], step: usize) -> Vec<Vec<String>> {
    values
        .chunks(step.max(1))
        .map(|chunk| {
            let mut unique: Vec<&V> = Vec::with_capacity(chunk.len());
            for value in chunk {
                if !unique.contains(&value) {
                    unique.push(value);
                }
            }
            unique.into_iter().map(InClauseValue::to_sql_literal).collect()
        })
        .collect()
}

/// Quote a column name when it collides with a reserved word.
fn column_sql(backend: DbBackend, column: &str) -> String {
    if RESERVED_WORDS.contains(&column.to_lowercase().as_str()) {
        match backend {
            DbBackend::MySql => format!("`{}`", column),
            _ => format!("\"{}\"", column),
        }
    } else {
        column.to_string()
    }
}

/// Command and parameters for one entity write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteCommand {
    pub status: EntityStatus,
    pub sql: String,
    pub params: Params,
}

/// Build the insert, update or delete for a record from its lifecycle status.
pub fn write_command(
    backend: DbBackend,
    mapping: &EntityMapping,
    record: &dyn Record,
) -> WriteCommand {
    let status = record.status();

    if status == EntityStatus::DeletePending {
        return WriteCommand {
            status,
            sql: format!(
                "DELETE FROM {} WHERE {} = {}",
                mapping.table,
                mapping.id_column,
                record.id()
            ),
            params: Params::new(),
        };
    }

    let mut params = Params::new();
    let mut columns: Vec<&str> = Vec::new();
    for (property, value) in record.values() {
        let Some(column) = mapping.column(property) else {
            debug!("Property {}.{} is not mapped, skipped", mapping.type_name, property);
            continue;
        };
        if column.identity {
            continue;
        }
        columns.push(column.name());
        params.push(column.name(), value.resolve_reference());
    }

    let sql = if status == EntityStatus::InsertPending {
        let names: Vec<String> = columns.iter().map(|c| column_sql(backend, c)).collect();
        let markers: Vec<String> = columns.iter().map(|c| format!("@{}", c)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            mapping.table,
            names.join(", "),
            markers.join(", ")
        )
    } else {
        let assignments: Vec<String> = columns
            .iter()
            .map(|c| format!("{} = @{}", column_sql(backend, c), c))
            .collect();
        format!(
            "UPDATE {} SET {} WHERE {} = {}",
            mapping.table,
            assignments.join(", "),
            mapping.id_column,
            record.id()
        )
    };

    WriteCommand {
        status,
        sql,
        params,
    }
}

/// Recursive writer shared by every broker write.
struct RecordWriter<'w> {
    executor: &'w CommandExecutor,
    registry: &'w MappingRegistry,
}

impl<'w> RecordWriter<'w> {
    /// Write one record and cascade to its children. Returns the rows affected
    /// by the record's own command.
    fn persist<'a>(
        &'a self,
        txn: &'a DatabaseTransaction,
        record: &'a mut dyn Record,
    ) -> BoxFuture<'a, AppResult<u64>> {
        Box::pin(async move {
            let mapping = self.registry.get(record.type_name())?;
            let command = write_command(self.executor.backend(), mapping, &*record);
            debug!(sql = %command.sql, params = ?command.params, "Persisting {}", mapping.type_name);

            let affected = match command.status {
                EntityStatus::InsertPending => {
                    match self
                        .executor
                        .insert_returning_id(txn, &command.sql, &command.params, mapping.id_column)
                        .await?
                    {
                        Some(id) => {
                            record.set_id(id);
                            1
                        }
                        None => 0,
                    }
                }
                _ => {
                    self.executor
                        .execute_non_query(txn, &command.sql, &command.params)
                        .await?
                }
            };

            if affected == 0 || command.status == EntityStatus::DeletePending {
                return Ok(affected);
            }

            let parent_id = record.id();
            let (mut pending_deletes, mut others): (Vec<_>, Vec<_>) = record
                .children_mut()
                .into_iter()
                .partition(|c| c.status() == EntityStatus::DeletePending);
            pending_deletes.append(&mut others);

            for child in pending_deletes {
                let child_mapping = self.registry.get(child.type_name())?;
                if let Some(foreign_key) = mapping.child_foreign_key(child_mapping) {
                    child.set_foreign_key(foreign_key, parent_id);
                }
                if self.persist(txn, child).await? == 0 {
                    warn!(
                        "Child {} of {} id '{}' affected 0 records",
                        child_mapping.type_name, mapping.type_name, parent_id
                    );
                }
            }

            Ok(affected)
        })
    }
}

/// Typed reads and writes for one entity type.
#[derive(Clone)]
pub struct EntityBroker<T: Entity> {
    executor: CommandExecutor,
    registry: Arc<MappingRegistry>,
    in_clause_step: usize,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> EntityBroker<T> {
    pub fn new(executor: CommandExecutor, registry: Arc<MappingRegistry>) -> Self {
        Self {
            executor,
            registry,
            in_clause_step: defaults::IN_CLAUSE_STEP,
            _entity: PhantomData,
        }
    }

    /// Maximum number of values per IN (...) lookup.
    pub fn with_in_clause_step(mut self, step: usize) -> Self {
        self.in_clause_step = step.max(1);
        self
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    pub fn mapping(&self) -> AppResult<&'static EntityMapping> {
        self.registry.get(T::TYPE_NAME)
    }

    /// Whether the mapped table exists in the connected database.
    pub async fn table_exists(&self) -> AppResult<bool> {
        let table = self.mapping()?.table;
        let command = match self.executor.backend() {
            DbBackend::Sqlite => "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = @table",
            _ => "SELECT 1 FROM information_schema.tables WHERE table_name = @table",
        };
        let params = Params::new().with("table", table);

        let found: Option<i32> = self
            .executor
            .execute_scalar(self.executor.connection(), command, &params)
            .await?;
        Ok(found == Some(1))
    }

    fn select_query(&self) -> AppResult<String> {
        Ok(format!("SELECT * FROM {}", self.mapping()?.table))
    }

    fn load_all(rows: &[QueryResult]) -> Result<Vec<T>, sea_orm::DbErr> {
        rows.iter().map(T::from_row).collect()
    }

    async fn query_entities(&self, command: &str, params: &Params) -> AppResult<Vec<T>> {
        self.executor
            .execute_reader(self.executor.connection(), command, params, Self::load_all)
            .await
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<Option<T>> {
        let mapping = self.mapping()?;
        let command = format!(
            "{} WHERE {} = @{}",
            self.select_query()?,
            mapping.id_column,
            mapping.id_column
        );
        let params = Params::new().with(mapping.id_column, id);

        self.executor
            .execute_reader(self.executor.connection(), &command, &params, |rows| {
                rows.first().map(T::from_row).transpose()
            })
            .await
    }

    pub async fn get_all(&self) -> AppResult<Vec<T>> {
        self.query_entities(&self.select_query()?, &Params::new())
            .await
    }

    pub async fn get_all_ids(&self) -> AppResult<Vec<i32>> {
        let mapping = self.mapping()?;
        let command = format!("SELECT {} FROM {}", mapping.id_column, mapping.table);

        self.executor
            .execute_reader(self.executor.connection(), &command, &Params::new(), |rows| {
                rows.iter()
                    .map(|row| row.try_get_by_index::<i32>(0))
                    .collect()
            })
            .await
    }

    /// Load the entities with the given identities, batching large id lists.
    pub async fn get_by_ids(&self, ids: &[i32]) -> AppResult<Vec<T>> {
        let id_column = self.mapping()?.id_column;
        self.get_by_column_values(id_column, ids, "").await
    }

    /// Load entities whose `column` matches any of `values`.
    ///
    /// One query per step of at most `in_clause_step` values; results are
    /// concatenated in step order. `other_filters` is appended verbatim.
    pub async fn get_by_column_values<V: InClauseValue>(
        &self,
        column: &str,
        values: &[V],
        other_filters: &str,
    ) -> AppResult<Vec<T>> {
        let select = self.select_query()?;
        let mut entities = Vec::new();

        for step in partition_in_steps(values, self.in_clause_step) {
            let command = format!(
                "{} WHERE {} IN ({}) {}",
                select,
                column,
                step.join(","),
                other_filters
            );
            entities.extend(self.query_entities(command.trim_end(), &Params::new()).await?);
        }

        Ok(entities)
    }

    /// Run a caller-supplied query whose `:values:` placeholder receives the
    /// deduplicated value list.
    pub async fn get_by_custom_in_query<V: InClauseValue>(
        &self,
        query: &str,
        values: &[V],
    ) -> AppResult<Vec<T>> {
        if !query.contains(IN_CLAUSE_VALUES_PLACEHOLDER) {
            return Err(AppError::InvalidInput(format!(
                "Query must contain the placeholder '{}' for IN (...) values replacement.",
                IN_CLAUSE_VALUES_PLACEHOLDER
            )));
        }

        let list = partition_in_steps(values, values.len())
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(",");
        let command = query.replace(IN_CLAUSE_VALUES_PLACEHOLDER, &list);
        self.query_entities(&command, &Params::new()).await
    }

    /// Insert or update the entity (and its children) per its lifecycle status.
    pub async fn save(&self, entity: &mut T) -> AppResult<OperationResult> {
        let written = self.write(entity).await;
        self.outcome("save", entity, written)
    }

    /// Update `entity`; `previous` must be the same entity as last loaded.
    pub async fn update(&self, entity: &mut T, previous: &T) -> AppResult<OperationResult> {
        if !same_entity(&*entity, previous) {
            return Ok(OperationResult::failure(
                FailureKind::Invalid,
                format!(
                    "Cannot update {} id '{}' from a different entity (id '{}')",
                    T::TYPE_NAME,
                    entity.id(),
                    previous.id()
                ),
            ));
        }
        let written = self.write(entity).await;
        self.outcome("update", entity, written)
    }

    /// Mark the entity deleted and remove its row.
    pub async fn delete(&self, entity: &mut T) -> AppResult<OperationResult> {
        self.mapping()?;
        entity.mark_deleted();

        match self.write(entity).await {
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("Failed to delete {} id '{}': {}", T::TYPE_NAME, entity.id(), e);
                Ok(OperationResult::failed("Error deleting").with_detail(e.to_string()))
            }
            written => self.outcome("delete", entity, written),
        }
    }

    /// Run the record's command and its cascade in one transaction.
    ///
    /// Commits only when the record's own command affected rows; otherwise the
    /// transaction is dropped and rolled back.
    async fn write(&self, entity: &mut T) -> AppResult<u64> {
        self.mapping()?;
        let txn = self.executor.begin().await?;
        let writer = RecordWriter {
            executor: &self.executor,
            registry: &self.registry,
        };

        let affected = writer.persist(&txn, &mut *entity).await?;
        if affected > 0 {
            txn.commit()
                .await
                .map_err(|e| AppError::Database(format!("Failed to commit: {}", e)))?;
        }
        Ok(affected)
    }

    fn outcome(
        &self,
        operation: &str,
        entity: &T,
        written: AppResult<u64>,
    ) -> AppResult<OperationResult> {
        match written {
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("{} of {} id '{}' failed: {}", operation, T::TYPE_NAME, entity.id(), e);
                Ok(OperationResult::failed(e.to_string()))
            }
            Ok(0) => {
                let details = format!(
                    "Save operation '{}' for entity type '{}' id '{}' was executed but affected 0 records!",
                    operation,
                    T::TYPE_NAME,
                    entity.id()
                );
                warn!("{}", details);
                Ok(
                    OperationResult::failed(format!("Save failed for type:{}", T::TYPE_NAME))
                        .with_detail(details),
                )
            }
            Ok(_) => Ok(OperationResult::ok(format!("{} {}d", T::TYPE_NAME, operation))),
        }
    }
}
