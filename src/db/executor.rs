//! Command executor: parameterized reads, writes and raw script execution.
//!
//! Every call takes the connection to run on. Passing the pool's
//! [`DatabaseConnection`] checks out a connection for that call only; passing an
//! open [`DatabaseTransaction`] reuses it so several calls share one
//! transaction.

use std::future::Future;
use std::time::Duration;

use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr, QueryResult,
    Statement, TransactionSession, TransactionTrait, TryGetable,
};
use tracing::{debug, warn};

use super::DbPool;
use super::params::{Params, bind};
use crate::error::{AppError, AppResult};

/// How a raw script body is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptMode {
    /// Read-only query; every row's first text column is collected.
    Reader,
    /// Batch executed inside an explicit transaction.
    NonQuery,
}

/// Executes commands against the versioning database.
#[derive(Clone)]
pub struct CommandExecutor {
    db: DatabaseConnection,
    timeout: Duration,
    nulls_equal: bool,
}

impl CommandExecutor {
    pub fn new(pool: &DbPool, timeout: Duration) -> Self {
        Self {
            db: pool.connection().clone(),
            timeout,
            nulls_equal: false,
        }
    }

    /// Make `= NULL` comparisons match NULL values for every command.
    pub fn with_nulls_equal(mut self, enabled: bool) -> Self {
        self.nulls_equal = enabled;
        self
    }

    /// Pooled connection; one connection per call.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn backend(&self) -> DbBackend {
        self.db.get_database_backend()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Open a transaction handle; dropping it without commit rolls back.
    pub async fn begin(&self) -> AppResult<DatabaseTransaction> {
        self.timed(self.db.begin()).await
    }

    /// Bind a command with `@name` markers for this backend.
    pub fn statement(&self, command: &str, params: &Params) -> Statement {
        bind(self.backend(), command, params)
    }

    /// Run a query and hand all rows to `handler`.
    ///
    /// Returns `T::default()` without calling the handler when no rows come back.
    pub async fn execute_reader<C, T, H>(
        &self,
        conn: &C,
        command: &str,
        params: &Params,
        handler: H,
    ) -> AppResult<T>
    where
        C: ConnectionTrait + TransactionTrait,
        T: Default,
        H: FnOnce(&[QueryResult]) -> Result<T, DbErr>,
    {
        let rows = self.query_all(conn, command, params).await?;
        if rows.is_empty() {
            return Ok(T::default());
        }
        handler(&rows).map_err(AppError::from)
    }

    /// Run a statement and return the affected row count.
    pub async fn execute_non_query<C>(
        &self,
        conn: &C,
        command: &str,
        params: &Params,
    ) -> AppResult<u64>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let stmt = self.statement(command, params);
        debug!(sql = %stmt.sql, "Executing non-query");

        if self.nulls_equal {
            let txn = self.timed(conn.begin()).await?;
            self.set_nulls_equal(&txn, true).await?;
            let result = self.timed(txn.execute_raw(stmt)).await?;
            self.set_nulls_equal(&txn, false).await?;
            self.timed(txn.commit()).await?;
            return Ok(result.rows_affected());
        }

        let result = self.timed(conn.execute_raw(stmt)).await?;
        Ok(result.rows_affected())
    }

    /// Run a query and return the first column of the first row.
    pub async fn execute_scalar<C, T>(
        &self,
        conn: &C,
        command: &str,
        params: &Params,
    ) -> AppResult<Option<T>>
    where
        C: ConnectionTrait + TransactionTrait,
        T: TryGetable,
    {
        let rows = self.query_all(conn, command, params).await?;
        match rows.first() {
            Some(row) => Ok(Some(row.try_get_by_index::<T>(0)?)),
            None => Ok(None),
        }
    }

    /// Run an INSERT and return the identity the database generated for it.
    pub async fn insert_returning_id<C>(
        &self,
        conn: &C,
        command: &str,
        params: &Params,
        id_column: &str,
    ) -> AppResult<Option<i32>>
    where
        C: ConnectionTrait,
    {
        match self.backend() {
            DbBackend::MySql => {
                let stmt = self.statement(command, params);
                debug!(sql = %stmt.sql, "Executing insert");
                let result = self.timed(conn.execute_raw(stmt)).await?;
                if result.rows_affected() == 0 {
                    return Ok(None);
                }
                let id = i32::try_from(result.last_insert_id()).map_err(|_| {
                    AppError::Database(format!(
                        "Generated id {} does not fit an integer identity",
                        result.last_insert_id()
                    ))
                })?;
                Ok(Some(id))
            }
            _ => {
                let command = format!("{} RETURNING {}", command, id_column);
                let stmt = self.statement(&command, params);
                debug!(sql = %stmt.sql, "Executing insert");
                match self.timed(conn.query_one_raw(stmt)).await? {
                    Some(row) => Ok(Some(row.try_get_by_index::<i32>(0)?)),
                    None => Ok(None),
                }
            }
        }
    }

    /// Run an opaque script body.
    ///
    /// Reader scripts return every row's first text column. Non-query scripts run
    /// inside their own transaction, committed only after the batch succeeds, and
    /// return a single line with the affected row count.
    pub async fn execute_script(&self, body: &str, mode: ScriptMode) -> AppResult<Vec<String>> {
        match mode {
            ScriptMode::Reader => {
                let stmt = Statement::from_string(self.backend(), body.to_owned());
                let rows = self.timed(self.db.query_all_raw(stmt)).await?;
                Ok(rows
                    .iter()
                    .filter_map(|row| row.try_get_by_index::<String>(0).ok())
                    .collect())
            }
            ScriptMode::NonQuery => {
                let txn = self.begin().await?;
                let result = self.timed(txn.execute_unprepared(body)).await?;
                self.timed(txn.commit()).await?;
                Ok(vec![format!(
                    "ExecuteNonQuery int result: {}",
                    result.rows_affected()
                )])
            }
        }
    }

    async fn query_all<C>(
        &self,
        conn: &C,
        command: &str,
        params: &Params,
    ) -> AppResult<Vec<QueryResult>>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let stmt = self.statement(command, params);
        debug!(sql = %stmt.sql, "Executing query");

        if self.nulls_equal {
            let txn = self.timed(conn.begin()).await?;
            self.set_nulls_equal(&txn, true).await?;
            let rows = self.timed(txn.query_all_raw(stmt)).await?;
            self.set_nulls_equal(&txn, false).await?;
            self.timed(txn.commit()).await?;
            return Ok(rows);
        }

        self.timed(conn.query_all_raw(stmt)).await
    }

    async fn set_nulls_equal<C>(&self, txn: &C, enabled: bool) -> AppResult<()>
    where
        C: ConnectionTrait,
    {
        match self.backend() {
            DbBackend::Postgres => {
                let value = if enabled { "on" } else { "off" };
                self.timed(txn.execute_unprepared(&format!(
                    "SET LOCAL transform_null_equals = {}",
                    value
                )))
                .await?;
            }
            backend => {
                if enabled {
                    warn!("NULL equality toggle not supported on {:?}, ignored", backend);
                }
            }
        }
        Ok(())
    }

    /// Apply the fixed per-command timeout.
    async fn timed<T, F>(&self, fut: F) -> AppResult<T>
    where
        F: Future<Output = Result<T, DbErr>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(AppError::from),
            Err(_) => Err(AppError::Timeout(self.timeout.as_secs())),
        }
    }
}
