//! Migration orchestrator.
//!
//! Catalogs the script resources, diffs them against `system_versioning` and
//! runs the pending ones in ascending id order. Every entry point takes the
//! same lock, so a status load never interleaves with an execution.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::database_admin::DatabaseAdmin;
use super::resources::{ScriptPatterns, ScriptSource, filter_by_environment};
use super::script_log::ScriptLogger;
use super::script_parser::{
    MESSAGE_TAG, WARNING_TAG, executable_body, parse_script, token_values,
};
use crate::config::{Config, ScriptsConfig};
use crate::db::system_versioning::SystemVersioningBroker;
use crate::db::system_versioning_log::{SystemVersioningLog, SystemVersioningLogBroker};
use crate::db::{CommandExecutor, DbPool, EntityBroker, MappingRegistry, ScriptMode};
use crate::error::AppResult;
use crate::models::{
    FailureKind, OperationResult, Script, ScriptKind, ScriptLog, ScriptLogView, ScriptView,
    StatusInfo, VersioningStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadState {
    NotLoaded,
    Loaded,
}

/// Scripts of the last load and the state derived from them.
struct Catalog {
    load: LoadState,
    database_exists: bool,
    needs_update: bool,
    has_warnings: bool,
    schema: Vec<Script>,
    data: Vec<Script>,
    integrity: Vec<Script>,
    logger: ScriptLogger,
}

impl Catalog {
    fn new() -> Self {
        Self {
            load: LoadState::NotLoaded,
            database_exists: false,
            needs_update: false,
            has_warnings: false,
            schema: Vec::new(),
            data: Vec::new(),
            integrity: Vec::new(),
            logger: ScriptLogger::new(),
        }
    }

    fn reset(&mut self) {
        self.load = LoadState::NotLoaded;
        self.schema.clear();
        self.data.clear();
        self.integrity.clear();
        self.logger.clear();
    }

    /// Schema and Data interleaved by id, then Integrity.
    fn ordered(&self) -> Vec<&Script> {
        let mut scripts: Vec<&Script> = self.schema.iter().chain(self.data.iter()).collect();
        scripts.sort_by_key(|s| s.id);
        scripts.extend(self.integrity.iter());
        scripts
    }

    fn refresh_flags(&mut self) {
        self.needs_update = self
            .schema
            .iter()
            .chain(self.data.iter())
            .any(|s| s.execution_required);
        self.has_warnings = self.ordered().iter().any(|s| s.has_warnings())
            || self.logger.entries().iter().any(|e| e.warning);
    }

    fn status(&self) -> VersioningStatus {
        let loaded = self.load == LoadState::Loaded;
        VersioningStatus {
            database_does_not_exist: loaded && !self.database_exists,
            database_needs_update: self.needs_update,
            has_warnings: self.has_warnings,
            status_loaded: loaded,
            scripts_logs: self.logger.entries().iter().map(ScriptLogView::from).collect(),
            scripts: self.ordered().into_iter().map(ScriptView::from).collect(),
        }
    }
}

fn database_missing<T>() -> OperationResult<T> {
    OperationResult::failure(FailureKind::DatabaseMissing, "Database does not exist")
}

pub struct StatusController {
    pool: DbPool,
    executor: CommandExecutor,
    versioning: SystemVersioningBroker,
    audit: SystemVersioningLogBroker,
    admin: Arc<dyn DatabaseAdmin>,
    source: Arc<dyn ScriptSource>,
    patterns: ScriptPatterns,
    scripts_config: ScriptsConfig,
    database_name: String,
    status_info: Arc<StatusInfo>,
    catalog: Mutex<Catalog>,
}

impl StatusController {
    pub fn new(
        pool: &DbPool,
        config: &Config,
        source: Arc<dyn ScriptSource>,
        admin: Arc<dyn DatabaseAdmin>,
        status_info: Arc<StatusInfo>,
    ) -> AppResult<Self> {
        let executor = CommandExecutor::new(pool, config.database.command_timeout());
        let registry = Arc::new(MappingRegistry::standard());
        let step = config.database.in_clause_step;

        Ok(Self {
            pool: pool.clone(),
            versioning: EntityBroker::new(executor.clone(), registry.clone())
                .with_in_clause_step(step),
            audit: EntityBroker::new(executor.clone(), registry).with_in_clause_step(step),
            executor,
            admin,
            source,
            patterns: ScriptPatterns::new(&config.scripts.namespace)?,
            scripts_config: config.scripts.clone(),
            database_name: config.database.name.clone(),
            status_info,
            catalog: Mutex::new(Catalog::new()),
        })
    }

    /// Create the bookkeeping tables when the target database exists.
    pub async fn setup_versioning_tables(&self) -> AppResult<bool> {
        let _guard = self.catalog.lock().await;
        if !self.admin.database_exists(&self.database_name).await? {
            warn!(
                "Database {} does not exist, versioning tables not created",
                self.database_name
            );
            return Ok(false);
        }
        self.pool.run_migrations().await?;
        Ok(true)
    }

    /// Rebuild the catalog and compute which scripts the database still needs.
    pub async fn load_status(&self) -> AppResult<VersioningStatus> {
        let mut guard = self.catalog.lock().await;
        let catalog = &mut *guard;

        self.load(catalog).await?;
        self.persist_logs(catalog).await?;
        self.refresh_info(catalog.database_exists).await;
        Ok(catalog.status())
    }

    /// Status of the last load without touching the database.
    pub async fn versioning_status(&self) -> VersioningStatus {
        self.catalog.lock().await.status()
    }

    pub async fn execute_schema_updates(&self) -> AppResult<OperationResult> {
        self.execute_required(&[ScriptKind::Schema]).await
    }

    pub async fn execute_data_scripts(&self) -> AppResult<OperationResult> {
        self.execute_required(&[ScriptKind::Data]).await
    }

    /// Schema and Data scripts together, interleaved by id.
    pub async fn execute_all_pending_scripts(&self) -> AppResult<OperationResult> {
        self.execute_required(&[ScriptKind::Schema, ScriptKind::Data])
            .await
    }

    /// Run every Integrity script; a failing check does not stop the others.
    pub async fn execute_integrity_scripts(&self) -> AppResult<OperationResult> {
        let mut guard = self.catalog.lock().await;
        let catalog = &mut *guard;
        self.ensure_loaded(catalog).await?;

        if !catalog.database_exists {
            return Ok(database_missing());
        }

        let mut failed = Vec::new();
        for script in catalog.integrity.iter_mut() {
            let result = self.run_script(script, &mut catalog.logger).await;
            if !result.success {
                failed.push(script.file_name.clone());
            }
        }
        let total = catalog.integrity.len();
        catalog.refresh_flags();

        self.persist_logs(catalog).await?;
        self.refresh_info(true).await;

        if failed.is_empty() {
            Ok(OperationResult::ok(format!("{} integrity script(s) executed", total)))
        } else {
            Ok(OperationResult::failed(format!(
                "{} of {} integrity script(s) failed",
                failed.len(),
                total
            ))
            .with_detail(failed.join(", ")))
        }
    }

    /// Run one cataloged script by resource name; returns its output lines.
    pub async fn execute_script(&self, file_name: &str) -> AppResult<OperationResult<Vec<String>>> {
        let mut guard = self.catalog.lock().await;
        let catalog = &mut *guard;
        self.ensure_loaded(catalog).await?;

        if !catalog.database_exists {
            return Ok(database_missing());
        }

        let Catalog {
            schema,
            data,
            integrity,
            logger,
            ..
        } = &mut *catalog;
        let Some(script) = schema
            .iter_mut()
            .chain(data.iter_mut())
            .chain(integrity.iter_mut())
            .find(|s| s.file_name == file_name)
        else {
            return Ok(OperationResult::not_found(format!(
                "Cannot find script with file name: {}",
                file_name
            )));
        };

        let result = self.run_script(script, logger).await;
        catalog.refresh_flags();

        self.persist_logs(catalog).await?;
        self.refresh_info(true).await;
        Ok(result)
    }

    /// Cataloged scripts: Schema and Data by ascending id, then Integrity.
    pub async fn get_scripts(&self) -> AppResult<Vec<Script>> {
        let mut guard = self.catalog.lock().await;
        self.ensure_loaded(&mut guard).await?;
        Ok(guard.ordered().into_iter().cloned().collect())
    }

    /// Validation and execution problems of the current load.
    pub async fn scripts_log(&self) -> Vec<ScriptLog> {
        self.catalog.lock().await.logger.entries().to_vec()
    }

    /// Write queued audit rows now.
    pub async fn flush_logs(&self) -> AppResult<usize> {
        let mut guard = self.catalog.lock().await;
        self.persist_logs(&mut guard).await
    }

    /// Persisted audit rows, newest first.
    pub async fn audit_log(&self, limit: i64) -> AppResult<Vec<SystemVersioningLog>> {
        self.audit.latest(limit).await
    }

    async fn ensure_loaded(&self, catalog: &mut Catalog) -> AppResult<()> {
        if catalog.load == LoadState::NotLoaded {
            self.load(catalog).await?;
        }
        Ok(())
    }

    async fn load(&self, catalog: &mut Catalog) -> AppResult<()> {
        catalog.reset();
        catalog.database_exists = self.admin.database_exists(&self.database_name).await?;

        self.catalog_scripts(catalog).await?;

        if catalog.database_exists {
            let applied: HashMap<i32, _> = self
                .versioning
                .get_all()
                .await?
                .into_iter()
                .map(|record| (record.script_id(), record.impacted_date))
                .collect();

            for script in catalog.schema.iter_mut().chain(catalog.data.iter_mut()) {
                match applied.get(&script.id) {
                    Some(impacted) => {
                        script.execution_required = false;
                        script.impacted_date = Some(*impacted);
                    }
                    None => script.execution_required = true,
                }
            }
        } else {
            warn!("Database {} does not exist", self.database_name);
            for script in catalog.schema.iter_mut() {
                script.execution_required = true;
            }
        }

        catalog.refresh_flags();

        if catalog.database_exists && !catalog.needs_update {
            debug!("Database is up to date, running integrity scripts");
            for script in catalog.integrity.iter_mut() {
                self.run_script(script, &mut catalog.logger).await;
            }
            catalog.refresh_flags();
        }

        catalog.load = LoadState::Loaded;
        info!(
            schema = catalog.schema.len(),
            data = catalog.data.len(),
            integrity = catalog.integrity.len(),
            rejected = catalog.logger.entries().len(),
            needs_update = catalog.needs_update,
            "Versioning status loaded"
        );
        Ok(())
    }

    /// Read, classify, filter and parse every resource into the catalog.
    async fn catalog_scripts(&self, catalog: &mut Catalog) -> AppResult<()> {
        let mut by_kind: HashMap<ScriptKind, Vec<String>> = HashMap::new();
        for name in self.source.names().await? {
            match self.patterns.classify(&name) {
                Some(kind) => by_kind.entry(kind).or_default().push(name),
                None => debug!("Resource {} is not a versioning script", name),
            }
        }

        for kind in [ScriptKind::Schema, ScriptKind::Data, ScriptKind::Integrity] {
            let names = by_kind.remove(&kind).unwrap_or_default();
            for name in filter_by_environment(&names, &self.scripts_config) {
                let raw = self.source.read(&name).await?;
                let parsed = parse_script(&name, &raw, kind, &self.patterns)?;

                for issue in &parsed.issues {
                    catalog.logger.log_issue(&parsed.script, *issue);
                }
                if catalog.logger.has_errors(&name) {
                    continue;
                }

                match kind {
                    ScriptKind::Schema => catalog.schema.push(parsed.script),
                    ScriptKind::Data => catalog.data.push(parsed.script),
                    ScriptKind::Integrity => catalog.integrity.push(parsed.script),
                }
            }
        }

        catalog.schema.sort_by_key(|s| s.id);
        catalog.data.sort_by_key(|s| s.id);
        Ok(())
    }

    /// Run the required scripts of the given kinds by ascending id, stopping
    /// at the first failure.
    async fn execute_required(&self, kinds: &[ScriptKind]) -> AppResult<OperationResult> {
        let mut guard = self.catalog.lock().await;
        let catalog = &mut *guard;
        self.ensure_loaded(catalog).await?;

        if !catalog.database_exists {
            return Ok(database_missing());
        }

        let mut queue: Vec<&mut Script> = catalog
            .schema
            .iter_mut()
            .chain(catalog.data.iter_mut())
            .filter(|s| kinds.contains(&s.kind) && s.execution_required)
            .collect();
        queue.sort_by_key(|s| s.id);

        let label = kinds
            .iter()
            .map(ScriptKind::as_str)
            .collect::<Vec<_>>()
            .join("/");
        let mut executed = 0;
        let mut outcome = None;
        for script in queue {
            let result = self.run_script(script, &mut catalog.logger).await;
            if !result.success {
                outcome = Some(result.discard_data());
                break;
            }
            executed += 1;
        }
        catalog.refresh_flags();

        self.persist_logs(catalog).await?;
        self.refresh_info(true).await;

        Ok(outcome.unwrap_or_else(|| {
            OperationResult::ok(format!("{} {} script(s) executed", executed, label))
        }))
    }

    async fn run_script(
        &self,
        script: &mut Script,
        logger: &mut ScriptLogger,
    ) -> OperationResult<Vec<String>> {
        let mode = if script.kind.is_versioned() {
            ScriptMode::NonQuery
        } else {
            ScriptMode::Reader
        };
        info!("Executing {} script {}", script.kind, script.file_name);

        let body = if script.kind.is_versioned() {
            executable_body(script)
        } else {
            script.body.clone()
        };

        let executed = self.executor.execute_script(&body, mode).await;
        match executed {
            Ok(lines) => {
                script.messages = token_values(&lines, MESSAGE_TAG);
                script.warnings = token_values(&lines, WARNING_TAG);

                if script.kind.is_versioned() {
                    script.execution_required = false;
                    script.impacted_date = Some(Utc::now().naive_utc());
                    logger.add_message(
                        format!(
                            "Versioning Script '{}' has been executed. See 'Details' column for script code.",
                            script.file_name
                        ),
                        body,
                        Some(script.id),
                    );
                }

                OperationResult::ok(format!("Script {} executed", script.file_name))
                    .with_data(lines)
            }
            Err(e) => {
                error!("Script {} failed: {}", script.file_name, e);
                logger.add_error(script, e.to_string(), false);
                OperationResult::failed(format!("Error executing script {}", script.file_name))
                    .with_detail(e.to_string())
            }
        }
    }

    /// Write queued audit rows when there is a database to hold them.
    async fn persist_logs(&self, catalog: &mut Catalog) -> AppResult<usize> {
        if !catalog.database_exists {
            catalog.logger.discard_pending();
            return Ok(0);
        }

        match catalog.logger.flush(&self.audit).await {
            Ok(saved) => Ok(saved),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("Failed to write audit log: {}", e);
                Ok(0)
            }
        }
    }

    /// Best-effort refresh of the descriptive database and server info.
    async fn refresh_info(&self, database_exists: bool) {
        if !database_exists {
            return;
        }

        let database = self.admin.database_info(&self.database_name).await;
        let server = self.admin.server_info().await;
        match (database, server) {
            (Ok(database), Ok(server)) => {
                self.status_info.set_database_info(database, server).await;
            }
            (Err(e), _) | (_, Err(e)) => warn!("Failed to refresh database info: {}", e),
        }
    }
}
