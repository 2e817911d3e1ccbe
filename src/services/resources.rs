//! Script resources: where script bodies come from, how their names are
//! classified and which of them apply to the active environment.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::config::{SCRIPT_ENVIRONMENTS, ScriptsConfig};
use crate::error::{AppError, AppResult};
use crate::models::ScriptKind;

/// Tags of scripts shared by every environment.
const SHARED_TAGS: &[&str] = &["default", "shared"];

/// Provider of raw script bodies keyed by resource name.
#[async_trait]
pub trait ScriptSource: Send + Sync {
    /// Every available resource name.
    async fn names(&self) -> AppResult<Vec<String>>;

    /// Raw text of one resource.
    async fn read(&self, name: &str) -> AppResult<String>;
}

/// Resources stored as files in one directory; the file name is the resource name.
#[derive(Debug, Clone)]
pub struct DirectoryScriptSource {
    dir: PathBuf,
}

impl DirectoryScriptSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ScriptSource for DirectoryScriptSource {
    async fn names(&self) -> AppResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            AppError::Resource(format!(
                "Failed to list scripts in {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn read(&self, name: &str) -> AppResult<String> {
        tokio::fs::read_to_string(self.dir.join(name))
            .await
            .map_err(|e| AppError::Resource(format!("Failed to read script {}: {}", name, e)))
    }
}

/// In-memory resources, for embedded scripts and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryScriptSource {
    scripts: BTreeMap<String, String>,
}

impl MemoryScriptSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.insert(name, body);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, body: impl Into<String>) {
        self.scripts.insert(name.into(), body.into());
    }
}

#[async_trait]
impl ScriptSource for MemoryScriptSource {
    async fn names(&self) -> AppResult<Vec<String>> {
        Ok(self.scripts.keys().cloned().collect())
    }

    async fn read(&self, name: &str) -> AppResult<String> {
        self.scripts
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Script resource {}", name)))
    }
}

/// Resource name patterns for one namespace.
#[derive(Debug, Clone)]
pub struct ScriptPatterns {
    prefix: String,
    schema: Regex,
    data: Regex,
    integrity: Regex,
}

impl ScriptPatterns {
    pub fn new(namespace: &str) -> AppResult<Self> {
        let prefix = format!("{}.Resources.", namespace);
        let escaped = regex::escape(&prefix);
        let compile = |pattern: String| {
            Regex::new(&pattern)
                .map_err(|e| AppError::InvalidInput(format!("Invalid script pattern: {}", e)))
        };

        Ok(Self {
            schema: compile(format!(r"{}DB.\d{{4}}.\w*.Schema.\w*.sql", escaped))?,
            data: compile(format!(r"{}DB.\d{{4}}.\w*.Data.\w*.sql", escaped))?,
            integrity: compile(format!(r"{}DB.\w*.Integrity.\w*.sql", escaped))?,
            prefix,
        })
    }

    /// `<namespace>.Resources.`, stripped from Integrity names.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Kind of a resource, or `None` when it is not a script. Schema wins
    /// over Data, Data over Integrity.
    pub fn classify(&self, name: &str) -> Option<ScriptKind> {
        if self.schema.is_match(name) {
            Some(ScriptKind::Schema)
        } else if self.data.is_match(name) {
            Some(ScriptKind::Data)
        } else if self.integrity.is_match(name) {
            Some(ScriptKind::Integrity)
        } else {
            None
        }
    }
}

fn has_tag(lower_name: &str, tag: &str) -> bool {
    lower_name.contains(&format!(".{}.", tag.to_lowercase()))
}

/// Keep the names tagged for the active environment.
///
/// When none match, shared names (`.Default.` / `.Shared.`) are used instead,
/// plus untagged names when running in the default environment.
pub fn filter_by_environment(names: &[String], config: &ScriptsConfig) -> Vec<String> {
    let tagged: Vec<String> = names
        .iter()
        .filter(|name| {
            let lower = name.to_lowercase();
            config.tags.iter().any(|tag| has_tag(&lower, tag))
        })
        .cloned()
        .collect();

    if !tagged.is_empty() {
        return tagged;
    }

    let fallback: Vec<String> = names
        .iter()
        .filter(|name| {
            let lower = name.to_lowercase();
            let shared = SHARED_TAGS.iter().any(|tag| has_tag(&lower, tag));
            let untagged = !SCRIPT_ENVIRONMENTS.iter().any(|env| has_tag(&lower, env));
            shared || (untagged && config.is_default_environment())
        })
        .cloned()
        .collect();

    debug!(
        "No script tagged for {:?}, using {} shared scripts",
        config.tags,
        fallback.len()
    );
    fallback
}
