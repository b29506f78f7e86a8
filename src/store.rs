//! Rule store and log sink collaborator boundaries
//!
//! The engine only reads enabled rules and writes `last_run_at` back;
//! rule editing belongs to an external surface. Log entries are
//! append-only and never read back by the engine. File-backed
//! reference implementations keep the binary self-contained; the
//! in-memory variants exist for tests and embedders.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Result, SweepError};
use crate::models::{LogEntry, Rule, RuleAction};

/// Read access to rules plus the single write-back the engine performs
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// All enabled rules
    async fn enabled_rules(&self) -> Result<Vec<Rule>>;

    /// Record when a rule last finished processing
    async fn stamp_last_run(&self, rule_name: &str, at: DateTime<Utc>) -> Result<()>;
}

/// Append-only sink for per-message execution records
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn append(&self, entry: LogEntry) -> Result<()>;
}

/// Validate a rule set loaded from an external source
///
/// Rules must have unique, non-empty names and non-empty patterns;
/// label actions must carry a label name so the failure surfaces at
/// load time instead of mid-run.
pub fn validate_rules(rules: &[Rule]) -> Result<()> {
    let mut seen = HashSet::new();

    for rule in rules {
        if rule.name.trim().is_empty() {
            return Err(SweepError::StoreError("Rule with empty name".to_string()));
        }
        if !seen.insert(rule.name.as_str()) {
            return Err(SweepError::StoreError(format!(
                "Duplicate rule name: {}",
                rule.name
            )));
        }
        if rule.value.trim().is_empty() {
            return Err(SweepError::StoreError(format!(
                "Rule '{}' has an empty pattern",
                rule.name
            )));
        }
        if rule.action == RuleAction::Label
            && rule
                .action_param
                .as_deref()
                .map(str::trim)
                .unwrap_or("")
                .is_empty()
        {
            return Err(SweepError::StoreError(format!(
                "Rule '{}' applies a label but no label name is set",
                rule.name
            )));
        }
    }

    Ok(())
}

/// Rule store backed by a JSON file (an array of rules)
pub struct JsonRuleStore {
    path: PathBuf,
    rules: Mutex<Vec<Rule>>,
}

impl JsonRuleStore {
    /// Load and validate the rule file; a missing file is an empty set
    pub async fn load(path: &Path) -> Result<Self> {
        let rules = if path.exists() {
            let json = tokio::fs::read_to_string(path).await?;
            let rules: Vec<Rule> = serde_json::from_str(&json)
                .map_err(|e| SweepError::StoreError(format!("Failed to parse rules file: {}", e)))?;
            validate_rules(&rules)?;
            rules
        } else {
            Vec::new()
        };

        debug!("Loaded {} rules from {:?}", rules.len(), path);
        Ok(Self {
            path: path.to_path_buf(),
            rules: Mutex::new(rules),
        })
    }

    /// All rules, enabled or not (for listing surfaces)
    pub async fn all_rules(&self) -> Vec<Rule> {
        self.rules.lock().await.clone()
    }

    async fn save(&self, rules: &[Rule]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(rules)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl RuleStore for JsonRuleStore {
    async fn enabled_rules(&self) -> Result<Vec<Rule>> {
        let rules = self.rules.lock().await;
        Ok(rules.iter().filter(|r| r.enabled).cloned().collect())
    }

    async fn stamp_last_run(&self, rule_name: &str, at: DateTime<Utc>) -> Result<()> {
        let mut rules = self.rules.lock().await;
        let rule = rules
            .iter_mut()
            .find(|r| r.name == rule_name)
            .ok_or_else(|| SweepError::StoreError(format!("Unknown rule: {}", rule_name)))?;
        rule.last_run_at = Some(at);

        let snapshot = rules.clone();
        drop(rules);
        self.save(&snapshot).await
    }
}

/// Log sink appending one JSON document per line
pub struct JsonlLogSink {
    path: PathBuf,
}

impl JsonlLogSink {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

#[async_trait]
impl LogSink for JsonlLogSink {
    async fn append(&self, entry: LogEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// In-memory rule store for tests and embedders
#[derive(Default)]
pub struct MemoryRuleStore {
    rules: Mutex<Vec<Rule>>,
}

impl MemoryRuleStore {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules: Mutex::new(rules),
        }
    }

    pub async fn rules(&self) -> Vec<Rule> {
        self.rules.lock().await.clone()
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn enabled_rules(&self) -> Result<Vec<Rule>> {
        let rules = self.rules.lock().await;
        Ok(rules.iter().filter(|r| r.enabled).cloned().collect())
    }

    async fn stamp_last_run(&self, rule_name: &str, at: DateTime<Utc>) -> Result<()> {
        let mut rules = self.rules.lock().await;
        if let Some(rule) = rules.iter_mut().find(|r| r.name == rule_name) {
            rule.last_run_at = Some(at);
        }
        Ok(())
    }
}

/// In-memory log sink for tests and embedders
#[derive(Default)]
pub struct MemoryLogSink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl LogSink for MemoryLogSink {
    async fn append(&self, entry: LogEntry) -> Result<()> {
        self.entries.lock().await.push(entry);
        Ok(())
    }
}
