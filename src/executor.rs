//! Action dispatch for matched messages
//!
//! Applies a rule's action through the provider, resolving label names
//! to identifiers on demand. A dry run records intent and reports
//! success without issuing any mutation.

use std::collections::HashMap;
use tracing::{debug, info};

use crate::client::MailProvider;
use crate::error::{Result, SweepError};
use crate::models::{EmailMessage, Rule, RuleAction};
use crate::rate_limiter::ApiRateLimiter;

/// System label removed to archive a message
const INBOX_LABEL: &str = "INBOX";
/// System label removed to mark a message read
const UNREAD_LABEL: &str = "UNREAD";

/// Executes rule actions against the provider
///
/// The label cache is per-executor (one run): labels are listed at
/// most once and each distinct label name is created at most once.
pub struct ActionExecutor<'a> {
    provider: &'a dyn MailProvider,
    limiter: &'a ApiRateLimiter,
    /// Lowercased label name -> provider label id
    label_cache: HashMap<String, String>,
    labels_loaded: bool,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(provider: &'a dyn MailProvider, limiter: &'a ApiRateLimiter) -> Self {
        Self {
            provider,
            limiter,
            label_cache: HashMap::new(),
            labels_loaded: false,
        }
    }

    /// Apply the rule's action to a message
    ///
    /// Success means the final provider mutation reported success. A
    /// label action with no label name fails with a configuration
    /// error even in dry-run mode; otherwise dry-run suppresses all
    /// provider calls and reports success.
    pub async fn execute(
        &mut self,
        message: &EmailMessage,
        rule: &Rule,
        dry_run: bool,
    ) -> Result<()> {
        // Validated before the dry-run gate: a missing label name is a
        // configuration fault, not a suppressed mutation.
        if rule.action == RuleAction::Label {
            label_param(rule)?;
        }

        if dry_run {
            info!(
                "[dry run] Would {} message {:?} from {:?}",
                rule.action.as_str(),
                message.subject,
                message.sender
            );
            return Ok(());
        }

        match rule.action {
            RuleAction::Delete => {
                // Move to trash, never a permanent delete
                self.limiter.throttle().await;
                self.provider.trash_message(&message.id).await?;
            }
            RuleAction::Archive => {
                self.limiter.throttle().await;
                self.provider
                    .modify_message(&message.id, &[], &[INBOX_LABEL.to_string()])
                    .await?;
            }
            RuleAction::MarkRead => {
                self.limiter.throttle().await;
                self.provider
                    .modify_message(&message.id, &[], &[UNREAD_LABEL.to_string()])
                    .await?;
            }
            RuleAction::Label => {
                let name = label_param(rule)?;
                let label_id = self.get_or_create_label(name).await?;
                self.limiter.throttle().await;
                self.provider
                    .modify_message(&message.id, &[label_id], &[])
                    .await?;
            }
        }

        info!(
            "Action '{}' executed on message {:?} from {:?}",
            rule.action.as_str(),
            message.subject,
            message.sender
        );
        Ok(())
    }

    /// Resolve a label name to its provider id, creating the label if
    /// it does not exist
    ///
    /// Lookup is case-insensitive against the account's labels, which
    /// are listed once and cached for the executor's lifetime.
    async fn get_or_create_label(&mut self, name: &str) -> Result<String> {
        if !self.labels_loaded {
            self.limiter.throttle().await;
            let labels = self.provider.list_labels().await?;
            for label in labels {
                self.label_cache.insert(label.name.to_lowercase(), label.id);
            }
            self.labels_loaded = true;
            debug!("Loaded {} labels into cache", self.label_cache.len());
        }

        if let Some(id) = self.label_cache.get(&name.to_lowercase()) {
            return Ok(id.clone());
        }

        self.limiter.throttle().await;
        let id = self.provider.create_label(name).await.map_err(|e| {
            SweepError::LabelError(format!("Could not create label '{}': {}", name, e))
        })?;

        info!("Created label '{}' with id {}", name, id);
        self.label_cache.insert(name.to_lowercase(), id.clone());
        Ok(id)
    }
}

/// The non-empty label name a label action requires
fn label_param(rule: &Rule) -> Result<&str> {
    rule.action_param
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            SweepError::ConfigError(format!(
                "Rule '{}' applies a label but no label name is set",
                rule.name
            ))
        })
}
