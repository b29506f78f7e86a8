//! Run orchestration: query, paginate, re-match, execute, aggregate
//!
//! The engine drives each enabled rule through the full pipeline and
//! folds per-rule counters into run totals. Failures are contained at
//! the smallest enclosing scope: a message-level error is counted and
//! skipped, a pagination error fails only its rule, and nothing short
//! of cancellation ends the run early.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::client::MailProvider;
use crate::config::Config;
use crate::executor::ActionExecutor;
use crate::matcher;
use crate::models::{LogEntry, Rule, RuleStats, RunOutcome, RunStats, RunSummary};
use crate::query;
use crate::rate_limiter::ApiRateLimiter;
use crate::scanner::{ProgressCallback, SearchPaginator};
use crate::store::{LogSink, RuleStore};

/// Severity of a structured run event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

/// Structured events delivered to the presentation layer, in emission
/// order, over a channel so the consumer may live on any thread
#[derive(Debug, Clone)]
pub enum RunEvent {
    Log { level: EventLevel, message: String },
    Progress { rule_name: String, fetched: usize },
}

/// Top-level cleanup driver
///
/// Provider calls are strictly sequential; the shared rate limiter
/// enforces the call pace, so parallelizing rules or messages would
/// only queue behind it while risking the quota budget.
pub struct ExecutionEngine {
    provider: Arc<dyn MailProvider>,
    limiter: ApiRateLimiter,
    rules: Arc<dyn RuleStore>,
    logs: Arc<dyn LogSink>,
    config: Config,
    cancel: CancellationToken,
    events: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl ExecutionEngine {
    pub fn new(
        provider: Arc<dyn MailProvider>,
        rules: Arc<dyn RuleStore>,
        logs: Arc<dyn LogSink>,
        config: Config,
    ) -> Self {
        let limiter =
            ApiRateLimiter::from_quota(config.quota.calls_per_minute, config.quota.safety_factor);
        Self {
            provider,
            limiter,
            rules,
            logs,
            config,
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Deliver structured run events to this sender
    pub fn with_events(mut self, sender: mpsc::UnboundedSender<RunEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Token observed between rules and between messages
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every enabled rule, ordered by name
    ///
    /// `dry_run_override` replaces the configured dry-run flag for this
    /// invocation only. Returns Err only if the rule store cannot be
    /// read; all rule- and message-level failures are absorbed into
    /// the stats.
    pub async fn run_all(&self, dry_run_override: Option<bool>) -> crate::error::Result<RunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let dry_run = dry_run_override.unwrap_or(self.config.execution.dry_run);

        let mut rules = self.rules.enabled_rules().await?;
        rules.sort_by(|a, b| a.name.cmp(&b.name));

        self.emit(
            EventLevel::Info,
            format!(
                "Starting cleanup run {} with {} active rules{}",
                run_id,
                rules.len(),
                if dry_run { " (dry run)" } else { "" }
            ),
        );

        let mut stats = RunStats::default();
        let mut executor = ActionExecutor::new(self.provider.as_ref(), &self.limiter);

        for rule in &rules {
            if self.cancel.is_cancelled() {
                self.emit(
                    EventLevel::Warn,
                    format!("Run cancelled before rule '{}'", rule.name),
                );
                break;
            }

            let rule_stats = self.process_rule(rule, dry_run, &mut executor).await;
            stats.absorb(rule_stats);
        }

        let outcome = if self.cancel.is_cancelled() {
            RunOutcome::Cancelled
        } else {
            RunOutcome::Completed
        };

        self.emit(
            EventLevel::Info,
            format!(
                "Cleanup {}: {} rules, {} messages matched, {} actions successful, {} failed",
                match outcome {
                    RunOutcome::Completed => "complete",
                    RunOutcome::Cancelled => "cancelled",
                },
                stats.rules_processed,
                stats.matched,
                stats.success,
                stats.failed
            ),
        );

        Ok(RunSummary {
            run_id,
            outcome,
            stats,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Run a single rule outside the normal schedule
    pub async fn run_one(&self, rule: &Rule, dry_run_override: Option<bool>) -> RuleStats {
        let dry_run = dry_run_override.unwrap_or(self.config.execution.dry_run);
        let mut executor = ActionExecutor::new(self.provider.as_ref(), &self.limiter);
        self.process_rule(rule, dry_run, &mut executor).await
    }

    /// Drive one rule: build query, paginate, re-match, execute, log
    async fn process_rule(
        &self,
        rule: &Rule,
        dry_run: bool,
        executor: &mut ActionExecutor<'_>,
    ) -> RuleStats {
        let mut stats = RuleStats::default();

        self.emit(EventLevel::Info, format!("Processing rule: {}", rule.name));

        let search_query = query::build(rule, &self.config.search.exclusions);
        let paginator = SearchPaginator::new(self.provider.as_ref(), &self.limiter);

        let progress = self.events.clone().map(|tx| {
            let rule_name = rule.name.clone();
            Arc::new(move |fetched: usize| {
                let _ = tx.send(RunEvent::Progress {
                    rule_name: rule_name.clone(),
                    fetched,
                });
            }) as ProgressCallback
        });

        // The query already carries the before: token, so no age
        // threshold is layered on here.
        let messages = match paginator
            .search(&search_query, self.config.search.max_results, None, progress)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                self.emit(
                    EventLevel::Error,
                    format!("Rule '{}' search failed: {}", rule.name, e),
                );
                return stats;
            }
        };

        for message in &messages {
            if self.cancel.is_cancelled() {
                self.emit(
                    EventLevel::Warn,
                    format!("Rule '{}' cancelled mid-run", rule.name),
                );
                break;
            }

            // The provider search is approximate; only the exact local
            // predicate decides a match.
            if !matcher::matches(message, rule) {
                continue;
            }

            stats.matched += 1;

            let (success, error_message) =
                match executor.execute(message, rule, dry_run).await {
                    Ok(()) => (true, None),
                    Err(e) => (false, Some(e.to_string())),
                };

            let entry = LogEntry::new(rule, message, success, error_message.clone());
            if let Err(e) = self.logs.append(entry).await {
                warn!("Failed to persist log entry for {}: {}", message.id, e);
            }

            if success {
                stats.success += 1;
            } else {
                stats.failed += 1;
                self.emit(
                    EventLevel::Error,
                    format!(
                        "Action '{}' failed on message {}: {}",
                        rule.action.as_str(),
                        message.id,
                        error_message.as_deref().unwrap_or("unknown error")
                    ),
                );
            }
        }

        self.emit(
            EventLevel::Info,
            format!(
                "Rule '{}' complete: {} matched, {} success, {} failed",
                rule.name, stats.matched, stats.success, stats.failed
            ),
        );

        if let Err(e) = self.rules.stamp_last_run(&rule.name, Utc::now()).await {
            warn!("Failed to stamp last run for rule '{}': {}", rule.name, e);
        }

        stats
    }

    /// Log locally and forward to the event channel, best effort
    fn emit(&self, level: EventLevel, message: String) {
        match level {
            EventLevel::Info => info!("{}", message),
            EventLevel::Warn => warn!("{}", message),
            EventLevel::Error => error!("{}", message),
        }

        if let Some(tx) = &self.events {
            let _ = tx.send(RunEvent::Log { level, message });
        }
    }
}
