//! Mailsweep
//!
//! A rule-driven mailbox cleanup engine for Gmail. Declarative rules
//! (field/operator/pattern/age predicates paired with an action) are
//! translated into provider search queries, candidate messages are
//! fetched under a strict rate budget and re-validated with an exact
//! local predicate, and the matching messages are deleted, archived,
//! marked read, or labeled - with per-rule and aggregate statistics,
//! cooperative cancellation, and a dry-run simulation mode.
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use mailsweep::{auth, client::GmailMailProvider, config::Config, engine::ExecutionEngine};
//! use mailsweep::store::{JsonRuleStore, JsonlLogSink};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("mailsweep.toml".as_ref()).await?;
//!
//!     let hub = auth::initialize_hub(
//!         "credentials.json".as_ref(),
//!         ".mailsweep/token.json".as_ref(),
//!     )
//!     .await?;
//!
//!     let provider = Arc::new(GmailMailProvider::new(hub));
//!     let rules = Arc::new(JsonRuleStore::load("rules.json".as_ref()).await?);
//!     let logs = Arc::new(JsonlLogSink::new(".mailsweep/actions.jsonl".as_ref()));
//!
//!     let engine = ExecutionEngine::new(provider, rules, logs, config);
//!     let summary = engine.run_all(None).await?;
//!     println!("{} messages matched", summary.stats.matched);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication and Gmail hub initialization
//! - [`client`] - Mail provider trait and the Gmail implementation
//! - [`config`] - Configuration management
//! - [`engine`] - Run orchestration and statistics
//! - [`error`] - Error types and result alias
//! - [`executor`] - Action dispatch with label resolution
//! - [`matcher`] - Exact rule predicate evaluation
//! - [`models`] - Core data structures
//! - [`query`] - Provider query construction
//! - [`rate_limiter`] - Provider call pacing
//! - [`scanner`] - Paged search and message hydration
//! - [`store`] - Rule store and log sink boundaries

pub mod auth;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod matcher;
pub mod models;
pub mod query;
pub mod rate_limiter;
pub mod scanner;
pub mod store;

// Re-export commonly used types for convenience
pub use error::{Result, SweepError};

// Core data models
pub use models::{
    EmailMessage, LogEntry, Rule, RuleAction, RuleField, RuleOperator, RuleStats, RunOutcome,
    RunStats, RunSummary,
};

// Provider boundary
pub use client::{GmailMailProvider, LabelInfo, MailProvider, MessagePage};

// Engine types
pub use engine::{EventLevel, ExecutionEngine, RunEvent};

// Query construction
pub use query::FolderExclusions;

// Pacing
pub use rate_limiter::ApiRateLimiter;

// Collaborator boundaries
pub use store::{JsonRuleStore, JsonlLogSink, LogSink, MemoryLogSink, MemoryRuleStore, RuleStore};

// Config types
pub use config::{Config, ExecutionConfig, QuotaConfig, SearchConfig};
