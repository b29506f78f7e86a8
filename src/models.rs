use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum characters of subject/sender preserved in a log entry
const LOG_FIELD_MAX: usize = 200;

/// Message field a rule predicate is evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleField {
    Subject,
    From,
    To,
    Body,
    Label,
}

/// Comparison operator applied to the extracted field value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOperator {
    Contains,
    ContainsExact,
    Equals,
    StartsWith,
    EndsWith,
    Regex,
}

/// Action taken on a matched message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Delete,
    Archive,
    MarkRead,
    Label,
}

impl RuleAction {
    /// Stable wire name, used in log entries and summaries
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Delete => "delete",
            RuleAction::Archive => "archive",
            RuleAction::MarkRead => "mark_read",
            RuleAction::Label => "label",
        }
    }
}

/// A declarative cleanup rule: predicate + action
///
/// The rule name is its identity; the rule store enforces uniqueness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub field: RuleField,
    pub operator: RuleOperator,
    pub value: String,
    pub action: RuleAction,
    /// Label name for `RuleAction::Label`; unused otherwise
    #[serde(default)]
    pub action_param: Option<String>,
    /// 0 means no age filter
    #[serde(default)]
    pub older_than_days: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

/// Read-only message snapshot hydrated from the provider for one rule's
/// evaluation; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: String,
    pub thread_id: String,
    pub subject: String,
    pub sender: String,
    pub recipient: String,
    pub date: DateTime<Utc>,
    pub snippet: String,
    pub labels: Vec<String>,
    /// First ~1000 characters of the decoded plain-text body
    #[serde(default)]
    pub body_preview: String,
}

impl EmailMessage {
    /// Whole days between now (UTC) and the message date
    ///
    /// Messages dated in the future count as zero days old.
    pub fn age_days(&self) -> u32 {
        let days = (Utc::now() - self.date).num_days();
        days.max(0) as u32
    }
}

/// Immutable record of one action attempt, handed to the log sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub rule_name: String,
    pub message_id: String,
    pub message_subject: String,
    pub message_from: String,
    pub action: RuleAction,
    pub success: bool,
    pub error_message: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(
        rule: &Rule,
        message: &EmailMessage,
        success: bool,
        error_message: Option<String>,
    ) -> Self {
        Self {
            rule_name: rule.name.clone(),
            message_id: message.id.clone(),
            message_subject: truncate_chars(&message.subject, LOG_FIELD_MAX),
            message_from: truncate_chars(&message.sender, LOG_FIELD_MAX),
            action: rule.action,
            success,
            error_message,
            executed_at: Utc::now(),
        }
    }
}

/// Truncate to at most `max` characters, respecting UTF-8 boundaries
fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Per-rule counters accumulated during one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleStats {
    pub matched: usize,
    pub success: usize,
    pub failed: usize,
}

/// Aggregate counters for a whole run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub rules_processed: usize,
    pub matched: usize,
    pub success: usize,
    pub failed: usize,
}

impl RunStats {
    /// Fold one rule's counters into the run total
    pub fn absorb(&mut self, rule_stats: RuleStats) {
        self.rules_processed += 1;
        self.matched += rule_stats.matched;
        self.success += rule_stats.success;
        self.failed += rule_stats.failed;
    }
}

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

/// Result of a full engine run: identity, outcome, and aggregate stats
///
/// Cancelled runs carry whatever partial stats were accumulated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: uuid::Uuid,
    pub outcome: RunOutcome,
    pub stats: RunStats,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_rule() -> Rule {
        Rule {
            name: "old-newsletters".to_string(),
            field: RuleField::Subject,
            operator: RuleOperator::Contains,
            value: "newsletter".to_string(),
            action: RuleAction::Archive,
            action_param: None,
            older_than_days: 30,
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_run_at: None,
        }
    }

    fn sample_message(subject: &str) -> EmailMessage {
        EmailMessage {
            id: "m1".to_string(),
            thread_id: "t1".to_string(),
            subject: subject.to_string(),
            sender: "news@example.com".to_string(),
            recipient: "me@example.com".to_string(),
            date: Utc::now() - Duration::days(45),
            snippet: "snippet".to_string(),
            labels: vec!["INBOX".to_string()],
            body_preview: String::new(),
        }
    }

    #[test]
    fn test_age_days() {
        let msg = sample_message("hello");
        assert_eq!(msg.age_days(), 45);
    }

    #[test]
    fn test_age_days_future_date_is_zero() {
        let mut msg = sample_message("hello");
        msg.date = Utc::now() + Duration::days(3);
        assert_eq!(msg.age_days(), 0);
    }

    #[test]
    fn test_rule_serde_snake_case() {
        let rule = sample_rule();
        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains("\"field\":\"subject\""));
        assert!(json.contains("\"operator\":\"contains\""));
        assert!(json.contains("\"action\":\"archive\""));

        let back: Rule = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, rule.name);
        assert_eq!(back.operator, RuleOperator::Contains);
    }

    #[test]
    fn test_operator_wire_names() {
        let json = serde_json::to_string(&RuleOperator::ContainsExact).unwrap();
        assert_eq!(json, "\"contains_exact\"");
        let json = serde_json::to_string(&RuleOperator::StartsWith).unwrap();
        assert_eq!(json, "\"starts_with\"");
        let json = serde_json::to_string(&RuleAction::MarkRead).unwrap();
        assert_eq!(json, "\"mark_read\"");
    }

    #[test]
    fn test_log_entry_truncates_long_fields() {
        let rule = sample_rule();
        let mut msg = sample_message(&"x".repeat(500));
        msg.sender = "y".repeat(300);

        let entry = LogEntry::new(&rule, &msg, true, None);
        assert_eq!(entry.message_subject.chars().count(), 200);
        assert_eq!(entry.message_from.chars().count(), 200);
        assert_eq!(entry.rule_name, "old-newsletters");
        assert!(entry.success);
    }

    #[test]
    fn test_run_stats_absorb() {
        let mut total = RunStats::default();
        total.absorb(RuleStats {
            matched: 3,
            success: 2,
            failed: 1,
        });
        total.absorb(RuleStats::default());

        assert_eq!(total.rules_processed, 2);
        assert_eq!(total.matched, 3);
        assert_eq!(total.success, 2);
        assert_eq!(total.failed, 1);
    }
}
