//! Exact rule predicate evaluation
//!
//! The provider-side search query is approximate (tokenized, sometimes
//! looser than the rule's semantics), so every candidate message is
//! re-validated here with an exact comparison before any action runs.

use regex::RegexBuilder;
use tracing::error;

use crate::models::{EmailMessage, Rule, RuleField, RuleOperator};

/// Check whether a message matches a rule. Pure, no side effects
/// beyond a log line for invalid regex patterns.
///
/// The age gate is evaluated first and short-circuits. Label-field
/// rules always match locally: label names and label identifiers do
/// not roundtrip reliably, so label matching is delegated entirely to
/// the provider-side `label:` query.
pub fn matches(message: &EmailMessage, rule: &Rule) -> bool {
    if rule.older_than_days > 0 && message.age_days() < rule.older_than_days {
        return false;
    }

    if rule.field == RuleField::Label {
        return true;
    }

    let field_value = field_value(message, rule.field);
    match_operator(field_value, rule.operator, &rule.value)
}

/// Extract the message field a rule is evaluated against
fn field_value(message: &EmailMessage, field: RuleField) -> &str {
    match field {
        RuleField::Subject => &message.subject,
        RuleField::From => &message.sender,
        RuleField::To => &message.recipient,
        RuleField::Body => &message.body_preview,
        // Handled before extraction; empty value keeps this total
        RuleField::Label => "",
    }
}

/// Apply the operator to a field value
///
/// Everything is case-insensitive except `contains_exact`. An invalid
/// regex is logged and treated as a non-match rather than aborting the
/// rule.
fn match_operator(value: &str, operator: RuleOperator, pattern: &str) -> bool {
    match operator {
        RuleOperator::Contains => value.to_lowercase().contains(&pattern.to_lowercase()),
        RuleOperator::ContainsExact => value.contains(pattern),
        RuleOperator::Equals => value.to_lowercase() == pattern.to_lowercase(),
        RuleOperator::StartsWith => value.to_lowercase().starts_with(&pattern.to_lowercase()),
        RuleOperator::EndsWith => value.to_lowercase().ends_with(&pattern.to_lowercase()),
        RuleOperator::Regex => match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => re.is_match(value),
            Err(e) => {
                error!("Invalid regex pattern {:?}: {}", pattern, e);
                false
            }
        },
    }
}
