//! Translation of rules into the provider's search query syntax
//!
//! The output is a space-joined token string consumed verbatim by the
//! provider's list call: `field:value` tokens, quoted literals for
//! body search, `before:YYYY/MM/DD` age bounds, and `-in:<folder>`
//! exclusions.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Rule, RuleField};

/// Folders excluded from every search, each independently toggleable
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FolderExclusions {
    #[serde(default = "default_true")]
    pub trash: bool,
    #[serde(default = "default_true")]
    pub spam: bool,
    #[serde(default = "default_true")]
    pub drafts: bool,
    #[serde(default)]
    pub sent: bool,
}

fn default_true() -> bool {
    true
}

impl Default for FolderExclusions {
    fn default() -> Self {
        Self {
            trash: true,
            spam: true,
            drafts: true,
            sent: false,
        }
    }
}

impl FolderExclusions {
    /// No folders excluded
    pub fn none() -> Self {
        Self {
            trash: false,
            spam: false,
            drafts: false,
            sent: false,
        }
    }
}

/// Build the provider query for a rule
///
/// Rules are required to carry a non-empty `value`; the rule store
/// rejects empty patterns before they reach this point.
pub fn build(rule: &Rule, exclusions: &FolderExclusions) -> String {
    let mut parts = Vec::new();

    parts.push(field_token(rule));

    if rule.older_than_days > 0 {
        parts.push(before_token(rule.older_than_days));
    }

    if exclusions.trash {
        parts.push("-in:trash".to_string());
    }
    if exclusions.spam {
        parts.push("-in:spam".to_string());
    }
    if exclusions.drafts {
        parts.push("-in:drafts".to_string());
    }
    if exclusions.sent {
        parts.push("-in:sent".to_string());
    }

    parts.join(" ")
}

/// The field-specific search token for a rule
fn field_token(rule: &Rule) -> String {
    match rule.field {
        RuleField::Subject => format!("subject:{}", rule.value),
        RuleField::From => format!("from:{}", rule.value),
        RuleField::To => format!("to:{}", rule.value),
        // Body search has no field prefix; a quoted literal searches
        // the full message text
        RuleField::Body => format!("\"{}\"", rule.value),
        RuleField::Label => {
            // Label names with whitespace or hyphens need quoting or
            // the provider tokenizes them apart
            if rule.value.contains(char::is_whitespace) || rule.value.contains('-') {
                format!("label:\"{}\"", rule.value)
            } else {
                format!("label:{}", rule.value)
            }
        }
    }
}

/// Age bound token: `before:` the date N days ago, provider date syntax
pub fn before_token(older_than_days: u32) -> String {
    let threshold = Utc::now() - Duration::days(older_than_days as i64);
    format!("before:{}", threshold.format("%Y/%m/%d"))
}
