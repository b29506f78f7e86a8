//! Common test utilities and fixtures

use async_trait::async_trait;
use chrono::{Duration, Utc};
use mailsweep::client::{LabelInfo, MailProvider, MessagePage};
use mailsweep::error::{Result, SweepError};
use mailsweep::models::{EmailMessage, Rule, RuleAction, RuleField, RuleOperator};
use std::sync::Mutex;

/// Create a test message with the given age in days
pub fn test_message(id: &str, subject: &str, sender: &str, age_days: i64) -> EmailMessage {
    EmailMessage {
        id: id.to_string(),
        thread_id: format!("thread_{}", id),
        subject: subject.to_string(),
        sender: sender.to_string(),
        recipient: "me@example.com".to_string(),
        date: Utc::now() - Duration::days(age_days),
        snippet: String::new(),
        labels: vec!["INBOX".to_string(), "UNREAD".to_string()],
        body_preview: String::new(),
    }
}

/// Create an enabled rule with sensible defaults
pub fn test_rule(name: &str, field: RuleField, operator: RuleOperator, value: &str) -> Rule {
    Rule {
        name: name.to_string(),
        field,
        operator,
        value: value.to_string(),
        action: RuleAction::Archive,
        action_param: None,
        older_than_days: 0,
        enabled: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        last_run_at: None,
    }
}

/// One recorded modify call: (message id, added labels, removed labels)
pub type Modification = (String, Vec<String>, Vec<String>);

#[derive(Default)]
struct FakeState {
    mailbox: Vec<EmailMessage>,
    labels: Vec<LabelInfo>,
    next_label_id: usize,
    queries: Vec<String>,
    list_calls: usize,
    create_label_calls: usize,
    trashed: Vec<String>,
    modifications: Vec<Modification>,
    fail_listing_for: Vec<String>,
    fail_modify_for: Vec<String>,
}

/// Scripted in-memory mail provider
///
/// Listing is deliberately approximate, like the real provider: every
/// mailbox message is a candidate for every query, and the engine's
/// exact matcher is expected to filter. Mutations are recorded for
/// assertions, and an optional hook fires after each one (used to
/// trip cancellation mid-run).
#[derive(Default)]
pub struct FakeProvider {
    state: Mutex<FakeState>,
    after_action: Option<Box<dyn Fn() + Send + Sync>>,
}

impl FakeProvider {
    pub fn new(mailbox: Vec<EmailMessage>) -> Self {
        Self {
            state: Mutex::new(FakeState {
                mailbox,
                ..Default::default()
            }),
            after_action: None,
        }
    }

    /// Pre-populate account labels
    pub fn with_labels(self, labels: Vec<(&str, &str)>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.labels = labels
                .into_iter()
                .map(|(id, name)| LabelInfo {
                    id: id.to_string(),
                    name: name.to_string(),
                })
                .collect();
        }
        self
    }

    /// Fail any listing whose query contains this substring
    pub fn fail_listing_for(self, fragment: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .fail_listing_for
            .push(fragment.to_string());
        self
    }

    /// Fail any modify call for this message id
    pub fn fail_modify_for(self, id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .fail_modify_for
            .push(id.to_string());
        self
    }

    /// Invoke a hook after every successful mutation
    pub fn with_after_action(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.after_action = Some(Box::new(hook));
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.state.lock().unwrap().queries.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn create_label_calls(&self) -> usize {
        self.state.lock().unwrap().create_label_calls
    }

    pub fn trashed(&self) -> Vec<String> {
        self.state.lock().unwrap().trashed.clone()
    }

    pub fn modifications(&self) -> Vec<Modification> {
        self.state.lock().unwrap().modifications.clone()
    }

    pub fn label_names(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .labels
            .iter()
            .map(|l| l.name.clone())
            .collect()
    }

    fn fire_after_action(&self) {
        if let Some(hook) = &self.after_action {
            hook();
        }
    }
}

#[async_trait]
impl MailProvider for FakeProvider {
    async fn list_messages(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<MessagePage> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if page_token.is_none() {
            state.queries.push(query.to_string());
        }

        if state
            .fail_listing_for
            .iter()
            .any(|fragment| query.contains(fragment.as_str()))
        {
            return Err(SweepError::ApiError("injected listing failure".to_string()));
        }

        let start: usize = page_token
            .as_deref()
            .map(|t| t.parse().expect("fake page tokens are offsets"))
            .unwrap_or(0);
        let end = (start + page_size as usize).min(state.mailbox.len());

        let ids = state.mailbox[start..end]
            .iter()
            .map(|m| m.id.clone())
            .collect();
        let next_page_token = if end < state.mailbox.len() {
            Some(end.to_string())
        } else {
            None
        };

        Ok(MessagePage {
            ids,
            next_page_token,
        })
    }

    async fn get_message(&self, id: &str) -> Result<EmailMessage> {
        let state = self.state.lock().unwrap();
        state
            .mailbox
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| SweepError::MessageNotFound(id.to_string()))
    }

    async fn trash_message(&self, id: &str) -> Result<()> {
        self.state.lock().unwrap().trashed.push(id.to_string());
        self.fire_after_action();
        Ok(())
    }

    async fn delete_message(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.mailbox.retain(|m| m.id != id);
        drop(state);
        self.fire_after_action();
        Ok(())
    }

    async fn modify_message(
        &self,
        id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if state.fail_modify_for.iter().any(|f| f == id) {
                return Err(SweepError::ApiError("injected modify failure".to_string()));
            }

            state
                .modifications
                .push((id.to_string(), add_label_ids.to_vec(), remove_label_ids.to_vec()));

            if let Some(message) = state.mailbox.iter_mut().find(|m| m.id == id) {
                for label in add_label_ids {
                    if !message.labels.contains(label) {
                        message.labels.push(label.clone());
                    }
                }
                message.labels.retain(|l| !remove_label_ids.contains(l));
            }
        }
        self.fire_after_action();
        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        Ok(self.state.lock().unwrap().labels.clone())
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.create_label_calls += 1;
        state.next_label_id += 1;
        let id = format!("Label_{}", state.next_label_id);
        state.labels.push(LabelInfo {
            id: id.clone(),
            name: name.to_string(),
        });
        Ok(id)
    }

    async fn profile(&self) -> Result<String> {
        Ok("fake@example.com".to_string())
    }
}
