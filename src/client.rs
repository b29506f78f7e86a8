//! Mail provider boundary and the Gmail API implementation
//!
//! Everything the engine needs from the remote mailbox goes through the
//! [`MailProvider`] trait: search/list, hydration, mutation, and label
//! management. The production implementation talks to the Gmail REST
//! API via google-gmail1 and retries transient failures with
//! exponential backoff.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use google_gmail1::{
    api::{Label, Message, MessagePart, ModifyMessageRequest},
    hyper_rustls, hyper_util, Gmail,
};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Result, SweepError};
use crate::models::EmailMessage;

/// Characters of decoded plain-text body kept on a hydrated message
const BODY_PREVIEW_MAX: usize = 1000;

/// One page of search results: lightweight ids plus continuation token
#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Label info returned from the provider
#[derive(Debug, Clone)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}

/// Trait defining mail provider operations for easier testing
///
/// All operations are remote calls subject to transient failure; the
/// caller is responsible for pacing them through the rate limiter.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// List one page of message ids matching a query
    async fn list_messages(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<MessagePage>;

    /// Hydrate a full message snapshot by id
    async fn get_message(&self, id: &str) -> Result<EmailMessage>;

    /// Move a message to trash (recoverable)
    async fn trash_message(&self, id: &str) -> Result<()>;

    /// Permanently delete a message
    async fn delete_message(&self, id: &str) -> Result<()>;

    /// Add and/or remove labels on a message
    async fn modify_message(
        &self,
        id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()>;

    /// List all labels in the account
    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Create a new visible label, returning its id
    async fn create_label(&self, name: &str) -> Result<String>;

    /// Connection test: the authenticated account's email address
    async fn profile(&self) -> Result<String>;
}

/// Type alias for the hyper connector google-gmail1 is built over
pub type GmailConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;

/// Production Gmail provider with retry logic for transient errors
pub struct GmailMailProvider {
    hub: Gmail<GmailConnector>,
}

impl GmailMailProvider {
    pub fn new(hub: Gmail<GmailConnector>) -> Self {
        Self { hub }
    }

    /// Execute an async operation with exponential backoff retry
    async fn with_retry<T, F, Fut>(
        operation_name: &str,
        max_retries: u32,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut delay = Duration::from_secs(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() && attempts <= max_retries => {
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name,
                        attempts,
                        max_retries + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, Duration::from_secs(30));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl MailProvider for GmailMailProvider {
    async fn list_messages(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<MessagePage> {
        let mut call = self
            .hub
            .users()
            .messages_list("me")
            .q(query)
            .max_results(page_size);

        if let Some(token) = page_token.as_deref() {
            call = call.page_token(token);
        }

        let (_, response) = call
            .add_scope("https://www.googleapis.com/auth/gmail.modify")
            .doit()
            .await?;

        let ids = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.id)
            .collect();

        Ok(MessagePage {
            ids,
            next_page_token: response.next_page_token,
        })
    }

    async fn get_message(&self, id: &str) -> Result<EmailMessage> {
        let id = id.to_string();
        Self::with_retry("get_message", 3, || async {
            let (_, msg) = self
                .hub
                .users()
                .messages_get("me", &id)
                .format("full")
                .add_scope("https://www.googleapis.com/auth/gmail.modify")
                .doit()
                .await?;

            parse_email_message(msg)
        })
        .await
    }

    async fn trash_message(&self, id: &str) -> Result<()> {
        self.hub
            .users()
            .messages_trash("me", id)
            .add_scope("https://www.googleapis.com/auth/gmail.modify")
            .doit()
            .await?;

        Ok(())
    }

    async fn delete_message(&self, id: &str) -> Result<()> {
        self.hub
            .users()
            .messages_delete("me", id)
            .add_scope("https://mail.google.com/")
            .doit()
            .await?;

        Ok(())
    }

    async fn modify_message(
        &self,
        id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()> {
        let request = ModifyMessageRequest {
            add_label_ids: if add_label_ids.is_empty() {
                None
            } else {
                Some(add_label_ids.to_vec())
            },
            remove_label_ids: if remove_label_ids.is_empty() {
                None
            } else {
                Some(remove_label_ids.to_vec())
            },
        };

        self.hub
            .users()
            .messages_modify(request, "me", id)
            .add_scope("https://www.googleapis.com/auth/gmail.modify")
            .doit()
            .await?;

        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        Self::with_retry("list_labels", 3, || async {
            let (_, response) = self
                .hub
                .users()
                .labels_list("me")
                .add_scope("https://www.googleapis.com/auth/gmail.labels")
                .doit()
                .await?;

            let labels: Vec<LabelInfo> = response
                .labels
                .unwrap_or_default()
                .into_iter()
                .filter_map(|label| match (label.id, label.name) {
                    (Some(id), Some(name)) => Some(LabelInfo { id, name }),
                    _ => None,
                })
                .collect();

            debug!("Listed {} labels", labels.len());
            Ok(labels)
        })
        .await
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        let name = name.to_string();
        Self::with_retry("create_label", 3, || async {
            let label = Label {
                name: Some(name.clone()),
                message_list_visibility: Some("show".to_string()),
                label_list_visibility: Some("labelShow".to_string()),
                ..Default::default()
            };

            let (_, created) = self
                .hub
                .users()
                .labels_create(label, "me")
                .add_scope("https://www.googleapis.com/auth/gmail.labels")
                .doit()
                .await?;

            created
                .id
                .ok_or_else(|| SweepError::LabelError("Created label has no ID".to_string()))
        })
        .await
    }

    async fn profile(&self) -> Result<String> {
        let (_, profile) = self
            .hub
            .users()
            .get_profile("me")
            .add_scope("https://www.googleapis.com/auth/gmail.modify")
            .doit()
            .await?;

        Ok(profile.email_address.unwrap_or_default())
    }
}

/// Parse a full-format Gmail API message into our snapshot structure
fn parse_email_message(msg: Message) -> Result<EmailMessage> {
    let id = msg
        .id
        .ok_or_else(|| SweepError::InvalidMessageFormat("Missing message ID".to_string()))?;

    let thread_id = msg
        .thread_id
        .ok_or_else(|| SweepError::InvalidMessageFormat("Missing thread ID".to_string()))?;

    let labels = msg.label_ids.unwrap_or_default();
    let snippet = msg.snippet.unwrap_or_default();

    let mut subject = String::new();
    let mut sender = String::new();
    let mut recipient = String::new();
    let mut date_str = String::new();

    if let Some(headers) = msg.payload.as_ref().and_then(|p| p.headers.as_ref()) {
        for header in headers {
            if let (Some(name), Some(value)) = (&header.name, &header.value) {
                match name.to_lowercase().as_str() {
                    "subject" => subject = value.clone(),
                    "from" => sender = value.clone(),
                    "to" => recipient = value.clone(),
                    "date" => date_str = value.clone(),
                    _ => {}
                }
            }
        }
    }

    let date = parse_date(&date_str).unwrap_or_else(|| {
        debug!("Unparseable date header {:?}, defaulting to now", date_str);
        Utc::now()
    });

    let body_preview = msg
        .payload
        .as_ref()
        .map(decode_body_preview)
        .unwrap_or_default();

    Ok(EmailMessage {
        id,
        thread_id,
        subject,
        sender,
        recipient,
        date,
        snippet,
        labels,
        body_preview,
    })
}

/// Parse an RFC 2822 date header, falling back to RFC 3339
fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(date_str)
        .or_else(|_| DateTime::parse_from_rfc3339(date_str))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Extract a plain-text preview from a message payload
///
/// A single-part message carries its data directly on the root part.
/// For multipart messages, a depth-first walk over the part tree finds
/// the first text/plain leaf with decodable content; nested multiparts
/// (e.g. multipart/alternative inside multipart/mixed) are descended
/// in order.
fn decode_body_preview(payload: &MessagePart) -> String {
    let text = direct_text(payload).or_else(|| {
        let mut stack: Vec<&MessagePart> = match &payload.parts {
            Some(parts) => parts.iter().rev().collect(),
            None => return None,
        };

        while let Some(part) = stack.pop() {
            if part.mime_type.as_deref() == Some("text/plain") {
                if let Some(text) = direct_text(part) {
                    return Some(text);
                }
            }
            if let Some(children) = &part.parts {
                for child in children.iter().rev() {
                    stack.push(child);
                }
            }
        }

        None
    });

    match text {
        Some(text) => text.chars().take(BODY_PREVIEW_MAX).collect(),
        None => String::new(),
    }
}

/// Decoded body bytes of a part, if it carries any
fn direct_text(part: &MessagePart) -> Option<String> {
    part.body
        .as_ref()
        .and_then(|b| b.data.as_ref())
        .filter(|data| !data.is_empty())
        .map(|data| String::from_utf8_lossy(data).into_owned())
}
