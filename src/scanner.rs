//! Paged retrieval and hydration of candidate messages
//!
//! Search results come back from the provider as lightweight id pages
//! behind a continuation token; every id is hydrated into a full
//! message snapshot with a second call. Both call kinds are paced
//! through the shared rate limiter.

use async_stream::stream;
use futures::stream::{Stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::client::MailProvider;
use crate::error::Result;
use crate::models::EmailMessage;
use crate::query;
use crate::rate_limiter::ApiRateLimiter;

/// Provider page size ceiling for id listing
pub const PAGE_SIZE: u32 = 100;

/// Progress callback invoked with the running hydrated-message count
pub type ProgressCallback = Arc<dyn Fn(usize) + Send + Sync>;

/// Drives multi-page search against the provider
pub struct SearchPaginator<'a> {
    provider: &'a dyn MailProvider,
    limiter: &'a ApiRateLimiter,
}

impl<'a> SearchPaginator<'a> {
    pub fn new(provider: &'a dyn MailProvider, limiter: &'a ApiRateLimiter) -> Self {
        Self { provider, limiter }
    }

    /// Lazily yield hydrated messages matching `query`, up to
    /// `max_results`
    ///
    /// `older_than_days` appends a `before:` token to the query; pass
    /// None when the query already carries one. A listing failure is
    /// yielded as the final Err item and ends the stream; a failed
    /// hydration of a single message is logged and the message simply
    /// omitted. The sequence is finite and non-restartable.
    pub fn stream(
        &self,
        query: String,
        max_results: usize,
        older_than_days: Option<u32>,
        on_progress: Option<ProgressCallback>,
    ) -> impl Stream<Item = Result<EmailMessage>> + '_ {
        stream! {
            let query = match older_than_days {
                Some(days) if days > 0 => {
                    format!("{} {}", query, query::before_token(days)).trim().to_string()
                }
                _ => query,
            };

            debug!("Searching provider with query: {}", query);

            let mut fetched = 0usize;
            let mut page_token: Option<String> = None;

            loop {
                if fetched >= max_results {
                    break;
                }

                let page_size = PAGE_SIZE.min((max_results - fetched) as u32);

                self.limiter.throttle().await;
                let page = match self
                    .provider
                    .list_messages(&query, page_size, page_token.take())
                    .await
                {
                    Ok(page) => page,
                    Err(e) => {
                        // Listing failures abort the whole search; the
                        // caller treats this as a rule-level failure.
                        yield Err(e);
                        return;
                    }
                };

                for id in page.ids {
                    if fetched >= max_results {
                        return;
                    }

                    self.limiter.throttle().await;
                    match self.provider.get_message(&id).await {
                        Ok(message) => {
                            fetched += 1;
                            if let Some(cb) = &on_progress {
                                cb(fetched);
                            }
                            yield Ok(message);
                        }
                        Err(e) => {
                            warn!("Skipping message {}: hydration failed: {}", id, e);
                        }
                    }
                }

                page_token = page.next_page_token;
                if page_token.is_none() {
                    break;
                }
            }
        }
    }

    /// Collect the full result set for a query
    ///
    /// Returns Err if the listing fails at any page; partial results
    /// are discarded in that case.
    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        older_than_days: Option<u32>,
        on_progress: Option<ProgressCallback>,
    ) -> Result<Vec<EmailMessage>> {
        let stream = self.stream(query.to_string(), max_results, older_than_days, on_progress);
        futures::pin_mut!(stream);

        let mut messages = Vec::new();
        while let Some(item) = stream.next().await {
            messages.push(item?);
        }

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MessagePage, MockMailProvider};
    use crate::error::SweepError;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn message(id: &str) -> EmailMessage {
        EmailMessage {
            id: id.to_string(),
            thread_id: format!("thread-{}", id),
            subject: "subject".to_string(),
            sender: "sender@example.com".to_string(),
            recipient: "me@example.com".to_string(),
            date: Utc::now(),
            snippet: String::new(),
            labels: vec![],
            body_preview: String::new(),
        }
    }

    fn ids(prefix: &str, count: usize) -> Vec<String> {
        (0..count).map(|i| format!("{}-{}", prefix, i)).collect()
    }

    fn limiter() -> ApiRateLimiter {
        ApiRateLimiter::with_interval(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_pagination_stops_at_max_results() {
        let mut provider = MockMailProvider::new();

        // Page 1: full page of 100 with a continuation token.
        // Page 2: the remaining 50 requested, token still present.
        provider
            .expect_list_messages()
            .times(2)
            .returning(|_query, page_size, token| {
                if token.is_none() {
                    assert_eq!(page_size, 100);
                    Ok(MessagePage {
                        ids: ids("a", 100),
                        next_page_token: Some("page2".to_string()),
                    })
                } else {
                    assert_eq!(page_size, 50);
                    Ok(MessagePage {
                        ids: ids("b", 50),
                        next_page_token: Some("page3".to_string()),
                    })
                }
            });
        provider
            .expect_get_message()
            .times(150)
            .returning(|id| Ok(message(id)));

        let limiter = limiter();
        let paginator = SearchPaginator::new(&provider, &limiter);
        let messages = paginator.search("subject:x", 150, None, None).await.unwrap();

        // Exactly 150 back, and the times(2) expectation proves no
        // third list call was issued despite the leftover token.
        assert_eq!(messages.len(), 150);
    }

    #[tokio::test]
    async fn test_stops_mid_page() {
        let mut provider = MockMailProvider::new();

        provider.expect_list_messages().times(1).returning(|_, _, _| {
            Ok(MessagePage {
                ids: ids("a", 10),
                next_page_token: None,
            })
        });
        // Only 5 of the 10 listed ids should be hydrated
        provider
            .expect_get_message()
            .times(5)
            .returning(|id| Ok(message(id)));

        let limiter = limiter();
        let paginator = SearchPaginator::new(&provider, &limiter);
        let messages = paginator.search("q", 5, None, None).await.unwrap();

        assert_eq!(messages.len(), 5);
    }

    #[tokio::test]
    async fn test_short_provider_ends_early() {
        let mut provider = MockMailProvider::new();

        provider.expect_list_messages().times(1).returning(|_, _, _| {
            Ok(MessagePage {
                ids: ids("a", 7),
                next_page_token: None,
            })
        });
        provider
            .expect_get_message()
            .times(7)
            .returning(|id| Ok(message(id)));

        let limiter = limiter();
        let paginator = SearchPaginator::new(&provider, &limiter);
        let messages = paginator.search("q", 500, None, None).await.unwrap();

        assert_eq!(messages.len(), 7);
    }

    #[tokio::test]
    async fn test_listing_error_aborts_search() {
        let mut provider = MockMailProvider::new();

        provider
            .expect_list_messages()
            .times(1)
            .returning(|_, _, _| Err(SweepError::ApiError("boom".to_string())));

        let limiter = limiter();
        let paginator = SearchPaginator::new(&provider, &limiter);
        let result = paginator.search("q", 10, None, None).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_hydration_failure_skips_message() {
        let mut provider = MockMailProvider::new();

        provider.expect_list_messages().times(1).returning(|_, _, _| {
            Ok(MessagePage {
                ids: ids("a", 3),
                next_page_token: None,
            })
        });
        provider.expect_get_message().times(3).returning(|id| {
            if id == "a-1" {
                Err(SweepError::MessageNotFound(id.to_string()))
            } else {
                Ok(message(id))
            }
        });

        let limiter = limiter();
        let paginator = SearchPaginator::new(&provider, &limiter);
        let messages = paginator.search("q", 10, None, None).await.unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "a-0");
        assert_eq!(messages[1].id, "a-2");
    }

    #[tokio::test]
    async fn test_age_token_appended_to_query() {
        let mut provider = MockMailProvider::new();

        provider
            .expect_list_messages()
            .times(1)
            .withf(|query, _, _| query.starts_with("subject:x before:"))
            .returning(|_, _, _| Ok(MessagePage::default()));

        let limiter = limiter();
        let paginator = SearchPaginator::new(&provider, &limiter);
        let messages = paginator.search("subject:x", 10, Some(30), None).await.unwrap();

        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_progress_callback_sees_running_count() {
        let mut provider = MockMailProvider::new();

        provider.expect_list_messages().times(1).returning(|_, _, _| {
            Ok(MessagePage {
                ids: ids("a", 4),
                next_page_token: None,
            })
        });
        provider
            .expect_get_message()
            .times(4)
            .returning(|id| Ok(message(id)));

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_cb = Arc::clone(&seen);
        let on_progress: ProgressCallback = Arc::new(move |count| {
            seen_cb.store(count, Ordering::SeqCst);
        });

        let limiter = limiter();
        let paginator = SearchPaginator::new(&provider, &limiter);
        let messages = paginator
            .search("q", 10, None, Some(on_progress))
            .await
            .unwrap();

        assert_eq!(messages.len(), 4);
        assert_eq!(seen.load(Ordering::SeqCst), 4);
    }
}
