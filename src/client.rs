//! Gmail API client with rate limiting and retry logic

use async_trait::async_trait;
use chrono::DateTime;
use futures::stream::{self, StreamExt, TryStreamExt};
use google_gmail1::api::{Label, Message as ApiMessage, MessagePart as ApiMessagePart, ModifyMessageRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::auth::{GmailHub, FULL_ACCESS_SCOPE, MODIFY_SCOPE};
use crate::error::{GmailError, Result};
use crate::models::{Header, Message, MessagePart};

/// Gmail caps `maxResults` for a single list page at 500
const MAX_PAGE_SIZE: u32 = 500;

/// Retries after the first attempt for a transient failure
const MAX_RETRIES: u32 = 3;

/// Upper bound on a single API round trip
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Label info returned from Gmail API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}

impl LabelInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// The mailbox operations the sorting and purge logic depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GmailClient: Send + Sync {
    /// List up to `limit` messages, optionally restricted to label ids and a
    /// search query (an empty query matches everything)
    async fn list_messages(
        &self,
        label_ids: &[String],
        query: &str,
        limit: usize,
    ) -> Result<Vec<Message>>;

    /// List all labels in the account
    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Create a new label, returning its id
    async fn create_label(&self, name: &str) -> Result<String>;

    /// Add and remove labels on one message; returns whether it was modified
    async fn modify_labels(
        &self,
        message_id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<bool>;

    /// Move a message to the trash
    async fn trash_message(&self, message_id: &str) -> Result<()>;

    /// Permanently delete a message
    async fn delete_message(&self, message_id: &str) -> Result<()>;
}

/// Production Gmail client with rate limiting and retry logic
///
/// This implementation includes:
/// - Semaphore-based rate limiting
/// - Exponential backoff retry logic
/// - Concurrent metadata fetching that preserves list order
pub struct ProductionGmailClient {
    hub: GmailHub,
    rate_limiter: Arc<Semaphore>,
    max_concurrent: usize,
}

impl ProductionGmailClient {
    /// Create a new production Gmail client
    ///
    /// # Arguments
    /// * `hub` - Gmail API hub instance
    /// * `max_concurrent` - Maximum concurrent requests
    pub fn new(hub: GmailHub, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            hub,
            rate_limiter: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Get the inner hub reference
    pub fn hub(&self) -> &GmailHub {
        &self.hub
    }

    async fn acquire_permit(&self) -> Result<tokio::sync::SemaphorePermit<'_>> {
        self.rate_limiter
            .acquire()
            .await
            .map_err(|e| GmailError::Unknown(format!("Failed to acquire rate limit permit: {}", e)))
    }

    /// Check if an error is retryable
    fn should_retry(error: &GmailError) -> bool {
        matches!(
            error,
            GmailError::ServerError { .. }
                | GmailError::RateLimitExceeded { .. }
                | GmailError::NetworkError(_)
        )
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
                Err(e) if Self::should_retry(&e) && attempts <= max_retries => {
                    let wait = match &e {
                        GmailError::RateLimitExceeded { retry_after } => {
                            delay.max(Duration::from_secs(*retry_after))
                        }
                        _ => delay,
                    };
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name,
                        attempts,
                        max_retries + 1,
                        e,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    delay = std::cmp::min(delay * 2, Duration::from_secs(30));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Bound a single API call so a stalled connection surfaces as a network error
    async fn with_timeout<T, Fut>(operation_name: &str, call: Fut) -> Result<T>
    where
        Fut: std::future::Future<Output = Result<T>>,
    {
        let timeout_duration = CALL_TIMEOUT;
        match tokio::time::timeout(timeout_duration, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Gmail API {} call timed out after {:?}", operation_name, timeout_duration);
                Err(GmailError::NetworkError(format!(
                    "API call timed out after {:?}",
                    timeout_duration
                )))
            }
        }
    }

    /// Run one API call under the per-call timeout, retrying transient failures
    async fn call<T, F, Fut>(operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        Self::with_retry(operation_name, MAX_RETRIES, || {
            Self::with_timeout(operation_name, operation())
        })
        .await
    }

    async fn list_message_ids(
        &self,
        label_ids: &[String],
        query: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let mut all_ids = Vec::new();
        let mut page_token: Option<String> = None;

        while all_ids.len() < limit {
            let remaining = (limit - all_ids.len()).min(MAX_PAGE_SIZE as usize) as u32;
            let token = page_token.clone();

            let response = Self::with_retry("list_messages", MAX_RETRIES, || {
                let token = token.clone();
                async move {
                    let mut call = self.hub.users().messages_list("me").max_results(remaining);
                    for label_id in label_ids {
                        call = call.add_label_ids(label_id);
                    }
                    if !query.is_empty() {
                        call = call.q(query);
                    }
                    if let Some(token) = token.as_ref() {
                        call = call.page_token(token);
                    }
                    let (_, response) = Self::with_timeout("list_messages", async {
                        call.add_scope(MODIFY_SCOPE).doit().await.map_err(GmailError::from)
                    })
                    .await?;
                    Ok(response)
                }
            })
            .await?;

            all_ids.extend(
                response
                    .messages
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|m| m.id),
            );

            page_token = response.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        all_ids.truncate(limit);
        Ok(all_ids)
    }

    /// Fetch one message's metadata (From/Subject headers, labels)
    async fn fetch_message(&self, id: &str) -> Result<Message> {
        let _permit = self.acquire_permit().await?;

        Self::with_retry("get_message", MAX_RETRIES, || async {
            let (_, msg) = Self::with_timeout("get_message", async {
                self.hub
                    .users()
                    .messages_get("me", id)
                    .format("metadata")
                    .add_metadata_headers("From")
                    .add_metadata_headers("Subject")
                    .add_scope(MODIFY_SCOPE)
                    .doit()
                    .await
                    .map_err(GmailError::from)
            })
            .await?;
            convert_message(msg)
        })
        .await
    }
}

/// Convert a Gmail API message into our snapshot type
fn convert_message(msg: ApiMessage) -> Result<Message> {
    let id = msg
        .id
        .ok_or_else(|| GmailError::InvalidMessageFormat("Missing message ID".to_string()))?;

    Ok(Message {
        id,
        thread_id: msg.thread_id.unwrap_or_default(),
        snippet: msg.snippet,
        internal_date: msg.internal_date.and_then(DateTime::from_timestamp_millis),
        label_ids: msg.label_ids.unwrap_or_default(),
        payload: msg.payload.map(convert_part),
    })
}

fn convert_part(part: ApiMessagePart) -> MessagePart {
    MessagePart {
        mime_type: part.mime_type,
        headers: part
            .headers
            .unwrap_or_default()
            .into_iter()
            .map(|h| Header {
                name: h.name.unwrap_or_default(),
                value: h.value.unwrap_or_default(),
            })
            .collect(),
        parts: part
            .parts
            .unwrap_or_default()
            .into_iter()
            .map(convert_part)
            .collect(),
    }
}

#[async_trait]
impl GmailClient for ProductionGmailClient {
    async fn list_messages(
        &self,
        label_ids: &[String],
        query: &str,
        limit: usize,
    ) -> Result<Vec<Message>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let ids = self.list_message_ids(label_ids, query, limit).await?;
        debug!("Listed {} message ids, fetching metadata", ids.len());

        // buffered (not buffer_unordered) keeps the listing order
        stream::iter(ids)
            .map(|id| async move { self.fetch_message(&id).await })
            .buffered(self.max_concurrent)
            .try_collect()
            .await
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        Self::with_retry("list_labels", MAX_RETRIES, || async {
            let (_, response) = Self::with_timeout("list_labels", async {
                debug!("Calling Gmail API to list labels...");
                self.hub
                    .users()
                    .labels_list("me")
                    .add_scope(MODIFY_SCOPE)
                    .doit()
                    .await
                    .map_err(GmailError::from)
            })
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

            debug!("Successfully parsed {} labels", labels.len());
            Ok(labels)
        })
        .await
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        Self::call("create_label", || async {
            let label = Label {
                name: Some(name.to_string()),
                message_list_visibility: Some("show".to_string()),
                label_list_visibility: Some("labelShow".to_string()),
                ..Default::default()
            };

            let (_, created_label) = self
                .hub
                .users()
                .labels_create(label, "me")
                .add_scope(MODIFY_SCOPE)
                .doit()
                .await?;

            created_label
                .id
                .ok_or_else(|| GmailError::LabelError("Created label has no ID".to_string()))
        })
        .await
    }

    async fn modify_labels(
        &self,
        message_id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<bool> {
        let add_labels = (!add_label_ids.is_empty()).then(|| add_label_ids.to_vec());
        let remove_labels = (!remove_label_ids.is_empty()).then(|| remove_label_ids.to_vec());

        Self::call("modify_labels", || async {
            let request = ModifyMessageRequest {
                add_label_ids: add_labels.clone(),
                remove_label_ids: remove_labels.clone(),
            };

            let (_, updated) = self
                .hub
                .users()
                .messages_modify(request, "me", message_id)
                .add_scope(MODIFY_SCOPE)
                .doit()
                .await?;

            Ok(updated.id.is_some())
        })
        .await
    }

    async fn trash_message(&self, message_id: &str) -> Result<()> {
        Self::call("trash_message", || async {
            self.hub
                .users()
                .messages_trash("me", message_id)
                .add_scope(MODIFY_SCOPE)
                .doit()
                .await?;
            Ok(())
        })
        .await
    }

    async fn delete_message(&self, message_id: &str) -> Result<()> {
        let mut attempt = 0;
        Self::call("delete_message", || {
            attempt += 1;
            let retried = attempt > 1;
            async move {
                // Permanent deletion is only granted to the full-access scope
                let result = self
                    .hub
                    .users()
                    .messages_delete("me", message_id)
                    .add_scope(FULL_ACCESS_SCOPE)
                    .doit()
                    .await
                    .map(|_| ())
                    .map_err(GmailError::from);
                settle_delete(result, retried)
            }
        })
        .await
    }
}

/// A 404 on a repeated delete means an earlier attempt went through
fn settle_delete(result: Result<()>, retried: bool) -> Result<()> {
    match result {
        Err(GmailError::MessageNotFound(_)) if retried => {
            debug!("Message already gone on delete retry");
            Ok(())
        }
        other => other,
    }
}

// Implement GmailClient for Arc<T> to allow shared ownership
#[async_trait]
impl<T: GmailClient + ?Sized> GmailClient for Arc<T> {
    async fn list_messages(
        &self,
        label_ids: &[String],
        query: &str,
        limit: usize,
    ) -> Result<Vec<Message>> {
        self.as_ref().list_messages(label_ids, query, limit).await
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        self.as_ref().list_labels().await
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        self.as_ref().create_label(name).await
    }

    async fn modify_labels(
        &self,
        message_id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<bool> {
        self.as_ref()
            .modify_labels(message_id, add_label_ids, remove_label_ids)
            .await
    }

    async fn trash_message(&self, message_id: &str) -> Result<()> {
        self.as_ref().trash_message(message_id).await
    }

    async fn delete_message(&self, message_id: &str) -> Result<()> {
        self.as_ref().delete_message(message_id).await
    }
}
