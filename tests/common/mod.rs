//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use inbox_agent::client::{GmailClient, LabelInfo};
use inbox_agent::error::{GmailError, Result};
use inbox_agent::models::{Header, Message, MessagePart};
use mockall::mock;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Mutex;

/// Create a test message in the inbox with From and Subject headers
pub fn create_test_message(id: &str, sender: &str, subject: &str) -> Message {
    Message {
        id: id.to_string(),
        thread_id: format!("thread_{}", id),
        snippet: Some("Email snippet...".to_string()),
        label_ids: vec!["INBOX".to_string()],
        payload: Some(MessagePart {
            mime_type: Some("multipart/alternative".to_string()),
            headers: vec![Header::new("From", sender), Header::new("Subject", subject)],
            parts: Vec::new(),
        }),
        ..Default::default()
    }
}

/// Create a message sitting in Gmail's SPAM label
pub fn create_spam_message(id: &str, subject: &str) -> Message {
    let mut message = create_test_message(id, "winner@lottery.example", subject);
    message.label_ids = vec!["SPAM".to_string()];
    message
}

/// Gmail API JSON for a message fetched with format=metadata
pub fn mock_gmail_message_response(
    id: &str,
    thread_id: &str,
    from: &str,
    subject: &str,
) -> serde_json::Value {
    json!({
        "id": id,
        "threadId": thread_id,
        "labelIds": ["INBOX", "UNREAD"],
        "snippet": "Email snippet...",
        "payload": {
            "mimeType": "multipart/alternative",
            "headers": [
                {"name": "From", "value": from},
                {"name": "Subject", "value": subject},
                {"name": "Date", "value": "Mon, 1 Jan 2024 10:00:00 -0800"},
                {"name": "To", "value": "me@example.com"}
            ]
        },
        "internalDate": "1704124800000",
        "sizeEstimate": 1234
    })
}

pub fn create_test_label_info(id: &str, name: &str) -> LabelInfo {
    LabelInfo::new(id, name)
}

mock! {
    pub GmailClient {}

    #[async_trait]
    impl GmailClient for GmailClient {
        async fn list_messages(&self, label_ids: &[String], query: &str, limit: usize) -> Result<Vec<Message>>;
        async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
        async fn create_label(&self, name: &str) -> Result<String>;
        async fn modify_labels(&self, message_id: &str, add_label_ids: &[String], remove_label_ids: &[String]) -> Result<bool>;
        async fn trash_message(&self, message_id: &str) -> Result<()>;
        async fn delete_message(&self, message_id: &str) -> Result<()>;
    }
}

/// A transport call as seen by [`FakeGmailClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListMessages { label_ids: Vec<String>, limit: usize },
    ListLabels,
    CreateLabel(String),
    ModifyLabels { message_id: String, add: Vec<String> },
    Trash(String),
    Delete(String),
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::CreateLabel(_) | Call::ModifyLabels { .. } | Call::Trash(_) | Call::Delete(_)
        )
    }
}

#[derive(Default)]
struct FakeState {
    messages: Vec<Message>,
    labels: Vec<LabelInfo>,
    next_label_id: usize,
    failing: HashSet<String>,
    calls: Vec<Call>,
}

/// In-memory mailbox that records every call in order
#[derive(Default)]
pub struct FakeGmailClient {
    state: Mutex<FakeState>,
}

impl FakeGmailClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_labels(self, labels: &[(&str, &str)]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state
                .labels
                .extend(labels.iter().map(|(id, name)| LabelInfo::new(*id, *name)));
        }
        self
    }

    pub fn with_messages(self, messages: Vec<Message>) -> Self {
        self.state.lock().unwrap().messages.extend(messages);
        self
    }

    /// Make every call naming `key` (a message id or label name) fail
    pub fn fail_on(self, key: &str) -> Self {
        self.state.lock().unwrap().failing.insert(key.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutation_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn labels(&self) -> Vec<LabelInfo> {
        self.state.lock().unwrap().labels.clone()
    }

    pub fn message(&self, id: &str) -> Option<Message> {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn check(&self, key: &str) -> Result<()> {
        if self.state.lock().unwrap().failing.contains(key) {
            return Err(GmailError::ServerError {
                status: 500,
                message: format!("injected failure for {}", key),
            });
        }
        Ok(())
    }

    fn remove_message(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let before = state.messages.len();
        state.messages.retain(|m| m.id != id);
        if state.messages.len() == before {
            return Err(GmailError::MessageNotFound(id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl GmailClient for FakeGmailClient {
    async fn list_messages(
        &self,
        label_ids: &[String],
        _query: &str,
        limit: usize,
    ) -> Result<Vec<Message>> {
        self.record(Call::ListMessages {
            label_ids: label_ids.to_vec(),
            limit,
        });
        let state = self.state.lock().unwrap();
        Ok(state
            .messages
            .iter()
            .filter(|m| label_ids.iter().all(|l| m.label_ids.contains(l)))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        self.record(Call::ListLabels);
        Ok(self.labels())
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        self.record(Call::CreateLabel(name.to_string()));
        self.check(name)?;

        let mut state = self.state.lock().unwrap();
        state.next_label_id += 1;
        let id = format!("Label_{}", state.next_label_id);
        state.labels.push(LabelInfo::new(id.clone(), name));
        Ok(id)
    }

    async fn modify_labels(
        &self,
        message_id: &str,
        add_label_ids: &[String],
        _remove_label_ids: &[String],
    ) -> Result<bool> {
        self.record(Call::ModifyLabels {
            message_id: message_id.to_string(),
            add: add_label_ids.to_vec(),
        });
        self.check(message_id)?;

        let mut state = self.state.lock().unwrap();
        let message = state
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| GmailError::MessageNotFound(message_id.to_string()))?;
        for id in add_label_ids {
            if !message.label_ids.contains(id) {
                message.label_ids.push(id.clone());
            }
        }
        Ok(true)
    }

    async fn trash_message(&self, message_id: &str) -> Result<()> {
        self.record(Call::Trash(message_id.to_string()));
        self.check(message_id)?;
        self.remove_message(message_id)
    }

    async fn delete_message(&self, message_id: &str) -> Result<()> {
        self.record(Call::Delete(message_id.to_string()));
        self.check(message_id)?;
        self.remove_message(message_id)
    }
}
