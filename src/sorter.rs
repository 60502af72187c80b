//! Plan/apply engine for rule-based label sorting
//!
//! Sorting is split in two phases. [`plan`] is pure: it classifies a
//! batch and records which labels each message would receive. [`Sorter::apply`]
//! takes a plan (possibly produced by an earlier run and read back from disk)
//! and either reports what it would do or performs the label mutations.
//!
//! Labelling is additive. Labels a message already carries are never removed.

use crate::classifier::{is_spam, EmailClassifier};
use crate::client::GmailClient;
use crate::error::Result;
use crate::label_directory::LabelDirectory;
use crate::models::Message;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Labels proposed for a single message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub message_id: String,
    pub proposed_labels: Vec<String>,
}

/// Ordered list of proposals; serializes as a bare JSON array
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan {
    entries: Vec<PlanEntry>,
}

impl Plan {
    pub fn new(entries: Vec<PlanEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every distinct label name the plan refers to
    pub fn label_names(&self) -> BTreeSet<&str> {
        self.entries
            .iter()
            .flat_map(|entry| entry.proposed_labels.iter().map(String::as_str))
            .collect()
    }
}

impl FromIterator<PlanEntry> for Plan {
    fn from_iter<I: IntoIterator<Item = PlanEntry>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// A mutation that a dry run would have issued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedMutation {
    pub message_id: String,
    pub label_names: Vec<String>,
    /// Ids of the names that already exist; names still to be created are absent
    pub label_ids: Vec<String>,
}

/// Outcome of applying a plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplySummary {
    /// Messages the transport reported as modified
    pub changed: usize,
    /// Number of plan entries
    pub total: usize,
    pub dry_run: bool,
    /// Names of labels created during this run
    #[serde(default)]
    pub labels_created: Vec<String>,
    /// Names a real run would have to create (dry run only)
    #[serde(default)]
    pub labels_to_create: Vec<String>,
    #[serde(default)]
    pub would_apply: Vec<PlannedMutation>,
    /// `"id: reason"` for each failed mutation or label creation
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ApplySummary {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Classify `messages` in order. Spam is skipped and messages without a
/// proposal produce no entry. No transport calls are made.
pub fn plan(classifier: &EmailClassifier, messages: &[Message]) -> Plan {
    let plan: Plan = messages
        .iter()
        .filter(|message| {
            let spam = is_spam(message);
            if spam {
                debug!("Skipping spam message {}", message.id);
            }
            !spam
        })
        .filter_map(|message| {
            let proposed = classifier.categorize(message);
            if proposed.is_empty() {
                return None;
            }
            debug!("Message {} -> {:?}", message.id, proposed);
            Some(PlanEntry {
                message_id: message.id.clone(),
                proposed_labels: proposed,
            })
        })
        .collect();

    info!(
        "Planned labels for {} of {} messages",
        plan.len(),
        messages.len()
    );
    plan
}

/// Applies plans through a [`GmailClient`]
pub struct Sorter<'a> {
    client: &'a dyn GmailClient,
}

impl<'a> Sorter<'a> {
    pub fn new(client: &'a dyn GmailClient) -> Self {
        Self { client }
    }

    /// Execute `plan`, or describe it when `dry_run` is set.
    ///
    /// Label names missing from the account are created before any message is
    /// touched. A failed creation is recorded and the name is dropped from the
    /// mutations that would have used it. Per-message failures are recorded
    /// and the batch carries on. Only a failure to read the label list aborts.
    pub async fn apply(&self, plan: &Plan, dry_run: bool) -> Result<ApplySummary> {
        let mut summary = ApplySummary {
            total: plan.len(),
            dry_run,
            ..Default::default()
        };

        info!("Applying plan with {} entries (dry_run: {})", plan.len(), dry_run);

        let mut directory = LabelDirectory::load(self.client).await?;
        let missing =
            directory.missing(plan.entries().iter().flat_map(|entry| &entry.proposed_labels));

        if dry_run {
            summary.labels_to_create = missing;
            summary.would_apply = plan
                .entries()
                .iter()
                .map(|entry| PlannedMutation {
                    message_id: entry.message_id.clone(),
                    label_names: entry.proposed_labels.clone(),
                    label_ids: directory.resolve_all(&entry.proposed_labels),
                })
                .collect();

            info!(
                "Dry-run complete: {} messages, {} labels to create",
                summary.would_apply.len(),
                summary.labels_to_create.len()
            );
            return Ok(summary);
        }

        if !missing.is_empty() {
            for name in &missing {
                match directory.resolve_or_create(name).await {
                    Ok(_) => summary.labels_created.push(name.clone()),
                    Err(e) => {
                        warn!("Label '{}': {}", name, e);
                        summary.errors.push(format!("{}: {}", name, e));
                    }
                }
            }
            directory.refresh().await?;
        }

        for entry in plan.entries() {
            let add_ids = directory.resolve_all(&entry.proposed_labels);
            if add_ids.is_empty() {
                warn!(
                    "No resolvable labels for message {}, skipping",
                    entry.message_id
                );
                continue;
            }

            match self
                .client
                .modify_labels(&entry.message_id, &add_ids, &[])
                .await
            {
                Ok(true) => {
                    debug!("Labelled {} with {:?}", entry.message_id, add_ids);
                    summary.changed += 1;
                }
                Ok(false) => debug!("Message {} was not modified", entry.message_id),
                Err(e) => {
                    warn!("Message {}: {}", entry.message_id, e);
                    summary.errors.push(format!("{}: {}", entry.message_id, e));
                }
            }
        }

        info!(
            "Apply complete: {}/{} messages changed, {} errors",
            summary.changed,
            summary.total,
            summary.errors.len()
        );
        Ok(summary)
    }
}
