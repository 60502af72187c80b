//! Spam purge with a two-step safety gate
//!
//! Purging is dry-run unless the caller opts out. Permanent deletion needs a
//! second, separate confirmation; without it the request is refused before
//! any message is touched.

use crate::auth::{FULL_ACCESS_SCOPE, MODIFY_SCOPE};
use crate::classifier::is_spam;
use crate::client::GmailClient;
use crate::error::{GmailError, Result};
use crate::models::Message;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// What happens to a purged message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PurgeMode {
    /// Move to trash (recoverable for 30 days)
    #[default]
    Trash,
    /// Delete permanently
    Delete,
}

impl fmt::Display for PurgeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PurgeMode::Trash => write!(f, "trash"),
            PurgeMode::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PurgeRequest {
    pub mode: PurgeMode,
    pub dry_run: bool,
    /// Second confirmation, required for `PurgeMode::Delete`
    pub confirm_permanent: bool,
}

impl Default for PurgeRequest {
    fn default() -> Self {
        Self {
            mode: PurgeMode::Trash,
            dry_run: true,
            confirm_permanent: false,
        }
    }
}

impl PurgeRequest {
    /// Refuse a permanent delete that lacks its confirmation
    pub fn check(&self) -> Result<()> {
        if self.mode == PurgeMode::Delete && !self.dry_run && !self.confirm_permanent {
            return Err(GmailError::SafetyGate(
                "permanently delete messages".to_string(),
            ));
        }
        Ok(())
    }

    /// OAuth scopes the transport needs to carry out this request
    pub fn required_scopes(&self) -> Vec<&'static str> {
        let mut scopes = vec![MODIFY_SCOPE];
        if self.mode == PurgeMode::Delete && !self.dry_run && self.confirm_permanent {
            scopes.push(FULL_ACCESS_SCOPE);
        }
        scopes
    }
}

/// Result of a purge; the variant tells which mode ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PurgeReport {
    DryRun {
        would_remove: Vec<String>,
    },
    Trashed {
        trashed: Vec<String>,
        errors: Vec<String>,
    },
    Deleted {
        deleted: Vec<String>,
        errors: Vec<String>,
    },
}

impl PurgeReport {
    /// Ids removed, or that would have been removed in a dry run
    pub fn removed(&self) -> &[String] {
        match self {
            PurgeReport::DryRun { would_remove } => would_remove,
            PurgeReport::Trashed { trashed, .. } => trashed,
            PurgeReport::Deleted { deleted, .. } => deleted,
        }
    }

    pub fn errors(&self) -> &[String] {
        match self {
            PurgeReport::DryRun { .. } => &[],
            PurgeReport::Trashed { errors, .. } | PurgeReport::Deleted { errors, .. } => errors,
        }
    }
}

/// Trash or delete every spam message in `messages`.
///
/// Messages that do not carry the spam label are ignored. The safety gate is
/// checked before the first transport call, so a refused request mutates
/// nothing. Individual failures are collected as `"id: reason"`.
pub async fn purge(
    client: &dyn GmailClient,
    messages: &[Message],
    request: &PurgeRequest,
) -> Result<PurgeReport> {
    let targets: Vec<&str> = messages
        .iter()
        .filter(|message| is_spam(message))
        .map(|message| message.id.as_str())
        .collect();

    if targets.len() < messages.len() {
        debug!(
            "Ignoring {} messages without the spam label",
            messages.len() - targets.len()
        );
    }

    if request.dry_run {
        info!("Dry-run: would {} {} spam messages", request.mode, targets.len());
        return Ok(PurgeReport::DryRun {
            would_remove: targets.into_iter().map(str::to_string).collect(),
        });
    }

    request.check()?;

    info!("Purging {} spam messages (mode: {})", targets.len(), request.mode);

    let mut removed = Vec::new();
    let mut errors = Vec::new();

    for id in targets {
        let result = match request.mode {
            PurgeMode::Trash => client.trash_message(id).await,
            PurgeMode::Delete => client.delete_message(id).await,
        };

        match result {
            Ok(()) => {
                debug!("Removed spam message {}", id);
                removed.push(id.to_string());
            }
            Err(e) => {
                warn!("Message {}: {}", id, e);
                errors.push(format!("{}: {}", id, e));
            }
        }
    }

    info!(
        "Purge complete: {} removed, {} errors",
        removed.len(),
        errors.len()
    );

    Ok(match request.mode {
        PurgeMode::Trash => PurgeReport::Trashed {
            trashed: removed,
            errors,
        },
        PurgeMode::Delete => PurgeReport::Deleted {
            deleted: removed,
            errors,
        },
    })
}
