//! Operator-facing entry points
//!
//! [`InboxAgent`] ties the transport, configuration and rule file together and
//! exposes each workflow as one async call with serializable inputs and
//! outputs. The CLI is a thin layer over it.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::classifier::{EmailClassifier, SPAM_LABEL_ID};
use crate::client::{GmailClient, LabelInfo};
use crate::config::Config;
use crate::error::Result;
use crate::label_directory::LabelDirectory;
use crate::rules::{RuleLoader, RuleSet};
use crate::sorter::{self, ApplySummary, Plan, Sorter};
use crate::spam::{self, PurgeReport, PurgeRequest};

enum RuleSource {
    File(Mutex<RuleLoader>),
    Fixed(RuleSet),
}

pub struct InboxAgent {
    client: Arc<dyn GmailClient>,
    config: Config,
    rules: RuleSource,
}

impl InboxAgent {
    /// Rules are read from `config.rules.path` on each sort call; unchanged
    /// files are served from cache
    pub fn new(client: Arc<dyn GmailClient>, config: Config) -> Self {
        Self {
            client,
            config,
            rules: RuleSource::File(Mutex::new(RuleLoader::default())),
        }
    }

    /// Use `rules` instead of reading the rule file
    pub fn with_rules(client: Arc<dyn GmailClient>, config: Config, rules: RuleSet) -> Self {
        Self {
            client,
            config,
            rules: RuleSource::Fixed(rules),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn rules_path(&self) -> Option<PathBuf> {
        match &self.rules {
            RuleSource::File(_) => Some(self.config.rules.path.clone()),
            RuleSource::Fixed(_) => None,
        }
    }

    fn classifier(&self) -> Result<EmailClassifier> {
        let rules = match &self.rules {
            RuleSource::Fixed(rules) => rules.clone(),
            RuleSource::File(loader) => {
                let mut loader = loader.lock().unwrap_or_else(|e| e.into_inner());
                loader.load(&self.config.rules.path)?
            }
        };
        Ok(EmailClassifier::new(rules))
    }

    /// Fetch up to `limit` messages (optionally under one label id) and
    /// propose labels for them. Nothing is modified.
    pub async fn plan_sort(&self, label_filter: Option<&str>, limit: Option<usize>) -> Result<Plan> {
        let span = info_span!("plan_sort", run_id = %Uuid::new_v4());
        async {
            let classifier = self.classifier()?;
            let label_ids: Vec<String> = label_filter.map(str::to_string).into_iter().collect();
            let limit = limit.unwrap_or(self.config.sort.limit);

            info!("Fetching up to {} messages (label: {:?})", limit, label_filter);
            let messages = self.client.list_messages(&label_ids, "", limit).await?;

            Ok(sorter::plan(&classifier, &messages))
        }
        .instrument(span)
        .await
    }

    /// Apply a plan produced by [`InboxAgent::plan_sort`]
    pub async fn apply_sort(&self, plan: &Plan, dry_run: bool) -> Result<ApplySummary> {
        let span = info_span!("apply_sort", run_id = %Uuid::new_v4());
        Sorter::new(self.client.as_ref())
            .apply(plan, dry_run)
            .instrument(span)
            .await
    }

    /// Plan and apply in one step over freshly fetched messages
    pub async fn sort(
        &self,
        label_filter: Option<&str>,
        limit: Option<usize>,
        dry_run: bool,
    ) -> Result<ApplySummary> {
        let plan = self.plan_sort(label_filter, limit).await?;
        self.apply_sort(&plan, dry_run).await
    }

    /// Fetch up to `limit` messages from the spam label and purge them
    pub async fn purge_spam(
        &self,
        limit: Option<usize>,
        request: &PurgeRequest,
    ) -> Result<PurgeReport> {
        let span = info_span!("purge_spam", run_id = %Uuid::new_v4(), mode = %request.mode);
        async {
            // Refuse before fetching anything
            if !request.dry_run {
                request.check()?;
            }

            let limit = limit.unwrap_or(self.config.spam.limit);
            let label_ids = vec![SPAM_LABEL_ID.to_string()];
            let messages = self.client.list_messages(&label_ids, "", limit).await?;
            info!("Found {} spam messages", messages.len());

            spam::purge(self.client.as_ref(), &messages, request).await
        }
        .instrument(span)
        .await
    }

    /// Every label in the account, sorted by name
    pub async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        let directory = LabelDirectory::load(self.client.as_ref()).await?;
        Ok(directory.list())
    }

    /// Make sure every label in `labels.defaults` exists, returning each with its id
    pub async fn ensure_default_labels(&self) -> Result<Vec<LabelInfo>> {
        let mut directory = LabelDirectory::new(self.client.as_ref());
        let mut ensured = Vec::with_capacity(self.config.labels.defaults.len());

        for name in &self.config.labels.defaults {
            let id = directory.resolve_or_create(name).await?;
            ensured.push(LabelInfo::new(id, name.clone()));
        }

        info!(
            "Ensured {} labels ({} created)",
            ensured.len(),
            directory.created_labels().len()
        );
        Ok(ensured)
    }
}
