//! Name/id mapping of Gmail labels with on-demand creation
use crate::client::{GmailClient, LabelInfo};
use crate::error::{GmailError, Result};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// Snapshot of the account's labels, keyed both ways.
///
/// Names are compared exactly (case-sensitive). The snapshot can go stale
/// if another process creates labels; `refresh` re-reads it.
pub struct LabelDirectory<'a> {
    client: &'a dyn GmailClient,
    by_name: HashMap<String, String>, // name -> id
    by_id: HashMap<String, String>,   // id -> name
    created_labels: Vec<LabelInfo>,
}

impl<'a> LabelDirectory<'a> {
    /// An empty directory; call `refresh` to populate it
    pub fn new(client: &'a dyn GmailClient) -> Self {
        Self {
            client,
            by_name: HashMap::new(),
            by_id: HashMap::new(),
            created_labels: Vec::new(),
        }
    }

    /// Read the current remote labels into a new directory
    pub async fn load(client: &'a dyn GmailClient) -> Result<Self> {
        let mut directory = Self::new(client);
        directory.refresh().await?;
        Ok(directory)
    }

    /// Replace the snapshot with the labels as they are now.
    ///
    /// Labels this directory created stay resolvable even if the remote list
    /// does not show them yet.
    pub async fn refresh(&mut self) -> Result<usize> {
        let labels = self.client.list_labels().await?;
        self.by_name.clear();
        self.by_id.clear();
        for label in labels {
            self.insert(label);
        }
        for label in self.created_labels.clone() {
            self.insert(label);
        }

        debug!("Label directory holds {} labels", self.by_name.len());
        Ok(self.by_name.len())
    }

    fn insert(&mut self, label: LabelInfo) {
        self.by_id.insert(label.id.clone(), label.name.clone());
        // Keep the first id if the account somehow holds duplicate names
        self.by_name.entry(label.name).or_insert(label.id);
    }

    /// All (name, id) pairs in the snapshot, sorted by name
    pub fn list(&self) -> Vec<LabelInfo> {
        let mut labels: Vec<LabelInfo> = self
            .by_name
            .iter()
            .map(|(name, id)| LabelInfo::new(id.clone(), name.clone()))
            .collect();
        labels.sort_by(|a, b| a.name.cmp(&b.name));
        labels
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(String::as_str)
    }

    pub fn name_of(&self, id: &str) -> Option<&str> {
        self.by_id.get(id).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Distinct names from `names` that the snapshot does not know, in sorted order
    pub fn missing<'n, I>(&self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'n String>,
    {
        names
            .into_iter()
            .filter(|name| !self.contains(name))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Resolve names to ids, silently dropping the ones that are unknown
    pub fn resolve_all(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .filter_map(|name| self.resolve(name).map(str::to_string))
            .collect()
    }

    /// Return the id of the label called `name`, creating it if needed.
    ///
    /// The remote label list is consulted first so a label created since the
    /// snapshot was taken is reused rather than duplicated.
    pub async fn resolve_or_create(&mut self, name: &str) -> Result<String> {
        if name.trim().is_empty() {
            return Err(GmailError::LabelError(
                "Label name cannot be empty".to_string(),
            ));
        }

        let existing = self
            .client
            .list_labels()
            .await?
            .into_iter()
            .find(|label| label.name == name);

        if let Some(label) = existing {
            debug!("Label '{}' already exists with ID: {}", name, label.id);
            let id = label.id.clone();
            self.insert(label);
            return Ok(id);
        }

        info!("Creating label: {}", name);
        let label_id = self.client.create_label(name).await.map_err(|e| {
            GmailError::LabelError(format!("Failed to create label '{}': {}", name, e))
        })?;

        let created = LabelInfo::new(label_id.clone(), name);
        self.insert(created.clone());
        self.created_labels.push(created);

        info!("Successfully created label '{}' with ID: {}", name, label_id);
        Ok(label_id)
    }

    /// Labels this directory created, in creation order
    pub fn created_labels(&self) -> &[LabelInfo] {
        &self.created_labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockGmailClient;

    fn labels() -> Vec<LabelInfo> {
        vec![
            LabelInfo::new("INBOX", "INBOX"),
            LabelInfo::new("L1", "Finance"),
            LabelInfo::new("L2", "Travel"),
        ]
    }

    #[tokio::test]
    async fn test_load_maps_both_directions() {
        let mut mock = MockGmailClient::new();
        mock.expect_list_labels().times(1).returning(|| Ok(labels()));

        let directory = LabelDirectory::load(&mock).await.unwrap();
        assert_eq!(directory.len(), 3);
        assert_eq!(directory.resolve("Finance"), Some("L1"));
        assert_eq!(directory.name_of("L2"), Some("Travel"));
        assert_eq!(directory.resolve("finance"), None);
        assert_eq!(directory.list()[0].name, "Finance");
    }

    #[tokio::test]
    async fn test_missing_is_exact_and_deduplicated() {
        let mut mock = MockGmailClient::new();
        mock.expect_list_labels().returning(|| Ok(labels()));

        let directory = LabelDirectory::load(&mock).await.unwrap();
        let proposed = vec![
            "Finance".to_string(),
            "Work".to_string(),
            "travel".to_string(),
            "Work".to_string(),
        ];
        assert_eq!(directory.missing(&proposed), vec!["Work", "travel"]);
        assert_eq!(directory.resolve_all(&proposed), vec!["L1"]);
    }

    #[tokio::test]
    async fn test_resolve_or_create_reuses_existing_label() {
        let mut mock = MockGmailClient::new();
        mock.expect_list_labels().returning(|| Ok(labels()));
        mock.expect_create_label().never();

        let mut directory = LabelDirectory::new(&mock);
        assert_eq!(directory.resolve_or_create("Travel").await.unwrap(), "L2");
        assert!(directory.created_labels().is_empty());
        assert_eq!(directory.resolve("Travel"), Some("L2"));
    }

    #[tokio::test]
    async fn test_resolve_or_create_creates_missing_label() {
        let mut mock = MockGmailClient::new();
        mock.expect_list_labels().returning(|| Ok(labels()));
        mock.expect_create_label()
            .withf(|name| name == "Receipts")
            .times(1)
            .returning(|_| Ok("L9".to_string()));

        let mut directory = LabelDirectory::load(&mock).await.unwrap();
        assert_eq!(directory.resolve_or_create("Receipts").await.unwrap(), "L9");
        assert_eq!(directory.resolve("Receipts"), Some("L9"));
        assert_eq!(directory.name_of("L9"), Some("Receipts"));
        assert_eq!(directory.created_labels(), &[LabelInfo::new("L9", "Receipts")]);

        // A lagging remote list must not hide the new label
        directory.refresh().await.unwrap();
        assert_eq!(directory.resolve("Receipts"), Some("L9"));
    }

    #[tokio::test]
    async fn test_resolve_or_create_wraps_create_failure() {
        let mut mock = MockGmailClient::new();
        mock.expect_list_labels().returning(|| Ok(Vec::new()));
        mock.expect_create_label()
            .returning(|_| Err(GmailError::Forbidden("HTTP 403: Forbidden".to_string())));

        let mut directory = LabelDirectory::new(&mock);
        let err = directory.resolve_or_create("Work").await.unwrap_err();
        assert!(matches!(err, GmailError::LabelError(_)));
        assert!(err.to_string().contains("Work"));
        assert!(!directory.contains("Work"));
    }

    #[tokio::test]
    async fn test_resolve_or_create_rejects_blank_name() {
        let mock = MockGmailClient::new();
        let mut directory = LabelDirectory::new(&mock);
        assert!(directory.resolve_or_create("  ").await.is_err());
    }
}
