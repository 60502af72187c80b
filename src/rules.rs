//! Declarative sorting rules: matching and loading
//!
//! A rule file is YAML, either a mapping with a `rules` key or a bare list:
//!
//! ```yaml
//! rules:
//!   - any_subject_contains: ["invoice", "receipt"]
//!     assign_labels: ["Finance"]
//!   - any_sender_contains: ["@airline.example"]
//!     assign_labels: ["Travel"]
//!   - assign_labels: ["Unsorted"]   # no predicates: matches everything
//! ```

use crate::error::{GmailError, Result};
use crate::models::MessagePart;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// One entry of a rule set.
///
/// An absent predicate is vacuously satisfied; a present one with an empty
/// needle list can never pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any_subject_contains: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any_sender_contains: Option<Vec<String>>,
    pub assign_labels: Vec<String>,
}

impl Rule {
    /// A rule without predicates
    pub fn catch_all(labels: &[&str]) -> Self {
        Self {
            any_subject_contains: None,
            any_sender_contains: None,
            assign_labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    pub fn has_predicates(&self) -> bool {
        self.any_subject_contains.is_some() || self.any_sender_contains.is_some()
    }
}

/// Ordered rules; the first match wins
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RuleDocument {
    Mapping {
        #[serde(default)]
        rules: Option<Vec<Rule>>,
    },
    List(Vec<Rule>),
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Parse a rule set from YAML text.
    ///
    /// Empty text, `rules:` with no value and `rules: []` all yield an empty
    /// set.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let value: serde_yaml::Value = serde_yaml::from_str(content)
            .map_err(|e| GmailError::ConfigError(format!("Failed to parse rules: {}", e)))?;
        if value.is_null() {
            return Ok(Self::default());
        }

        let document: RuleDocument = serde_yaml::from_value(value)
            .map_err(|e| GmailError::ConfigError(format!("Invalid rule definition: {}", e)))?;
        let rules = match document {
            RuleDocument::Mapping { rules } => rules.unwrap_or_default(),
            RuleDocument::List(rules) => rules,
        };

        let set = Self { rules };
        set.validate()?;
        Ok(set)
    }

    /// Read and parse a rule file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GmailError::ConfigError(format!("Failed to read rules file {:?}: {}", path, e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Every rule must assign at least one non-blank label
    pub fn validate(&self) -> Result<()> {
        for (index, rule) in self.rules.iter().enumerate() {
            if rule.assign_labels.is_empty() {
                return Err(GmailError::ConfigError(format!(
                    "rules[{}].assign_labels must not be empty",
                    index
                )));
            }
            if rule.assign_labels.iter().any(|l| l.trim().is_empty()) {
                return Err(GmailError::ConfigError(format!(
                    "rules[{}].assign_labels cannot contain empty strings",
                    index
                )));
            }
        }
        Ok(())
    }

    /// Labels of the first rule matching the payload, if any
    pub fn first_match(&self, payload: &MessagePart) -> Option<&[String]> {
        self.rules
            .iter()
            .find(|rule| matches(payload, rule))
            .map(|rule| rule.assign_labels.as_slice())
    }
}

fn any_contains(text: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| text.contains(&n.to_lowercase()))
}

/// Evaluate one rule against a message payload.
///
/// `Subject` and `From` are compared lower-cased; a missing header is the
/// empty string. Predicate kinds are ANDed, needles within a kind are ORed.
pub fn matches(payload: &MessagePart, rule: &Rule) -> bool {
    let subject = payload.header("Subject").unwrap_or("").to_lowercase();
    let sender = payload.header("From").unwrap_or("").to_lowercase();

    if let Some(needles) = &rule.any_subject_contains {
        if !any_contains(&subject, needles) {
            return false;
        }
    }

    if let Some(needles) = &rule.any_sender_contains {
        if !any_contains(&sender, needles) {
            return false;
        }
    }

    true
}

#[derive(Clone)]
struct CachedRules {
    modified: Option<SystemTime>,
    len: u64,
    rules: RuleSet,
}

/// Loads rule files, reusing a parsed set while the file is unchanged
pub struct RuleLoader {
    cache: LruCache<PathBuf, CachedRules>,
}

impl RuleLoader {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
        }
    }

    /// Load `path`, returning the cached set if its mtime and size still match
    pub fn load(&mut self, path: &Path) -> Result<RuleSet> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            GmailError::ConfigError(format!("Failed to read rules file {:?}: {}", path, e))
        })?;
        let modified = metadata.modified().ok();
        let len = metadata.len();
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        if let Some(cached) = self.cache.get(&key) {
            if cached.modified.is_some() && cached.modified == modified && cached.len == len {
                debug!("Using cached rules for {:?}", key);
                return Ok(cached.rules.clone());
            }
        }

        let rules = RuleSet::load(path)?;
        debug!("Loaded {} rules from {:?}", rules.len(), key);
        self.cache.put(
            key,
            CachedRules {
                modified,
                len,
                rules: rules.clone(),
            },
        );
        Ok(rules)
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

impl Default for RuleLoader {
    fn default() -> Self {
        Self::new(8)
    }
}
