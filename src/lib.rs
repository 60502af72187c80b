//! Inbox Agent
//!
//! Rule-based Gmail sorting and spam purging.
//!
//! # Overview
//!
//! - **Rules**: an ordered YAML rule set; the first rule whose subject and
//!   sender predicates match decides a message's labels
//! - **Sorting**: a pure planning step followed by an apply step that creates
//!   missing labels and adds them to messages, with a dry-run mode
//! - **Spam purge**: trash or permanently delete messages in the SPAM label,
//!   behind a dry-run default and an explicit confirmation for deletion
//! - **Transport**: OAuth2 authenticated Gmail API client with retry and
//!   bounded concurrency, abstracted behind the [`GmailClient`] trait
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use inbox_agent::{auth, client::ProductionGmailClient, config::Config, InboxAgent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let hub = auth::initialize_gmail_hub(
//!         &config.gmail.client_secret_file,
//!         &config.gmail.token_file,
//!         &config.gmail.scopes,
//!     )
//!     .await?;
//!     let client = ProductionGmailClient::new(hub, config.gmail.max_concurrent_requests);
//!
//!     let agent = InboxAgent::new(Arc::new(client), config);
//!     let plan = agent.plan_sort(Some("INBOX"), Some(50)).await?;
//!     let summary = agent.apply_sort(&plan, true).await?;
//!     println!("{} of {} messages would change", summary.would_apply.len(), summary.total);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`agent`] - Operator entry points
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`classifier`] - First-match classification and the spam test
//! - [`cli`] - Command-line interface
//! - [`client`] - Gmail API client with retry logic
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`label_directory`] - Label name/id lookup and creation
//! - [`models`] - Core data structures
//! - [`rules`] - Rule definitions, matching and loading
//! - [`sorter`] - Plan and apply
//! - [`spam`] - Spam purge

pub mod agent;
pub mod auth;
pub mod classifier;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod label_directory;
pub mod models;
pub mod rules;
pub mod sorter;
pub mod spam;

pub use error::{GmailError, Result};

pub use models::{Header, Message, MessagePart};

pub use rules::{Rule, RuleLoader, RuleSet};

pub use classifier::{categorize, is_spam, EmailClassifier, SPAM_LABEL_ID};

pub use config::Config;

pub use client::{GmailClient, LabelInfo, ProductionGmailClient};

pub use label_directory::LabelDirectory;

pub use sorter::{ApplySummary, Plan, PlanEntry, PlannedMutation, Sorter};

pub use spam::{purge, PurgeMode, PurgeReport, PurgeRequest};

pub use agent::InboxAgent;
