//! Command-line interface

use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

use crate::client::LabelInfo;
use crate::config::Config;
use crate::sorter::{ApplySummary, Plan};
use crate::spam::{PurgeMode, PurgeReport, PurgeRequest};

#[derive(Parser, Debug)]
#[command(name = "inbox-agent")]
#[command(version)]
#[command(about = "Rule-based Gmail sorting and spam purging", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: PathBuf,

    /// Path to OAuth2 client secret file (overrides gmail.client_secret_file)
    #[arg(long, global = true)]
    pub credentials: Option<PathBuf>,

    /// Path to token cache file (overrides gmail.token_file)
    #[arg(long, global = true)]
    pub token_cache: Option<PathBuf>,

    /// Path to the YAML rules file (overrides rules.path)
    #[arg(long, global = true)]
    pub rules: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Fold the path overrides given on the command line into `config`
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(path) = &self.credentials {
            config.gmail.client_secret_file = path.clone();
        }
        if let Some(path) = &self.token_cache {
            config.gmail.token_file = path.clone();
        }
        if let Some(path) = &self.rules {
            config.rules.path = path.clone();
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the OAuth flow and cache the token
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// List labels or create the default set
    Labels {
        #[command(subcommand)]
        action: LabelsAction,
    },

    /// Plan or apply rule-based labels
    Sort {
        #[command(subcommand)]
        action: SortAction,
    },

    /// Act on messages in the spam label
    Spam {
        #[command(subcommand)]
        action: SpamAction,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum LabelsAction {
    /// Show every label with its id
    List,
    /// Create any missing label from labels.defaults
    Ensure,
}

/// Dry-run switches shared by the mutating commands
#[derive(clap::Args, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DryRunArgs {
    /// Only report what would change
    #[arg(long, conflicts_with = "no_dry_run")]
    pub dry_run: bool,

    /// Perform the changes
    #[arg(long)]
    pub no_dry_run: bool,
}

impl DryRunArgs {
    /// Explicit flags win; otherwise `default` (execution.dry_run) applies
    pub fn resolve(&self, default: bool) -> bool {
        if self.no_dry_run {
            false
        } else if self.dry_run {
            true
        } else {
            default
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum SortAction {
    /// Show the labels each message would receive
    Plan {
        /// Only consider messages with this Gmail label id
        #[arg(long)]
        label: Option<String>,

        /// Max messages to fetch (defaults to sort.limit)
        #[arg(long)]
        limit: Option<usize>,

        /// Print the plan as JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Also write the plan as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Create missing labels and add them to messages
    Apply {
        /// Only consider messages with this Gmail label id
        #[arg(long, conflicts_with = "plan_file")]
        label: Option<String>,

        /// Max messages to fetch (defaults to sort.limit)
        #[arg(long, conflicts_with = "plan_file")]
        limit: Option<usize>,

        /// Apply a plan saved by `sort plan --output` instead of planning afresh
        #[arg(long)]
        plan_file: Option<PathBuf>,

        #[command(flatten)]
        dry_run: DryRunArgs,
    },
}

#[derive(Subcommand, Debug)]
pub enum SpamAction {
    /// Trash or delete messages labelled SPAM
    Purge {
        #[arg(long, value_enum, default_value_t = PurgeMode::Trash)]
        mode: PurgeMode,

        #[command(flatten)]
        dry_run: DryRunArgs,

        /// Required together with --mode delete
        #[arg(long)]
        i_understand_this_is_permanent: bool,

        /// Max messages to act on (defaults to spam.limit)
        #[arg(long)]
        limit: Option<usize>,
    },
}

impl SpamAction {
    pub fn request(&self, default_dry_run: bool) -> PurgeRequest {
        match self {
            SpamAction::Purge {
                mode,
                dry_run,
                i_understand_this_is_permanent,
                ..
            } => PurgeRequest {
                mode: *mode,
                dry_run: dry_run.resolve(default_dry_run),
                confirm_permanent: *i_understand_this_is_permanent,
            },
        }
    }
}

/// Truncate a string to max_len characters, adding "..." if truncated
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}

/// Progress reporter using indicatif; draws on stderr so stdout stays parseable
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }

    /// Share `multi` with the log writer so log lines print above spinners
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        Self {
            multi,
            spinner_style,
        }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        if self.multi.is_hidden() {
            eprintln!("  ✓ {}", msg);
        } else {
            let _ = self.multi.println(format!("  ✓ {}", msg));
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

pub fn format_labels(labels: &[LabelInfo]) -> String {
    let width = labels.iter().map(|l| l.id.len()).max().unwrap_or(2).max(2);
    let mut out = format!("{:<width$}  {}\n", "ID", "Name", width = width);
    for label in labels {
        out.push_str(&format!("{:<width$}  {}\n", label.id, label.name, width = width));
    }
    out
}

pub fn format_plan(plan: &Plan) -> String {
    if plan.is_empty() {
        return "No messages matched any rule.\n".to_string();
    }

    let width = plan
        .entries()
        .iter()
        .map(|e| e.message_id.len())
        .max()
        .unwrap_or(0)
        .max("Message ID".len());

    let mut out = format!("{:<width$}  {}\n", "Message ID", "Proposed Labels", width = width);
    for entry in plan.entries() {
        out.push_str(&format!(
            "{:<width$}  {}\n",
            entry.message_id,
            truncate_string(&entry.proposed_labels.join(","), 60),
            width = width
        ));
    }
    out.push_str(&format!("\n{} messages would be labelled\n", plan.len()));
    out
}

pub fn format_apply_summary(summary: &ApplySummary) -> String {
    let mut out = String::new();

    if summary.dry_run {
        out.push_str("DRY RUN - no changes were made\n");
        for mutation in &summary.would_apply {
            out.push_str(&format!(
                "  {} <- {}\n",
                mutation.message_id,
                mutation.label_names.join(",")
            ));
        }
        if !summary.labels_to_create.is_empty() {
            out.push_str(&format!(
                "Labels to create: {}\n",
                summary.labels_to_create.join(", ")
            ));
        }
        out.push_str(&format!("{} messages would be labelled\n", summary.would_apply.len()));
    } else {
        for name in &summary.labels_created {
            out.push_str(&format!("Created label '{}'\n", name));
        }
        out.push_str(&format!(
            "Labelled {} of {} messages\n",
            summary.changed, summary.total
        ));
    }

    if !summary.errors.is_empty() {
        out.push_str(&format!("{} errors:\n", summary.errors.len()));
        for error in &summary.errors {
            out.push_str(&format!("  - {}\n", error));
        }
    }
    out
}

pub fn format_purge_report(report: &PurgeReport) -> String {
    let mut out = match report {
        PurgeReport::DryRun { would_remove } => {
            let mut out = format!("DRY RUN - would remove {} messages:\n", would_remove.len());
            for id in would_remove {
                out.push_str(&format!("  {}\n", id));
            }
            out
        }
        PurgeReport::Trashed { trashed, .. } => format!("Trashed {} messages\n", trashed.len()),
        PurgeReport::Deleted { deleted, .. } => {
            format!("Permanently deleted {} messages\n", deleted.len())
        }
    };

    let errors = report.errors();
    if !errors.is_empty() {
        out.push_str(&format!("{} errors:\n", errors.len()));
        for error in errors {
            out.push_str(&format!("  - {}\n", error));
        }
    }
    out
}
