use anyhow::{Context, Result};
use clap::Parser;
use indicatif::MultiProgress;
use inbox_agent::auth::{self, MODIFY_SCOPE};
use inbox_agent::cli::{self, Cli, Commands, LabelsAction, ProgressReporter, SortAction};
use inbox_agent::client::ProductionGmailClient;
use inbox_agent::config::Config;
use inbox_agent::error::GmailError;
use inbox_agent::sorter::Plan;
use inbox_agent::InboxAgent;
use std::io::Write;
use std::process;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Exit code for a destructive request refused for lack of confirmation
const EXIT_SAFETY_GATE: i32 = 2;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
struct MultiProgressWriter {
    multi: MultiProgress,
    buffer: Vec<u8>,
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            let msg = String::from_utf8_lossy(&self.buffer);
            let msg = msg.trim_end_matches('\n');
            if self.multi.is_hidden() {
                eprintln!("{}", msg);
            } else if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            self.buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// MakeWriter implementation for tracing
#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: MultiProgress,
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter {
            multi: self.multi.clone(),
            buffer: Vec::new(),
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);

        let refused = matches!(
            e.downcast_ref::<GmailError>(),
            Some(GmailError::SafetyGate(_))
        );
        if refused {
            process::exit(EXIT_SAFETY_GATE);
        }

        eprintln!("\nFor help, run: inbox-agent --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Install default crypto provider for rustls
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("inbox_agent=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("inbox_agent=info,warn"))
    };

    // Logs and spinners share stderr; stdout carries only command output
    let multi_progress = MultiProgress::new();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(MultiProgressMakeWriter {
            multi: multi_progress.clone(),
        })
        .with_target(false)
        .init();

    if let Commands::InitConfig { output, force } = &cli.command {
        if output.exists() && !force {
            return Err(GmailError::ConfigError(format!(
                "Configuration file already exists at {:?}. Use --force to overwrite.",
                output
            ))
            .into());
        }

        Config::create_example(output).await?;
        println!("Created example configuration file at: {:?}", output);
        return Ok(());
    }

    let mut config = Config::load(&cli.config).await?;
    config.apply_env_overrides();
    cli.apply_overrides(&mut config);
    config.validate()?;

    if let Commands::Auth { force } = &cli.command {
        let token_file = &config.gmail.token_file;
        if *force && token_file.exists() {
            tokio::fs::remove_file(token_file).await?;
            tracing::info!("Removed existing token cache");
        }

        let hub = auth::initialize_gmail_hub(
            &config.gmail.client_secret_file,
            token_file,
            &config.gmail.scopes,
        )
        .await?;

        println!("OAuth complete. Token cached at: {:?}", token_file);

        let (_, profile) = hub
            .users()
            .get_profile("me")
            .add_scope(MODIFY_SCOPE)
            .doit()
            .await
            .map_err(GmailError::from)?;
        println!(
            "Connected to account: {}",
            profile.email_address.unwrap_or_default()
        );
        return Ok(());
    }

    // Permanent deletion needs the full-access scope on the cached token
    if let Commands::Spam { action } = &cli.command {
        for scope in action.request(config.execution.dry_run).required_scopes() {
            config.gmail.require_scope(scope);
        }
    }

    let reporter = ProgressReporter::with_multi_progress(multi_progress);
    let hub = auth::initialize_gmail_hub(
        &config.gmail.client_secret_file,
        &config.gmail.token_file,
        &config.gmail.scopes,
    )
    .await?;
    let client = ProductionGmailClient::new(hub, config.gmail.max_concurrent_requests);
    let default_dry_run = config.execution.dry_run;
    let agent = InboxAgent::new(Arc::new(client), config);

    match cli.command {
        Commands::Labels { action } => match action {
            LabelsAction::List => {
                let labels = agent.list_labels().await?;
                print!("{}", cli::format_labels(&labels));
            }
            LabelsAction::Ensure => {
                let spinner = reporter.add_spinner("Ensuring default labels...");
                let labels = agent.ensure_default_labels().await?;
                reporter.finish_spinner(&spinner, &format!("{} labels present", labels.len()));
                for label in labels {
                    println!("Ensured label '{}' -> {}", label.name, label.id);
                }
            }
        },

        Commands::Sort { action } => match action {
            SortAction::Plan {
                label,
                limit,
                json,
                output,
            } => {
                let spinner = reporter.add_spinner("Fetching and classifying messages...");
                let plan = agent.plan_sort(label.as_deref(), limit).await?;
                reporter.finish_spinner(&spinner, &format!("{} messages planned", plan.len()));

                if let Some(path) = &output {
                    let content = serde_json::to_string_pretty(&plan)?;
                    tokio::fs::write(path, content)
                        .await
                        .with_context(|| format!("Failed to write plan to {:?}", path))?;
                    tracing::info!("Saved plan to {:?}", path);
                }

                if json {
                    println!("{}", serde_json::to_string_pretty(&plan)?);
                } else {
                    print!("{}", cli::format_plan(&plan));
                }
            }
            SortAction::Apply {
                label,
                limit,
                plan_file,
                dry_run,
            } => {
                let dry_run = dry_run.resolve(default_dry_run);
                let plan: Plan = match &plan_file {
                    Some(path) => {
                        let content = tokio::fs::read_to_string(path)
                            .await
                            .with_context(|| format!("Failed to read plan from {:?}", path))?;
                        serde_json::from_str(&content)
                            .with_context(|| format!("Invalid plan file {:?}", path))?
                    }
                    None => agent.plan_sort(label.as_deref(), limit).await?,
                };

                let spinner = reporter.add_spinner("Applying labels...");
                let summary = agent.apply_sort(&plan, dry_run).await?;
                reporter.finish_spinner(&spinner, "Done");
                print!("{}", cli::format_apply_summary(&summary));
            }
        },

        Commands::Spam { action } => {
            let request = action.request(default_dry_run);
            let cli::SpamAction::Purge { limit, .. } = action;

            let spinner = reporter.add_spinner("Purging spam...");
            let result = agent.purge_spam(limit, &request).await;
            spinner.finish_and_clear();

            print!("{}", cli::format_purge_report(&result?));
        }

        Commands::Auth { .. } | Commands::InitConfig { .. } => {}
    }

    Ok(())
}
