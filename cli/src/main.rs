//! Leadflow CLI - fill a qualification form, move a lead on the board, or
//! check a national id.
//!
//! ```text
//! leadflow fill "https://forms.example.com/?c=acme&l=ig-bio&utm_source=ig"
//! leadflow move <LEAD_ID> --from warm --to converted
//! leadflow check-id 529.982.247-25
//! ```

mod prompt;

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use leadflow_config::LeadflowConfig;
use leadflow_engine::leadflow_backend::{
    HttpBackend, HttpNationalIdVerifier, LeadBackend, NationalIdVerifier,
};
use leadflow_engine::leadflow_types::{AttributionContext, KanbanStatus, LeadId};
use leadflow_engine::{
    Advance, BoardNotice, Card, EngineSettings, ExternalFieldValidator, KanbanStatusController,
    LeadForm, StepError, StepPosition, SubmissionError, backend_options,
};

use crate::prompt::{Prompt, Reply, parse_answer};

#[derive(Parser)]
#[command(name = "leadflow")]
#[command(about = "Lead qualification forms and board moves from the terminal")]
struct Cli {
    /// Config file (defaults to ~/.leadflow/config.toml)
    #[arg(long, global = true, env = "LEADFLOW_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fill a form opened from an entry link
    Fill {
        /// Entry URL or bare query string (`c=...&l=...`)
        entry: String,
        /// Pre-supplied answer, repeatable
        #[arg(long = "answer", value_name = "KEY=VALUE", value_parser = parse_answer)]
        answers: Vec<(String, String)>,
        /// Give consent without asking
        #[arg(long)]
        consent: bool,
        /// Never prompt; missing answers are left blank
        #[arg(long)]
        no_input: bool,
    },
    /// Move a lead to another board column
    Move {
        lead_id: String,
        #[arg(long, value_parser = parse_status)]
        from: KanbanStatus,
        #[arg(long, value_parser = parse_status)]
        to: KanbanStatus,
    },
    /// Check a national id (CPF) locally and against the registry
    CheckId { value: String },
}

fn parse_status(raw: &str) -> Result<KanbanStatus, String> {
    KanbanStatus::parse(raw).ok_or_else(|| {
        let names: Vec<&str> = KanbanStatus::COLUMNS.iter().map(|s| s.as_str()).collect();
        format!("unknown column `{raw}` (expected one of: {})", names.join(", "))
    })
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // Prompts go to stdout, so diagnostics stay on stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.leadflow/logs/leadflow.log
    if let Some(config_path) = LeadflowConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("leadflow.log"));
    }

    candidates.push(PathBuf::from(".leadflow").join("logs").join("leadflow.log"));
    candidates
}

fn load_config(path: Option<&Path>) -> Result<LeadflowConfig> {
    match path {
        Some(path) => LeadflowConfig::load_from(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(LeadflowConfig::load()
            .context("loading default config")?
            .unwrap_or_default()),
    }
}

fn parse_entry(entry: &str) -> Result<AttributionContext> {
    let context = if entry.contains("://") {
        AttributionContext::from_entry_url(entry)
    } else {
        AttributionContext::from_query(entry)
    };
    context.context("invalid entry link")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Fill {
            entry,
            answers,
            consent,
            no_input,
        } => {
            let answers = answers.into_iter().collect();
            run_fill(&config, &entry, answers, consent, !no_input).await
        }
        Commands::Move { lead_id, from, to } => {
            run_move(&config, LeadId::new(lead_id), from, to).await
        }
        Commands::CheckId { value } => run_check_id(&config, &value).await,
    }
}

enum FillEnd {
    Submitted,
    Quit,
}

async fn run_fill(
    config: &LeadflowConfig,
    entry: &str,
    answers: HashMap<String, String>,
    consent: bool,
    interactive: bool,
) -> Result<()> {
    let context = parse_entry(entry)?;
    let options = backend_options(config)?;
    let backend: Arc<dyn LeadBackend> = Arc::new(HttpBackend::new(&options)?);
    let verifier: Arc<dyn NationalIdVerifier> = Arc::new(HttpNationalIdVerifier::new(&options)?);
    let settings = EngineSettings::from_config(config);

    let form = LeadForm::open(context, backend, Some(verifier), &settings)
        .await
        .context("opening form")?;
    println!("{}", form.form_config().client_name());

    let mut prompt = Prompt::new(answers, interactive);
    let outcome = tokio::select! {
        outcome = fill_form(&form, &mut prompt, consent) => outcome,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted.");
            Ok(FillEnd::Quit)
        }
    };

    form.close().await;
    match outcome? {
        FillEnd::Submitted => Ok(()),
        FillEnd::Quit => bail!("form left before submitting"),
    }
}

async fn fill_form(form: &LeadForm, prompt: &mut Prompt, consent: bool) -> Result<FillEnd> {
    let steps = form.steps();
    let total = steps.plan().len();

    'steps: loop {
        let StepPosition::Step(step) = steps.position() else {
            return Ok(FillEnd::Submitted);
        };
        println!("\nStep {step} of {total}");

        for field in steps.plan().fields(step).unwrap_or_default() {
            steps.focus_field(field.key())?;
            let reply = prompt.ask(field).await?;
            steps.blur_field(field.key())?;
            match reply {
                Reply::Value(value) => steps.set_value(field.key(), value)?,
                Reply::Back => {
                    steps.retreat(step)?;
                    continue 'steps;
                }
                Reply::Quit => return Ok(FillEnd::Quit),
            }
        }

        match steps.advance(step) {
            Ok(Advance::Next(_)) => {}
            Ok(Advance::ReadyToSubmit) => return submit(form, prompt, consent).await,
            Err(StepError::MissingRequired { first, .. }) => {
                eprintln!("Please fill in `{first}`.");
                if !prompt.confirm("Try again?").await? {
                    return Ok(FillEnd::Quit);
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn submit(form: &LeadForm, prompt: &mut Prompt, consent: bool) -> Result<FillEnd> {
    let mut consent = consent || prompt.confirm("Do you agree to share these answers?").await?;
    loop {
        match form.submit(consent).await {
            Ok(payload) => {
                println!("\nThanks! Your answers were received.");
                if let Some(score) = payload.score {
                    println!("Score: {score}");
                }
                if let Some(link) = payload.whatsapp_link {
                    println!("Continue on WhatsApp: {link}");
                }
                return Ok(FillEnd::Submitted);
            }
            Err(e @ (SubmissionError::Incomplete(_) | SubmissionError::InvalidField { .. })) => {
                eprintln!("{}", e.user_message());
                return Ok(FillEnd::Quit);
            }
            Err(e) => {
                eprintln!("{}", e.user_message());
                let retry = match e {
                    SubmissionError::ConsentRequired => {
                        consent = prompt.confirm("Do you agree to share these answers?").await?;
                        consent
                    }
                    SubmissionError::Backend(_) => prompt.confirm("Try again?").await?,
                    _ => false,
                };
                if !retry {
                    return Ok(FillEnd::Quit);
                }
            }
        }
    }
}

async fn run_move(
    config: &LeadflowConfig,
    lead_id: LeadId,
    from: KanbanStatus,
    to: KanbanStatus,
) -> Result<()> {
    let options = backend_options(config)?;
    let backend: Arc<dyn LeadBackend> = Arc::new(HttpBackend::new(&options)?);
    let (board, mut notices) = KanbanStatusController::new(backend);
    board.load([Card::new(lead_id.clone(), lead_id.as_str(), from)]);

    let result = board.move_card(&lead_id, from, to).await;
    while let Ok(notice) = notices.try_recv() {
        match notice {
            BoardNotice::Moved { card, to } => println!("{card} moved to {}", to.label()),
            BoardNotice::Celebrate { card } => println!("{card} converted!"),
            BoardNotice::MoveFailed { card, from, reason, .. } => {
                eprintln!("{card} stays in {}: {reason}", from.label());
            }
        }
    }
    result?;
    Ok(())
}

async fn run_check_id(config: &LeadflowConfig, value: &str) -> Result<()> {
    let validator = if config.validator_enabled() {
        let options = backend_options(config)?;
        let verifier: Arc<dyn NationalIdVerifier> =
            Arc::new(HttpNationalIdVerifier::new(&options)?);
        ExternalFieldValidator::new(verifier, config.validator_timeout())
    } else {
        ExternalFieldValidator::local_only()
    };

    if validator.check(value).await {
        println!("valid");
        Ok(())
    } else {
        bail!("`{value}` is not a valid national id")
    }
}
