mod ai;
mod backup;
mod config;
mod dashboard;
mod gateway;
mod models;
mod pdf;
mod state;
mod store;
mod tui;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use config::Config;
use gateway::Gateway;
use models::{EnhancedResume, Job, JobStatus, Origin, Resume};
use state::{AppState, JobFilter};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use store::{KeyValueStore, SqliteStore};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Column width used when rendering resumes and letters to the terminal.
const RENDER_WIDTH: usize = 80;

#[derive(Parser)]
#[command(name = "jobpilot")]
#[command(about = "Job application tracker with AI-written cover letters, resumes and interview prep")]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the store file (overrides JOBPILOT_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store and show where it lives
    Init,

    /// Record an application (or a received offer)
    Add {
        company: String,
        role: String,

        /// Initial status (applied, interview, offer, rejected, accepted, auto-pilot)
        #[arg(short, long)]
        status: Option<String>,

        #[arg(long)]
        salary: Option<String>,

        #[arg(short, long)]
        location: Option<String>,

        /// Job description text, or @path to read it from a file
        #[arg(short, long)]
        description: Option<String>,

        /// Record as an offer received rather than an application sent
        #[arg(long)]
        offer: bool,
    },

    /// List applications, newest first
    List {
        /// Filter by status
        #[arg(short, long)]
        status: Option<String>,

        /// Match against company or role
        #[arg(short = 'q', long)]
        search: Option<String>,

        /// Only offers (offer or accepted)
        #[arg(long)]
        offers: bool,
    },

    /// Show one application in full
    Show {
        /// Job id or unique id prefix
        id: String,
    },

    /// Change the status of an application
    Status { id: String, status: String },

    /// Edit fields of an application
    Edit {
        id: String,

        #[arg(long)]
        company: Option<String>,

        #[arg(long)]
        role: Option<String>,

        #[arg(long)]
        salary: Option<String>,

        #[arg(short, long)]
        location: Option<String>,

        /// Job description text, or @path to read it from a file
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Delete an application
    Delete { id: String },

    /// Totals, this month's activity and recent applications
    Stats,

    /// Interactive browser
    Browse,

    /// Manage the resume profile
    Resume {
        #[command(subcommand)]
        command: ResumeCommands,
    },

    /// Draft a cover letter for an application
    Letter {
        id: String,

        /// Model to write with (overrides JOBPILOT_MODEL)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Rewrite the resume for an application
    Enhance {
        id: String,

        /// Model to edit with (overrides JOBPILOT_ENHANCE_MODEL)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Generate interview preparation questions
    Guide {
        id: String,

        #[arg(short, long)]
        model: Option<String>,

        /// Write the guide to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Enhance the resume and draft the cover letter together
    Autopilot {
        id: String,

        /// Mark the application as submitted by auto-pilot
        #[arg(long)]
        submit: bool,
    },

    /// Write a JSON backup of everything
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace everything with the contents of a JSON backup
    Import {
        file: PathBuf,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ResumeCommands {
    /// Show the stored resume profile
    Show,

    /// Set name, skills or full text
    Set {
        #[arg(short, long)]
        name: Option<String>,

        /// Plain-text resume file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Short skills summary (ignored when --file is given)
        #[arg(short, long)]
        skills: Option<String>,
    },

    /// Extract the full text from a PDF resume
    Import { file: PathBuf },

    /// Clear the resume profile
    Wipe {
        #[arg(short, long)]
        yes: bool,
    },
}

fn init_logging(config: &Config, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("jobpilot=debug")
    } else {
        EnvFilter::try_new(&config.rust_log).unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_FILTER))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env();
    init_logging(&config, cli.verbose);

    let db_path = cli.db.clone().or_else(|| config.db_path.clone());
    let store = match &db_path {
        Some(path) if path.as_os_str() == ":memory:" => SqliteStore::in_memory(),
        Some(path) => SqliteStore::open_at(path),
        None => SqliteStore::open(),
    }
    .context("Failed to open the store")?;
    debug!("Using store at {:?}", store.path());
    let mut state = AppState::load(store);

    match cli.command {
        Commands::Init => {
            match state.store().backend().path() {
                Some(path) => println!("Store ready at {}", path.display()),
                None => println!("Store ready (in memory)"),
            }
        }

        Commands::Add {
            company,
            role,
            status,
            salary,
            location,
            description,
            offer,
        } => {
            let mut job = Job::new(company.trim(), role.trim());
            if !job.has_required_fields() {
                bail!("Company and role are required");
            }
            if offer {
                job.origin = Origin::Offer;
                job.status = JobStatus::Offer;
            }
            if let Some(status) = status {
                job.status = parse_status(&status)?;
            }
            job.salary = salary.unwrap_or_default();
            job.location = location.unwrap_or_default();
            job.description = description.map(|d| read_text_arg(&d)).transpose()?.unwrap_or_default();

            for similar in state.find_similar(&job.company, &job.role) {
                eprintln!(
                    "Warning: looks like a duplicate of {} ({} at {}, {})",
                    similar.short_id(),
                    similar.role,
                    similar.company,
                    similar.status
                );
            }

            match state.add_job(job)? {
                Some(id) => {
                    let label = state.get_job(&id).map_or(id.as_str(), Job::short_id);
                    println!("Added job {}", label);
                }
                None => bail!("Company and role are required"),
            }
        }

        Commands::List { status, search, offers } => {
            let filter = JobFilter {
                search,
                status: status.as_deref().map(parse_status).transpose()?,
                offers_only: offers,
            };
            let jobs = state.filtered_jobs(&filter);
            if jobs.is_empty() {
                println!("No jobs found.");
            } else {
                print_job_table(&jobs);
            }
        }

        Commands::Show { id } => {
            let job = resolve_job(&state, &id)?;
            print_job(&job);
        }

        Commands::Status { id, status } => {
            let mut job = resolve_job(&state, &id)?;
            job.status = parse_status(&status)?;
            state.update_job(job.clone())?;
            println!("{} at {} is now {}", job.role, job.company, job.status);
        }

        Commands::Edit {
            id,
            company,
            role,
            salary,
            location,
            description,
        } => {
            let mut job = resolve_job(&state, &id)?;
            if let Some(company) = company {
                job.company = company.trim().to_string();
            }
            if let Some(role) = role {
                job.role = role.trim().to_string();
            }
            if !job.has_required_fields() {
                bail!("Company and role cannot be blank");
            }
            if let Some(salary) = salary {
                job.salary = salary;
            }
            if let Some(location) = location {
                job.location = location;
            }
            if let Some(description) = description {
                job.description = read_text_arg(&description)?;
            }
            state.update_job(job.clone())?;
            println!("Updated job {}", job.short_id());
        }

        Commands::Delete { id } => {
            let job = resolve_job(&state, &id)?;
            state.delete_job(&job.id)?;
            println!("Deleted {} at {}", job.role, job.company);
        }

        Commands::Stats => {
            print_stats(state.list_jobs());
        }

        Commands::Browse => tui::run_browse(&mut state)?,

        Commands::Resume { command } => run_resume_command(&mut state, command).await?,

        Commands::Letter { id, model } => {
            let mut job = resolve_job(&state, &id)?;
            if state.resume().is_empty() {
                eprintln!("Warning: no resume profile set; the letter will be generic.");
            }
            let gateway = writer_gateway(model.as_deref().unwrap_or(&config.text_model))?;
            println!("Writing cover letter for {} at {}...", job.role, job.company);
            let letter = gateway.generate_cover_letter(&job, state.resume()).await;
            if gateway::is_fallback(&letter) {
                bail!("{}", letter);
            }
            job.cover_letter = letter;
            state.update_job(job.clone())?;
            println!("\n{}", job.cover_letter);
        }

        Commands::Enhance { id, model } => {
            let mut job = resolve_job(&state, &id)?;
            require_resume_context(state.resume())?;
            let gateway = editor_gateway(&config, model.as_deref())?;
            println!("Tailoring resume for {} at {}...", job.role, job.company);
            let document = gateway
                .enhance_resume(&job, state.resume())
                .await
                .context("Resume enhancement failed")?;
            job.enhanced_resume = Some(EnhancedResume::Structured(document));
            state.update_job(job.clone())?;
            if let Some(enhanced) = &job.enhanced_resume {
                println!("\n{}", enhanced.render(RENDER_WIDTH));
            }
        }

        Commands::Guide { id, model, output } => {
            let job = resolve_job(&state, &id)?;
            let gateway = writer_gateway(model.as_deref().unwrap_or(&config.text_model))?;
            println!("Preparing interview guide for {} at {}...", job.role, job.company);
            let guide = gateway.generate_interview_guide(&job).await;
            if gateway::is_fallback(&guide) {
                bail!("{}", guide);
            }
            match output {
                Some(path) => {
                    std::fs::write(&path, &guide)
                        .with_context(|| format!("Failed to write to {}", path.display()))?;
                    println!("Interview guide saved to: {}", path.display());
                }
                None => println!("\n{}", guide),
            }
        }

        Commands::Autopilot { id, submit } => {
            let mut job = resolve_job(&state, &id)?;
            if !state.resume().has_full_text() {
                bail!("Auto-pilot needs your full resume. Import one first: jobpilot resume import <file.pdf>");
            }
            let gateway = Gateway::new(
                provider_for(&config.text_model)?,
                provider_for(&config.enhance_model)?,
            );
            println!("Auto-pilot: preparing {} at {}...", job.role, job.company);
            let package = gateway.prepare_application(&job, state.resume()).await;

            match &package.resume {
                Ok(_) => println!("  Resume tailored"),
                Err(e) => eprintln!("  Resume not tailored: {}", e),
            }
            if gateway::is_fallback(&package.cover_letter) {
                eprintln!("  Cover letter not written: {}", package.cover_letter);
            } else {
                println!("  Cover letter written");
            }

            let changed = package.apply_to(&mut job);
            if changed && submit {
                job.status = JobStatus::AutoPilot;
            }
            if changed {
                state.update_job(job.clone())?;
                println!("Saved. Run `jobpilot show {}` to review.", job.short_id());
            } else {
                bail!("Auto-pilot produced nothing to save");
            }
        }

        Commands::Export { output } => {
            let now = Utc::now();
            let path = output.unwrap_or_else(|| PathBuf::from(backup::default_file_name(now)));
            let text = backup::export(state.list_jobs(), state.resume(), now).context("Failed to serialize backup")?;
            std::fs::write(&path, text).with_context(|| format!("Failed to write to {}", path.display()))?;
            println!("Exported {} job(s) to {}", state.list_jobs().len(), path.display());
        }

        Commands::Import { file, yes } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read backup file: {}", file.display()))?;
            let payload = backup::parse(&text)?;
            payload.ensure_complete()?;

            let job_count = payload.jobs.as_ref().map_or(0, Vec::len);
            match payload.exported_at {
                Some(at) => println!(
                    "Backup from {}: {} job(s)",
                    at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                    job_count
                ),
                None => println!("Backup: {} job(s)", job_count),
            }
            if !yes && !confirm("This will overwrite all current jobs and the resume profile. Continue?")? {
                println!("Import cancelled.");
                return Ok(());
            }
            state.import_all(payload.jobs, payload.resume)?;
            info!("Import complete");
            println!("Imported {} job(s).", state.list_jobs().len());
        }
    }

    Ok(())
}

async fn run_resume_command<S: KeyValueStore>(state: &mut AppState<S>, command: ResumeCommands) -> Result<()> {
    match command {
        ResumeCommands::Show => {
            let resume = state.resume();
            if resume.is_empty() {
                println!("No resume profile set.");
                return Ok(());
            }
            println!("Name: {}", or_dash(&resume.full_name));
            println!("Skills: {}", or_dash(&resume.skills));
            match &resume.resume_text {
                Some(text) if resume.has_full_text() => {
                    println!("\n--- Full Resume ({} chars) ---\n{}", text.chars().count(), text)
                }
                _ => println!("\n(No full resume text; import a PDF for best results)"),
            }
        }

        ResumeCommands::Set { name, file, skills } => {
            let mut resume = state.resume().clone();
            if let Some(name) = name {
                resume.full_name = name.trim().to_string();
            }
            if let Some(file) = file {
                let text = std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read resume file: {}", file.display()))?;
                resume.set_resume_text(text);
            } else if let Some(skills) = skills {
                resume.skills = skills;
            }
            state.set_resume(resume)?;
            println!("Resume profile saved.");
        }

        ResumeCommands::Import { file } => {
            let bytes = std::fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            let text = pdf::extract_text(bytes, |progress| {
                eprint!(
                    "\rExtracting pages: {}/{} ({:.0}%)",
                    progress.completed,
                    progress.total,
                    progress.fraction() * 100.0
                );
            })
            .await;
            eprintln!();
            let text = text?;

            let mut resume = state.resume().clone();
            resume.set_resume_text(text);
            let chars = resume.resume_text.as_deref().map_or(0, |t| t.chars().count());
            state.set_resume(resume)?;
            println!("Imported {} characters of resume text from {}", chars, file.display());
        }

        ResumeCommands::Wipe { yes } => {
            if !yes && !confirm("Clear the resume profile?")? {
                println!("Cancelled.");
                return Ok(());
            }
            state.wipe_resume()?;
            println!("Resume profile cleared.");
        }
    }
    Ok(())
}

fn provider_for(model: &str) -> Result<Arc<dyn ai::AIProvider>> {
    let spec = ai::resolve_model(model)?;
    info!("Using {} ({})", spec.short_name, spec.model_id);
    Ok(Arc::from(ai::create_provider(&spec)?))
}

fn writer_gateway(model: &str) -> Result<Gateway> {
    Ok(Gateway::with_provider(provider_for(model)?))
}

fn editor_gateway(config: &Config, model: Option<&str>) -> Result<Gateway> {
    Ok(Gateway::with_provider(provider_for(model.unwrap_or(&config.enhance_model))?))
}

fn require_resume_context(resume: &Resume) -> Result<()> {
    if resume.context().trim().is_empty() {
        bail!("No resume profile set. Run `jobpilot resume import <file.pdf>` or `jobpilot resume set` first");
    }
    Ok(())
}

fn resolve_job<S: KeyValueStore>(state: &AppState<S>, id: &str) -> Result<Job> {
    state
        .find_job(id.trim())
        .cloned()
        .ok_or_else(|| anyhow!("No job matches '{}' (use a full id or a unique prefix)", id))
}

fn parse_status(s: &str) -> Result<JobStatus> {
    s.parse::<JobStatus>().map_err(|e| anyhow!(e))
}

/// `@path` reads the value from a file; anything else is taken literally.
fn read_text_arg(value: &str) -> Result<String> {
    match value.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path)),
        None => Ok(value.to_string()),
    }
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn print_job_table(jobs: &[&Job]) {
    println!(
        "{:<9} {:<11} {:<24} {:<28} {:<10}",
        "ID", "STATUS", "COMPANY", "ROLE", "APPLIED"
    );
    println!("{}", "-".repeat(86));
    for job in jobs {
        println!(
            "{:<9} {:<11} {:<24} {:<28} {:<10}",
            job.short_id(),
            job.status,
            truncate(&job.company, 22),
            truncate(&job.role, 26),
            job.date_applied.with_timezone(&Local).format("%Y-%m-%d")
        );
    }
}

fn print_job(job: &Job) {
    println!("Job {}", job.id);
    println!("Company: {}", job.company);
    println!("Role: {}", job.role);
    println!("Status: {}", job.status);
    if job.origin == Origin::Offer {
        println!("Origin: offer received");
    }
    if !job.salary.is_empty() {
        println!("Salary: {}", job.salary);
    }
    if !job.location.is_empty() {
        println!("Location: {}", job.location);
    }
    println!("Applied: {}", job.date_applied.with_timezone(&Local).format("%Y-%m-%d %H:%M"));
    if !job.description.is_empty() {
        println!("\n--- Description ---\n{}", textwrap::fill(&job.description, RENDER_WIDTH));
    }
    if let Some(enhanced) = &job.enhanced_resume {
        println!("\n--- Tailored Resume ---\n{}", enhanced.render(RENDER_WIDTH));
    }
    if !job.cover_letter.is_empty() {
        println!("\n--- Cover Letter ---\n{}", job.cover_letter);
    }
}

fn print_stats(jobs: &[Job]) {
    let totals = dashboard::totals(jobs);
    println!("Applied:    {}", totals.applied);
    println!("Interviews: {}", totals.interviews);
    println!("Offers:     {}", totals.offers);
    println!("Rejected:   {}", totals.rejected);

    let activity = dashboard::current_month_activity(jobs);
    let title = chrono::NaiveDate::from_ymd_opt(activity.year, activity.month, 1)
        .map(|d| d.format("%B %Y").to_string())
        .unwrap_or_default();
    println!("\n{}", title);
    print!("{}", activity.render());
    println!("(. none  - 1-2  + 3-10  # more)");

    let recent = dashboard::recent(jobs);
    if !recent.is_empty() {
        println!("\nRecent activity:");
        for job in recent {
            println!(
                "  {} {} at {} ({})",
                job.date_applied.with_timezone(&Local).format("%b %d"),
                job.role,
                job.company,
                job.status
            );
        }
    }
}

fn or_dash(s: &str) -> &str {
    if s.trim().is_empty() { "-" } else { s }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
