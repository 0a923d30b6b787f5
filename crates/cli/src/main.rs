use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use triage_backend::{DiagnosisBackend, HttpBackend};
use triage_core::{normalize, Message, MessageKind, RenderableReport, ReportSection, Sender};
use triage_engine::{
    ClientIdentity, EngineError, IdentityProvider, IntakeEngine, LabAnalyzer, TurnOutcome,
};
use triage_observability::{init_tracing, EngineMetrics};
use triage_storage::Store;

#[derive(Debug, Parser)]
#[command(name = "triage")]
#[command(about = "Triage Concierge CLI")]
struct Cli {
    #[arg(long, env = "TRIAGE_BACKEND_URL", default_value = "http://127.0.0.1:8700")]
    backend_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive intake dialogue.
    Chat,
    /// Upload a lab report for analysis.
    Analyze { file: PathBuf },
    /// Backend capability flags and usage stats.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("triage_cli");
    let cli = Cli::parse();

    let backend = Arc::new(HttpBackend::new(&cli.backend_url).context("invalid backend url")?);
    let metrics = EngineMetrics::shared();
    let identity = resolve_identity(backend.clone()).await?;

    match cli.command {
        Command::Chat => {
            let engine = IntakeEngine::new(backend, identity, metrics);
            run_chat(engine).await?;
        }
        Command::Analyze { file } => {
            let analyzer = LabAnalyzer::new(backend, metrics);
            run_analyze(&analyzer, &identity, &file).await?;
        }
        Command::Status => {
            run_status(backend.as_ref(), &identity).await;
        }
    }

    Ok(())
}

async fn resolve_identity(backend: Arc<HttpBackend>) -> Result<ClientIdentity> {
    let store = if let Ok(database_url) = env::var("TRIAGE_DATABASE_URL") {
        Store::sqlite(&database_url).await?
    } else {
        Store::memory()
    };

    let provider = IdentityProvider::new(backend, store, "default");
    provider
        .ensure_identity()
        .await
        .context("failed resolving device identity")
}

async fn run_chat(mut engine: IntakeEngine<HttpBackend>) -> Result<()> {
    println!("Triage Concierge chat. Type 'exit' to quit, '/help' for commands.\n");
    for message in engine.transcript() {
        print_message(message);
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let input = line.trim();
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }
        if input.is_empty() {
            continue;
        }

        if let Some(command) = input.strip_prefix('/') {
            handle_slash_command(&mut engine, command).await?;
            continue;
        }

        match engine.process_message(input).await {
            Ok(outcome) => print_outcome(&outcome),
            Err(error) => print_engine_error(&error),
        }
    }

    Ok(())
}

async fn handle_slash_command(
    engine: &mut IntakeEngine<HttpBackend>,
    command: &str,
) -> Result<()> {
    let (name, rest) = match command.split_once(' ') {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };

    match name {
        "help" => {
            println!("Commands:");
            println!("  /symptom add <name>     add a symptom to the pending set");
            println!("  /symptom remove <name>  remove a symptom");
            println!("  /symptoms               list the pending set");
            println!("  /submit                 send the pending symptoms as one answer");
            println!("  /new                    discard the session and start over");
            println!("  /quota                  remaining daily usage, if known");
            println!("  exit                    leave the chat");
        }
        "symptom" => match rest.split_once(' ') {
            Some(("add", symptom)) => match engine.add_symptom(symptom) {
                triage_core::AddOutcome::Added => println!("added: {}", symptom.trim()),
                triage_core::AddOutcome::Duplicate => println!("already listed"),
                triage_core::AddOutcome::Blank => println!("nothing to add"),
            },
            Some(("remove", symptom)) => {
                if engine.remove_symptom(symptom) {
                    println!("removed: {}", symptom.trim());
                } else {
                    println!("not in the list");
                }
            }
            _ => println!("usage: /symptom add <name> | /symptom remove <name>"),
        },
        "symptoms" => {
            if engine.symptoms().is_empty() {
                println!("no symptoms collected yet");
            } else {
                for symptom in engine.symptoms() {
                    println!("- {symptom}");
                }
            }
        }
        "submit" => match engine.submit_symptoms().await {
            Ok(outcome) => print_outcome(&outcome),
            Err(error) => print_engine_error(&error),
        },
        "new" => {
            engine.start_new_session();
            println!("Started a new session.\n");
            for message in engine.transcript() {
                print_message(message);
            }
        }
        "quota" => match engine.remaining_daily() {
            Some(remaining) => println!("remaining today: {remaining}"),
            None => println!("no quota information yet"),
        },
        _ => println!("unknown command; try /help"),
    }

    Ok(())
}

fn print_outcome(outcome: &TurnOutcome) {
    for message in &outcome.new_messages {
        print_message(message);
    }
    if let Some(service) = outcome.redirect {
        println!("[switching to {}]", service.display_name());
    }
}

fn print_message(message: &Message) {
    match message.sender {
        Sender::User => {}
        Sender::System => {
            if message.kind == MessageKind::Diagnosis {
                println!("\n{}", message.text);
                if let Some(payload) = &message.diagnosis {
                    print_report(&normalize(payload));
                }
                println!();
            } else {
                println!("\n{}\n", message.text);
            }
        }
    }
}

fn print_report(report: &RenderableReport) {
    for section in &report.sections {
        match section {
            ReportSection::Conditions { title, cards } => {
                println!("\n{title}:");
                for card in cards {
                    println!("  {}", card.headline);
                    if !card.key_symptoms.is_empty() {
                        println!("    key symptoms: {}", card.key_symptoms.join(", "));
                    }
                    if let Some(coverage) = card.coverage_pct {
                        println!("    symptom coverage: {coverage}%");
                    }
                    if let Some(detail) = &card.detail {
                        println!("    {detail}");
                    }
                }
            }
            ReportSection::Treatment { title, items } => {
                println!("\n{title}:");
                for item in items {
                    println!("  - {item}");
                }
            }
            ReportSection::Risk {
                title,
                level,
                factors,
                summary,
            } => {
                println!("\n{title}: {}", level.label());
                for factor in factors {
                    println!("  - {factor}");
                }
                if let Some(summary) = summary {
                    println!("  {summary}");
                }
            }
            ReportSection::FollowUp { title, text } => {
                println!("\n{title}: {text}");
            }
            ReportSection::Disclaimer { text } => {
                println!("\n{text}");
            }
            ReportSection::RawJson { warning, pretty } => {
                println!("\n[warning] {warning}");
                println!("{pretty}");
            }
            ReportSection::Text { lines } => {
                for line in lines {
                    println!("{}", line.content);
                }
            }
        }
    }
}

fn print_engine_error(error: &EngineError) {
    match error {
        EngineError::RateLimited {
            message,
            suggestion,
        } => {
            println!("\n[limit] {message}");
            if let Some(suggestion) = suggestion {
                println!("{suggestion}");
            }
        }
        EngineError::Validation(message) => println!("\n{message}"),
        EngineError::Busy => println!("\nStill waiting on the previous reply."),
        EngineError::Backend(error) => {
            println!("\n[network] {error}");
            println!("Your answer was not lost; try sending it again.");
        }
    }
}

async fn run_analyze(
    analyzer: &LabAnalyzer<HttpBackend>,
    identity: &ClientIdentity,
    file: &PathBuf,
) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed reading {}", file.display()))?;
    let file_name = file
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("report")
        .to_string();

    // Decorative only; the analysis result does not depend on it.
    let ticker = tokio::spawn(async {
        let mut interval = tokio::time::interval(Duration::from_millis(400));
        loop {
            interval.tick().await;
            print!(".");
            let _ = io::stdout().flush();
        }
    });

    let result = analyzer.analyze(identity, &file_name, bytes).await;
    ticker.abort();
    println!();

    match result {
        Ok(analysis) => {
            println!("{}", analysis.summary);
            if let Some(remaining) = analysis.remaining_daily {
                println!("\nremaining analyses today: {remaining}");
            }
        }
        Err(error) => print_engine_error(&error),
    }

    Ok(())
}

async fn run_status(backend: &HttpBackend, identity: &ClientIdentity) {
    match backend.system_status().await {
        Ok(status) => {
            println!(
                "lab analysis: {}",
                if status.analysis_available {
                    "available"
                } else {
                    "offline"
                }
            );
            if !status.supported_formats.is_empty() {
                println!("formats: {}", status.supported_formats.join(", "));
            }
            if let Some(notes) = status.notes {
                println!("{notes}");
            }
        }
        Err(_) => println!("lab analysis: unavailable"),
    }

    if let Some(temp_user_id) = identity.temp_user_id() {
        if let Ok(stats) = backend.temp_user_stats(temp_user_id).await {
            println!("sessions started: {}", stats.sessions_started);
            println!("analyses run: {}", stats.analyses_run);
            if let Some(remaining) = stats.remaining_daily {
                println!("remaining today: {remaining}");
            }
        }
    }
}
