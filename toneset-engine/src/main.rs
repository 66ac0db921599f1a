//! ToneSet - Main entry point
//!
//! Runs calibration and confidence sessions against a simulated listener.
//!
//! **Usage:**
//! ```bash
//! toneset calibrate --subject 7 [--realtime] [--export <file>]
//! toneset confidence --calibration <file> [--lengths 1,3,5] [--export <file>]
//! ```
//!
//! Ctrl+C pauses the running session and stops it at the next trial boundary.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use toneset_common::config::{self as common_config, LoggingConfig, CONFIG_ENV_VAR};
use toneset_common::events::{EventBus, SessionEvent};
use toneset_common::time;
use toneset_engine::confidence::{compare_calibration_lengths, ConfidenceTest};
use toneset_engine::config::{SessionConfig, TrialTiming};
use toneset_engine::context::{SessionContext, SessionLabel};
use toneset_engine::model::{AudibilityModel, Predictor, RampModel};
use toneset_engine::player::{NoiseSpec, SilentNoise};
use toneset_engine::report::{CalibrationReport, CliFormatter, ConfidenceReport, SessionInfo};
use toneset_engine::results::SubjectResults;
use toneset_engine::runner::{Finished, SessionRunner, SessionTask};
use toneset_engine::simulation::{ListenerProfile, SimulatedListener};
use toneset_engine::sink::{BackgroundSink, FileResultSink};
use toneset_engine::{Protocol, Session, TestOrchestrator};

/// Psychoacoustic threshold estimation and validation
#[derive(Parser, Debug)]
#[command(name = "toneset")]
#[command(about = "Hearing threshold calibration and model validation")]
#[command(version)]
struct Cli {
    /// Config file (TOML)
    #[arg(long, global = true, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a calibration protocol and export its report
    Calibrate(SessionArgs),

    /// Validate a calibration report with a confidence battery
    Confidence(ConfidenceArgs),
}

#[derive(Args, Debug)]
struct SessionArgs {
    /// Subject id (overrides the config file)
    #[arg(long)]
    subject: Option<u32>,

    /// Seed for trial ordering and the simulated listener
    #[arg(long, default_value = "1")]
    seed: u64,

    /// Flat 50% hearing threshold of the simulated listener
    #[arg(long)]
    threshold: Option<f64>,

    /// Slope of the simulated listener's psychometric curve (log-volume)
    #[arg(long, default_value = "0.15")]
    spread: f64,

    /// Use the configured timing instead of running trials back to back
    #[arg(long)]
    realtime: bool,

    /// Export results to JSON file
    #[arg(long, value_name = "FILE")]
    export: Option<PathBuf>,

    /// Session log file (defaults to the results directory)
    #[arg(long, value_name = "FILE")]
    log: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ConfidenceArgs {
    /// Calibration report produced by `toneset calibrate`
    #[arg(long, value_name = "FILE")]
    calibration: PathBuf,

    /// Calibration lengths (trials per volume) to compare
    #[arg(long, value_delimiter = ',')]
    lengths: Vec<usize>,

    #[command(flatten)]
    session: SessionArgs,
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("toneset={0},toneset_engine={0},toneset_common={0}", logging.level).into());

    let file_layer = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<SessionConfig> {
    let resolved = common_config::resolve_config_path(path, CONFIG_ENV_VAR);
    let config: SessionConfig = common_config::load_toml_or_default(resolved.as_deref())
        .context("Failed to load configuration")?;
    Ok(config)
}

/// Apply CLI overrides and collapse timing unless running in real time
fn prepare_config(mut config: SessionConfig, args: &SessionArgs) -> Result<SessionConfig> {
    if let Some(subject) = args.subject {
        config.subject_id = subject;
    }
    if !args.realtime {
        config.timing = TrialTiming::instant();
        config.ramp.slice_ms = 0;
        config.ramp.settle_ms = 0;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn listener_profile(args: &SessionArgs) -> Result<ListenerProfile> {
    let profile = match args.threshold {
        Some(threshold) => ListenerProfile::flat(threshold, args.spread)?,
        None => ListenerProfile::default().with_spread(args.spread)?,
    };
    Ok(profile)
}

fn session_paths(config: &SessionConfig, test: &str) -> PathBuf {
    let dir = config
        .results_dir
        .clone()
        .unwrap_or_else(common_config::default_results_dir)
        .join(format!("subject_{}", config.subject_id));
    let stamp = time::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("{}_{}", test, stamp))
}

/// Build the session context shared by both subcommands
fn build_context(
    session: &Arc<Session>,
    config: &SessionConfig,
    args: &SessionArgs,
    test: &str,
    noise: NoiseSpec,
    events: &EventBus,
) -> Result<SessionContext> {
    let log_path = args
        .log
        .clone()
        .unwrap_or_else(|| session_paths(config, test).with_extension("txt"));
    let sink = BackgroundSink::spawn(
        FileResultSink::open(&log_path)
            .with_context(|| format!("Failed to open session log {}", log_path.display()))?,
    )?;
    info!("Session log: {}", log_path.display());

    let listener = SimulatedListener::new(Arc::clone(session), listener_profile(args)?, args.seed)
        .realtime(args.realtime);

    Ok(SessionContext::new(Arc::clone(session), listener, sink)
        .with_timing(config.timing)
        .with_seed(args.seed)
        .with_events(events.clone())
        .with_noise(SilentNoise::new())
        .with_label(SessionLabel {
            subject_id: config.subject_id,
            test: test.to_string(),
            noise,
        }))
}

/// Print phase progress from the event bus
fn spawn_progress_printer(events: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        let mut phase_index = 0;
        loop {
            match rx.recv().await {
                Ok(SessionEvent::PhaseStarted { phase, .. }) => {
                    phase_index += 1;
                    print!("{}", CliFormatter::format_phase_header(phase_index, &phase));
                }
                Ok(SessionEvent::SessionPaused { reason, .. }) => {
                    println!("Session paused ({:?})", reason);
                }
                Ok(SessionEvent::SessionCompleted { trials, .. }) => {
                    println!("Session complete: {} trials", trials);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Progress output skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Run a task to completion, pausing and stopping it on Ctrl+C
async fn run_session<T: SessionTask + 'static>(task: T, ctx: SessionContext) -> Result<Finished<T>> {
    let runner = SessionRunner::spawn(task, ctx).context("Failed to start session")?;
    let handle = runner.handle();
    let mut join = tokio::task::spawn_blocking(move || runner.join());

    let finished = tokio::select! {
        result = &mut join => result,
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, pausing session");
            handle.pause();
            handle.stop();
            join.await
        }
    };

    Ok(finished.context("Session worker task failed")??)
}

async fn calibrate(config: SessionConfig, args: SessionArgs) -> Result<()> {
    let config = prepare_config(config, &args)?;
    let noise = config.noise_spec()?;
    let events = EventBus::new(1024);
    let printer = spawn_progress_printer(&events);

    let session = Arc::new(Session::new());
    let ctx = build_context(&session, &config, &args, "calibration", noise.clone(), &events)?;
    let orchestrator = TestOrchestrator::new(&config).context("Failed to configure calibration")?;
    info!(
        "Calibrating subject {} ({}, {})",
        config.subject_id, config.protocol, config.stimulus
    );

    let Finished { task, context, completed } = run_session(orchestrator, ctx).await?;
    let (session_id, trials) = (context.session_id(), context.trials_recorded());
    // Closing the last bus sender ends the printer
    drop(context);
    drop(events);
    printer.await.ok();

    if !completed {
        println!("\nSession stopped before completion; no report written");
        return Ok(());
    }

    let mut subject = SubjectResults::new(config.subject_id);
    let completed = task.fold_into(&mut subject, session_id, noise)?;
    let report =
        CalibrationReport::from_completed(&completed, config.subject_id, config.stimulus.clone(), trials);

    print!("{}", CliFormatter::format_ramp_summary(&report.ramp, &report.floors));
    if !report.calibration.is_empty() {
        print!("{}", CliFormatter::format_calibration_table(&report.calibration));
    }
    print!("{}", CliFormatter::format_session_summary(&report));

    let export = args
        .export
        .unwrap_or_else(|| session_paths(&config, "calibration").with_extension("json"));
    report
        .export_json(&export)
        .with_context(|| format!("Failed to export report to {}", export.display()))?;
    println!("\n✓ Results exported to: {}", export.display());
    Ok(())
}

async fn confidence(config: SessionConfig, args: ConfidenceArgs) -> Result<()> {
    let config = prepare_config(config, &args.session)?;
    let noise = config.noise_spec()?;
    let stimulus = config.stimulus_kind()?;

    let calibration_report = CalibrationReport::import_json(&args.calibration)
        .with_context(|| format!("Failed to read calibration report {}", args.calibration.display()))?;
    if calibration_report.ramp.is_empty() {
        bail!("Calibration report {} has no ramp results", args.calibration.display());
    }
    let calibration = calibration_report.calibration_results();

    let (predictor, predictor_name): (Box<dyn Predictor + '_>, &str) =
        if calibration_report.protocol == Protocol::Full && !calibration.is_empty() {
            (Box::new(AudibilityModel::new(&calibration)), "calibrated")
        } else {
            (
                Box::new(RampModel::new(
                    &calibration_report.ramp,
                    Some(&calibration_report.floors),
                    config.confidence.ramp_curve,
                )),
                "ramp",
            )
        };

    let mut rng = StdRng::seed_from_u64(args.session.seed);
    let test = ConfidenceTest::design(
        predictor.as_ref(),
        &config.confidence_frequencies,
        stimulus,
        &config.confidence,
        config.timing.tone_duration_ms,
        &mut rng,
    )
    .context("Failed to design confidence battery")?;
    info!(
        "Confidence battery: {} cases, {} trials ({} predictor)",
        test.cases().len(),
        test.schedule_len(),
        predictor_name
    );

    let events = EventBus::new(1024);
    let printer = spawn_progress_printer(&events);
    let session = Arc::new(Session::new());
    let ctx = build_context(&session, &config, &args.session, "confidence", noise.clone(), &events)?;

    let Finished { task, context, completed } = run_session(test, ctx).await?;
    let (session_id, trials) = (context.session_id(), context.trials_recorded());
    drop(context);
    drop(events);
    printer.await.ok();

    if !completed {
        println!("\nSession stopped before completion; no analysis written");
        return Ok(());
    }

    let mut subject = SubjectResults::new(config.subject_id);
    let completed = subject.add_confidence(task.completed(session_id, noise.clone())?);

    let lengths = if predictor_name == "calibrated" && !args.lengths.is_empty() {
        compare_calibration_lengths(&calibration, &completed.results, &args.lengths, config.confidence.alpha)?
    } else {
        Vec::new()
    };

    let report = ConfidenceReport::new(
        SessionInfo::new(
            session_id,
            config.subject_id,
            config.stimulus.clone(),
            noise,
            trials,
        ),
        Some(calibration_report.session.session_id),
        predictor_name,
        config.confidence.alpha,
        task.analyze()?,
    )
    .with_calibration_lengths(lengths);

    print!("{}", CliFormatter::format_analysis(&report));

    let export = args
        .session
        .export
        .unwrap_or_else(|| session_paths(&config, "confidence").with_extension("json"));
    report
        .export_json(&export)
        .with_context(|| format!("Failed to export report to {}", export.display()))?;
    println!("\n✓ Results exported to: {}", export.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.logging)?;

    match cli.command {
        Command::Calibrate(args) => calibrate(config, args).await,
        Command::Confidence(args) => confidence(config, args).await,
    }
}
