//! PolyTouch CLI
//!
//! Tracks a multi-contact recording and drives closed-loop audio feedback.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use polytouch::{
    audio::{AudioSink, NullSink, PcmFileSink, SinkFactory},
    channel::{LatestSample, SessionChannel, SessionKey},
    collector::{Collector, CollectorConfig, ReplaySource},
    config::{Config, SessionParams},
    feedback::{FeedbackController, FeedbackProtocol, FeedbackSettings},
    session::{run_tracking, SessionContext, Tracker, TrackerSettings},
    stats::SessionStats,
    VERSION,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "polytouch")]
#[command(version = VERSION)]
#[command(about = "Multi-contact tracking with closed-loop audio feedback", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a tracking session over a recorded event stream
    Run {
        /// Recording to replay (`-` reads stdin)
        #[arg(long, default_value = "-")]
        events: String,

        /// Replay at recorded speed instead of as fast as possible
        #[arg(long)]
        pace: bool,

        /// Session parameter file (overrides the configured path)
        #[arg(long)]
        params: Option<PathBuf>,

        /// Data directory for session channels and stats
        #[arg(long)]
        data: Option<PathBuf>,

        /// Append raw PCM output to this file instead of discarding it
        #[arg(long)]
        audio_out: Option<PathBuf>,

        /// Seed for the randomized stimulus schedule
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show the last tracking sample of a session
    Latest {
        #[arg(long)]
        params: Option<PathBuf>,

        #[arg(long)]
        data: Option<PathBuf>,
    },

    /// Show the session parameters and the protocol they select
    Params {
        #[arg(long)]
        params: Option<PathBuf>,
    },

    /// Show configuration
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            events,
            pace,
            params,
            data,
            audio_out,
            seed,
        } => cmd_run(&events, pace, params, data, audio_out, seed),
        Commands::Latest { params, data } => cmd_latest(params, data),
        Commands::Params { params } => cmd_params(params),
        Commands::Config => {
            cmd_config();
            Ok(())
        }
    }
}

/// Load the configuration and apply command-line path overrides.
fn load_config(params: Option<PathBuf>, data: Option<PathBuf>) -> Config {
    let mut config = Config::load().unwrap_or_default();
    if let Some(path) = params {
        config.params_path = path;
    }
    if let Some(path) = data {
        config.data_path = path;
    }
    config
}

fn load_params(config: &Config) -> Result<SessionParams> {
    SessionParams::load(&config.params_path).with_context(|| {
        format!(
            "Session parameters are required (looked in {:?})",
            config.params_path
        )
    })
}

fn cmd_run(
    events: &str,
    pace: bool,
    params: Option<PathBuf>,
    data: Option<PathBuf>,
    audio_out: Option<PathBuf>,
    seed: Option<u64>,
) -> Result<()> {
    println!("PolyTouch v{VERSION}");
    println!();

    let config = load_config(params, data);
    let params = load_params(&config)?;
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let protocol = FeedbackProtocol::select(params.protocol, params.session);
    let key = SessionKey::from_params(&params);

    println!("Starting session {key}...");
    println!("  Protocol: {protocol}");
    println!("  Duration: {}s", params.session_duration);
    println!(
        "  Target: ({}, {}) radius {}cm",
        params.target_x, params.target_y, params.target_radius
    );
    println!("  Data: {:?}", config.data_path);
    match &audio_out {
        Some(path) => println!("  Audio: {path:?}"),
        None => println!("  Audio: discarded"),
    }
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let token = CancellationToken::new();
    let abort = token.clone();
    ctrlc::set_handler(move || abort.cancel()).context("Error setting Ctrl+C handler")?;

    let ctx = SessionContext::with_token(params, token);
    let channel = SessionChannel::open_files(&config.data_path, &key);
    channel
        .start()
        .with_context(|| format!("Could not reset session channel in {:?}", config.data_path))?;
    let stats = Arc::new(SessionStats::with_persistence(
        key,
        config.data_path.join(key.stats_file_name()),
    ));

    let floor = config.level_floor_db;
    let sinks: Arc<dyn SinkFactory> = match audio_out {
        Some(path) => Arc::new(move || -> Box<dyn AudioSink> {
            Box::new(PcmFileSink::new(path.clone(), floor))
        }),
        None => Arc::new(move || -> Box<dyn AudioSink> { Box::new(NullSink::new(floor)) }),
    };

    let mut collector = Collector::new(CollectorConfig {
        source: ReplaySource::from_arg(events),
        pace,
    });
    collector.start().context("Error starting collector")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Could not start feedback runtime")?;
    let feedback = FeedbackController::new(
        ctx.clone(),
        channel.clone(),
        sinks,
        stats.clone(),
        FeedbackSettings {
            seed,
            ..FeedbackSettings::from_config(&config)
        },
    );
    let feedback_handle = runtime.spawn(feedback.run());

    let mut tracker = Tracker::new(
        ctx,
        channel,
        stats.clone(),
        TrackerSettings::from_config(&config),
    );
    let exit = run_tracking(&mut tracker, collector.receiver());
    collector.stop();

    let report = match runtime.block_on(feedback_handle) {
        Ok(report) => Some(report),
        Err(e) => {
            warn!(error = %e, "Feedback task failed");
            None
        }
    };

    if let Err(e) = stats.save() {
        warn!(error = %e, "Could not save session stats");
    }

    println!();
    println!("Session stopped: {exit:?}");
    if let Some(report) = report {
        println!(
            "  Feedback decisions: {}{}",
            report.decisions,
            if report.schedule_exhausted {
                " (schedule exhausted)"
            } else {
                ""
            }
        );
    }
    println!();
    println!("{}", stats.summary());
    println!();
    println!("Recent states:");
    for entry in tracker.state_log().entries() {
        println!("  {entry}");
    }

    Ok(())
}

fn cmd_latest(params: Option<PathBuf>, data: Option<PathBuf>) -> Result<()> {
    let config = load_config(params, data);
    let params = load_params(&config)?;
    let key = SessionKey::from_params(&params);
    let channel = SessionChannel::open_files(&config.data_path, &key);

    println!("Session {key}");
    println!();

    let line = channel
        .latest_line()
        .with_context(|| format!("Could not read session channel in {:?}", config.data_path))?;
    match line {
        None => println!("No data yet"),
        Some(line) => {
            println!("Last line: {line}");
            match LatestSample::parse(&line) {
                Some(sample) => {
                    println!("  Elapsed: {:.3}s", sample.elapsed_secs());
                    println!("  Relative distance: {:.2}cm", sample.relative_distance);
                    println!("  Speed: {:.2}", sample.speed);
                }
                None => println!("  (incomplete record)"),
            }
        }
    }
    if let Some(trigger) = channel.latest_trigger() {
        println!(
            "Last trigger: {:.2}cm at {:.3}s",
            trigger.relative_distance,
            trigger.elapsed_ns as f64 / 1e9
        );
    }
    Ok(())
}

fn cmd_params(params: Option<PathBuf>) -> Result<()> {
    let config = load_config(params, None);
    let params = load_params(&config)?;

    println!("Session Parameters");
    println!("==================");
    println!();
    println!("File: {:?}", config.params_path);
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&params).unwrap_or_else(|_| "Error".to_string())
    );
    println!();
    println!(
        "Protocol: {}",
        FeedbackProtocol::select(params.protocol, params.session)
    );
    Ok(())
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}
