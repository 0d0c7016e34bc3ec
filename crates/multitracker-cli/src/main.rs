//! multitracker: command-line front end for the mixer engine

mod config;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use multitracker_core::{conversions::format_time, ProjectRecord, TrackId};
use multitracker_services::{default_output_info, AudioInputService, MixerEngine};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{load_config, save_config, AppConfig};

const DECODE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "multitracker", about = "Multitrack mixer engine")]
struct Cli {
    /// Override the engine sample rate
    #[arg(long, global = true)]
    sample_rate: Option<u32>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List audio devices
    Devices,
    /// Render a project to a stereo WAV file
    Mix {
        /// Project JSON (name, bpm, tracks)
        project: PathBuf,
        /// Directory holding `<track id>.wav` clips
        #[arg(short, long)]
        audio_dir: Option<PathBuf>,
        #[arg(short, long, default_value = "mix.wav")]
        output: PathBuf,
    },
    /// Play a project through the default output device
    Play {
        project: PathBuf,
        #[arg(short, long)]
        audio_dir: Option<PathBuf>,
        /// Start position in seconds
        #[arg(long, default_value_t = 0.0)]
        from: f64,
        /// Enable the metronome click
        #[arg(long)]
        click: bool,
    },
    /// Record from an input device into a WAV file
    Record {
        /// Length in seconds
        seconds: f64,
        #[arg(short, long, default_value = "take.wav")]
        output: PathBuf,
        /// Input device name (saved as the new default)
        #[arg(short, long)]
        device: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("multitracker=info".parse()?)
            .add_directive("multitracker_services=info".parse()?))
        .init();

    let cli = Cli::parse();
    let mut config = load_config();
    if let Some(sample_rate) = cli.sample_rate {
        config.engine.sample_rate = sample_rate;
    }

    match cli.command {
        Commands::Devices => list_devices(),
        Commands::Mix { project, audio_dir, output } => {
            mix(&config, &project, audio_dir.as_deref(), &output)
        }
        Commands::Play { project, audio_dir, from, click } => {
            play(&config, &project, audio_dir.as_deref(), from, click)
        }
        Commands::Record { seconds, output, device } => {
            if let Some(device) = device {
                config.input_device = device;
                if let Err(e) = save_config(&config) {
                    warn!("Failed to save config: {}", e);
                }
            }
            record(&config, seconds, &output)
        }
    }
}

fn list_devices() -> Result<()> {
    match default_output_info() {
        Ok((name, sample_rate, channels)) => {
            println!("output: {} ({} Hz, {} ch)", name, sample_rate, channels);
        }
        Err(e) => println!("output: unavailable ({})", e),
    }
    for device in AudioInputService::list_devices()? {
        let marker = if device.is_default { "*" } else { " " };
        println!(
            "input {} {} ({} Hz, {} ch)",
            marker, device.name, device.sample_rate, device.channels
        );
    }
    Ok(())
}

/// Read the project JSON and the clips of every track that has audio.
fn read_project(path: &Path, audio_dir: Option<&Path>) -> Result<(ProjectRecord, HashMap<TrackId, Vec<u8>>)> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let project: ProjectRecord = serde_json::from_str(&text)
        .with_context(|| format!("Invalid project file {}", path.display()))?;

    let dir = audio_dir
        .map(Path::to_path_buf)
        .or_else(|| path.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    let mut clips = HashMap::new();
    for record in project.tracks.iter().filter(|r| r.has_audio) {
        let clip = dir.join(format!("{}.wav", record.id));
        match std::fs::read(&clip) {
            Ok(bytes) => {
                clips.insert(record.id, bytes);
            }
            Err(e) => warn!(track = %record.id, path = %clip.display(), "Missing clip: {}", e),
        }
    }
    Ok((project, clips))
}

fn load(engine: &mut MixerEngine, path: &Path, audio_dir: Option<&Path>) -> Result<ProjectRecord> {
    let (project, clips) = read_project(path, audio_dir)?;
    engine.load_project(&project, clips)?;
    for failure in engine.await_decodes(DECODE_TIMEOUT)? {
        warn!("{}", failure);
    }
    Ok(project)
}

fn mix(config: &AppConfig, path: &Path, audio_dir: Option<&Path>, output: &Path) -> Result<()> {
    let mut engine = MixerEngine::new(config.engine.clone());
    engine.initialize_detached();
    let project = load(&mut engine, path, audio_dir)?;

    let bytes = engine.export_mix(&project.name)?;
    std::fs::write(output, &bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "{} -> {} ({})",
        project.name,
        output.display(),
        format_time(engine.project_duration()?)
    );
    Ok(())
}

fn play(config: &AppConfig, path: &Path, audio_dir: Option<&Path>, from: f64, click: bool) -> Result<()> {
    let mut engine = MixerEngine::new(config.engine.clone());
    engine.initialize().context("No audio output available")?;
    let project = load(&mut engine, path, audio_dir)?;

    let duration = engine.project_duration()?;
    engine.set_metronome(click)?;
    engine.seek(from)?;
    engine.play()?;
    info!(project = %project.name, duration, "Playing");

    while engine.current_time()? < duration {
        thread::sleep(Duration::from_millis(250));
        let peak = engine.master_tap()?.peak();
        println!("{}  peak {:.3}", engine.format_time()?, peak);
    }
    engine.stop()?;
    Ok(())
}

fn record(config: &AppConfig, seconds: f64, output: &Path) -> Result<()> {
    if seconds.is_nan() || seconds <= 0.0 {
        bail!("Recording length must be positive");
    }
    let engine = MixerEngine::new(config.engine.clone());
    let mut session = engine.start_capture(config.input_device())?;
    println!("Recording {:.1}s from {}", seconds, config.input_device());

    let started = Instant::now();
    while started.elapsed().as_secs_f64() < seconds {
        thread::sleep(Duration::from_millis(50));
        session.poll();
    }
    let clip = session.stop()?;
    std::fs::write(output, &clip.encoded)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "{} frames at {} Hz -> {}",
        clip.buffer.frames(),
        clip.buffer.sample_rate(),
        output.display()
    );
    Ok(())
}
