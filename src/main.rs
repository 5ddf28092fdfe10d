use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{debug, info, warn};

mod automation;
mod config;
mod controller;
mod device;
mod gain;
mod graph;
mod noise;
mod offline;
mod session;

use config::{Config, DEFAULT_DB_A, DEFAULT_DB_B, DEVICE_ENV};
use controller::{help_text, Command, Controller, Outcome};
use device::DeviceContext;
use gain::{Readout, Selector};
use offline::{write_wav, OfflineContext};
use session::AudioSession;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Play(args) => run_play(args),
        Commands::Render(args) => run_render(args),
        Commands::Info(args) => run_info(args),
        Commands::Devices => run_devices(),
    }
}

#[derive(Parser)]
#[command(author, version, about = "Hear the difference between two dB levels with A/B white noise")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive A/B playback on an output device.
    Play(PlayArgs),
    /// Render an A/B comparison to a WAV file.
    Render(RenderArgs),
    /// Print delta, ratio and gains for two levels.
    Info(LevelArgs),
    /// List output devices.
    Devices,
}

#[derive(Args, Clone)]
struct LevelArgs {
    /// Level A in dB (20-90).
    #[arg(long, default_value_t = DEFAULT_DB_A, allow_negative_numbers = true)]
    db_a: f32,
    /// Level B in dB (20-90).
    #[arg(long, default_value_t = DEFAULT_DB_B, allow_negative_numbers = true)]
    db_b: f32,
    /// Which level is audible first.
    #[arg(long, value_enum, default_value_t = Selector::A)]
    active: Selector,
    /// Print readouts as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct PlayArgs {
    #[command(flatten)]
    levels: LevelArgs,
    /// Output device name (defaults to the host default).
    #[arg(long, env = DEVICE_ENV)]
    device: Option<String>,
    /// Gain smoothing time constant in milliseconds.
    #[arg(long, default_value_t = 20.0)]
    time_constant_ms: f32,
    /// Length of the looped noise buffer in seconds.
    #[arg(long, default_value_t = 2.0)]
    noise_seconds: f32,
}

#[derive(Args)]
struct RenderArgs {
    #[command(flatten)]
    levels: LevelArgs,
    /// Output WAV path.
    #[arg(long)]
    out: PathBuf,
    /// Seconds per A or B segment.
    #[arg(long, default_value_t = 1.0)]
    segment_seconds: f32,
    /// Number of A/B switches after the first segment.
    #[arg(long, default_value_t = 3)]
    switches: u32,
    #[arg(long, default_value_t = 48_000)]
    sample_rate: u32,
    /// Gain smoothing time constant in milliseconds.
    #[arg(long, default_value_t = 20.0)]
    time_constant_ms: f32,
    /// Seed for reproducible noise.
    #[arg(long)]
    seed: Option<u64>,
}

impl LevelArgs {
    fn config(&self) -> Config {
        Config {
            db_a: self.db_a,
            db_b: self.db_b,
            active: self.active,
            ..Config::default()
        }
    }
}

fn run_info(args: LevelArgs) -> Result<()> {
    let cfg = args.config().normalized();
    let readout = Readout::new(cfg.db_a, cfg.db_b);
    if args.json {
        println!("{}", serde_json::to_string(&readout)?);
    } else {
        println!("A {:.1} dB | B {:.1} dB", cfg.db_a, cfg.db_b);
        println!("{readout}");
    }
    Ok(())
}

fn run_devices() -> Result<()> {
    let names = device::output_device_names();
    if names.is_empty() {
        warn!("no output devices found");
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}

fn run_play(args: PlayArgs) -> Result<()> {
    let cfg = Config {
        device: args.device.clone(),
        noise_seconds: args.noise_seconds,
        time_constant: args.time_constant_ms / 1000.0,
        ..args.levels.config()
    }
    .normalized();

    println!("🎧 dB A/B comparator (relative, not calibrated SPL)");
    let device = cfg.device.clone();
    let session = AudioSession::new(move || DeviceContext::new(device.as_deref()), cfg.db_a, cfg.db_b, cfg.active)
        .with_time_constant(cfg.time_constant)
        .with_noise_seconds(cfg.noise_seconds);
    let mut controller = Controller::new(session, args.levels.json);

    println!("{}", help_text());
    println!("{}", controller.render_status());

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let cmd = match line.parse::<Command>() {
            Ok(cmd) => cmd,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        if cmd == Command::Help {
            println!("{}", help_text());
            continue;
        }
        match controller.handle(cmd) {
            Ok(Outcome::Quit) => break,
            Ok(Outcome::Continue) => {}
            Err(e) => return Err(e.context("audio output failed")),
        }
        println!("{}", controller.render_status());
        stdout.flush()?;
    }

    if controller.session().is_playing() {
        controller.session_mut().stop();
    }
    Ok(())
}

fn run_render(args: RenderArgs) -> Result<()> {
    let cfg = Config {
        time_constant: args.time_constant_ms / 1000.0,
        ..args.levels.config()
    }
    .normalized();

    let sample_rate = args.sample_rate;
    let mut session = AudioSession::new(move || Ok(OfflineContext::new(sample_rate)), cfg.db_a, cfg.db_b, cfg.active)
        .with_time_constant(cfg.time_constant)
        .with_noise_seconds(cfg.noise_seconds);
    if let Some(seed) = args.seed {
        session = session.with_seed(seed);
    }

    session.start()?;
    let mut samples = Vec::new();
    for i in 0..=args.switches {
        if i > 0 {
            session.set_active(session.active().toggled());
        }
        let ctx = session.context_mut().context("offline context missing after start")?;
        samples.extend(ctx.render_seconds(args.segment_seconds));
    }
    session.stop();
    if let Some(ctx) = session.context() {
        debug!(
            "offline render: {} voice(s) created, {} left connected",
            ctx.voices_created(),
            ctx.connected()
        );
    }

    write_wav(&args.out, &samples, sample_rate)?;
    info!(
        "wrote {} ({:.2} s, {})",
        args.out.display(),
        samples.len() as f32 / sample_rate as f32,
        Readout::new(cfg.db_a, cfg.db_b)
    );
    Ok(())
}
