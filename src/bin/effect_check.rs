use anyhow::{anyhow, Context, Result};
use kestrel_fx::particles::RecordingRenderer;
use kestrel_fx::{FxConfig, ParticleEffect};
use std::env;
use std::path::PathBuf;
use std::process;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match run() {
        Ok(summary) => {
            if summary.failed > 0 {
                process::exit(2);
            }
        }
        Err(err) => {
            eprintln!("effect_check error: {err:?}");
            process::exit(1);
        }
    }
}

#[derive(Default)]
struct RunSummary {
    checked: usize,
    failed: usize,
}

struct CliOptions {
    seconds: f32,
    fps: f32,
    stop_after: Option<f32>,
    config: Option<PathBuf>,
    show_help: bool,
    targets: Vec<PathBuf>,
}

struct EffectReport {
    systems: usize,
    peak_particles: usize,
    peak_quads: usize,
    finished_at: Option<f32>,
}

fn run() -> Result<RunSummary> {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = parse_cli_args(&args)?;
    if options.show_help {
        print_usage();
        return Ok(RunSummary::default());
    }
    if options.targets.is_empty() {
        return Err(anyhow!("no effect files given"));
    }
    let config = match &options.config {
        Some(path) => FxConfig::load(path)?,
        None => FxConfig::default(),
    };
    let mut summary = RunSummary::default();
    for path in &options.targets {
        summary.checked += 1;
        let mut effect = ParticleEffect::new();
        if let Err(err) = effect.load_effect(path, &config) {
            summary.failed += 1;
            println!("FAIL {}: {err:#}", path.display());
            continue;
        }
        let report = simulate(&mut effect, &options, &config)
            .with_context(|| format!("Failed to simulate {}", path.display()))?;
        let ending = match report.finished_at {
            Some(time) => format!("finished at {time:.2}s"),
            None => "still alive".to_string(),
        };
        println!(
            "OK {} systems={} peak_particles={} peak_quads={} {}",
            path.display(),
            report.systems,
            report.peak_particles,
            report.peak_quads,
            ending
        );
    }
    println!("Checked {} effects ({} failed)", summary.checked, summary.failed);
    Ok(summary)
}

fn simulate(effect: &mut ParticleEffect, options: &CliOptions, config: &FxConfig) -> Result<EffectReport> {
    let dt = config.clamp_step(1.0 / options.fps);
    let steps = (options.seconds * options.fps).ceil() as usize;
    let mut renderer = RecordingRenderer::new();
    let mut report = EffectReport {
        systems: effect.num_systems(),
        peak_particles: 0,
        peak_quads: 0,
        finished_at: None,
    };
    let mut stopped = false;
    for step in 0..steps {
        let time = step as f32 * dt;
        if let Some(stop_after) = options.stop_after {
            if !stopped && time >= stop_after {
                effect.stop(false);
                stopped = true;
            }
        }
        effect.update(dt);
        report.peak_particles = report.peak_particles.max(effect.num_particles());
        renderer.clear();
        effect.draw(&mut renderer)?;
        report.peak_quads = report.peak_quads.max(renderer.total_quads());
        if !effect.is_alive() {
            report.finished_at = Some(time + dt);
            break;
        }
    }
    Ok(report)
}

fn print_usage() {
    eprintln!(
        "Effect Check

Usage:
  effect_check [--seconds <s>] [--fps <n>] [--stop-after <s>] [--config <path>] <effect.json> [...]

Loads each effect description, simulates it headlessly and prints particle
peaks. Use --stop-after to stop emission partway through so looping effects
can be checked for termination. Exits with code 2 when any effect fails to load.
"
    );
}

fn parse_cli_args(args: &[String]) -> Result<CliOptions> {
    let mut options =
        CliOptions { seconds: 5.0, fps: 60.0, stop_after: None, config: None, show_help: false, targets: Vec::new() };
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--seconds" => options.seconds = parse_positive(arg, iter.next())?,
            "--fps" => options.fps = parse_positive(arg, iter.next())?,
            "--stop-after" => options.stop_after = Some(parse_positive(arg, iter.next())?),
            "--config" => {
                let value = iter.next().ok_or_else(|| anyhow!("missing value for '{arg}'"))?;
                options.config = Some(PathBuf::from(value));
            }
            "--help" | "-h" => options.show_help = true,
            _ if arg.starts_with("--") => {
                return Err(anyhow!("unknown flag '{arg}'"));
            }
            _ => options.targets.push(PathBuf::from(arg)),
        }
    }
    Ok(options)
}

fn parse_positive(flag: &str, value: Option<&String>) -> Result<f32> {
    let value = value.ok_or_else(|| anyhow!("missing value for '{flag}'"))?;
    let parsed: f32 = value.parse().with_context(|| format!("invalid value '{value}' for '{flag}'"))?;
    if !parsed.is_finite() || parsed <= 0.0 {
        return Err(anyhow!("'{flag}' must be a positive number, got {value}"));
    }
    Ok(parsed)
}
