use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::info;

use rbf_observer::excitation::ExcitationPlan;
use rbf_observer::session::{self, DetectionRun};
use rbf_observer::storage;
use rbf_observer::types::STATE_LABELS;
use rbf_observer::{GridBasis, GridConfig, ObserverConfig, Trajectory, WeightSnapshot};

#[derive(Parser, Debug)]
#[command(name = "rbf_observer")]
#[command(about = "Deterministic-learning RBF observer: train on nominal runs, flag faults on new ones", long_about = None)]
struct Args {
    /// JSON config (grid, gains, envelope); defaults are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Learn weights from a nominal trajectory
    Train {
        /// Trajectory (.json or .json.gz)
        #[arg(long)]
        data: PathBuf,

        /// Output weight snapshot (.json or .json.gz)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Use the wide 16-node detection grid instead of the configured one
        #[arg(long, default_value_t = false)]
        detection_grid: bool,
    },

    /// Replay frozen weights and compute the residual envelope
    Detect {
        /// Weight snapshot written by `train`
        #[arg(long)]
        weights: PathBuf,

        /// One or more trajectories; several are processed in parallel
        #[arg(long, required = true, num_args = 1..)]
        data: Vec<PathBuf>,

        /// Envelope window override (samples)
        #[arg(long)]
        window: Option<usize>,

        /// Warm-up samples dropped before smoothing
        #[arg(long)]
        warmup: Option<usize>,

        /// Output directory for reports
        #[arg(long, default_value = "detection_reports")]
        output_dir: PathBuf,
    },

    /// Write the default configuration as a starting point for editing
    InitConfig {
        #[arg(long, default_value = "observer_config.json")]
        out: PathBuf,
    },

    /// Write the actuator excitation schedule, framed by approach and retreat moves
    Excite {
        #[arg(long, default_value = "10")]
        amplitude: u32,

        #[arg(long, default_value = "5")]
        nominal_rounds: usize,

        #[arg(long, default_value = "5")]
        fault_rounds: usize,

        /// Motor (0-based) held at zero during fault rounds
        #[arg(long)]
        fault_motor: Option<usize>,

        #[arg(long, default_value = "excitation.json")]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ObserverConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ObserverConfig::default(),
    };

    match args.command {
        Command::Train {
            data,
            out,
            detection_grid,
        } => run_train(&config, &data, out, detection_grid),
        Command::Detect {
            weights,
            data,
            window,
            warmup,
            output_dir,
        } => {
            let mut config = config;
            if let Some(window) = window {
                config.envelope.window = window;
            }
            if let Some(warmup) = warmup {
                config.envelope.warmup = warmup;
            }
            config.validate()?;
            run_detect(&config, &weights, &data, &output_dir)
        }
        Command::InitConfig { out } => {
            config.save(&out)?;
            info!("Wrote configuration to {}", out.display());
            Ok(())
        }
        Command::Excite {
            amplitude,
            nominal_rounds,
            fault_rounds,
            fault_motor,
            out,
        } => {
            let plan = ExcitationPlan {
                amplitude,
                nominal_rounds,
                fault_rounds,
                fault_motor,
            };
            let mut schedule = plan.approach();
            schedule.extend(plan.schedule()?);
            schedule.extend(plan.retreat());
            storage::write_json(&out, &schedule)?;
            info!("Wrote {} excitation steps to {}", schedule.len(), out.display());
            Ok(())
        }
    }
}

fn run_train(
    config: &ObserverConfig,
    data: &Path,
    out: Option<PathBuf>,
    detection_grid: bool,
) -> Result<()> {
    let trajectory = Trajectory::load(data)
        .with_context(|| format!("loading trajectory {}", data.display()))?;
    if trajectory.is_empty() {
        bail!("trajectory {} has no samples", data.display());
    }

    let grid = if detection_grid {
        GridConfig::detection_default()
    } else {
        config.grid.clone()
    };
    let basis = GridBasis::new(grid)?;
    info!(
        "Training on {} samples, {} centers",
        trajectory.len(),
        basis.len()
    );

    let run = session::train(&basis, config.training, &trajectory)?;
    if let Some(rmse) = run.tracking_rmse(config.transient_steps) {
        for (label, value) in STATE_LABELS.iter().zip(rmse.iter()) {
            info!("  tracking RMSE {label}: {value:.4}");
        }
    }

    let out = out.unwrap_or_else(|| PathBuf::from(format!("weights_{}.json.gz", ts_now_clean())));
    run.snapshot.save(&out)?;
    info!("Saved weights ({} steps) to {}", run.snapshot.steps, out.display());
    Ok(())
}

fn run_detect(
    config: &ObserverConfig,
    weights: &Path,
    data: &[PathBuf],
    output_dir: &Path,
) -> Result<()> {
    let snapshot = WeightSnapshot::load(weights)
        .with_context(|| format!("loading weights {}", weights.display()))?;
    // The snapshot's grid is authoritative; the config grid only matters for training
    let basis = GridBasis::new(snapshot.grid.clone())?;

    let trajectories = data
        .iter()
        .map(|path| {
            Trajectory::load(path).with_context(|| format!("loading trajectory {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let runs: Vec<DetectionRun> = if trajectories.len() == 1 {
        vec![session::detect(
            &basis,
            &snapshot,
            config.estimation,
            &config.envelope,
            &trajectories[0],
        )?]
    } else {
        session::detect_units(
            &basis,
            &snapshot,
            config.estimation,
            &config.envelope,
            &trajectories,
        )?
    };

    std::fs::create_dir_all(output_dir)?;
    for (path, run) in data.iter().zip(&runs) {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("trajectory");
        let report_path = output_dir.join(format!("{stem}_detection.json"));
        storage::write_json(&report_path, &run.report())?;

        if let Some(peak) = run
            .envelope
            .iter()
            .copied()
            .reduce(|a, b| a.sup(&b))
        {
            info!(
                "{}: peak envelope x={:.3} z={:.3} y={:.3} -> {}",
                stem,
                peak[2],
                peak[3],
                peak[4],
                report_path.display()
            );
        }
    }
    Ok(())
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
