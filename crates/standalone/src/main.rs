//! The `oneloop` binary.
//!
//! Without `--worker` it runs as the master: it parses the sweep
//! definition, opens the data container, spawns the worker pool by
//! re-executing itself, and drives the phases to completion. With
//! `--worker` it runs the worker loop over its standard pipes; that
//! mode is spawned by the master and not meant to be used directly.

use std::path::PathBuf;
use std::process::{Command, ExitCode};
use std::str::FromStr;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use log::error;
use oneloop_core::config::{ArgumentCache, SampleRange, Spacing};
use oneloop_core::transport::StreamEndpoint;
use oneloop_core::{worker, MasterController, ProcessPool};
use oneloop_cosmology::{frw, FilterParams, GrowthParams, LoopParams, MatsubaraXyParams};

/// `min:max:steps` with an optional `log:` prefix.
#[derive(Debug, Clone, Copy)]
struct RangeSpec(SampleRange);

impl FromStr for RangeSpec {
    type Err = String;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let (spacing, rest) = match spec.strip_prefix("log:") {
            Some(rest) => (Spacing::Logarithmic, rest),
            None => (Spacing::Linear, spec),
        };
        let fields: Vec<&str> = rest.split(':').collect();
        let &[min, max, steps] = fields.as_slice() else {
            return Err(format!("expected min:max:steps, found `{spec}`"));
        };
        let parse_f64 =
            |field: &str| field.parse::<f64>().map_err(|e| format!("`{field}`: {e}"));
        Ok(RangeSpec(SampleRange {
            min: parse_f64(min)?,
            max: parse_f64(max)?,
            steps: steps.parse().map_err(|e| format!("`{steps}`: {e}"))?,
            spacing,
        }))
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelPreset {
    /// Parameters matching the MDR1 simulation.
    Mdr1,
    /// Parameters matching the Big MultiDark Planck simulation.
    BigMdpl,
}

#[derive(Parser, Debug)]
#[command(name = "oneloop", about = "One-loop perturbation theory pipeline", version)]
struct Cli {
    /// Run the worker loop over stdin/stdout (spawned by the master).
    #[arg(long, hide = true)]
    worker: bool,

    /// SQLite data container.
    #[arg(long, default_value = "oneloop.sqlite")]
    container: PathBuf,

    /// Initial linear power spectrum, two-column ASCII in Mpc units.
    #[arg(long, required_unless_present = "worker")]
    pk: Option<PathBuf>,

    /// Optional final linear power spectrum.
    #[arg(long)]
    pk_final: Option<PathBuf>,

    /// Background model preset.
    #[arg(long, value_enum, default_value_t = ModelPreset::Mdr1)]
    model: ModelPreset,

    /// Redshift sweep, min:max:steps.
    #[arg(long, default_value = "0:2:9")]
    z_samples: RangeSpec,

    /// Wavenumber sweep in 1/Mpc, [log:]min:max:steps.
    #[arg(long, default_value = "log:0.01:0.8:16")]
    k_samples: RangeSpec,

    /// UV cutoff sweep in 1/Mpc.
    #[arg(long, default_value = "1.0:1.0:1")]
    uv_samples: RangeSpec,

    /// IR cutoff sweep in 1/Mpc.
    #[arg(long, default_value = "0.0001:0.0001:1")]
    ir_samples: RangeSpec,

    /// IR resummation scale sweep in 1/Mpc.
    #[arg(long, default_value = "1.4:1.4:1")]
    ir_resum_samples: RangeSpec,

    /// Number of worker processes.
    #[arg(long, default_value_t = default_workers())]
    workers: usize,

    /// Enforce foreign-key consistency inside the container.
    #[arg(long)]
    strict: bool,

    /// Use Einstein-de Sitter limits instead of the growth ODE.
    #[arg(long)]
    eds: bool,

    /// Relative tolerance for the loop-kernel integrals.
    #[arg(long)]
    loop_rel_tol: Option<f64>,

    /// Absolute tolerance for the loop-kernel integrals.
    #[arg(long)]
    loop_abs_tol: Option<f64>,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1).max(1))
        .unwrap_or(1)
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    if cli.worker {
        return run_worker();
    }

    match run_master(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run_worker() -> ExitCode {
    let stdin = std::io::stdin().lock();
    let stdout = std::io::stdout().lock();
    let mut endpoint = StreamEndpoint::new(stdin, stdout);
    match worker::run(&mut endpoint) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("worker failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run_master(cli: Cli) -> anyhow::Result<()> {
    let model = match cli.model {
        ModelPreset::Mdr1 => frw::mdr1(),
        ModelPreset::BigMdpl => frw::big_mdpl(),
    };

    let mut loop_params = LoopParams::default();
    if let Some(abs_tol) = cli.loop_abs_tol {
        loop_params.abs_tol = abs_tol;
    }
    if let Some(rel_tol) = cli.loop_rel_tol {
        loop_params.rel_tol = rel_tol;
    }

    let args = ArgumentCache {
        container: cli.container,
        pk_init: cli.pk.context("--pk is required in master mode")?,
        pk_final: cli.pk_final,
        model,
        z_samples: cli.z_samples.0,
        k_samples: cli.k_samples.0,
        uv_samples: cli.uv_samples.0,
        ir_samples: cli.ir_samples.0,
        ir_resum_samples: cli.ir_resum_samples.0,
        filter_params: FilterParams::default(),
        growth_params: GrowthParams {
            eds_mode: cli.eds,
            ..GrowthParams::default()
        },
        loop_params,
        xy_params: MatsubaraXyParams::default(),
        workers: cli.workers,
        strict_consistency: cli.strict,
    };

    let exe = std::env::current_exe().context("cannot locate the running executable")?;
    let mut pool = ProcessPool::spawn(
        || {
            let mut command = Command::new(&exe);
            command.arg("--worker");
            command
        },
        args.workers,
    )?;

    // TERMINATE is broadcast on both clean and failed exits.
    let result = MasterController::new(args).execute(&mut pool);
    pool.shutdown();
    result.map_err(Into::into)
}
