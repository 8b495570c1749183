//! The argument cache: everything the master consumes, read-only.
//!
//! Built by the binary from the command line and handed to the
//! controller; the core never parses arguments itself.

use std::path::PathBuf;

use oneloop_cosmology::{FilterParams, FrwModel, GrowthParams, LoopParams, MatsubaraXyParams};
use oneloop_units::{Energy, MPC};

use crate::error::{CoreError, Result};

/// Spacing of a sample range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spacing {
    Linear,
    Logarithmic,
}

/// A sweep over an interval, materialised as a grid of sample points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRange {
    pub min: f64,
    pub max: f64,
    pub steps: usize,
    pub spacing: Spacing,
}

impl SampleRange {
    pub fn grid(&self) -> Vec<f64> {
        if self.steps <= 1 {
            return vec![self.min];
        }
        let n = (self.steps - 1) as f64;
        (0..self.steps)
            .map(|i| {
                let t = i as f64 / n;
                match self.spacing {
                    Spacing::Linear => self.min + t * (self.max - self.min),
                    Spacing::Logarithmic => {
                        (self.min.ln() + t * (self.max.ln() - self.min.ln())).exp()
                    }
                }
            })
            .collect()
    }

    fn validate(&self, name: &str, allow_zero_min: bool) -> Result<()> {
        let min_ok = if allow_zero_min {
            self.min >= 0.0
        } else {
            self.min > 0.0
        };
        if !min_ok || self.max < self.min || self.steps == 0 {
            return Err(CoreError::Config(format!(
                "malformed {name} range [{}, {}] with {} steps",
                self.min, self.max, self.steps
            )));
        }
        if self.spacing == Spacing::Logarithmic && self.min <= 0.0 {
            return Err(CoreError::Config(format!(
                "{name} range cannot be logarithmic from {}",
                self.min
            )));
        }
        Ok(())
    }
}

/// The read-only configuration of one pipeline run.
#[derive(Debug, Clone)]
pub struct ArgumentCache {
    /// Path of the SQLite data container.
    pub container: PathBuf,
    /// Initial linear power spectrum table.
    pub pk_init: PathBuf,
    /// Optional final linear power spectrum table.
    pub pk_final: Option<PathBuf>,

    pub model: FrwModel,

    pub z_samples: SampleRange,
    pub k_samples: SampleRange,
    pub uv_samples: SampleRange,
    pub ir_samples: SampleRange,
    pub ir_resum_samples: SampleRange,

    pub filter_params: FilterParams,
    pub growth_params: GrowthParams,
    pub loop_params: LoopParams,
    pub xy_params: MatsubaraXyParams,

    /// Number of worker processes.
    pub workers: usize,
    pub strict_consistency: bool,
}

impl ArgumentCache {
    pub fn validate(&self) -> Result<()> {
        if !self.pk_init.exists() {
            return Err(CoreError::Config(format!(
                "linear power spectrum {} does not exist",
                self.pk_init.display()
            )));
        }
        if let Some(pk_final) = &self.pk_final {
            if !pk_final.exists() {
                return Err(CoreError::Config(format!(
                    "final power spectrum {} does not exist",
                    pk_final.display()
                )));
            }
        }
        if self.workers == 0 {
            return Err(CoreError::Config("at least one worker is required".into()));
        }
        self.z_samples.validate("z", true)?;
        self.k_samples.validate("k", false)?;
        self.uv_samples.validate("UV cutoff", false)?;
        self.ir_samples.validate("IR cutoff", false)?;
        self.ir_resum_samples.validate("IR resummation", false)?;

        for (name, abs_tol, rel_tol) in [
            ("filter", self.filter_params.abs_tol, self.filter_params.rel_tol),
            ("growth", self.growth_params.abs_tol, self.growth_params.rel_tol),
            ("loop", self.loop_params.abs_tol, self.loop_params.rel_tol),
            ("XY", self.xy_params.abs_tol, self.xy_params.rel_tol),
        ] {
            if abs_tol < 0.0 || rel_tol <= 0.0 {
                return Err(CoreError::Config(format!(
                    "nonsensical {name} tolerances abs={abs_tol:e} rel={rel_tol:e}"
                )));
            }
        }
        Ok(())
    }

    pub fn z_grid(&self) -> Vec<f64> {
        self.z_samples.grid()
    }

    pub fn k_grid(&self) -> Vec<Energy> {
        wavenumbers(&self.k_samples)
    }

    pub fn uv_grid(&self) -> Vec<Energy> {
        wavenumbers(&self.uv_samples)
    }

    pub fn ir_grid(&self) -> Vec<Energy> {
        wavenumbers(&self.ir_samples)
    }

    pub fn ir_resum_grid(&self) -> Vec<Energy> {
        wavenumbers(&self.ir_resum_samples)
    }
}

fn wavenumbers(range: &SampleRange) -> Vec<Energy> {
    range.grid().into_iter().map(|k| k / MPC).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_grid_hits_both_endpoints() {
        let range = SampleRange {
            min: 1.0,
            max: 3.0,
            steps: 5,
            spacing: Spacing::Linear,
        };
        assert_eq!(range.grid(), vec![1.0, 1.5, 2.0, 2.5, 3.0]);
    }

    #[test]
    fn logarithmic_grid_is_geometric() {
        let range = SampleRange {
            min: 0.01,
            max: 1.0,
            steps: 3,
            spacing: Spacing::Logarithmic,
        };
        let grid = range.grid();
        assert!((grid[1] - 0.1).abs() < 1e-12);
        assert!((grid[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn single_step_range_collapses_to_min() {
        let range = SampleRange {
            min: 0.5,
            max: 2.0,
            steps: 1,
            spacing: Spacing::Linear,
        };
        assert_eq!(range.grid(), vec![0.5]);
    }
}
