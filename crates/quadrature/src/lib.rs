//! Numerical integration services.
//!
//! The [`driver::IntegrationDriver`] wraps a deterministic cubature
//! routine — injected as a [`Cubature`] capability, never hard-wired —
//! with the pipeline's retry-on-failure and tolerance-relaxation policy.
//! [`genz_malik::GenzMalik`] is the default capability, a degree-7
//! adaptive subdivision rule for 2 and 3 dimensional unit hyper-cubes.
//! [`ode`] holds the adaptive Runge-Kutta stepper used by the growth
//! factor phase.

pub mod driver;
pub mod genz_malik;
pub mod ode;

pub use driver::{IntegrationDriver, IntegrationResult, KernelClass, Tolerances};
pub use genz_malik::GenzMalik;

/// Outcome of a single cubature call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubatureOutput {
    pub value: f64,
    /// 1-sigma error estimate.
    pub error: f64,
    /// Number of subregions at termination.
    pub regions: u32,
    /// Number of integrand evaluations.
    pub evaluations: u64,
    /// Whether `error <= max(abs_tol, rel_tol * |value|)` was reached
    /// within the evaluation budget.
    pub converged: bool,
}

/// A deterministic adaptive cubature over the unit hyper-cube `[0,1]^dim`.
///
/// Implementations must be deterministic (same integrand, same output),
/// must not spawn threads, and must report `converged = false` rather
/// than failing silently when the tolerance cannot be met. The driver
/// owns retries; a capability performs exactly one attempt.
pub trait Cubature {
    fn integrate(
        &self,
        dim: usize,
        abs_tol: f64,
        rel_tol: f64,
        max_eval: u64,
        integrand: &mut dyn FnMut(&[f64]) -> f64,
    ) -> CubatureOutput;
}
