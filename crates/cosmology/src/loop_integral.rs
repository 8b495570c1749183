//! Loop-kernel integrals over the momentum annulus.
//!
//! Every kernel is a two-dimensional integral over the unit square: the
//! radial coordinate maps to `q` in `[IR, UV]` and the angular coordinate
//! to `z = cos(theta)` in `[-1, 1]`. The azimuthal direction is not
//! integrated (no integrand depends on it); its `2 pi` lives in the
//! overall prefactor together with the conventional `1/(2 pi)^3`.
//!
//! The 22-type kernels AA, AB, BB carry the product
//! `P(q) P(|k - q|)` and have dimension Mpc^3; the 13-type kernels
//! D, E, F, G, J1, J2 carry only `P(q)` and are dimensionless. Each
//! kernel is evaluated twice, once against the raw spectrum and once
//! against its no-wiggle counterpart.

use oneloop_quadrature::{Cubature, IntegrationDriver, IntegrationResult, KernelClass, Tolerances};
use oneloop_units::{
    Energy, IrToken, KToken, LinearPkToken, LoopParamsToken, ModelToken, UvToken, MPC,
};
use oneloop_wire::{BufReader, BufWriter, Decode, DecodeError, Encode};

use crate::params::LoopParams;
use crate::spectrum::{FilteredPk, PkTable};

/// One stored integral: the shape of a loop-kernel table row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegralRow {
    /// Kernel value, in Mpc^3 for 22-type kernels and dimensionless for
    /// 13-type kernels.
    pub value: f64,
    /// 1-sigma error estimate, same units as `value`.
    pub error: f64,
    pub regions: u32,
    pub evaluations: u64,
    pub time_ns: u64,
    pub converged: bool,
}

impl IntegralRow {
    fn from_result(result: IntegrationResult, prefactor: f64) -> Self {
        IntegralRow {
            value: result.value * prefactor,
            error: result.error * prefactor.abs(),
            regions: result.regions,
            evaluations: result.evaluations,
            time_ns: result.time.as_nanos() as u64,
            converged: result.converged,
        }
    }
}

/// Raw and no-wiggle evaluations of one kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelResult {
    pub raw: IntegralRow,
    pub nowiggle: IntegralRow,
}

/// The full kernel set for one `(k, UV, IR)` configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopKernels {
    pub aa: KernelResult,
    pub ab: KernelResult,
    pub bb: KernelResult,
    pub d: KernelResult,
    pub e: KernelResult,
    pub f: KernelResult,
    pub g: KernelResult,
    pub j1: KernelResult,
    pub j2: KernelResult,
}

impl LoopKernels {
    /// True when any of the eighteen integrals exhausted its retry
    /// budget.
    pub fn failed(&self) -> bool {
        self.results().iter().any(|kernel| {
            !kernel.raw.converged || !kernel.nowiggle.converged
        })
    }

    pub fn results(&self) -> [&KernelResult; 9] {
        [
            &self.aa, &self.ab, &self.bb, &self.d, &self.e, &self.f, &self.g, &self.j1, &self.j2,
        ]
    }
}

/// A loop-kernel sample together with the tokens that key it.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopIntegral {
    pub model: ModelToken,
    pub params: LoopParamsToken,
    pub k: KToken,
    pub pk_lin: LinearPkToken,
    pub uv: UvToken,
    pub ir: IrToken,
    pub kernels: LoopKernels,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kernel {
    Aa,
    Ab,
    Bb,
    D,
    E,
    F,
    G,
    J1,
    J2,
}

impl Kernel {
    fn name(self) -> &'static str {
        match self {
            Kernel::Aa => "AA",
            Kernel::Ab => "AB",
            Kernel::Bb => "BB",
            Kernel::D => "D",
            Kernel::E => "E",
            Kernel::F => "F",
            Kernel::G => "G",
            Kernel::J1 => "J1",
            Kernel::J2 => "J2",
        }
    }

    fn class(self) -> KernelClass {
        match self {
            Kernel::Aa | Kernel::Ab | Kernel::Bb => KernelClass::TwentyTwoType,
            _ => KernelClass::ThirteenType,
        }
    }
}

/// Closure data shared by every integrand of one configuration, in bare
/// Mpc units.
struct IntegrandData<'a> {
    k: f64,
    k_sq: f64,
    ir: f64,
    uv: f64,
    q_range: f64,
    pk: &'a PkTable,
}

impl IntegrandData<'_> {
    fn pk_at(&self, q: f64) -> f64 {
        self.pk.eval(q / MPC).raw()
    }

    fn eval(&self, kernel: Kernel, x: &[f64]) -> f64 {
        let q = self.ir + x[0] * self.q_range;
        let z = 2.0 * x[1] - 1.0;

        let k_dot_q = z * self.k * q;
        let k_minus_q_sq = q * q + self.k_sq - 2.0 * k_dot_q;
        if k_minus_q_sq <= f64::EPSILON * self.k_sq {
            return 0.0;
        }
        let q_sq = q * q;

        let qq_pq = q_sq * self.pk_at(q);

        let alpha1 = (k_minus_q_sq * k_dot_q + q_sq * self.k_sq - q_sq * k_dot_q)
            / (2.0 * q_sq * k_minus_q_sq);
        let gamma1 = (k_minus_q_sq * k_dot_q - q_sq * k_dot_q + self.k_sq * k_dot_q)
            / (2.0 * q_sq * k_minus_q_sq);

        match kernel {
            Kernel::Aa | Kernel::Ab | Kernel::Bb => {
                let k_minus_q = k_minus_q_sq.sqrt();
                let pk_minus_q = if k_minus_q > self.ir && k_minus_q < self.uv {
                    self.pk_at(k_minus_q)
                } else {
                    0.0
                };
                let pp_prod = qq_pq * pk_minus_q;
                match kernel {
                    Kernel::Aa => 2.0 * pp_prod * alpha1 * alpha1,
                    Kernel::Ab => 4.0 * pp_prod * alpha1 * gamma1,
                    _ => 2.0 * pp_prod * gamma1 * gamma1,
                }
            }
            Kernel::D | Kernel::E | Kernel::F | Kernel::G => {
                let alpha2 =
                    (2.0 * self.k_sq * q_sq - k_dot_q * (self.k_sq + q_sq)) / (2.0 * q_sq * self.k_sq);
                let gamma2 = (2.0 * self.k_sq * q_sq
                    - k_dot_q * (2.0 * self.k_sq + 2.0 * q_sq - 2.0 * k_dot_q))
                    / (2.0 * q_sq * self.k_sq);
                match kernel {
                    Kernel::D => 8.0 * qq_pq * gamma1 * alpha2,
                    Kernel::E => 8.0 * qq_pq * gamma1 * gamma2,
                    Kernel::F => 8.0 * qq_pq * alpha1 * alpha2,
                    _ => 8.0 * qq_pq * alpha1 * gamma2,
                }
            }
            Kernel::J1 | Kernel::J2 => {
                let alpha_sym =
                    (2.0 * self.k_sq * q_sq - k_dot_q * (self.k_sq + q_sq)) / (2.0 * q_sq * self.k_sq);
                let beta_sym = -k_dot_q * (self.k_sq + q_sq - 2.0 * k_dot_q)
                    / (2.0 * q_sq * self.k_sq);
                let alpha_asym = (self.k_sq - k_dot_q) / k_minus_q_sq;
                match kernel {
                    Kernel::J1 => 8.0 * qq_pq * alpha_asym * beta_sym,
                    _ => -8.0 * qq_pq * alpha_asym * alpha_sym,
                }
            }
        }
    }
}

pub struct LoopIntegrator<C> {
    driver: IntegrationDriver<C>,
    tolerances: Tolerances,
}

impl<C: Cubature> LoopIntegrator<C> {
    pub fn new(engine: C, params: LoopParams) -> Self {
        LoopIntegrator {
            driver: IntegrationDriver::new(engine),
            tolerances: Tolerances::new(params.abs_tol, params.rel_tol),
        }
    }

    /// Compute the full kernel set for one `(k, UV, IR)` configuration.
    pub fn integrate(&self, k: Energy, uv: Energy, ir: Energy, pk: &FilteredPk) -> LoopKernels {
        let run = |kernel| KernelResult {
            raw: self.one_kernel(kernel, k, uv, ir, &pk.raw, "raw"),
            nowiggle: self.one_kernel(kernel, k, uv, ir, &pk.nowiggle, "nowiggle"),
        };
        LoopKernels {
            aa: run(Kernel::Aa),
            ab: run(Kernel::Ab),
            bb: run(Kernel::Bb),
            d: run(Kernel::D),
            e: run(Kernel::E),
            f: run(Kernel::F),
            g: run(Kernel::G),
            j1: run(Kernel::J1),
            j2: run(Kernel::J2),
        }
    }

    fn one_kernel(
        &self,
        kernel: Kernel,
        k: Energy,
        uv: Energy,
        ir: Energy,
        pk: &PkTable,
        which: &str,
    ) -> IntegralRow {
        let data = IntegrandData {
            k: k * MPC,
            k_sq: (k * MPC) * (k * MPC),
            ir: ir * MPC,
            uv: uv * MPC,
            q_range: (uv - ir) * MPC,
            pk,
        };
        let name = format!("{}[{which}]", kernel.name());
        let result = self.driver.integrate(
            &name,
            kernel.class(),
            2,
            self.tolerances,
            &mut |x| data.eval(kernel, x),
        );
        // Angular measure: 2 pi from the azimuth, 2 from the z mapping,
        // q_range from the radial mapping, all over (2 pi)^3.
        let prefactor = data.q_range / (2.0 * std::f64::consts::PI * std::f64::consts::PI);
        IntegralRow::from_result(result, prefactor)
    }
}

impl Encode for IntegralRow {
    fn encode(&self, out: &mut impl BufWriter) {
        out.put_f64(self.value);
        out.put_f64(self.error);
        out.put_u32(self.regions);
        out.put_u64(self.evaluations);
        out.put_u64(self.time_ns);
        self.converged.encode(out);
    }
}

impl Decode for IntegralRow {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        Ok(IntegralRow {
            value: reader.get_f64()?,
            error: reader.get_f64()?,
            regions: reader.get_u32()?,
            evaluations: reader.get_u64()?,
            time_ns: reader.get_u64()?,
            converged: bool::decode(reader)?,
        })
    }
}

impl Encode for KernelResult {
    fn encode(&self, out: &mut impl BufWriter) {
        self.raw.encode(out);
        self.nowiggle.encode(out);
    }
}

impl Decode for KernelResult {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        Ok(KernelResult {
            raw: IntegralRow::decode(reader)?,
            nowiggle: IntegralRow::decode(reader)?,
        })
    }
}

impl Encode for LoopKernels {
    fn encode(&self, out: &mut impl BufWriter) {
        for kernel in self.results() {
            kernel.encode(out);
        }
    }
}

impl Decode for LoopKernels {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        Ok(LoopKernels {
            aa: KernelResult::decode(reader)?,
            ab: KernelResult::decode(reader)?,
            bb: KernelResult::decode(reader)?,
            d: KernelResult::decode(reader)?,
            e: KernelResult::decode(reader)?,
            f: KernelResult::decode(reader)?,
            g: KernelResult::decode(reader)?,
            j1: KernelResult::decode(reader)?,
            j2: KernelResult::decode(reader)?,
        })
    }
}

impl Encode for LoopIntegral {
    fn encode(&self, out: &mut impl BufWriter) {
        self.model.encode(out);
        self.params.encode(out);
        self.k.encode(out);
        self.pk_lin.encode(out);
        self.uv.encode(out);
        self.ir.encode(out);
        self.kernels.encode(out);
    }
}

impl Decode for LoopIntegral {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        Ok(LoopIntegral {
            model: ModelToken::decode(reader)?,
            params: LoopParamsToken::decode(reader)?,
            k: KToken::decode(reader)?,
            pk_lin: LinearPkToken::decode(reader)?,
            uv: UvToken::decode(reader)?,
            ir: IrToken::decode(reader)?,
            kernels: LoopKernels::decode(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oneloop_quadrature::GenzMalik;
    use oneloop_units::{LinearPkToken, MPC3};

    fn flat_filtered_pk() -> FilteredPk {
        // A gently falling power law, identical raw and no-wiggle parts.
        let points: Vec<_> = (0..60)
            .map(|i| {
                let k = 10f64.powf(-3.0 + 3.5 * i as f64 / 59.0);
                (k / MPC, 1.0e3 * k.powf(-1.2) * MPC3)
            })
            .collect();
        let table = PkTable::new(&points).unwrap();
        FilteredPk {
            token: LinearPkToken::new(0),
            raw: table.clone(),
            nowiggle: table,
        }
    }

    fn integrator() -> LoopIntegrator<GenzMalik> {
        // Loose tolerances keep the test fast; convergence behaviour is
        // covered by the quadrature crate.
        LoopIntegrator::new(
            GenzMalik,
            LoopParams {
                abs_tol: 1e-6,
                rel_tol: 1e-3,
            },
        )
    }

    #[test]
    fn squared_kernels_are_positive() {
        let pk = flat_filtered_pk();
        let kernels =
            integrator().integrate(0.1 / MPC, 1.0 / MPC, 0.005 / MPC, &pk);
        assert!(kernels.aa.raw.value > 0.0);
        assert!(kernels.bb.raw.value > 0.0);
        assert!(kernels.aa.raw.converged);
        assert!(!kernels.failed());
    }

    #[test]
    fn identical_spectra_give_identical_raw_and_nowiggle() {
        let pk = flat_filtered_pk();
        let kernels =
            integrator().integrate(0.05 / MPC, 0.8 / MPC, 0.005 / MPC, &pk);
        for kernel in kernels.results() {
            assert_eq!(kernel.raw.value.to_bits(), kernel.nowiggle.value.to_bits());
        }
    }

    #[test]
    fn kernels_roundtrip_on_the_wire() {
        let pk = flat_filtered_pk();
        let kernels =
            integrator().integrate(0.2 / MPC, 0.5 / MPC, 0.01 / MPC, &pk);
        let integral = LoopIntegral {
            model: ModelToken::new(0),
            params: LoopParamsToken::new(1),
            k: KToken::new(2),
            pk_lin: LinearPkToken::new(3),
            uv: UvToken::new(4),
            ir: IrToken::new(5),
            kernels,
        };
        let bytes = integral.encoded();
        assert_eq!(LoopIntegral::from_slice(&bytes).unwrap(), integral);
    }
}
