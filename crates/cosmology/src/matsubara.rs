//! Matsubara X & Y resummation coefficients.
//!
//! The displacement dispersions of the Zel'dovich approximation,
//! evaluated at the BAO separation and integrated up to the infrared
//! resummation scale:
//!
//! ```text
//! X(l) = 1/(2 pi^2) Int dq P(q) [ 1/3 - j1(q l)/(q l) ]
//! Y(l) = 1/(2 pi^2) Int dq P(q) j2(q l)
//! ```
//!
//! Both carry dimension Mpc^2 and damp the wiggle component of the
//! resummed spectra as `exp(-k^2 (X + Y) / 2)` (with the
//! redshift-space mu-dependence applied by the multipole calculator).

use oneloop_quadrature::{Cubature, IntegrationDriver, KernelClass, Tolerances};
use oneloop_units::{Energy, InverseEnergy2, IrResumToken, LinearPkToken, ModelToken, XyParamsToken, MPC, MPC2};
use oneloop_wire::{BufReader, BufWriter, Decode, DecodeError, Encode};

use crate::params::MatsubaraXyParams;
use crate::spectrum::PkTable;

/// The stored (X, Y) pair with its keying tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatsubaraXy {
    pub model: ModelToken,
    pub params: XyParamsToken,
    pub pk_lin: LinearPkToken,
    pub ir_resum: IrResumToken,
    pub x: InverseEnergy2,
    pub y: InverseEnergy2,
    pub converged: bool,
}

impl MatsubaraXy {
    /// Total damping coefficient `X + Y`.
    pub fn total(&self) -> InverseEnergy2 {
        self.x + self.y
    }
}

pub struct MatsubaraXyCalculator<C> {
    driver: IntegrationDriver<C>,
    tolerances: Tolerances,
    params: MatsubaraXyParams,
}

impl<C: Cubature> MatsubaraXyCalculator<C> {
    pub fn new(engine: C, params: MatsubaraXyParams) -> Self {
        MatsubaraXyCalculator {
            driver: IntegrationDriver::new(engine),
            tolerances: Tolerances::new(params.abs_tol, params.rel_tol),
            params,
        }
    }

    /// Integrate X and Y from the bottom of the spectrum table up to the
    /// resummation scale.
    pub fn compute(
        &self,
        ir_resum: Energy,
        pk: &PkTable,
    ) -> (InverseEnergy2, InverseEnergy2, bool) {
        let q_min = pk.k_min() * MPC;
        let q_max = (ir_resum * MPC).min(pk.k_max() * MPC);
        let q_range = q_max - q_min;
        let scale = self.params.bao_scale / MPC;

        let integrate = |weight: &dyn Fn(f64) -> f64, name: &str| {
            let mut integrand = |x: &[f64]| {
                let q = q_min + x[0] * q_range;
                q_range * pk.eval(q / MPC).raw() * weight(q * scale)
            };
            let result = self.driver.integrate(
                name,
                KernelClass::TwentyTwoType,
                2,
                self.tolerances,
                &mut integrand,
            );
            let value = result.value / (2.0 * std::f64::consts::PI * std::f64::consts::PI);
            (value * MPC2, result.converged)
        };

        let (x, x_ok) = integrate(&|arg| 1.0 / 3.0 - j1_over_x(arg), "MatsubaraX");
        let (y, y_ok) = integrate(&j2, "MatsubaraY");
        (x, y, x_ok && y_ok)
    }
}

/// `j1(x) / x`, with the series limit at small argument.
fn j1_over_x(x: f64) -> f64 {
    if x.abs() < 1e-3 {
        1.0 / 3.0 - x * x / 30.0
    } else {
        (x.sin() / (x * x) - x.cos() / x) / x
    }
}

/// Spherical Bessel function `j2`.
fn j2(x: f64) -> f64 {
    if x.abs() < 1e-3 {
        x * x / 15.0
    } else {
        (3.0 / (x * x) - 1.0) * x.sin() / x - 3.0 * x.cos() / (x * x)
    }
}

impl Encode for MatsubaraXy {
    fn encode(&self, out: &mut impl BufWriter) {
        self.model.encode(out);
        self.params.encode(out);
        self.pk_lin.encode(out);
        self.ir_resum.encode(out);
        out.put_f64(self.x.raw());
        out.put_f64(self.y.raw());
        self.converged.encode(out);
    }
}

impl Decode for MatsubaraXy {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        Ok(MatsubaraXy {
            model: ModelToken::decode(reader)?,
            params: XyParamsToken::decode(reader)?,
            pk_lin: LinearPkToken::decode(reader)?,
            ir_resum: IrResumToken::decode(reader)?,
            x: InverseEnergy2::new(reader.get_f64()?),
            y: InverseEnergy2::new(reader.get_f64()?),
            converged: bool::decode(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oneloop_quadrature::GenzMalik;
    use oneloop_units::MPC3;

    #[test]
    fn bessel_limits() {
        assert!((j1_over_x(1e-6) - 1.0 / 3.0).abs() < 1e-9);
        assert!(j2(1e-6).abs() < 1e-9);
        // Continuity across the series switch-over.
        assert!((j2(1e-3 + 1e-9) - j2(1e-3 - 1e-9)).abs() < 1e-9);
    }

    #[test]
    fn x_is_positive_for_a_positive_spectrum() {
        let points: Vec<_> = (0..40)
            .map(|i| {
                let k = 10f64.powf(-3.0 + 2.5 * i as f64 / 39.0);
                (k / MPC, 2.0e4 * k.powf(-1.0) * MPC3)
            })
            .collect();
        let table = PkTable::new(&points).unwrap();

        let calculator = MatsubaraXyCalculator::new(GenzMalik, MatsubaraXyParams::default());
        let (x, y, converged) = calculator.compute(0.2 / MPC, &table);
        assert!(converged);
        // j1(x)/x <= 1/3 everywhere, so X is positive term by term.
        assert!(x.raw() > 0.0);
        assert!(y.is_finite());
    }

    #[test]
    fn xy_roundtrips_on_the_wire() {
        let xy = MatsubaraXy {
            model: ModelToken::new(1),
            params: XyParamsToken::new(2),
            pk_lin: LinearPkToken::new(3),
            ir_resum: IrResumToken::new(4),
            x: InverseEnergy2::new(17.5),
            y: InverseEnergy2::new(-0.25),
            converged: true,
        };
        assert_eq!(MatsubaraXy::from_slice(&xy.encoded()).unwrap(), xy);
    }
}
