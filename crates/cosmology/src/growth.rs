//! One-loop growth factors.
//!
//! Eight growth functions are tracked: the linear factor `g`, the two
//! second-order factors `A`, `B`, and the third-order factors `D`, `E`,
//! `F`, `G`, `J`, together with their logarithmic derivatives
//! `f_X = d ln X / d ln a`. The system is integrated in e-folds from deep
//! in matter domination, where every factor approaches its
//! Einstein-de Sitter limit.

use std::time::{Duration, Instant};

use log::debug;
use oneloop_quadrature::ode::{OdeError, OdeIntegrator};
use oneloop_units::ZToken;
use oneloop_wire::{BufReader, BufWriter, Decode, DecodeError, Encode};

use crate::frw::FrwModel;
use crate::params::GrowthParams;

/// Redshift at which the integration starts and the linear factor is
/// normalised to unity.
pub const GROWTH_Z_INIT: f64 = 999.0;

/// Einstein-de Sitter coefficients of the higher-order factors relative
/// to `g^2` (A, B) and `g^3` (D..J).
pub const EDS_A: f64 = 3.0 / 7.0;
pub const EDS_B: f64 = 2.0 / 7.0;
pub const EDS_D: f64 = 1.0 / 14.0;
pub const EDS_E: f64 = 1.0 / 21.0;
pub const EDS_F: f64 = 2.0 / 21.0;
pub const EDS_G: f64 = 4.0 / 63.0;
pub const EDS_J: f64 = 1.0 / 42.0;

/// The eight growth functions (or their logarithmic derivatives).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GrowthSet {
    pub linear: f64,
    pub a: f64,
    pub b: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
    pub g: f64,
    pub j: f64,
}

impl GrowthSet {
    fn to_array(self) -> [f64; 8] {
        [
            self.linear,
            self.a,
            self.b,
            self.d,
            self.e,
            self.f,
            self.g,
            self.j,
        ]
    }

    fn from_array(values: [f64; 8]) -> Self {
        GrowthSet {
            linear: values[0],
            a: values[1],
            b: values[2],
            d: values[3],
            e: values[4],
            f: values[5],
            g: values[6],
            j: values[7],
        }
    }
}

/// Growth functions and rates at a single redshift.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GrowthRecord {
    pub value: GrowthSet,
    /// `d ln X / d ln a` for each function in `value`.
    pub rate: GrowthSet,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthRow {
    pub z_tok: ZToken,
    pub z: f64,
    pub record: GrowthRecord,
}

/// Output of one growth-ODE run.
#[derive(Debug, Clone, PartialEq)]
pub struct GrowthSample {
    pub rows: Vec<GrowthRow>,
    pub time: Duration,
    pub steps: u64,
}

pub struct GrowthIntegrator {
    params: GrowthParams,
}

impl GrowthIntegrator {
    pub fn new(params: GrowthParams) -> Self {
        GrowthIntegrator { params }
    }

    /// Integrate the growth system for the given redshift samples.
    /// Rows come back in the input order.
    pub fn integrate(
        &self,
        model: &FrwModel,
        zs: &[(ZToken, f64)],
    ) -> Result<GrowthSample, OdeError> {
        let start = Instant::now();

        if self.params.eds_mode {
            let rows = zs
                .iter()
                .map(|&(z_tok, z)| GrowthRow {
                    z_tok,
                    z,
                    record: eds_record(z),
                })
                .collect();
            return Ok(GrowthSample {
                rows,
                time: start.elapsed(),
                steps: 0,
            });
        }

        // Integrate in e-folds n = ln a, deepest redshift first.
        let mut order: Vec<usize> = (0..zs.len()).collect();
        order.sort_by(|&i, &j| zs[j].1.total_cmp(&zs[i].1));
        let mut stops = Vec::with_capacity(zs.len());
        for &idx in &order {
            let n = efold(zs[idx].1);
            // Coincident redshifts (within the store tolerance) share one
            // stop; the stepper requires strictly increasing stops.
            if stops.last().is_some_and(|&last: &f64| n <= last) {
                return Err(OdeError::BadStops);
            }
            stops.push(n);
        }

        let n0 = efold(GROWTH_Z_INIT);
        let y0 = initial_state(self.params.eds_ics);
        let integrator = OdeIntegrator::new(self.params.abs_tol, self.params.rel_tol);
        let solution = integrator.solve(
            |n, y, dy| growth_system(model, n, y, dy),
            n0,
            &y0,
            &stops,
        )?;

        let mut rows = vec![None; zs.len()];
        for (slot, state) in order.iter().zip(&solution.states) {
            let (z_tok, z) = zs[*slot];
            rows[*slot] = Some(GrowthRow {
                z_tok,
                z,
                record: record_from_state(state),
            });
        }
        debug!(
            "integrated growth system for {} redshifts in {} steps",
            zs.len(),
            solution.steps
        );
        Ok(GrowthSample {
            rows: rows.into_iter().map(|row| row.expect("row filled")).collect(),
            time: start.elapsed(),
            steps: solution.steps,
        })
    }
}

fn efold(z: f64) -> f64 {
    -(1.0 + z).ln()
}

/// State layout: `[X, X']` pairs for g, A, B, D, E, F, G, J.
const DIM: usize = 16;

fn initial_state(eds_ics: bool) -> [f64; DIM] {
    let mut y = [0.0; DIM];
    // Linear factor normalised to unity, growing like a.
    y[0] = 1.0;
    y[1] = 1.0;
    if eds_ics {
        for (slot, &(coeff, order)) in [
            (EDS_A, 2.0),
            (EDS_B, 2.0),
            (EDS_D, 3.0),
            (EDS_E, 3.0),
            (EDS_F, 3.0),
            (EDS_G, 3.0),
            (EDS_J, 3.0),
        ]
        .iter()
        .enumerate()
        {
            y[2 + 2 * slot] = coeff;
            y[3 + 2 * slot] = coeff * order;
        }
    }
    y
}

fn growth_system(model: &FrwModel, n: f64, y: &[f64], dy: &mut [f64]) {
    let om = model.omega_m_at(n);
    let damping = 2.0 + model.dln_h(n);

    let (g, gp) = (y[0], y[1]);
    let (a, ap) = (y[2], y[3]);
    let (b, bp) = (y[4], y[5]);

    // Sources of the second- and third-order factors, built from the
    // lower orders.
    let sources = [
        0.0,
        1.5 * om * g * g,
        gp * gp,
        1.5 * om * g * a,
        1.5 * om * g * b,
        gp * ap,
        gp * bp,
        1.5 * om * g * (a - b),
    ];

    for (slot, source) in sources.iter().enumerate() {
        let x = y[2 * slot];
        let xp = y[2 * slot + 1];
        dy[2 * slot] = xp;
        dy[2 * slot + 1] = -damping * xp + 1.5 * om * x + source;
    }
}

fn record_from_state(state: &[f64]) -> GrowthRecord {
    let mut values = [0.0; 8];
    let mut rates = [0.0; 8];
    for slot in 0..8 {
        values[slot] = state[2 * slot];
        rates[slot] = if state[2 * slot] != 0.0 {
            state[2 * slot + 1] / state[2 * slot]
        } else {
            0.0
        };
    }
    GrowthRecord {
        value: GrowthSet::from_array(values),
        rate: GrowthSet::from_array(rates),
    }
}

/// Closed-form Einstein-de Sitter record.
pub fn eds_record(z: f64) -> GrowthRecord {
    let g = (1.0 + GROWTH_Z_INIT) / (1.0 + z);
    let g2 = g * g;
    let g3 = g2 * g;
    GrowthRecord {
        value: GrowthSet {
            linear: g,
            a: EDS_A * g2,
            b: EDS_B * g2,
            d: EDS_D * g3,
            e: EDS_E * g3,
            f: EDS_F * g3,
            g: EDS_G * g3,
            j: EDS_J * g3,
        },
        rate: GrowthSet {
            linear: 1.0,
            a: 2.0,
            b: 2.0,
            d: 3.0,
            e: 3.0,
            f: 3.0,
            g: 3.0,
            j: 3.0,
        },
    }
}

impl Encode for GrowthSet {
    fn encode(&self, out: &mut impl BufWriter) {
        for value in self.to_array() {
            out.put_f64(value);
        }
    }
}

impl Decode for GrowthSet {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        let mut values = [0.0; 8];
        for value in &mut values {
            *value = reader.get_f64()?;
        }
        Ok(GrowthSet::from_array(values))
    }
}

impl Encode for GrowthRecord {
    fn encode(&self, out: &mut impl BufWriter) {
        self.value.encode(out);
        self.rate.encode(out);
    }
}

impl Decode for GrowthRecord {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        Ok(GrowthRecord {
            value: GrowthSet::decode(reader)?,
            rate: GrowthSet::decode(reader)?,
        })
    }
}

impl Encode for GrowthRow {
    fn encode(&self, out: &mut impl BufWriter) {
        self.z_tok.encode(out);
        out.put_f64(self.z);
        self.record.encode(out);
    }
}

impl Decode for GrowthRow {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        Ok(GrowthRow {
            z_tok: ZToken::decode(reader)?,
            z: reader.get_f64()?,
            record: GrowthRecord::decode(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frw::mdr1;

    fn eds_model() -> FrwModel {
        FrwModel {
            omega_m: 1.0,
            omega_cc: 0.0,
            ..mdr1()
        }
    }

    #[test]
    fn eds_cosmology_reproduces_eds_limits() {
        let integrator = GrowthIntegrator::new(GrowthParams::default());
        let zs = [(ZToken::new(0), 9.0), (ZToken::new(1), 0.0)];
        let sample = integrator.integrate(&eds_model(), &zs).unwrap();

        for row in &sample.rows {
            let expected = eds_record(row.z);
            let got = row.record;
            assert!(
                (got.value.linear / expected.value.linear - 1.0).abs() < 1e-5,
                "g at z = {}",
                row.z
            );
            assert!((got.value.a / expected.value.a - 1.0).abs() < 1e-4);
            assert!((got.value.b / expected.value.b - 1.0).abs() < 1e-4);
            assert!((got.value.j / expected.value.j - 1.0).abs() < 1e-4);
            assert!((got.rate.linear - 1.0).abs() < 1e-4);
            assert!((got.rate.d - 3.0).abs() < 1e-3);
        }
        assert!(sample.steps > 0);
    }

    #[test]
    fn lambda_suppresses_late_growth() {
        let integrator = GrowthIntegrator::new(GrowthParams::default());
        let zs = [(ZToken::new(0), 0.0)];
        let lcdm = integrator.integrate(&mdr1(), &zs).unwrap();
        let eds = integrator.integrate(&eds_model(), &zs).unwrap();

        let g_lcdm = lcdm.rows[0].record.value.linear;
        let g_eds = eds.rows[0].record.value.linear;
        assert!(g_lcdm < g_eds);
        // The growth rate today is roughly Omega_m^0.55.
        let f = lcdm.rows[0].record.rate.linear;
        assert!((f - 0.27f64.powf(0.55)).abs() < 0.03, "f = {f}");
    }

    #[test]
    fn rows_keep_input_order() {
        let integrator = GrowthIntegrator::new(GrowthParams::default());
        let zs = [
            (ZToken::new(5), 0.0),
            (ZToken::new(6), 2.0),
            (ZToken::new(7), 0.5),
        ];
        let sample = integrator.integrate(&mdr1(), &zs).unwrap();
        let tokens: Vec<_> = sample.rows.iter().map(|row| row.z_tok.id()).collect();
        assert_eq!(tokens, vec![5, 6, 7]);
        // Deeper redshift, smaller growth.
        assert!(sample.rows[1].record.value.linear < sample.rows[2].record.value.linear);
    }

    #[test]
    fn eds_mode_skips_the_ode() {
        let integrator = GrowthIntegrator::new(GrowthParams {
            eds_mode: true,
            ..GrowthParams::default()
        });
        let sample = integrator
            .integrate(&mdr1(), &[(ZToken::new(0), 1.0)])
            .unwrap();
        assert_eq!(sample.steps, 0);
        assert_eq!(sample.rows[0].record, eds_record(1.0));
    }
}
