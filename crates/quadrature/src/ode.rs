//! Adaptive Cash-Karp Runge-Kutta stepping with dense sample points.
//!
//! The growth-factor phase integrates a small ODE system from deep in
//! matter domination down to each requested redshift. The stepper is
//! tolerance-controlled and records the state at an increasing list of
//! stop points, clamping steps so every stop is hit exactly.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OdeError {
    #[error("step size underflow at x = {x}")]
    StepUnderflow { x: f64 },
    #[error("stop points must be strictly increasing and start at or after x0")]
    BadStops,
    #[error("step budget of {0} exhausted")]
    StepBudget(u64),
}

/// Result of an ODE run: the state at every requested stop, plus the
/// number of accepted steps.
pub struct OdeSolution {
    pub states: Vec<Vec<f64>>,
    pub steps: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct OdeIntegrator {
    pub abs_tol: f64,
    pub rel_tol: f64,
    pub max_steps: u64,
}

impl Default for OdeIntegrator {
    fn default() -> Self {
        OdeIntegrator {
            abs_tol: 1e-12,
            rel_tol: 1e-8,
            max_steps: 10_000_000,
        }
    }
}

// Cash-Karp tableau.
const A: [[f64; 5]; 5] = [
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0],
    [3.0 / 10.0, -9.0 / 10.0, 6.0 / 5.0, 0.0, 0.0],
    [-11.0 / 54.0, 5.0 / 2.0, -70.0 / 27.0, 35.0 / 27.0, 0.0],
    [
        1631.0 / 55296.0,
        175.0 / 512.0,
        575.0 / 13824.0,
        44275.0 / 110592.0,
        253.0 / 4096.0,
    ],
];
const B5: [f64; 6] = [
    37.0 / 378.0,
    0.0,
    250.0 / 621.0,
    125.0 / 594.0,
    0.0,
    512.0 / 1771.0,
];
const B4: [f64; 6] = [
    2825.0 / 27648.0,
    0.0,
    18575.0 / 48384.0,
    13525.0 / 55296.0,
    277.0 / 14336.0,
    1.0 / 4.0,
];

impl OdeIntegrator {
    pub fn new(abs_tol: f64, rel_tol: f64) -> Self {
        OdeIntegrator {
            abs_tol: abs_tol.abs(),
            rel_tol: rel_tol.abs(),
            ..Self::default()
        }
    }

    /// Integrate `dy/dx = f(x, y)` from `x0`, recording the state at each
    /// of `stops` (strictly increasing, all `>= x0`).
    pub fn solve(
        &self,
        mut f: impl FnMut(f64, &[f64], &mut [f64]),
        x0: f64,
        y0: &[f64],
        stops: &[f64],
    ) -> Result<OdeSolution, OdeError> {
        if stops.windows(2).any(|w| w[1] <= w[0]) || stops.first().is_some_and(|&s| s < x0) {
            return Err(OdeError::BadStops);
        }

        let n = y0.len();
        let mut x = x0;
        let mut y = y0.to_vec();
        let mut steps = 0u64;
        let mut states = Vec::with_capacity(stops.len());

        let mut k = vec![vec![0.0; n]; 6];
        let mut y_stage = vec![0.0; n];
        let mut y5 = vec![0.0; n];
        let mut y4 = vec![0.0; n];

        let x_end = match stops.last() {
            Some(&last) => last,
            None => return Ok(OdeSolution { states, steps }),
        };

        let mut next_stop = 0;
        while next_stop < stops.len() && stops[next_stop] <= x0 {
            states.push(y.clone());
            next_stop += 1;
        }

        let mut h = ((x_end - x0) / 100.0).max(f64::MIN_POSITIVE);

        while next_stop < stops.len() {
            if steps >= self.max_steps {
                return Err(OdeError::StepBudget(self.max_steps));
            }
            let to_stop = stops[next_stop] - x;
            let hits_stop = h >= to_stop;
            let clamped = if hits_stop { to_stop } else { h };
            if clamped <= f64::EPSILON * x.abs().max(1.0) {
                return Err(OdeError::StepUnderflow { x });
            }

            // Six stages.
            f(x, &y, &mut k[0]);
            for stage in 1..6 {
                for i in 0..n {
                    let mut acc = 0.0;
                    for (j, kj) in k.iter().enumerate().take(stage) {
                        acc += A[stage - 1][j] * kj[i];
                    }
                    y_stage[i] = y[i] + clamped * acc;
                }
                let c = match stage {
                    1 => 1.0 / 5.0,
                    2 => 3.0 / 10.0,
                    3 => 3.0 / 5.0,
                    4 => 1.0,
                    _ => 7.0 / 8.0,
                };
                let (_, tail) = k.split_at_mut(stage);
                f(x + c * clamped, &y_stage, &mut tail[0]);
            }

            let mut err = 0.0f64;
            for i in 0..n {
                let mut acc5 = 0.0;
                let mut acc4 = 0.0;
                for j in 0..6 {
                    acc5 += B5[j] * k[j][i];
                    acc4 += B4[j] * k[j][i];
                }
                y5[i] = y[i] + clamped * acc5;
                y4[i] = y[i] + clamped * acc4;
                let scale = self.abs_tol + self.rel_tol * y[i].abs().max(y5[i].abs());
                err = err.max(((y5[i] - y4[i]) / scale).abs());
            }

            if err <= 1.0 {
                // Accept. Snap to the stop when the step was clamped to
                // it, so `x + (stop - x)` rounding cannot strand the
                // integration just short of a stop.
                x = if hits_stop { stops[next_stop] } else { x + clamped };
                y.copy_from_slice(&y5);
                steps += 1;
                while next_stop < stops.len() && x >= stops[next_stop] {
                    states.push(y.clone());
                    next_stop += 1;
                }
                let grow = if err > 0.0 {
                    (0.9 * err.powf(-0.2)).min(5.0)
                } else {
                    5.0
                };
                h = clamped * grow;
            } else {
                h = clamped * (0.9 * err.powf(-0.25)).max(0.1);
            }
        }

        Ok(OdeSolution { states, steps })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_decay() {
        let integrator = OdeIntegrator::new(1e-12, 1e-10);
        let stops = [0.5, 1.0, 2.0];
        let solution = integrator
            .solve(|_, y, dy| dy[0] = -y[0], 0.0, &[1.0], &stops)
            .unwrap();
        assert_eq!(solution.states.len(), 3);
        for (state, &x) in solution.states.iter().zip(&stops) {
            assert!((state[0] - (-x).exp()).abs() < 1e-8, "at x = {x}");
        }
        assert!(solution.steps > 0);
    }

    #[test]
    fn harmonic_oscillator_system() {
        let integrator = OdeIntegrator::new(1e-12, 1e-10);
        let stops = [std::f64::consts::PI];
        let solution = integrator
            .solve(
                |_, y, dy| {
                    dy[0] = y[1];
                    dy[1] = -y[0];
                },
                0.0,
                &[1.0, 0.0],
                &stops,
            )
            .unwrap();
        // cos(pi) = -1, sin(pi) = 0
        assert!((solution.states[0][0] + 1.0).abs() < 1e-7);
        assert!(solution.states[0][1].abs() < 1e-7);
    }

    #[test]
    fn stop_at_start_records_initial_state() {
        let integrator = OdeIntegrator::default();
        let solution = integrator
            .solve(|_, _, dy| dy[0] = 1.0, 0.0, &[7.0], &[0.0, 1.0])
            .unwrap();
        assert_eq!(solution.states[0][0], 7.0);
        assert!((solution.states[1][0] - 8.0).abs() < 1e-9);
    }

    #[test]
    fn unsorted_stops_are_rejected() {
        let integrator = OdeIntegrator::default();
        let result = integrator.solve(|_, _, dy| dy[0] = 0.0, 0.0, &[0.0], &[1.0, 0.5]);
        assert!(matches!(result, Err(OdeError::BadStops)));
    }
}
