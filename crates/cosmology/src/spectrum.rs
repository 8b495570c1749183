//! Linear power spectrum containers.
//!
//! A linear spectrum enters the pipeline as a two-column ASCII table of
//! `(k, P(k))` in Mpc units. Its identity is the MD5 digest of the file
//! content, so the same table registered from two paths tokenises to the
//! same row. Interpolation is cubic in log-log space, which is accurate
//! for the strictly-positive spectra handled here.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use md5::{Digest, Md5};
use oneloop_units::{Energy, InverseEnergy3, LinearPkToken, MPC, MPC3};
use oneloop_wire::{BufReader, BufWriter, Decode, DecodeError, Encode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpectrumError {
    #[error("failed to read spectrum file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: malformed spectrum row")]
    Malformed { path: PathBuf, line: usize },
    #[error("spectrum table needs at least {min} rows, found {found}")]
    TooFewRows { min: usize, found: usize },
    #[error("spectrum table must have strictly increasing, positive k and positive P")]
    NotMonotonic,
}

/// A sorted `(k, P)` table with cubic interpolation in log-log space.
#[derive(Debug, Clone, PartialEq)]
pub struct PkTable {
    log_k: Vec<f64>,
    log_p: Vec<f64>,
    // Second derivatives of the natural cubic spline through
    // (log_k, log_p); rebuilt on construction, never serialised.
    second: Vec<f64>,
}

impl PkTable {
    pub const MIN_ROWS: usize = 4;

    pub fn new(points: &[(Energy, InverseEnergy3)]) -> Result<Self, SpectrumError> {
        if points.len() < Self::MIN_ROWS {
            return Err(SpectrumError::TooFewRows {
                min: Self::MIN_ROWS,
                found: points.len(),
            });
        }
        let ascending = points.windows(2).all(|w| w[0].0 < w[1].0);
        let positive = points.iter().all(|&(k, p)| k.raw() > 0.0 && p.raw() > 0.0);
        if !ascending || !positive {
            return Err(SpectrumError::NotMonotonic);
        }
        let log_k: Vec<f64> = points.iter().map(|&(k, _)| (k * MPC).ln()).collect();
        let log_p: Vec<f64> = points.iter().map(|&(_, p)| (p / MPC3).ln()).collect();
        let second = natural_spline(&log_k, &log_p);
        Ok(PkTable {
            log_k,
            log_p,
            second,
        })
    }

    pub fn len(&self) -> usize {
        self.log_k.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log_k.is_empty()
    }

    pub fn k_min(&self) -> Energy {
        (self.log_k[0].exp()) / MPC
    }

    pub fn k_max(&self) -> Energy {
        (self.log_k[self.log_k.len() - 1].exp()) / MPC
    }

    /// Whether `k` lies inside the usable window after applying the
    /// given clearances to the tabulated endpoints.
    pub fn is_valid(&self, k: Energy, bottom_clearance: f64, top_clearance: f64) -> bool {
        k >= bottom_clearance * self.k_min() && k <= top_clearance * self.k_max()
    }

    /// Interpolated `P(k)`. Outside the tabulated range the spectrum is
    /// extrapolated along the boundary power law, which callers avoid by
    /// checking [`Self::is_valid`] first.
    pub fn eval(&self, k: Energy) -> InverseEnergy3 {
        let x = (k * MPC).ln();
        let n = self.log_k.len();
        let i = match self.log_k.binary_search_by(|probe| probe.total_cmp(&x)) {
            Ok(exact) => return self.log_p[exact].exp() * MPC3,
            Err(0) => 0,
            Err(idx) if idx >= n => n - 2,
            Err(idx) => idx - 1,
        };
        let h = self.log_k[i + 1] - self.log_k[i];
        let a = (self.log_k[i + 1] - x) / h;
        let b = (x - self.log_k[i]) / h;
        let log_p = if (0.0..=1.0).contains(&a) {
            a * self.log_p[i]
                + b * self.log_p[i + 1]
                + ((a * a * a - a) * self.second[i] + (b * b * b - b) * self.second[i + 1]) * h * h
                    / 6.0
        } else {
            // Power-law continuation off either end.
            let slope = (self.log_p[i + 1] - self.log_p[i]) / h;
            self.log_p[i] + slope * (x - self.log_k[i])
        };
        log_p.exp() * MPC3
    }

    /// The tabulated sample points.
    pub fn points(&self) -> Vec<(Energy, InverseEnergy3)> {
        self.log_k
            .iter()
            .zip(&self.log_p)
            .map(|(&lk, &lp)| (lk.exp() / MPC, lp.exp() * MPC3))
            .collect()
    }

    /// Rescale every `P` value by a constant factor.
    pub fn rescaled(&self, factor: f64) -> PkTable {
        let points: Vec<_> = self
            .points()
            .into_iter()
            .map(|(k, p)| (k, factor * p))
            .collect();
        PkTable::new(&points).expect("rescaling preserves table validity")
    }
}

fn natural_spline(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let mut second = vec![0.0; n];
    let mut scratch = vec![0.0; n];
    for i in 1..n - 1 {
        let sig = (x[i] - x[i - 1]) / (x[i + 1] - x[i - 1]);
        let p = sig * second[i - 1] + 2.0;
        second[i] = (sig - 1.0) / p;
        let d = (y[i + 1] - y[i]) / (x[i + 1] - x[i]) - (y[i] - y[i - 1]) / (x[i] - x[i - 1]);
        scratch[i] = (6.0 * d / (x[i + 1] - x[i - 1]) - sig * scratch[i - 1]) / p;
    }
    for i in (0..n - 1).rev() {
        second[i] = second[i] * second[i + 1] + scratch[i];
    }
    second
}

impl Encode for PkTable {
    fn encode(&self, out: &mut impl BufWriter) {
        self.points().encode(out);
    }
}

impl Decode for PkTable {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        let points = Vec::<(Energy, InverseEnergy3)>::decode(reader)?;
        PkTable::new(&points).map_err(|_| DecodeError::InvalidTag {
            tag: 0,
            kind: "spectrum table",
        })
    }
}

/// A linear spectrum loaded from disk, carrying its content identity.
#[derive(Debug, Clone)]
pub struct LinearPk {
    path: PathBuf,
    hash: String,
    table: PkTable,
}

impl LinearPk {
    /// Load a two-column ASCII table. Blank lines and `#` comments are
    /// skipped. The MD5 digest of the raw file bytes becomes the
    /// spectrum's identity.
    pub fn load(path: &Path) -> Result<Self, SpectrumError> {
        let bytes = fs::read(path).map_err(|source| SpectrumError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let hash = hex::encode(Md5::digest(&bytes));

        let text = String::from_utf8_lossy(&bytes);
        let mut points = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut cols = line.split_whitespace();
            let parse = |field: Option<&str>| {
                field
                    .and_then(|s| s.parse::<f64>().ok())
                    .ok_or(SpectrumError::Malformed {
                        path: path.to_path_buf(),
                        line: idx + 1,
                    })
            };
            let k = parse(cols.next())?;
            let p = parse(cols.next())?;
            points.push((k / MPC, p * MPC3));
        }
        let table = PkTable::new(&points)?;
        debug!(
            "loaded linear spectrum {} ({} samples, md5 {hash})",
            path.display(),
            table.len()
        );
        Ok(LinearPk {
            path: path.to_path_buf(),
            hash,
            table,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hex-encoded MD5 digest of the file content.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn table(&self) -> &PkTable {
        &self.table
    }

    /// The same spectrum with every `P` value scaled by `factor`. Path
    /// and content identity are preserved; rescaling is an amplitude
    /// adjustment, not a new spectrum.
    pub fn rescaled(&self, factor: f64) -> LinearPk {
        LinearPk {
            path: self.path.clone(),
            hash: self.hash.clone(),
            table: self.table.rescaled(factor),
        }
    }
}

/// A linear spectrum after wiggle/no-wiggle filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredPk {
    pub token: LinearPkToken,
    pub raw: PkTable,
    pub nowiggle: PkTable,
}

impl FilteredPk {
    pub fn pk_raw(&self, k: Energy) -> InverseEnergy3 {
        self.raw.eval(k)
    }

    pub fn pk_nowiggle(&self, k: Energy) -> InverseEnergy3 {
        self.nowiggle.eval(k)
    }

    /// The baryon-acoustic part, `raw - nowiggle`.
    pub fn pk_wiggle(&self, k: Energy) -> InverseEnergy3 {
        self.raw.eval(k) - self.nowiggle.eval(k)
    }
}

impl Encode for FilteredPk {
    fn encode(&self, out: &mut impl BufWriter) {
        self.token.encode(out);
        self.raw.encode(out);
        self.nowiggle.encode(out);
    }
}

impl Decode for FilteredPk {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        Ok(FilteredPk {
            token: LinearPkToken::decode(reader)?,
            raw: PkTable::decode(reader)?,
            nowiggle: PkTable::decode(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn power_law_table() -> PkTable {
        // P(k) = 1e4 * (k Mpc)^-1.5 over two decades.
        let points: Vec<_> = (0..50)
            .map(|i| {
                let k = 10f64.powf(-2.0 + 2.0 * i as f64 / 49.0);
                (k / MPC, 1.0e4 * k.powf(-1.5) * MPC3)
            })
            .collect();
        PkTable::new(&points).unwrap()
    }

    #[test]
    fn interpolation_reproduces_power_law() {
        let table = power_law_table();
        for &k in &[0.005f64, 0.02, 0.3, 0.9] {
            let expected = 1.0e4 * k.powf(-1.5);
            let got = table.eval(k / MPC) / MPC3;
            assert!(
                (got / expected - 1.0).abs() < 1e-6,
                "k = {k}: {got} vs {expected}"
            );
        }
    }

    #[test]
    fn validity_window_applies_clearances() {
        let table = power_law_table();
        assert!(table.is_valid(0.05 / MPC, 1.1, 0.9));
        assert!(!table.is_valid(0.0105 / MPC, 1.1, 0.9));
        assert!(!table.is_valid(0.95 / MPC, 1.1, 0.9));
    }

    #[test]
    fn table_roundtrips_on_the_wire() {
        let table = power_law_table();
        let bytes = table.encoded();
        let decoded = PkTable::from_slice(&bytes).unwrap();
        let k = 0.1 / MPC;
        assert!((decoded.eval(k) / table.eval(k) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn identical_content_hashes_identically() {
        let dir = tempfile::tempdir().unwrap();
        let body = "# k P\n0.01 1000\n0.02 900\n0.04 800\n0.08 700\n0.16 600\n";

        let path_a = dir.path().join("a.dat");
        let path_b = dir.path().join("copied.dat");
        for path in [&path_a, &path_b] {
            let mut file = fs::File::create(path).unwrap();
            file.write_all(body.as_bytes()).unwrap();
        }

        let a = LinearPk::load(&path_a).unwrap();
        let b = LinearPk::load(&path_b).unwrap();
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn malformed_rows_are_reported_with_line_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.dat");
        fs::write(&path, "0.01 1000\nnot-a-number 5\n").unwrap();
        match LinearPk::load(&path) {
            Err(SpectrumError::Malformed { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
