//! Tolerance and mode blocks for the individual subsystems.
//!
//! Parameter blocks are tokenised by the data manager from their
//! enumerated fields; a block is never defaulted implicitly into meaning
//! a particular choice, so every field shows up in the schema and on the
//! wire.

use oneloop_units::InverseEnergy;
use oneloop_wire::{BufReader, BufWriter, Decode, DecodeError, Encode};

/// Wiggle/no-wiggle filter settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    /// Multiplier on the smallest tabulated k giving the lowest usable
    /// scale of the convolution.
    pub bottom_clearance: f64,
    /// Multiplier on the largest tabulated k giving the highest usable
    /// scale of the convolution.
    pub top_clearance: f64,
    /// Width factor of the log-space Gaussian; the smoothing scale is
    /// `log10(width * h)` dex.
    pub width: f64,
    pub abs_tol: f64,
    pub rel_tol: f64,
}

impl Default for FilterParams {
    fn default() -> Self {
        FilterParams {
            bottom_clearance: 1.1,
            top_clearance: 0.9,
            width: 0.25,
            abs_tol: 1e-10,
            rel_tol: 1e-6,
        }
    }
}

/// Growth-factor integration settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthParams {
    /// Replace the ODE system by its Einstein-de Sitter limits.
    pub eds_mode: bool,
    /// Start the higher-order factors from their EdS values rather than
    /// from zero.
    pub eds_ics: bool,
    pub abs_tol: f64,
    pub rel_tol: f64,
}

impl Default for GrowthParams {
    fn default() -> Self {
        GrowthParams {
            eds_mode: false,
            eds_ics: true,
            abs_tol: 1e-12,
            rel_tol: 1e-8,
        }
    }
}

/// Loop-kernel integration settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopParams {
    pub abs_tol: f64,
    pub rel_tol: f64,
}

impl Default for LoopParams {
    fn default() -> Self {
        LoopParams {
            abs_tol: 1e-8,
            rel_tol: 1e-5,
        }
    }
}

/// Matsubara X & Y integration settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatsubaraXyParams {
    /// Comoving separation at which the displacement dispersions are
    /// evaluated; conventionally the BAO scale.
    pub bao_scale: InverseEnergy,
    pub abs_tol: f64,
    pub rel_tol: f64,
}

impl Default for MatsubaraXyParams {
    fn default() -> Self {
        MatsubaraXyParams {
            bao_scale: InverseEnergy::new(110.0),
            abs_tol: 1e-10,
            rel_tol: 1e-6,
        }
    }
}

impl Encode for FilterParams {
    fn encode(&self, out: &mut impl BufWriter) {
        out.put_f64(self.bottom_clearance);
        out.put_f64(self.top_clearance);
        out.put_f64(self.width);
        out.put_f64(self.abs_tol);
        out.put_f64(self.rel_tol);
    }
}

impl Decode for FilterParams {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        Ok(FilterParams {
            bottom_clearance: reader.get_f64()?,
            top_clearance: reader.get_f64()?,
            width: reader.get_f64()?,
            abs_tol: reader.get_f64()?,
            rel_tol: reader.get_f64()?,
        })
    }
}

impl Encode for GrowthParams {
    fn encode(&self, out: &mut impl BufWriter) {
        self.eds_mode.encode(out);
        self.eds_ics.encode(out);
        out.put_f64(self.abs_tol);
        out.put_f64(self.rel_tol);
    }
}

impl Decode for GrowthParams {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        Ok(GrowthParams {
            eds_mode: bool::decode(reader)?,
            eds_ics: bool::decode(reader)?,
            abs_tol: reader.get_f64()?,
            rel_tol: reader.get_f64()?,
        })
    }
}

impl Encode for LoopParams {
    fn encode(&self, out: &mut impl BufWriter) {
        out.put_f64(self.abs_tol);
        out.put_f64(self.rel_tol);
    }
}

impl Decode for LoopParams {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        Ok(LoopParams {
            abs_tol: reader.get_f64()?,
            rel_tol: reader.get_f64()?,
        })
    }
}

impl Encode for MatsubaraXyParams {
    fn encode(&self, out: &mut impl BufWriter) {
        self.bao_scale.encode(out);
        out.put_f64(self.abs_tol);
        out.put_f64(self.rel_tol);
    }
}

impl Decode for MatsubaraXyParams {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        Ok(MatsubaraXyParams {
            bao_scale: InverseEnergy::decode(reader)?,
            abs_tol: reader.get_f64()?,
            rel_tol: reader.get_f64()?,
        })
    }
}
