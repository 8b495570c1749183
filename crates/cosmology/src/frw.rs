//! FRW background models.

use oneloop_units::{Energy, KELVIN, MPC};
use oneloop_wire::{BufReader, BufWriter, Decode, DecodeError, Encode};

/// A spatially-flat-or-curved FRW background.
///
/// The first five parameters identify the model in the persistent store;
/// the remaining spectral parameters feed the Eisenstein-Hu reference
/// spectrum and are carried alongside but do not participate in
/// tokenisation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrwModel {
    pub omega_m: f64,
    pub omega_cc: f64,
    pub h: f64,
    pub t_cmb: Energy,
    pub n_eff: f64,

    // Fluctuation two-point function.
    pub f_baryon: f64,
    pub ns: f64,
    pub a_curv: f64,
    pub k_piv: Energy,
    pub sigma8: f64,

    // CMB-related redshifts.
    pub z_star: f64,
    pub z_drag: f64,
    pub z_eq: f64,
}

impl FrwModel {
    /// Matter density parameter at e-fold `n = ln a` (a = 1 today).
    pub fn omega_m_at(&self, n: f64) -> f64 {
        let m = self.omega_m * (-3.0 * n).exp();
        m / (m + self.omega_k() * (-2.0 * n).exp() + self.omega_cc)
    }

    /// Logarithmic derivative of the Hubble rate, `d ln H / d ln a`.
    pub fn dln_h(&self, n: f64) -> f64 {
        let m = self.omega_m * (-3.0 * n).exp();
        let k = self.omega_k() * (-2.0 * n).exp();
        -(3.0 * m + 2.0 * k) / (2.0 * (m + k + self.omega_cc))
    }

    pub fn omega_k(&self) -> f64 {
        1.0 - self.omega_m - self.omega_cc
    }

    pub fn t_cmb_kelvin(&self) -> f64 {
        self.t_cmb / KELVIN
    }
}

/// Parameters matching the MDR1 simulation,
/// <https://www.cosmosim.org/cms/simulations/mdr1/>.
pub fn mdr1() -> FrwModel {
    FrwModel {
        omega_cc: 0.73,
        omega_m: 0.27,
        h: 0.70,
        t_cmb: 2.7255 * KELVIN,
        n_eff: 3.046,
        f_baryon: 0.0469 / 0.27,
        ns: 0.95,
        a_curv: 2.3650e-9,
        k_piv: 0.05 / MPC,
        sigma8: 0.8200,
        z_star: 1088.02,
        z_drag: 1060.39,
        z_eq: 3161.49,
    }
}

/// Parameters matching the Big MultiDark Planck simulation,
/// <https://www.cosmosim.org/cms/simulations/bigmdpl/>.
pub fn big_mdpl() -> FrwModel {
    FrwModel {
        omega_cc: 0.692885,
        omega_m: 0.307115,
        h: 0.6777,
        t_cmb: 2.7255 * KELVIN,
        n_eff: 3.046,
        f_baryon: 0.048206 / 0.307115,
        ns: 0.96,
        a_curv: 1.9716e-9,
        k_piv: 0.05 / MPC,
        sigma8: 0.8228,
        z_star: 1088.75,
        z_drag: 1063.06,
        z_eq: 3596.22,
    }
}

impl Encode for FrwModel {
    fn encode(&self, out: &mut impl BufWriter) {
        out.put_f64(self.omega_m);
        out.put_f64(self.omega_cc);
        out.put_f64(self.h);
        self.t_cmb.encode(out);
        out.put_f64(self.n_eff);
        out.put_f64(self.f_baryon);
        out.put_f64(self.ns);
        out.put_f64(self.a_curv);
        self.k_piv.encode(out);
        out.put_f64(self.sigma8);
        out.put_f64(self.z_star);
        out.put_f64(self.z_drag);
        out.put_f64(self.z_eq);
    }
}

impl Decode for FrwModel {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        Ok(FrwModel {
            omega_m: reader.get_f64()?,
            omega_cc: reader.get_f64()?,
            h: reader.get_f64()?,
            t_cmb: Energy::decode(reader)?,
            n_eff: reader.get_f64()?,
            f_baryon: reader.get_f64()?,
            ns: reader.get_f64()?,
            a_curv: reader.get_f64()?,
            k_piv: Energy::decode(reader)?,
            sigma8: reader.get_f64()?,
            z_star: reader.get_f64()?,
            z_drag: reader.get_f64()?,
            z_eq: reader.get_f64()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matter_dominates_in_the_past() {
        let model = mdr1();
        assert!((model.omega_m_at(0.0) - model.omega_m).abs() < 1e-12);
        // Deep in matter domination Omega_m -> 1 and d ln H / d ln a -> -3/2.
        let n_early = -(1000.0f64).ln();
        assert!(model.omega_m_at(n_early) > 0.999);
        assert!((model.dln_h(n_early) + 1.5).abs() < 1e-3);
    }

    #[test]
    fn model_roundtrips_on_the_wire() {
        let model = big_mdpl();
        let bytes = model.encoded();
        assert_eq!(FrwModel::from_slice(&bytes).unwrap(), model);
    }
}
