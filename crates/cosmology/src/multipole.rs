//! Legendre multipoles of the one-loop redshift-space spectrum, with and
//! without infrared resummation, and the associated k^2 counterterm
//! coefficients.
//!
//! The mu decomposition assembled upstream is projected analytically:
//! moments of `mu^(2n)` against `L_l` are rational numbers. Resummation
//! damps only the wiggle part, with the Matsubara coefficients entering
//! through `exp(-k^2/2 (1 + f(f+2) mu^2) (X+Y))`; the damped wiggle
//! moments are taken with a fixed-order Gauss-Legendre rule, which is a
//! collaborator-side choice and deliberately not routed through the
//! adaptive integration driver.

use oneloop_units::{
    Energy, GrowthParamsToken, InverseEnergy3, IrResumToken, IrToken, KToken, LinearPkToken,
    LoopParamsToken, ModelToken, UvToken, XyParamsToken, ZToken,
};
use oneloop_wire::{BufReader, BufWriter, Decode, DecodeError, Encode};

use crate::growth::GrowthRecord;
use crate::matsubara::MatsubaraXy;
use crate::oneloop::{PkComponent, RsdPk, MU_POWERS};
use crate::spectrum::FilteredPk;

/// Plain and resummed values of one multipole component, Mpc^3.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Resummed {
    pub plain: InverseEnergy3,
    pub resummed: InverseEnergy3,
}

/// One Legendre multipole of the assembled spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MultipoleData {
    pub tree: Resummed,
    pub p13: Resummed,
    pub p22: Resummed,
    pub spt: Resummed,
}

/// The three stored multipoles with their keying tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipolePk {
    pub model: ModelToken,
    pub growth_params: GrowthParamsToken,
    pub loop_params: LoopParamsToken,
    pub xy_params: XyParamsToken,
    pub pk_init: LinearPkToken,
    pub pk_final: Option<LinearPkToken>,
    pub k: KToken,
    pub z: ZToken,
    pub uv: UvToken,
    pub ir: IrToken,
    pub ir_resum: IrResumToken,
    pub p0: MultipoleData,
    pub p2: MultipoleData,
    pub p4: MultipoleData,
}

/// k^2 counterterm coefficients per multipole.
#[derive(Debug, Clone, PartialEq)]
pub struct Counterterms {
    pub model: ModelToken,
    pub growth_params: GrowthParamsToken,
    pub xy_params: XyParamsToken,
    pub pk_init: LinearPkToken,
    pub pk_final: Option<LinearPkToken>,
    pub k: KToken,
    pub z: ZToken,
    pub uv: UvToken,
    pub ir: IrToken,
    pub ir_resum: IrResumToken,
    pub c0: Resummed,
    pub c2: Resummed,
    pub c4: Resummed,
}

/// `(2l+1)/2 Int_{-1}^{1} mu^(2n) L_l(mu) d mu` for l in {0, 2, 4} and
/// n in 0..=4.
const MU_MOMENTS: [[f64; MU_POWERS]; 3] = [
    [1.0, 1.0 / 3.0, 1.0 / 5.0, 1.0 / 7.0, 1.0 / 9.0],
    [0.0, 2.0 / 3.0, 4.0 / 7.0, 10.0 / 21.0, 40.0 / 99.0],
    [0.0, 0.0, 8.0 / 35.0, 24.0 / 77.0, 48.0 / 143.0],
];

// 8-point Gauss-Legendre rule on [-1, 1].
const GL_NODES: [f64; 8] = [
    -0.960_289_856_497_536_2,
    -0.796_666_477_413_626_7,
    -0.525_532_409_916_329_0,
    -0.183_434_642_495_649_8,
    0.183_434_642_495_649_8,
    0.525_532_409_916_329_0,
    0.796_666_477_413_626_7,
    0.960_289_856_497_536_2,
];
const GL_WEIGHTS: [f64; 8] = [
    0.101_228_536_290_376_3,
    0.222_381_034_453_374_5,
    0.313_706_645_877_887_3,
    0.362_683_783_378_362_0,
    0.362_683_783_378_362_0,
    0.313_706_645_877_887_3,
    0.222_381_034_453_374_5,
    0.101_228_536_290_376_3,
];

/// `L_l(mu)` for the index into {0, 2, 4}.
fn legendre(ell_idx: usize, mu: f64) -> f64 {
    let mu2 = mu * mu;
    match ell_idx {
        0 => 1.0,
        1 => (3.0 * mu2 - 1.0) / 2.0,
        _ => (35.0 * mu2 * mu2 - 30.0 * mu2 + 3.0) / 8.0,
    }
}

/// Project one assembled mu decomposition onto l in {0, 2, 4}.
///
/// `damping(mu)` multiplies the wiggle part of every component; the
/// no-wiggle part is projected analytically.
fn project(
    mu_components: &[RsdPk; MU_POWERS],
    select: impl Fn(&RsdPk) -> &PkComponent,
    damping: impl Fn(f64) -> f64,
) -> [Resummed; 3] {
    std::array::from_fn(|ell_idx| {
        let ell = 2 * ell_idx;
        let mut plain = InverseEnergy3::ZERO;
        let mut smooth = InverseEnergy3::ZERO;
        for n in 0..MU_POWERS {
            let component = select(&mu_components[n]);
            plain = plain + MU_MOMENTS[ell_idx][n] * component.raw.value;
            smooth = smooth + MU_MOMENTS[ell_idx][n] * component.nowiggle.value;
        }

        // Damped wiggle moment, by quadrature.
        let mut damped_wiggle = 0.0;
        for (node, weight) in GL_NODES.iter().zip(&GL_WEIGHTS) {
            let mut integrand = 0.0;
            let mut mu_pow = 1.0;
            for n in 0..MU_POWERS {
                integrand += mu_pow * select(&mu_components[n]).wiggle().raw();
                mu_pow *= node * node;
            }
            damped_wiggle +=
                weight * legendre(ell_idx, *node) * integrand * damping(*node);
        }
        damped_wiggle *= (2.0 * ell as f64 + 1.0) / 2.0;

        Resummed {
            plain,
            resummed: smooth + InverseEnergy3::new(damped_wiggle),
        }
    })
}

/// Compute the three multipoles of one configuration.
pub fn multipoles(
    k: Energy,
    growth: &GrowthRecord,
    xy: &MatsubaraXy,
    mu_components: &[RsdPk; MU_POWERS],
) -> [MultipoleData; 3] {
    let damping = damping_factor(k, growth, xy);

    let tree = project(mu_components, |c| &c.tree, &damping);
    let p13 = project(mu_components, |c| &c.p13, &damping);
    let p22 = project(mu_components, |c| &c.p22, &damping);
    let spt = project(mu_components, |c| &c.spt, &damping);

    std::array::from_fn(|ell| MultipoleData {
        tree: tree[ell],
        p13: p13[ell],
        p22: p22[ell],
        spt: spt[ell],
    })
}

/// Counterterm coefficients `c_l = -k^2 (X+Y) x <(1 + f(f+2) mu^2) L_l>`
/// against the tree spectrum, plain and resummed.
pub fn counterterms(
    k: Energy,
    growth: &GrowthRecord,
    xy: &MatsubaraXy,
    pk_init: &FilteredPk,
    pk_final: Option<&FilteredPk>,
) -> [Resummed; 3] {
    let g = growth.value.linear;
    let f = growth.rate.linear;
    let base = pk_final.unwrap_or(pk_init);
    let tree_raw = g * g * base.pk_raw(k);
    let tree_nw = g * g * base.pk_nowiggle(k);
    let tree_wiggle = (tree_raw - tree_nw).raw();

    let amplitude = -((k * k) * xy.total());
    let damping = damping_factor(k, growth, xy);
    let rsd = f * (f + 2.0);

    std::array::from_fn(|ell_idx| {
        let ell = 2 * ell_idx;
        // <L_l> is nonzero only for l = 0; <mu^2 L_l> is MU_MOMENTS[.][1].
        let moment = if ell == 0 { 1.0 } else { 0.0 } + rsd * MU_MOMENTS[ell_idx][1];
        let plain = amplitude * moment * tree_raw;

        let mut damped = 0.0;
        for (node, weight) in GL_NODES.iter().zip(&GL_WEIGHTS) {
            let mu2 = node * node;
            damped += weight
                * legendre(ell_idx, *node)
                * (1.0 + rsd * mu2)
                * tree_wiggle
                * damping(*node);
        }
        damped *= (2.0 * ell as f64 + 1.0) / 2.0;
        let resummed = amplitude * (moment * tree_nw + InverseEnergy3::new(damped));

        Resummed { plain, resummed }
    })
}

fn damping_factor(k: Energy, growth: &GrowthRecord, xy: &MatsubaraXy) -> impl Fn(f64) -> f64 {
    let k_sq_xy = (k * k) * xy.total();
    let rsd = growth.rate.linear * (growth.rate.linear + 2.0);
    move |mu: f64| (-0.5 * k_sq_xy * (1.0 + rsd * mu * mu)).exp()
}

impl Encode for Resummed {
    fn encode(&self, out: &mut impl BufWriter) {
        self.plain.encode(out);
        self.resummed.encode(out);
    }
}

impl Decode for Resummed {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        Ok(Resummed {
            plain: InverseEnergy3::decode(reader)?,
            resummed: InverseEnergy3::decode(reader)?,
        })
    }
}

impl Encode for MultipoleData {
    fn encode(&self, out: &mut impl BufWriter) {
        self.tree.encode(out);
        self.p13.encode(out);
        self.p22.encode(out);
        self.spt.encode(out);
    }
}

impl Decode for MultipoleData {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        Ok(MultipoleData {
            tree: Resummed::decode(reader)?,
            p13: Resummed::decode(reader)?,
            p22: Resummed::decode(reader)?,
            spt: Resummed::decode(reader)?,
        })
    }
}

impl Encode for MultipolePk {
    fn encode(&self, out: &mut impl BufWriter) {
        self.model.encode(out);
        self.growth_params.encode(out);
        self.loop_params.encode(out);
        self.xy_params.encode(out);
        self.pk_init.encode(out);
        self.pk_final.encode(out);
        self.k.encode(out);
        self.z.encode(out);
        self.uv.encode(out);
        self.ir.encode(out);
        self.ir_resum.encode(out);
        self.p0.encode(out);
        self.p2.encode(out);
        self.p4.encode(out);
    }
}

impl Decode for MultipolePk {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        Ok(MultipolePk {
            model: ModelToken::decode(reader)?,
            growth_params: GrowthParamsToken::decode(reader)?,
            loop_params: LoopParamsToken::decode(reader)?,
            xy_params: XyParamsToken::decode(reader)?,
            pk_init: LinearPkToken::decode(reader)?,
            pk_final: Option::<LinearPkToken>::decode(reader)?,
            k: KToken::decode(reader)?,
            z: ZToken::decode(reader)?,
            uv: UvToken::decode(reader)?,
            ir: IrToken::decode(reader)?,
            ir_resum: IrResumToken::decode(reader)?,
            p0: MultipoleData::decode(reader)?,
            p2: MultipoleData::decode(reader)?,
            p4: MultipoleData::decode(reader)?,
        })
    }
}

impl Encode for Counterterms {
    fn encode(&self, out: &mut impl BufWriter) {
        self.model.encode(out);
        self.growth_params.encode(out);
        self.xy_params.encode(out);
        self.pk_init.encode(out);
        self.pk_final.encode(out);
        self.k.encode(out);
        self.z.encode(out);
        self.uv.encode(out);
        self.ir.encode(out);
        self.ir_resum.encode(out);
        self.c0.encode(out);
        self.c2.encode(out);
        self.c4.encode(out);
    }
}

impl Decode for Counterterms {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        Ok(Counterterms {
            model: ModelToken::decode(reader)?,
            growth_params: GrowthParamsToken::decode(reader)?,
            xy_params: XyParamsToken::decode(reader)?,
            pk_init: LinearPkToken::decode(reader)?,
            pk_final: Option::<LinearPkToken>::decode(reader)?,
            k: KToken::decode(reader)?,
            z: ZToken::decode(reader)?,
            uv: UvToken::decode(reader)?,
            ir: IrToken::decode(reader)?,
            ir_resum: IrResumToken::decode(reader)?,
            c0: Resummed::decode(reader)?,
            c2: Resummed::decode(reader)?,
            c4: Resummed::decode(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::growth::eds_record;
    use crate::oneloop::{PkComponent, PkValue};
    use oneloop_units::{InverseEnergy2, MPC};

    fn kaiser_only(p: f64, f: f64) -> [RsdPk; MU_POWERS] {
        let component = |value: f64| PkComponent {
            raw: PkValue::new(InverseEnergy3::new(value), InverseEnergy3::ZERO),
            nowiggle: PkValue::new(InverseEnergy3::new(value), InverseEnergy3::ZERO),
        };
        let weights = [1.0, 2.0 * f, f * f, 0.0, 0.0];
        std::array::from_fn(|n| RsdPk {
            tree: component(weights[n] * p),
            p13: PkComponent::default(),
            p22: PkComponent::default(),
            spt: component(weights[n] * p),
        })
    }

    fn no_damping_xy() -> MatsubaraXy {
        MatsubaraXy {
            model: ModelToken::new(0),
            params: XyParamsToken::new(0),
            pk_lin: LinearPkToken::new(0),
            ir_resum: IrResumToken::new(0),
            x: InverseEnergy2::ZERO,
            y: InverseEnergy2::ZERO,
            converged: true,
        }
    }

    #[test]
    fn kaiser_multipoles_match_closed_forms() {
        // P(k, mu) = (1 + f mu^2)^2 P with f = 1:
        // P0/P = 1 + 2/3 f + ... evaluated with the standard formulas.
        let f = 1.0;
        let p = 1.0e4;
        let growth = eds_record(0.0);
        let mu = kaiser_only(p, f);
        let result = multipoles(0.1 / MPC, &growth, &no_damping_xy(), &mu);

        let p0 = 1.0 + 2.0 * f / 3.0 + f * f / 5.0;
        let p2 = 4.0 * f / 3.0 + 4.0 * f * f / 7.0;
        let p4 = 8.0 * f * f / 35.0;
        assert!((result[0].spt.plain.raw() / (p0 * p) - 1.0).abs() < 1e-12);
        assert!((result[1].spt.plain.raw() / (p2 * p) - 1.0).abs() < 1e-12);
        assert!((result[2].spt.plain.raw() / (p4 * p) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_damping_means_resummed_equals_plain() {
        let growth = eds_record(0.0);
        let mu = kaiser_only(5.0e3, growth.rate.linear);
        let result = multipoles(0.1 / MPC, &growth, &no_damping_xy(), &mu);
        for data in &result {
            assert!((data.spt.resummed.raw() - data.spt.plain.raw()).abs() < 1e-6);
        }
    }

    #[test]
    fn damping_suppresses_only_the_wiggle_part() {
        let growth = eds_record(0.0);
        // Components whose raw and no-wiggle parts differ.
        let mut mu = kaiser_only(1.0e4, 1.0);
        for entry in &mut mu {
            entry.spt.nowiggle.value = 0.9 * entry.spt.raw.value;
            entry.tree.nowiggle.value = 0.9 * entry.tree.raw.value;
        }
        let xy = MatsubaraXy {
            x: InverseEnergy2::new(50.0),
            y: InverseEnergy2::new(10.0),
            ..no_damping_xy()
        };
        let result = multipoles(0.3 / MPC, &growth, &xy, &mu);
        let monopole = result[0].spt;
        // Resummed lies between the pure no-wiggle projection and the
        // undamped spectrum.
        assert!(monopole.resummed.raw() < monopole.plain.raw());
        assert!(monopole.resummed.raw() > 0.89 * monopole.plain.raw());
    }

    #[test]
    fn counterterms_are_negative_for_positive_xy() {
        let growth = eds_record(0.0);
        let xy = MatsubaraXy {
            x: InverseEnergy2::new(20.0),
            y: InverseEnergy2::new(5.0),
            ..no_damping_xy()
        };
        let points: Vec<_> = (0..40)
            .map(|i| {
                let kk = 10f64.powf(-2.5 + 2.5 * i as f64 / 39.0);
                (kk / MPC, 1.0e4 * kk.powf(-1.1) * oneloop_units::MPC3)
            })
            .collect();
        let table = crate::spectrum::PkTable::new(&points).unwrap();
        let pk = FilteredPk {
            token: LinearPkToken::new(0),
            raw: table.clone(),
            nowiggle: table,
        };
        let c = counterterms(0.1 / MPC, &growth, &xy, &pk, None);
        assert!(c[0].plain.raw() < 0.0);
        // The quadrupole coefficient follows the mu^2 moment.
        assert!(c[1].plain.raw() < 0.0);
    }
}
