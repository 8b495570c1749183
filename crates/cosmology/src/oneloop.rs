//! Assembly of the one-loop redshift-space P(k), decomposed in powers of
//! mu, from growth factors, loop kernels and the filtered linear
//! spectrum.
//!
//! Conventions: the linear spectrum is defined at the initial redshift
//! and the linear factor g is normalised there, so every assembled
//! component carries its growth factors explicitly. The tree term has
//! the Kaiser structure `(1 + f mu^2)^2 g^2 P`; the loop terms are
//! distributed over mu powers with the binomial weights
//! `[1, 4f, 6f^2, 4f^3, f^4]`.

use oneloop_units::{
    Energy, GrowthParamsToken, InverseEnergy3, IrToken, KToken, LinearPkToken, LoopParamsToken,
    ModelToken, UvToken, ZToken,
};
use oneloop_wire::{BufReader, BufWriter, Decode, DecodeError, Encode};

use crate::growth::GrowthRecord;
use crate::loop_integral::LoopKernels;
use crate::spectrum::FilteredPk;

/// Value and 1-sigma error of one spectrum component, Mpc^3.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PkValue {
    pub value: InverseEnergy3,
    pub error: InverseEnergy3,
}

impl PkValue {
    pub fn new(value: InverseEnergy3, error: InverseEnergy3) -> Self {
        PkValue { value, error }
    }

    fn scaled(self, factor: f64) -> Self {
        PkValue {
            value: factor * self.value,
            error: factor.abs() * self.error,
        }
    }

    fn add(self, other: Self) -> Self {
        // Errors are independent between components, so add in
        // quadrature.
        let error = (self.error.raw() * self.error.raw()
            + other.error.raw() * other.error.raw())
        .sqrt();
        PkValue {
            value: self.value + other.value,
            error: InverseEnergy3::new(error),
        }
    }
}

/// Raw and no-wiggle branches of one component.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PkComponent {
    pub raw: PkValue,
    pub nowiggle: PkValue,
}

impl PkComponent {
    fn scaled(self, factor: f64) -> Self {
        PkComponent {
            raw: self.raw.scaled(factor),
            nowiggle: self.nowiggle.scaled(factor),
        }
    }

    fn add(self, other: Self) -> Self {
        PkComponent {
            raw: self.raw.add(other.raw),
            nowiggle: self.nowiggle.add(other.nowiggle),
        }
    }

    /// The acoustic part, `raw - nowiggle`.
    pub fn wiggle(&self) -> InverseEnergy3 {
        self.raw.value - self.nowiggle.value
    }
}

/// One mu power of the one-loop redshift-space spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RsdPk {
    pub tree: PkComponent,
    pub p13: PkComponent,
    pub p22: PkComponent,
    pub spt: PkComponent,
}

/// Number of mu powers carried by the decomposition (mu^0 .. mu^8).
pub const MU_POWERS: usize = 5;

/// The assembled one-loop P(k) at a single `(k, z, UV, IR)`
/// configuration, with its keying tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct OneLoopPk {
    pub model: ModelToken,
    pub growth_params: GrowthParamsToken,
    pub loop_params: LoopParamsToken,
    pub pk_init: LinearPkToken,
    pub pk_final: Option<LinearPkToken>,
    pub k: KToken,
    pub z: ZToken,
    pub uv: UvToken,
    pub ir: IrToken,
    pub mu: [RsdPk; MU_POWERS],
}

/// Assemble the mu decomposition at one redshift.
pub fn assemble(
    k: Energy,
    growth: &GrowthRecord,
    kernels: &LoopKernels,
    pk_init: &FilteredPk,
    pk_final: Option<&FilteredPk>,
) -> [RsdPk; MU_POWERS] {
    let g = growth.value.linear;
    let f = growth.rate.linear;
    let a = growth.value.a;
    let b = growth.value.b;

    // Tree level from the final spectrum when one is present, otherwise
    // from the initial spectrum.
    let base = pk_final.unwrap_or(pk_init);
    let tree = PkComponent {
        raw: PkValue::new(g * g * base.pk_raw(k), InverseEnergy3::ZERO),
        nowiggle: PkValue::new(g * g * base.pk_nowiggle(k), InverseEnergy3::ZERO),
    };

    // P22 = A^2 AA + A B AB + B^2 BB; the kernels carry the symmetry
    // factors.
    let p22 = scaled_kernel(kernels, |k| &k.aa, a * a)
        .add(scaled_kernel(kernels, |k| &k.ab, a * b))
        .add(scaled_kernel(kernels, |k| &k.bb, b * b));

    // P13 = g P(k) [ D Dk + E Ek + F Fk + G Gk + J (J1k + J2k) ];
    // the 13-type kernels are dimensionless.
    let p13_raw = p13_branch(growth, kernels, pk_init.pk_raw(k), false);
    let p13_nw = p13_branch(growth, kernels, pk_init.pk_nowiggle(k), true);
    let p13 = PkComponent {
        raw: p13_raw,
        nowiggle: p13_nw,
    };

    // Distribute over mu powers.
    let f2 = f * f;
    let tree_weights = [1.0, 2.0 * f, f2, 0.0, 0.0];
    let loop_weights = [1.0, 4.0 * f, 6.0 * f2, 4.0 * f2 * f, f2 * f2];

    std::array::from_fn(|n| {
        let tree_n = tree.scaled(tree_weights[n]);
        let p13_n = p13.scaled(loop_weights[n]);
        let p22_n = p22.scaled(loop_weights[n]);
        let spt = tree_n.add(p13_n).add(p22_n);
        RsdPk {
            tree: tree_n,
            p13: p13_n,
            p22: p22_n,
            spt,
        }
    })
}

fn scaled_kernel(
    kernels: &LoopKernels,
    select: impl Fn(&LoopKernels) -> &crate::loop_integral::KernelResult,
    factor: f64,
) -> PkComponent {
    let kernel = select(kernels);
    PkComponent {
        raw: PkValue::new(
            factor * InverseEnergy3::new(kernel.raw.value),
            factor.abs() * InverseEnergy3::new(kernel.raw.error),
        ),
        nowiggle: PkValue::new(
            factor * InverseEnergy3::new(kernel.nowiggle.value),
            factor.abs() * InverseEnergy3::new(kernel.nowiggle.error),
        ),
    }
}

fn p13_branch(
    growth: &GrowthRecord,
    kernels: &LoopKernels,
    pk: InverseEnergy3,
    nowiggle: bool,
) -> PkValue {
    let g = growth.value.linear;
    let pick = |kernel: &crate::loop_integral::KernelResult| {
        if nowiggle {
            kernel.nowiggle
        } else {
            kernel.raw
        }
    };
    let terms = [
        (growth.value.d, pick(&kernels.d)),
        (growth.value.e, pick(&kernels.e)),
        (growth.value.f, pick(&kernels.f)),
        (growth.value.g, pick(&kernels.g)),
        (growth.value.j, pick(&kernels.j1)),
        (growth.value.j, pick(&kernels.j2)),
    ];
    let mut total = 0.0;
    let mut err_sq = 0.0;
    for (factor, row) in terms {
        total += factor * row.value;
        err_sq += (factor * row.error) * (factor * row.error);
    }
    PkValue {
        value: g * total * pk,
        error: g.abs() * err_sq.sqrt() * pk.abs(),
    }
}

impl Encode for PkValue {
    fn encode(&self, out: &mut impl BufWriter) {
        self.value.encode(out);
        self.error.encode(out);
    }
}

impl Decode for PkValue {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        Ok(PkValue {
            value: InverseEnergy3::decode(reader)?,
            error: InverseEnergy3::decode(reader)?,
        })
    }
}

impl Encode for PkComponent {
    fn encode(&self, out: &mut impl BufWriter) {
        self.raw.encode(out);
        self.nowiggle.encode(out);
    }
}

impl Decode for PkComponent {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        Ok(PkComponent {
            raw: PkValue::decode(reader)?,
            nowiggle: PkValue::decode(reader)?,
        })
    }
}

impl Encode for RsdPk {
    fn encode(&self, out: &mut impl BufWriter) {
        self.tree.encode(out);
        self.p13.encode(out);
        self.p22.encode(out);
        self.spt.encode(out);
    }
}

impl Decode for RsdPk {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        Ok(RsdPk {
            tree: PkComponent::decode(reader)?,
            p13: PkComponent::decode(reader)?,
            p22: PkComponent::decode(reader)?,
            spt: PkComponent::decode(reader)?,
        })
    }
}

impl Encode for OneLoopPk {
    fn encode(&self, out: &mut impl BufWriter) {
        self.model.encode(out);
        self.growth_params.encode(out);
        self.loop_params.encode(out);
        self.pk_init.encode(out);
        self.pk_final.encode(out);
        self.k.encode(out);
        self.z.encode(out);
        self.uv.encode(out);
        self.ir.encode(out);
        for component in &self.mu {
            component.encode(out);
        }
    }
}

impl Decode for OneLoopPk {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        Ok(OneLoopPk {
            model: ModelToken::decode(reader)?,
            growth_params: GrowthParamsToken::decode(reader)?,
            loop_params: LoopParamsToken::decode(reader)?,
            pk_init: LinearPkToken::decode(reader)?,
            pk_final: Option::<LinearPkToken>::decode(reader)?,
            k: KToken::decode(reader)?,
            z: ZToken::decode(reader)?,
            uv: UvToken::decode(reader)?,
            ir: IrToken::decode(reader)?,
            mu: [
                RsdPk::decode(reader)?,
                RsdPk::decode(reader)?,
                RsdPk::decode(reader)?,
                RsdPk::decode(reader)?,
                RsdPk::decode(reader)?,
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::growth::eds_record;
    use crate::loop_integral::{IntegralRow, KernelResult, LoopKernels};
    use crate::spectrum::PkTable;
    use oneloop_units::{MPC, MPC3};

    fn fake_row(value: f64) -> IntegralRow {
        IntegralRow {
            value,
            error: 0.01 * value.abs(),
            regions: 1,
            evaluations: 17,
            time_ns: 1,
            converged: true,
        }
    }

    fn fake_kernels() -> LoopKernels {
        let pair = |value: f64| KernelResult {
            raw: fake_row(value),
            nowiggle: fake_row(value),
        };
        LoopKernels {
            aa: pair(120.0),
            ab: pair(-30.0),
            bb: pair(55.0),
            d: pair(-0.8),
            e: pair(0.2),
            f: pair(-0.6),
            g: pair(0.1),
            j1: pair(0.05),
            j2: pair(-0.15),
        }
    }

    fn flat_pk() -> FilteredPk {
        let points: Vec<_> = (0..40)
            .map(|i| {
                let k = 10f64.powf(-2.5 + 2.5 * i as f64 / 39.0);
                (k / MPC, 1.0e4 * k.powf(-1.1) * MPC3)
            })
            .collect();
        let table = PkTable::new(&points).unwrap();
        FilteredPk {
            token: oneloop_units::LinearPkToken::new(0),
            raw: table.clone(),
            nowiggle: table,
        }
    }

    #[test]
    fn tree_term_is_kaiser() {
        let growth = eds_record(0.0);
        let pk = flat_pk();
        let k = 0.1 / MPC;
        let mu = assemble(k, &growth, &fake_kernels(), &pk, None);

        let g = growth.value.linear;
        let expected = g * g * pk.pk_raw(k);
        assert!((mu[0].tree.raw.value / expected - 1.0).abs() < 1e-12);
        // EdS rate f = 1: mu^2 coefficient is 2 f, mu^4 is f^2.
        assert!((mu[1].tree.raw.value / (2.0 * expected) - 1.0).abs() < 1e-12);
        assert!((mu[2].tree.raw.value / expected - 1.0).abs() < 1e-12);
        assert_eq!(mu[3].tree.raw.value, InverseEnergy3::ZERO);
        assert_eq!(mu[4].tree.raw.value, InverseEnergy3::ZERO);
    }

    #[test]
    fn spt_is_the_component_sum() {
        let growth = eds_record(0.5);
        let pk = flat_pk();
        let mu = assemble(0.05 / MPC, &growth, &fake_kernels(), &pk, None);
        for entry in &mu {
            let sum = entry.tree.raw.value + entry.p13.raw.value + entry.p22.raw.value;
            assert!((entry.spt.raw.value.raw() - sum.raw()).abs() < 1e-9 * sum.raw().abs().max(1.0));
        }
    }

    #[test]
    fn identical_branches_have_no_wiggle() {
        let growth = eds_record(1.0);
        let pk = flat_pk();
        let mu = assemble(0.05 / MPC, &growth, &fake_kernels(), &pk, None);
        for entry in &mu {
            assert!(entry.spt.wiggle().raw().abs() < 1e-9);
        }
    }

    #[test]
    fn p22_scales_as_fourth_power_of_growth() {
        let pk = flat_pk();
        let kernels = fake_kernels();
        let shallow = assemble(0.05 / MPC, &eds_record(0.0), &kernels, &pk, None);
        let deep = assemble(0.05 / MPC, &eds_record(9.0), &kernels, &pk, None);
        let g_ratio = eds_record(0.0).value.linear / eds_record(9.0).value.linear;
        let p22_ratio = shallow[0].p22.raw.value / deep[0].p22.raw.value;
        assert!((p22_ratio / g_ratio.powi(4) - 1.0).abs() < 1e-9);
    }
}
