//! Work item and result payload types for every pipeline phase.
//!
//! A work item carries everything its calculator needs — values, the
//! tokens that will key the result rows, parameter blocks, and any
//! spectrum tables — so workers never touch the persistent store. A
//! result echoes the tokens of the item it came from; the master commits
//! results keyed by those tokens, which makes redelivery idempotent.

use oneloop_units::{
    Energy, FilterParamsToken, GrowthParamsToken, InverseEnergy3, IrResumToken, IrToken, KToken,
    LinearPkToken, LoopParamsToken, ModelToken, UvToken, XyParamsToken, ZToken,
};
use oneloop_wire::{BufReader, BufWriter, Decode, DecodeError, Encode};

use crate::frw::FrwModel;
use crate::growth::{GrowthRecord, GrowthRow};
use crate::loop_integral::{LoopIntegral, LoopKernels};
use crate::matsubara::MatsubaraXy;
use crate::multipole::{Counterterms, MultipolePk};
use crate::oneloop::OneLoopPk;
use crate::params::{FilterParams, GrowthParams, LoopParams, MatsubaraXyParams};
use crate::spectrum::{FilteredPk, PkTable};

macro_rules! payload {
    ($(#[$attr:meta])* $ty:ident { $($field:ident : $fty:ty),+ $(,)? }) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $ty {
            $(pub $field: $fty,)+
        }

        impl Encode for $ty {
            fn encode(&self, out: &mut impl BufWriter) {
                $(self.$field.encode(out);)+
            }
        }

        impl Decode for $ty {
            fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
                Ok($ty {
                    $($field: <$fty>::decode(reader)?,)+
                })
            }
        }
    };
}

payload!(
    /// Filter one wavenumber of a registered linear spectrum.
    FilterItem {
        model: FrwModel,
        model_tok: ModelToken,
        k: Energy,
        k_tok: KToken,
        pk_tok: LinearPkToken,
        params_tok: FilterParamsToken,
        params: FilterParams,
        pk_lin: PkTable,
    }
);

payload!(
    /// One filtered spectrum sample.
    FilterResult {
        model_tok: ModelToken,
        k_tok: KToken,
        pk_tok: LinearPkToken,
        params_tok: FilterParamsToken,
        raw: InverseEnergy3,
        nowiggle: InverseEnergy3,
        converged: bool,
    }
);

payload!(
    /// Run the growth ODE system over a set of redshifts.
    GrowthItem {
        model: FrwModel,
        model_tok: ModelToken,
        params_tok: GrowthParamsToken,
        params: GrowthParams,
        zs: Vec<(ZToken, f64)>,
    }
);

payload!(
    GrowthResult {
        model_tok: ModelToken,
        params_tok: GrowthParamsToken,
        rows: Vec<GrowthRow>,
        time_ns: u64,
        steps: u64,
    }
);

payload!(
    /// Compute the Matsubara X & Y coefficients at one resummation
    /// scale.
    XyItem {
        model_tok: ModelToken,
        params_tok: XyParamsToken,
        params: MatsubaraXyParams,
        pk_tok: LinearPkToken,
        ir_resum: Energy,
        ir_resum_tok: IrResumToken,
        pk: PkTable,
    }
);

/// The XY result is the stored coefficient pair itself.
pub type XyResult = MatsubaraXy;

payload!(
    /// Integrate the loop-kernel set for one `(k, UV, IR)`
    /// configuration.
    LoopItem {
        model_tok: ModelToken,
        params_tok: LoopParamsToken,
        params: LoopParams,
        k: Energy,
        k_tok: KToken,
        uv: Energy,
        uv_tok: UvToken,
        ir: Energy,
        ir_tok: IrToken,
        pk: FilteredPk,
    }
);

/// The loop result is the keyed kernel container.
pub type LoopResult = LoopIntegral;

payload!(
    /// Assemble the one-loop P(k) for one `(k, UV, IR)` configuration at
    /// the redshifts that are still missing from the store.
    OneLoopItem {
        model_tok: ModelToken,
        growth_params_tok: GrowthParamsToken,
        loop_params_tok: LoopParamsToken,
        pk_init_tok: LinearPkToken,
        pk_final_tok: Option<LinearPkToken>,
        k: Energy,
        k_tok: KToken,
        uv_tok: UvToken,
        ir_tok: IrToken,
        growth: Vec<GrowthRow>,
        kernels: LoopKernels,
        pk_init: FilteredPk,
        pk_final: Option<FilteredPk>,
    }
);

payload!(
    /// One assembled spectrum per requested redshift.
    OneLoopResult {
        rows: Vec<OneLoopPk>,
    }
);

payload!(
    /// Project one assembled configuration onto the multipoles. The
    /// keying tokens all travel inside `xy` and `oneloop`.
    MultipoleItem {
        k: Energy,
        xy: MatsubaraXy,
        growth: GrowthRecord,
        oneloop: OneLoopPk,
    }
);

/// The multipole result is the stored triple itself.
pub type MultipoleResult = MultipolePk;

payload!(
    /// Compute counterterm coefficients for one configuration and
    /// redshift.
    CountertermItem {
        model_tok: ModelToken,
        growth_params_tok: GrowthParamsToken,
        xy_params_tok: XyParamsToken,
        pk_init_tok: LinearPkToken,
        pk_final_tok: Option<LinearPkToken>,
        k: Energy,
        k_tok: KToken,
        z_tok: ZToken,
        uv_tok: UvToken,
        ir_tok: IrToken,
        ir_resum_tok: IrResumToken,
        xy: MatsubaraXy,
        growth: GrowthRecord,
        pk_init: FilteredPk,
        pk_final: Option<FilteredPk>,
    }
);

/// The counterterm result is the stored coefficient set itself.
pub type CountertermResult = Counterterms;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frw::mdr1;
    use oneloop_units::MPC;

    #[test]
    fn filter_item_roundtrips() {
        let points: Vec<_> = (0..8)
            .map(|i| {
                let k = 0.01 * (i + 1) as f64;
                (k / MPC, 1.0e3 / k * oneloop_units::MPC3)
            })
            .collect();
        let item = FilterItem {
            model: mdr1(),
            model_tok: ModelToken::new(0),
            k: 0.05 / MPC,
            k_tok: KToken::new(3),
            pk_tok: LinearPkToken::new(1),
            params_tok: FilterParamsToken::new(0),
            params: FilterParams::default(),
            pk_lin: PkTable::new(&points).unwrap(),
        };
        assert_eq!(FilterItem::from_slice(&item.encoded()).unwrap(), item);
    }

    #[test]
    fn growth_item_roundtrips() {
        let item = GrowthItem {
            model: mdr1(),
            model_tok: ModelToken::new(2),
            params_tok: GrowthParamsToken::new(1),
            params: GrowthParams::default(),
            zs: vec![(ZToken::new(0), 0.0), (ZToken::new(1), 1.5)],
        };
        assert_eq!(GrowthItem::from_slice(&item.encoded()).unwrap(), item);
    }
}
