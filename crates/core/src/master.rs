//! The master controller.
//!
//! Owns the persistent store for the lifetime of the run and drives the
//! pool through the task phases in order: spectrum filtering, growth
//! factors, Matsubara XY, loop kernels, one-loop assembly, multipole
//! assembly, counterterms. Every phase follows the same shape: ask the
//! data manager for the residual work list, scatter it, commit results
//! as they arrive.

use log::{info, warn};
use oneloop_cosmology::growth::{GrowthIntegrator, GrowthRow};
use oneloop_cosmology::spectrum::LinearPk;
use oneloop_cosmology::FrwModel;
use oneloop_store::{DataManager, Options, ZDb};
use oneloop_units::{FilterParamsToken, LinearPkToken, ModelToken, ZToken};

use crate::config::ArgumentCache;
use crate::error::{CoreError, Result};
use crate::messages::{TaskKind, WorkItem, WorkResult};
use crate::scheduler::run_phase;
use crate::transport::WorkerPool;

pub struct MasterController {
    args: ArgumentCache,
}

impl MasterController {
    pub fn new(args: ArgumentCache) -> Self {
        MasterController { args }
    }

    /// Run every phase against the given pool. The caller is
    /// responsible for terminating the pool afterwards, on success and
    /// on failure alike.
    pub fn execute<P: WorkerPool>(&self, pool: &mut P) -> Result<()> {
        self.args.validate()?;
        let args = &self.args;

        let dm = DataManager::open(
            &args.container,
            Options {
                strict_consistency: args.strict_consistency,
            },
        )?;

        let model_tok = dm.tokenize_model(&args.model)?;
        let filter_tok = dm.tokenize_filter_params(&args.filter_params)?;
        let growth_tok = dm.tokenize_growth_params(&args.growth_params)?;
        let loop_tok = dm.tokenize_loop_params(&args.loop_params)?;
        let xy_tok = dm.tokenize_xy_params(&args.xy_params)?;

        let z_db = dm.build_z_db(&args.z_grid())?;
        let k_db = dm.build_k_db(&args.k_grid())?;
        let uv_db = dm.build_uv_db(&args.uv_grid())?;
        let ir_db = dm.build_ir_db(&args.ir_grid())?;
        let ir_resum_db = dm.build_ir_resum_db(&args.ir_resum_grid())?;

        let pk_init = LinearPk::load(&args.pk_init)?;
        let init_tok = dm.tokenize_linear_pk(model_tok, &pk_init)?;

        // Phase (i): wiggle/no-wiggle filtering of the initial spectrum.
        self.filter_spectrum(pool, &dm, model_tok, init_tok, &pk_init, filter_tok)?;
        let filtered_init = dm.find_filtered_pk(init_tok, filter_tok)?;

        // Phase (ii): growth factors.
        if let Some(item) =
            dm.build_growth_work_list(&args.model, model_tok, growth_tok, &args.growth_params, &z_db)?
        {
            run_phase(pool, TaskKind::Growth, vec![WorkItem::Growth(item)], &mut |result| {
                let WorkResult::Growth(sample) = result else {
                    unreachable!("scheduler checked the phase kind");
                };
                dm.store_growth_sample(&sample)?;
                Ok(())
            })?;
        }
        let growth_rows = dm.find_growth(model_tok, growth_tok, &z_db)?;

        // The final spectrum, when present, is rescaled so that its
        // amplitude at the deepest requested redshift matches the
        // growth-rescaled initial spectrum.
        let filtered_final = match &args.pk_final {
            None => None,
            Some(path) => {
                let pk_final = LinearPk::load(path)?;
                let final_tok = dm.tokenize_linear_pk(model_tok, &pk_final)?;
                let factor = self.rescale_factor(&args.model, &z_db, &growth_rows)?;
                info!("rescaling final linear spectrum by (D_init/D_final)^2 = {factor:.6e}");
                let rescaled = pk_final.rescaled(factor);
                self.filter_spectrum(pool, &dm, model_tok, final_tok, &rescaled, filter_tok)?;
                Some(dm.find_filtered_pk(final_tok, filter_tok)?)
            }
        };

        // Phase (iii): Matsubara X & Y coefficients.
        let work = dm.build_xy_work_list(model_tok, xy_tok, &args.xy_params, &filtered_init, &ir_resum_db)?;
        run_phase(
            pool,
            TaskKind::MatsubaraXy,
            work.into_iter().map(WorkItem::MatsubaraXy).collect(),
            &mut |result| {
                let WorkResult::MatsubaraXy(sample) = result else {
                    unreachable!("scheduler checked the phase kind");
                };
                dm.store_xy(&sample)?;
                Ok(())
            },
        )?;

        // Phase (iv): loop-kernel integration.
        let work = dm.build_loop_work_list(
            model_tok,
            loop_tok,
            &args.loop_params,
            &filtered_init,
            &k_db,
            &uv_db,
            &ir_db,
        )?;
        run_phase(
            pool,
            TaskKind::Loop,
            work.into_iter().map(WorkItem::Loop).collect(),
            &mut |result| {
                let WorkResult::Loop(sample) = result else {
                    unreachable!("scheduler checked the phase kind");
                };
                if sample.kernels.failed() {
                    // Committed anyway so subsequent runs do not retry.
                    warn!(
                        "loop kernels for k={}, IR={}, UV={} carry a failure flag",
                        sample.k, sample.ir, sample.uv
                    );
                }
                dm.store_loop(&sample)?;
                Ok(())
            },
        )?;

        // Phase (v): one-loop P(k) assembly.
        let work = dm.build_oneloop_work_list(
            model_tok,
            growth_tok,
            loop_tok,
            &filtered_init,
            filtered_final.as_ref(),
            &k_db,
            &uv_db,
            &ir_db,
            &z_db,
        )?;
        run_phase(
            pool,
            TaskKind::OneLoop,
            work.into_iter().map(WorkItem::OneLoop).collect(),
            &mut |result| {
                let WorkResult::OneLoop(sample) = result else {
                    unreachable!("scheduler checked the phase kind");
                };
                dm.store_oneloop(&sample.rows)?;
                Ok(())
            },
        )?;

        // Phase (vi): multipole assembly.
        let work = dm.build_multipole_work_list(
            model_tok,
            growth_tok,
            loop_tok,
            xy_tok,
            &filtered_init,
            filtered_final.as_ref(),
            &k_db,
            &uv_db,
            &ir_db,
            &ir_resum_db,
            &z_db,
        )?;
        run_phase(
            pool,
            TaskKind::Multipole,
            work.into_iter().map(WorkItem::Multipole).collect(),
            &mut |result| {
                let WorkResult::Multipole(sample) = result else {
                    unreachable!("scheduler checked the phase kind");
                };
                dm.store_multipole(&sample)?;
                Ok(())
            },
        )?;

        // Phase (vii): counterterm assembly.
        let work = dm.build_counterterm_work_list(
            model_tok,
            growth_tok,
            xy_tok,
            &filtered_init,
            filtered_final.as_ref(),
            &k_db,
            &uv_db,
            &ir_db,
            &ir_resum_db,
            &z_db,
        )?;
        run_phase(
            pool,
            TaskKind::Counterterm,
            work.into_iter().map(WorkItem::Counterterm).collect(),
            &mut |result| {
                let WorkResult::Counterterm(sample) = result else {
                    unreachable!("scheduler checked the phase kind");
                };
                dm.store_counterterms(&sample)?;
                Ok(())
            },
        )?;

        info!("all phases complete");
        Ok(())
    }

    fn filter_spectrum<P: WorkerPool>(
        &self,
        pool: &mut P,
        dm: &DataManager,
        model_tok: ModelToken,
        pk_tok: LinearPkToken,
        pk: &LinearPk,
        filter_tok: FilterParamsToken,
    ) -> Result<()> {
        let work = dm.build_filter_work_list(
            &self.args.model,
            model_tok,
            pk_tok,
            pk,
            filter_tok,
            &self.args.filter_params,
        )?;
        run_phase(
            pool,
            TaskKind::Filter,
            work.into_iter().map(WorkItem::Filter).collect(),
            &mut |result| {
                let WorkResult::Filter(sample) = result else {
                    unreachable!("scheduler checked the phase kind");
                };
                dm.store_filter_sample(&sample)?;
                Ok(())
            },
        )?;
        Ok(())
    }

    /// `(D_init / D_final)^2` between the deepest requested redshift and
    /// today, from the linear growth factor.
    fn rescale_factor(
        &self,
        model: &FrwModel,
        z_db: &ZDb,
        growth_rows: &[GrowthRow],
    ) -> Result<f64> {
        let deepest = z_db
            .iter()
            .cloned()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| CoreError::Config("empty redshift sample".into()))?;
        let g_deep = growth_rows
            .iter()
            .find(|row| row.z_tok == deepest.0)
            .map(|row| row.record.value.linear)
            .ok_or_else(|| CoreError::Config("growth factors incomplete".into()))?;

        // The final spectrum is defined today; reuse a stored z = 0 row
        // when one exists, otherwise integrate it locally.
        let g_today = match growth_rows.iter().find(|row| row.z == 0.0) {
            Some(row) => row.record.value.linear,
            None => {
                let integrator = GrowthIntegrator::new(self.args.growth_params);
                let sample = integrator.integrate(model, &[(ZToken::new(0), 0.0)])?;
                sample.rows[0].record.value.linear
            }
        };
        Ok((g_deep / g_today).powi(2))
    }
}
