//! Transactional writes of result payloads.
//!
//! Each `store_*` operation inserts one sample's rows in a single
//! transaction. Rows are keyed by their input tokens and written with
//! `INSERT OR REPLACE`, so a redelivered result is idempotent rather
//! than duplicated.

use oneloop_cosmology::loop_integral::LoopIntegral;
use oneloop_cosmology::matsubara::MatsubaraXy;
use oneloop_cosmology::multipole::{Counterterms, MultipolePk};
use oneloop_cosmology::oneloop::{OneLoopPk, RsdPk};
use oneloop_cosmology::types::{FilterResult, GrowthResult};
use rusqlite::params;

use crate::error::Result;
use crate::policy::Policy;
use crate::DataManager;

impl DataManager {
    pub fn store_filter_sample(&self, sample: &FilterResult) -> Result<()> {
        let tx = self.open_transaction()?;
        self.conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {table} VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
                table = self.policy.pk_filter
            ),
            params![
                sample.pk_tok.id(),
                sample.params_tok.id(),
                sample.k_tok.id(),
                sample.model_tok.id(),
                sample.raw.raw(),
                sample.nowiggle.raw(),
                sample.converged as i64,
            ],
        )?;
        tx.commit()
    }

    pub fn store_growth_sample(&self, sample: &GrowthResult) -> Result<()> {
        let tx = self.open_transaction()?;
        {
            let mut insert_g = self.conn.prepare(&format!(
                "INSERT OR REPLACE INTO {table} VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
                table = self.policy.growth_g
            ))?;
            let mut insert_f = self.conn.prepare(&format!(
                "INSERT OR REPLACE INTO {table} VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
                table = self.policy.growth_f
            ))?;
            for row in &sample.rows {
                let value = row.record.value;
                let rate = row.record.rate;
                insert_g.execute(params![
                    sample.model_tok.id(),
                    sample.params_tok.id(),
                    row.z_tok.id(),
                    value.linear,
                    value.a,
                    value.b,
                    value.d,
                    value.e,
                    value.f,
                    value.g,
                    value.j,
                ])?;
                insert_f.execute(params![
                    sample.model_tok.id(),
                    sample.params_tok.id(),
                    row.z_tok.id(),
                    rate.linear,
                    rate.a,
                    rate.b,
                    rate.d,
                    rate.e,
                    rate.f,
                    rate.g,
                    rate.j,
                ])?;
            }
        }
        self.conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {table} VALUES (?1, ?2, ?3, ?4);",
                table = self.policy.growth_meta
            ),
            params![
                sample.model_tok.id(),
                sample.params_tok.id(),
                sample.time_ns as i64,
                sample.steps as i64,
            ],
        )?;
        tx.commit()
    }

    pub fn store_xy(&self, sample: &MatsubaraXy) -> Result<()> {
        let tx = self.open_transaction()?;
        self.conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {table} VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
                table = self.policy.matsubara_xy
            ),
            params![
                sample.model.id(),
                sample.params.id(),
                sample.pk_lin.id(),
                sample.ir_resum.id(),
                sample.x.raw(),
                sample.y.raw(),
                sample.converged as i64,
            ],
        )?;
        tx.commit()
    }

    pub fn store_loop(&self, sample: &LoopIntegral) -> Result<()> {
        let tx = self.open_transaction()?;
        for (table, kernel) in Policy::KERNEL_TABLES.iter().zip(sample.kernels.results()) {
            self.conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO {table} VALUES \
                     (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18);"
                ),
                params![
                    sample.model.id(),
                    sample.params.id(),
                    sample.k.id(),
                    sample.pk_lin.id(),
                    sample.ir.id(),
                    sample.uv.id(),
                    kernel.raw.value,
                    kernel.raw.error,
                    kernel.raw.regions as i64,
                    kernel.raw.evaluations as i64,
                    kernel.raw.time_ns as i64,
                    kernel.raw.converged as i64,
                    kernel.nowiggle.value,
                    kernel.nowiggle.error,
                    kernel.nowiggle.regions as i64,
                    kernel.nowiggle.evaluations as i64,
                    kernel.nowiggle.time_ns as i64,
                    kernel.nowiggle.converged as i64,
                ],
            )?;
        }
        tx.commit()
    }

    pub fn store_oneloop(&self, samples: &[OneLoopPk]) -> Result<()> {
        let tx = self.open_transaction()?;
        for sample in samples {
            for (table, component) in Policy::DD_PK_TABLES.iter().zip(&sample.mu) {
                self.insert_dd_row(table, sample, component)?;
            }
        }
        tx.commit()
    }

    fn insert_dd_row(&self, table: &str, sample: &OneLoopPk, component: &RsdPk) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {table} VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, \
                  ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, \
                  ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25);"
            ),
            params![
                sample.model.id(),
                sample.growth_params.id(),
                sample.loop_params.id(),
                sample.pk_init.id(),
                sample.pk_final.map(|token| token.id()),
                sample.k.id(),
                sample.z.id(),
                sample.ir.id(),
                sample.uv.id(),
                component.tree.raw.value.raw(),
                component.tree.raw.error.raw(),
                component.tree.nowiggle.value.raw(),
                component.tree.nowiggle.error.raw(),
                component.p13.raw.value.raw(),
                component.p13.raw.error.raw(),
                component.p13.nowiggle.value.raw(),
                component.p13.nowiggle.error.raw(),
                component.p22.raw.value.raw(),
                component.p22.raw.error.raw(),
                component.p22.nowiggle.value.raw(),
                component.p22.nowiggle.error.raw(),
                component.spt.raw.value.raw(),
                component.spt.raw.error.raw(),
                component.spt.nowiggle.value.raw(),
                component.spt.nowiggle.error.raw(),
            ],
        )?;
        Ok(())
    }

    pub fn store_multipole(&self, sample: &MultipolePk) -> Result<()> {
        let tx = self.open_transaction()?;
        for (table, data) in Policy::MULTIPOLE_TABLES
            .iter()
            .zip([&sample.p0, &sample.p2, &sample.p4])
        {
            self.conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO {table} VALUES \
                     (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, \
                      ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19);"
                ),
                params![
                    sample.model.id(),
                    sample.growth_params.id(),
                    sample.loop_params.id(),
                    sample.xy_params.id(),
                    sample.pk_init.id(),
                    sample.pk_final.map(|token| token.id()),
                    sample.k.id(),
                    sample.z.id(),
                    sample.ir.id(),
                    sample.uv.id(),
                    sample.ir_resum.id(),
                    data.tree.plain.raw(),
                    data.tree.resummed.raw(),
                    data.p13.plain.raw(),
                    data.p13.resummed.raw(),
                    data.p22.plain.raw(),
                    data.p22.resummed.raw(),
                    data.spt.plain.raw(),
                    data.spt.resummed.raw(),
                ],
            )?;
        }
        tx.commit()
    }

    pub fn store_counterterms(&self, sample: &Counterterms) -> Result<()> {
        let tx = self.open_transaction()?;
        for (table, data) in Policy::COUNTERTERM_TABLES
            .iter()
            .zip([&sample.c0, &sample.c2, &sample.c4])
        {
            self.conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO {table} VALUES \
                     (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12);"
                ),
                params![
                    sample.model.id(),
                    sample.growth_params.id(),
                    sample.xy_params.id(),
                    sample.pk_init.id(),
                    sample.pk_final.map(|token| token.id()),
                    sample.k.id(),
                    sample.z.id(),
                    sample.ir.id(),
                    sample.uv.id(),
                    sample.ir_resum.id(),
                    data.plain.raw(),
                    data.resummed.raw(),
                ],
            )?;
        }
        tx.commit()
    }
}
