//! Read-back of previously stored payloads.
//!
//! A `find_*` operation returns the stored payload for a token tuple, or
//! a `Missing*` error naming the tuple when any required row is absent.
//! Reads run on the manager's connection and therefore observe any live
//! transaction.

use oneloop_cosmology::growth::{GrowthRecord, GrowthRow, GrowthSet};
use oneloop_cosmology::loop_integral::{IntegralRow, KernelResult, LoopIntegral, LoopKernels};
use oneloop_cosmology::matsubara::MatsubaraXy;
use oneloop_cosmology::oneloop::{OneLoopPk, PkComponent, PkValue, RsdPk};
use oneloop_cosmology::spectrum::{FilteredPk, PkTable};
use oneloop_units::{
    Energy, FilterParamsToken, GrowthParamsToken, InverseEnergy2, InverseEnergy3, IrResumToken,
    IrToken, KToken, LinearPkToken, LoopParamsToken, ModelToken, UvToken, XyParamsToken, ZToken,
    MPC, MPC3,
};
use rusqlite::{params, OptionalExtension};

use crate::error::{Result, StoreError};
use crate::policy::Policy;
use crate::{DataManager, ZDb};

impl DataManager {
    /// Reassemble a filtered spectrum from the filter table.
    pub fn find_filtered_pk(
        &self,
        pk: LinearPkToken,
        params: FilterParamsToken,
    ) -> Result<FilteredPk> {
        let sql = format!(
            "SELECT k.k, f.raw, f.nowiggle FROM {filter} f \
             JOIN {k_config} k ON f.kid = k.id \
             WHERE f.pkid = ?1 AND f.params_id = ?2 ORDER BY k.k;",
            filter = self.policy.pk_filter,
            k_config = self.policy.k_config
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![pk.id(), params.id()], |row| {
            Ok((
                row.get::<_, f64>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;

        let mut raw = Vec::new();
        let mut nowiggle = Vec::new();
        for row in rows {
            let (k, raw_p, nw_p) = row?;
            raw.push((k / MPC, raw_p * MPC3));
            nowiggle.push((k / MPC, nw_p * MPC3));
        }
        let raw = PkTable::new(&raw).map_err(|_| StoreError::Consistency {
            table: "pk_filter",
            value: pk.id() as f64,
        })?;
        let nowiggle = PkTable::new(&nowiggle).map_err(|_| StoreError::Consistency {
            table: "pk_filter",
            value: pk.id() as f64,
        })?;
        Ok(FilteredPk {
            token: pk,
            raw,
            nowiggle,
        })
    }

    /// Growth functions for every redshift in `z_db`. Fails naming the
    /// first missing `(model, growth-params, z)` tuple.
    pub fn find_growth(
        &self,
        model: ModelToken,
        params: GrowthParamsToken,
        z_db: &ZDb,
    ) -> Result<Vec<GrowthRow>> {
        let g_sql = format!(
            "SELECT g_linear, a, b, d, e, f, g, j FROM {table} \
             WHERE mid = ?1 AND params_id = ?2 AND zid = ?3;",
            table = self.policy.growth_g
        );
        let f_sql = format!(
            "SELECT f_linear, fa, fb, fd, fe, ff, fg, fj FROM {table} \
             WHERE mid = ?1 AND params_id = ?2 AND zid = ?3;",
            table = self.policy.growth_f
        );
        let mut g_stmt = self.conn.prepare(&g_sql)?;
        let mut f_stmt = self.conn.prepare(&f_sql)?;

        let mut rows = Vec::with_capacity(z_db.len());
        for &(z_tok, z) in z_db {
            let read_set = |row: &rusqlite::Row<'_>| -> rusqlite::Result<GrowthSet> {
                Ok(GrowthSet {
                    linear: row.get(0)?,
                    a: row.get(1)?,
                    b: row.get(2)?,
                    d: row.get(3)?,
                    e: row.get(4)?,
                    f: row.get(5)?,
                    g: row.get(6)?,
                    j: row.get(7)?,
                })
            };
            let key = params![model.id(), params.id(), z_tok.id()];
            let value = g_stmt.query_row(key, read_set).optional()?;
            let key = params![model.id(), params.id(), z_tok.id()];
            let rate = f_stmt.query_row(key, read_set).optional()?;
            match (value, rate) {
                (Some(value), Some(rate)) => rows.push(GrowthRow {
                    z_tok,
                    z,
                    record: GrowthRecord { value, rate },
                }),
                _ => {
                    return Err(StoreError::MissingGrowth {
                        model,
                        params,
                        z: z_tok,
                    });
                }
            }
        }
        Ok(rows)
    }

    /// The loop-kernel set for one configuration.
    pub fn find_loop(
        &self,
        model: ModelToken,
        params: LoopParamsToken,
        k: KToken,
        pk: LinearPkToken,
        ir: IrToken,
        uv: UvToken,
    ) -> Result<LoopIntegral> {
        let mut kernels = Vec::with_capacity(Policy::KERNEL_TABLES.len());
        for table in Policy::KERNEL_TABLES {
            let sql = format!(
                "SELECT raw_value, raw_err, raw_regions, raw_evals, raw_time, raw_converged, \
                        nw_value, nw_err, nw_regions, nw_evals, nw_time, nw_converged \
                 FROM {table} \
                 WHERE mid = ?1 AND params_id = ?2 AND kid = ?3 AND pkid = ?4 \
                   AND ir_id = ?5 AND uv_id = ?6;"
            );
            let read_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<KernelResult> {
                let read = |offset: usize| -> rusqlite::Result<IntegralRow> {
                    Ok(IntegralRow {
                        value: row.get(offset)?,
                        error: row.get(offset + 1)?,
                        regions: row.get::<_, i64>(offset + 2)? as u32,
                        evaluations: row.get::<_, i64>(offset + 3)? as u64,
                        time_ns: row.get::<_, i64>(offset + 4)? as u64,
                        converged: row.get::<_, i64>(offset + 5)? != 0,
                    })
                };
                Ok(KernelResult {
                    raw: read(0)?,
                    nowiggle: read(6)?,
                })
            };
            let kernel = self
                .conn
                .query_row(
                    &sql,
                    params![model.id(), params.id(), k.id(), pk.id(), ir.id(), uv.id()],
                    read_row,
                )
                .optional()?;
            match kernel {
                Some(kernel) => kernels.push(kernel),
                None => {
                    return Err(StoreError::MissingLoop {
                        model,
                        k,
                        pk,
                        ir,
                        uv,
                    });
                }
            }
        }

        Ok(LoopIntegral {
            model,
            params,
            k,
            pk_lin: pk,
            uv,
            ir,
            kernels: LoopKernels {
                aa: kernels[0],
                ab: kernels[1],
                bb: kernels[2],
                d: kernels[3],
                e: kernels[4],
                f: kernels[5],
                g: kernels[6],
                j1: kernels[7],
                j2: kernels[8],
            },
        })
    }

    /// The assembled one-loop P(k) at one configuration and redshift.
    pub fn find_oneloop(
        &self,
        model: ModelToken,
        growth_params: GrowthParamsToken,
        loop_params: LoopParamsToken,
        pk_init: LinearPkToken,
        pk_final: Option<LinearPkToken>,
        k: KToken,
        z: ZToken,
        ir: IrToken,
        uv: UvToken,
    ) -> Result<OneLoopPk> {
        let mut mu = Vec::with_capacity(Policy::DD_PK_TABLES.len());
        for table in Policy::DD_PK_TABLES {
            let sql = format!(
                "SELECT tree_raw, tree_raw_err, tree_nw, tree_nw_err, \
                        p13_raw, p13_raw_err, p13_nw, p13_nw_err, \
                        p22_raw, p22_raw_err, p22_nw, p22_nw_err, \
                        spt_raw, spt_raw_err, spt_nw, spt_nw_err \
                 FROM {table} \
                 WHERE mid = ?1 AND growth_id = ?2 AND loop_id = ?3 AND init_id = ?4 \
                   AND final_id IS ?5 AND kid = ?6 AND zid = ?7 AND ir_id = ?8 AND uv_id = ?9;"
            );
            let read_component = |row: &rusqlite::Row<'_>| -> rusqlite::Result<RsdPk> {
                let read = |offset: usize| -> rusqlite::Result<PkComponent> {
                    let value = |idx: usize| -> rusqlite::Result<InverseEnergy3> {
                        Ok(InverseEnergy3::new(row.get::<_, f64>(idx)?))
                    };
                    Ok(PkComponent {
                        raw: PkValue::new(value(offset)?, value(offset + 1)?),
                        nowiggle: PkValue::new(value(offset + 2)?, value(offset + 3)?),
                    })
                };
                Ok(RsdPk {
                    tree: read(0)?,
                    p13: read(4)?,
                    p22: read(8)?,
                    spt: read(12)?,
                })
            };
            let component = self
                .conn
                .query_row(
                    &sql,
                    params![
                        model.id(),
                        growth_params.id(),
                        loop_params.id(),
                        pk_init.id(),
                        pk_final.map(|token| token.id()),
                        k.id(),
                        z.id(),
                        ir.id(),
                        uv.id()
                    ],
                    read_component,
                )
                .optional()?;
            match component {
                Some(component) => mu.push(component),
                None => {
                    return Err(StoreError::MissingOneLoop { model, k, z, ir, uv });
                }
            }
        }

        Ok(OneLoopPk {
            model,
            growth_params,
            loop_params,
            pk_init,
            pk_final,
            k,
            z,
            uv,
            ir,
            mu: [mu[0], mu[1], mu[2], mu[3], mu[4]],
        })
    }

    /// The Matsubara (X, Y) pair for one resummation scale.
    pub fn find_xy(
        &self,
        model: ModelToken,
        params: XyParamsToken,
        pk: LinearPkToken,
        ir_resum: IrResumToken,
    ) -> Result<MatsubaraXy> {
        let sql = format!(
            "SELECT x, y, converged FROM {table} \
             WHERE mid = ?1 AND params_id = ?2 AND pkid = ?3 AND ir_resum_id = ?4;",
            table = self.policy.matsubara_xy
        );
        let row = self
            .conn
            .query_row(
                &sql,
                params![model.id(), params.id(), pk.id(), ir_resum.id()],
                |row| {
                    Ok((
                        row.get::<_, f64>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, i64>(2)? != 0,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((x, y, converged)) => Ok(MatsubaraXy {
                model,
                params,
                pk_lin: pk,
                ir_resum,
                x: InverseEnergy2::new(x),
                y: InverseEnergy2::new(y),
                converged,
            }),
            None => Err(StoreError::MissingXy {
                model,
                params,
                pk,
                ir_resum,
            }),
        }
    }

    /// The wavenumber value of a stored generic-k token.
    pub fn k_value(&self, k: KToken) -> Result<Energy> {
        let sql = format!(
            "SELECT k FROM {table} WHERE id = ?1;",
            table = self.policy.k_config
        );
        let raw: f64 = self.conn.query_row(&sql, params![k.id()], |row| row.get(0))?;
        Ok(raw / MPC)
    }
}
