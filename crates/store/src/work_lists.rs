//! Residual work-list construction.
//!
//! A work list is the set-difference between a requested Cartesian
//! product of configuration tokens and the results already persisted.
//! Requested identifiers are staged in a scratch table and anti-joined
//! against the relevant result table; configuration sets are held as
//! hash sets of token tuples. An empty list means the store already
//! holds every requested combination.

use std::collections::HashSet;
use std::time::Instant;

use log::info;
use oneloop_cosmology::spectrum::{FilteredPk, LinearPk};
use oneloop_cosmology::types::{
    CountertermItem, FilterItem, GrowthItem, LoopItem, MultipoleItem, OneLoopItem, XyItem,
};
use oneloop_cosmology::{FilterParams, FrwModel, GrowthParams, LoopParams, MatsubaraXyParams};
use oneloop_units::{
    FilterParamsToken, GrowthParamsToken, LinearPkToken, LoopParamsToken, ModelToken,
    XyParamsToken,
};
use rusqlite::params;

use crate::error::Result;
use crate::{DataManager, IrDb, IrResumDb, KDb, Transaction, UvDb, ZDb};

impl DataManager {
    /// Stage `requested` in the scratch table and return those ids for
    /// which `anti_join_sql` (a SELECT over the scratch table) yields a
    /// row. The scratch table is dropped before returning.
    fn missing_ids(
        &self,
        _tx: &Transaction<'_>,
        requested: impl Iterator<Item = u32>,
        anti_join_sql: &str,
        bindings: impl rusqlite::Params,
    ) -> Result<Vec<u32>> {
        let temp = self.policy.temp;
        self.conn.execute_batch(&format!(
            "CREATE TEMP TABLE {temp} (id INTEGER PRIMARY KEY);"
        ))?;
        {
            let mut insert = self
                .conn
                .prepare(&format!("INSERT INTO {temp} VALUES (?1);"))?;
            for id in requested {
                insert.execute(params![id])?;
            }
        }

        let mut stmt = self.conn.prepare(anti_join_sql)?;
        let ids = stmt
            .query_map(bindings, |row| row.get::<_, i64>(0).map(|id| id as u32))?
            .collect::<rusqlite::Result<Vec<u32>>>();

        self.conn
            .execute_batch(&format!("DROP TABLE {temp};"))?;
        Ok(ids?)
    }

    /// Wavenumbers of a freshly registered spectrum that still need
    /// filtering. The k grid is the spectrum's own sample grid inside
    /// the clearance window.
    pub fn build_filter_work_list(
        &self,
        model: &FrwModel,
        model_tok: ModelToken,
        pk_tok: LinearPkToken,
        pk_lin: &LinearPk,
        params_tok: FilterParamsToken,
        params: &FilterParams,
    ) -> Result<Vec<FilterItem>> {
        let timer = Instant::now();
        let tx = self.open_transaction()?;

        let grid: Vec<_> = pk_lin
            .table()
            .points()
            .into_iter()
            .map(|(k, _)| k)
            .filter(|&k| {
                pk_lin
                    .table()
                    .is_valid(k, params.bottom_clearance, params.top_clearance)
            })
            .collect();
        let mut k_db = Vec::with_capacity(grid.len());
        for &k in &grid {
            k_db.push((self.tokenize_k_in(&tx, k)?, k));
        }

        let sql = format!(
            "SELECT t.id FROM {temp} t \
             LEFT JOIN {filter} f \
               ON f.kid = t.id AND f.pkid = ?1 AND f.params_id = ?2 \
             WHERE f.kid IS NULL;",
            temp = self.policy.temp,
            filter = self.policy.pk_filter
        );
        let missing = self.missing_ids(
            &tx,
            k_db.iter().map(|(token, _)| token.id()),
            &sql,
            params![pk_tok.id(), params_tok.id()],
        )?;
        let missing: HashSet<u32> = missing.into_iter().collect();

        let work: Vec<_> = k_db
            .into_iter()
            .filter(|(token, _)| missing.contains(&token.id()))
            .map(|(k_tok, k)| FilterItem {
                model: *model,
                model_tok,
                k,
                k_tok,
                pk_tok,
                params_tok,
                params: *params,
                pk_lin: pk_lin.table().clone(),
            })
            .collect();

        tx.commit()?;
        info!(
            "constructed wiggle/no-wiggle filter work list ({} items) in {:.2?}",
            work.len(),
            timer.elapsed()
        );
        Ok(work)
    }

    /// Redshifts still missing from the growth-factor tables. A
    /// non-empty result becomes a single ODE work item.
    pub fn build_growth_work_list(
        &self,
        model: &FrwModel,
        model_tok: ModelToken,
        params_tok: GrowthParamsToken,
        params: &GrowthParams,
        z_db: &ZDb,
    ) -> Result<Option<GrowthItem>> {
        let timer = Instant::now();
        let tx = self.open_transaction()?;

        let sql = format!(
            "SELECT t.id FROM {temp} t \
             LEFT JOIN {growth} g \
               ON g.zid = t.id AND g.mid = ?1 AND g.params_id = ?2 \
             WHERE g.zid IS NULL;",
            temp = self.policy.temp,
            growth = self.policy.growth_g
        );
        let missing = self.missing_ids(
            &tx,
            z_db.iter().map(|(token, _)| token.id()),
            &sql,
            params![model_tok.id(), params_tok.id()],
        )?;
        let missing: HashSet<u32> = missing.into_iter().collect();
        tx.commit()?;

        let zs: Vec<_> = z_db
            .iter()
            .filter(|(token, _)| missing.contains(&token.id()))
            .copied()
            .collect();
        info!(
            "constructed one-loop growth factor work list ({} items) in {:.2?}",
            zs.len(),
            timer.elapsed()
        );
        if zs.is_empty() {
            return Ok(None);
        }
        Ok(Some(GrowthItem {
            model: *model,
            model_tok,
            params_tok,
            params: *params,
            zs,
        }))
    }

    /// Resummation scales with no stored (X, Y) pair.
    pub fn build_xy_work_list(
        &self,
        model_tok: ModelToken,
        params_tok: XyParamsToken,
        params: &MatsubaraXyParams,
        pk: &FilteredPk,
        ir_resum_db: &IrResumDb,
    ) -> Result<Vec<XyItem>> {
        let timer = Instant::now();
        let tx = self.open_transaction()?;

        let sql = format!(
            "SELECT t.id FROM {temp} t \
             LEFT JOIN {xy} x \
               ON x.ir_resum_id = t.id AND x.mid = ?1 AND x.params_id = ?2 AND x.pkid = ?3 \
             WHERE x.ir_resum_id IS NULL;",
            temp = self.policy.temp,
            xy = self.policy.matsubara_xy
        );
        let missing = self.missing_ids(
            &tx,
            ir_resum_db.iter().map(|(token, _)| token.id()),
            &sql,
            params![model_tok.id(), params_tok.id(), pk.token.id()],
        )?;
        let missing: HashSet<u32> = missing.into_iter().collect();
        tx.commit()?;

        let work: Vec<_> = ir_resum_db
            .iter()
            .filter(|(token, _)| missing.contains(&token.id()))
            .map(|&(ir_resum_tok, ir_resum)| XyItem {
                model_tok,
                params_tok,
                params: *params,
                pk_tok: pk.token,
                ir_resum,
                ir_resum_tok,
                pk: pk.raw.clone(),
            })
            .collect();
        info!(
            "constructed Matsubara XY work list ({} items) in {:.2?}",
            work.len(),
            timer.elapsed()
        );
        Ok(work)
    }

    /// `(k, UV, IR)` combinations with no stored kernel set. All nine
    /// kernel tables are written in one transaction, so the AA table is
    /// the representative for the anti-join.
    pub fn build_loop_work_list(
        &self,
        model_tok: ModelToken,
        params_tok: LoopParamsToken,
        params: &LoopParams,
        pk: &FilteredPk,
        k_db: &KDb,
        uv_db: &UvDb,
        ir_db: &IrDb,
    ) -> Result<Vec<LoopItem>> {
        let timer = Instant::now();
        let tx = self.open_transaction()?;

        let sql = format!(
            "SELECT kid, uv_id, ir_id FROM {aa} \
             WHERE mid = ?1 AND params_id = ?2 AND pkid = ?3;",
            aa = crate::policy::Policy::KERNEL_TABLES[0]
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let stored = stmt
            .query_map(
                params![model_tok.id(), params_tok.id(), pk.token.id()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)? as u32,
                        row.get::<_, i64>(1)? as u32,
                        row.get::<_, i64>(2)? as u32,
                    ))
                },
            )?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        drop(stmt);
        tx.commit()?;

        let mut work = Vec::new();
        for &(k_tok, k) in k_db {
            for &(uv_tok, uv) in uv_db {
                for &(ir_tok, ir) in ir_db {
                    if stored.contains(&(k_tok.id(), uv_tok.id(), ir_tok.id())) {
                        continue;
                    }
                    work.push(LoopItem {
                        model_tok,
                        params_tok,
                        params: *params,
                        k,
                        k_tok,
                        uv,
                        uv_tok,
                        ir,
                        ir_tok,
                        pk: pk.clone(),
                    });
                }
            }
        }
        info!(
            "constructed loop momentum work list ({} items) in {:.2?}",
            work.len(),
            timer.elapsed()
        );
        Ok(work)
    }

    /// One item per `(k, UV, IR)` configuration that still misses
    /// redshifts in the assembled P(k) tables.
    pub fn build_oneloop_work_list(
        &self,
        model_tok: ModelToken,
        growth_tok: GrowthParamsToken,
        loop_tok: LoopParamsToken,
        pk_init: &FilteredPk,
        pk_final: Option<&FilteredPk>,
        k_db: &KDb,
        uv_db: &UvDb,
        ir_db: &IrDb,
        z_db: &ZDb,
    ) -> Result<Vec<OneLoopItem>> {
        let timer = Instant::now();
        let pk_final_tok = pk_final.map(|pk| pk.token);
        let mut work = Vec::new();

        for &(k_tok, k) in k_db {
            for &(uv_tok, _) in uv_db {
                for &(ir_tok, _) in ir_db {
                    let tx = self.open_transaction()?;
                    let sql = format!(
                        "SELECT t.id FROM {temp} t \
                         LEFT JOIN {dd} p \
                           ON p.zid = t.id AND p.mid = ?1 AND p.growth_id = ?2 \
                          AND p.loop_id = ?3 AND p.init_id = ?4 AND p.final_id IS ?5 \
                          AND p.kid = ?6 AND p.ir_id = ?7 AND p.uv_id = ?8 \
                         WHERE p.zid IS NULL;",
                        temp = self.policy.temp,
                        dd = crate::policy::Policy::DD_PK_TABLES[0]
                    );
                    let missing = self.missing_ids(
                        &tx,
                        z_db.iter().map(|(token, _)| token.id()),
                        &sql,
                        params![
                            model_tok.id(),
                            growth_tok.id(),
                            loop_tok.id(),
                            pk_init.token.id(),
                            pk_final_tok.map(|token| token.id()),
                            k_tok.id(),
                            ir_tok.id(),
                            uv_tok.id()
                        ],
                    )?;
                    let missing: HashSet<u32> = missing.into_iter().collect();
                    tx.commit()?;

                    if missing.is_empty() {
                        continue;
                    }
                    let missing_zs: ZDb = z_db
                        .iter()
                        .filter(|(token, _)| missing.contains(&token.id()))
                        .copied()
                        .collect();

                    let growth = self.find_growth(model_tok, growth_tok, &missing_zs)?;
                    let kernels = self.find_loop(
                        model_tok,
                        loop_tok,
                        k_tok,
                        pk_init.token,
                        ir_tok,
                        uv_tok,
                    )?;

                    work.push(OneLoopItem {
                        model_tok,
                        growth_params_tok: growth_tok,
                        loop_params_tok: loop_tok,
                        pk_init_tok: pk_init.token,
                        pk_final_tok,
                        k,
                        k_tok,
                        uv_tok,
                        ir_tok,
                        growth,
                        kernels: kernels.kernels,
                        pk_init: pk_init.clone(),
                        pk_final: pk_final.cloned(),
                    });
                }
            }
        }
        info!(
            "constructed one-loop P(k) work list ({} items) in {:.2?}",
            work.len(),
            timer.elapsed()
        );
        Ok(work)
    }

    /// One item per missing `(k, UV, IR, IR-resum, z)` multipole row.
    pub fn build_multipole_work_list(
        &self,
        model_tok: ModelToken,
        growth_tok: GrowthParamsToken,
        loop_tok: LoopParamsToken,
        xy_tok: XyParamsToken,
        pk_init: &FilteredPk,
        pk_final: Option<&FilteredPk>,
        k_db: &KDb,
        uv_db: &UvDb,
        ir_db: &IrDb,
        ir_resum_db: &IrResumDb,
        z_db: &ZDb,
    ) -> Result<Vec<MultipoleItem>> {
        let timer = Instant::now();
        let pk_final_tok = pk_final.map(|pk| pk.token);
        let mut work = Vec::new();

        for &(k_tok, k) in k_db {
            for &(uv_tok, _) in uv_db {
                for &(ir_tok, _) in ir_db {
                    for &(ir_resum_tok, _) in ir_resum_db {
                        let tx = self.open_transaction()?;
                        let sql = format!(
                            "SELECT t.id FROM {temp} t \
                             LEFT JOIN {p0} p \
                               ON p.zid = t.id AND p.mid = ?1 AND p.growth_id = ?2 \
                              AND p.loop_id = ?3 AND p.xy_id = ?4 AND p.init_id = ?5 \
                              AND p.final_id IS ?6 AND p.kid = ?7 AND p.ir_id = ?8 \
                              AND p.uv_id = ?9 AND p.ir_resum_id = ?10 \
                             WHERE p.zid IS NULL;",
                            temp = self.policy.temp,
                            p0 = crate::policy::Policy::MULTIPOLE_TABLES[0]
                        );
                        let missing = self.missing_ids(
                            &tx,
                            z_db.iter().map(|(token, _)| token.id()),
                            &sql,
                            params![
                                model_tok.id(),
                                growth_tok.id(),
                                loop_tok.id(),
                                xy_tok.id(),
                                pk_init.token.id(),
                                pk_final_tok.map(|token| token.id()),
                                k_tok.id(),
                                ir_tok.id(),
                                uv_tok.id(),
                                ir_resum_tok.id()
                            ],
                        )?;
                        let missing: HashSet<u32> = missing.into_iter().collect();
                        tx.commit()?;

                        if missing.is_empty() {
                            continue;
                        }
                        let missing_zs: ZDb = z_db
                            .iter()
                            .filter(|(token, _)| missing.contains(&token.id()))
                            .copied()
                            .collect();

                        let growth = self.find_growth(model_tok, growth_tok, &missing_zs)?;
                        let xy = self.find_xy(model_tok, xy_tok, pk_init.token, ir_resum_tok)?;

                        for row in growth {
                            let oneloop = self.find_oneloop(
                                model_tok,
                                growth_tok,
                                loop_tok,
                                pk_init.token,
                                pk_final_tok,
                                k_tok,
                                row.z_tok,
                                ir_tok,
                                uv_tok,
                            )?;
                            work.push(MultipoleItem {
                                k,
                                xy,
                                growth: row.record,
                                oneloop,
                            });
                        }
                    }
                }
            }
        }
        info!(
            "constructed one-loop multipole P(k) work list ({} items) in {:.2?}",
            work.len(),
            timer.elapsed()
        );
        Ok(work)
    }

    /// One item per missing counterterm row.
    pub fn build_counterterm_work_list(
        &self,
        model_tok: ModelToken,
        growth_tok: GrowthParamsToken,
        xy_tok: XyParamsToken,
        pk_init: &FilteredPk,
        pk_final: Option<&FilteredPk>,
        k_db: &KDb,
        uv_db: &UvDb,
        ir_db: &IrDb,
        ir_resum_db: &IrResumDb,
        z_db: &ZDb,
    ) -> Result<Vec<CountertermItem>> {
        let timer = Instant::now();
        let pk_final_tok = pk_final.map(|pk| pk.token);
        let mut work = Vec::new();

        for &(k_tok, k) in k_db {
            for &(uv_tok, _) in uv_db {
                for &(ir_tok, _) in ir_db {
                    for &(ir_resum_tok, _) in ir_resum_db {
                        let tx = self.open_transaction()?;
                        let sql = format!(
                            "SELECT t.id FROM {temp} t \
                             LEFT JOIN {c0} c \
                               ON c.zid = t.id AND c.mid = ?1 AND c.growth_id = ?2 \
                              AND c.xy_id = ?3 AND c.init_id = ?4 AND c.final_id IS ?5 \
                              AND c.kid = ?6 AND c.ir_id = ?7 AND c.uv_id = ?8 \
                              AND c.ir_resum_id = ?9 \
                             WHERE c.zid IS NULL;",
                            temp = self.policy.temp,
                            c0 = crate::policy::Policy::COUNTERTERM_TABLES[0]
                        );
                        let missing = self.missing_ids(
                            &tx,
                            z_db.iter().map(|(token, _)| token.id()),
                            &sql,
                            params![
                                model_tok.id(),
                                growth_tok.id(),
                                xy_tok.id(),
                                pk_init.token.id(),
                                pk_final_tok.map(|token| token.id()),
                                k_tok.id(),
                                ir_tok.id(),
                                uv_tok.id(),
                                ir_resum_tok.id()
                            ],
                        )?;
                        let missing: HashSet<u32> = missing.into_iter().collect();
                        tx.commit()?;

                        if missing.is_empty() {
                            continue;
                        }
                        let missing_zs: ZDb = z_db
                            .iter()
                            .filter(|(token, _)| missing.contains(&token.id()))
                            .copied()
                            .collect();

                        let growth = self.find_growth(model_tok, growth_tok, &missing_zs)?;
                        let xy = self.find_xy(model_tok, xy_tok, pk_init.token, ir_resum_tok)?;

                        for row in growth {
                            work.push(CountertermItem {
                                model_tok,
                                growth_params_tok: growth_tok,
                                xy_params_tok: xy_tok,
                                pk_init_tok: pk_init.token,
                                pk_final_tok,
                                k,
                                k_tok,
                                z_tok: row.z_tok,
                                uv_tok,
                                ir_tok,
                                ir_resum_tok,
                                xy,
                                growth: row.record,
                                pk_init: pk_init.clone(),
                                pk_final: pk_final.cloned(),
                            });
                        }
                    }
                }
            }
        }
        info!(
            "constructed counterterm work list ({} items) in {:.2?}",
            work.len(),
            timer.elapsed()
        );
        Ok(work)
    }
}
