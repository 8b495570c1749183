//! Tokenisation: lookup-or-insert for every entity class.
//!
//! A lookup matches within the class tolerance; zero matches mint a new
//! identifier equal to the current row count, and more than one match is
//! a fatal consistency error, because the store could no longer map
//! values to identifiers deterministically.

use oneloop_cosmology::{
    FilterParams, FrwModel, GrowthParams, LinearPk, LoopParams, MatsubaraXyParams,
};
use oneloop_units::{
    Energy, FilterParamsToken, GrowthParamsToken, IrResumToken, IrToken, KToken, LinearPkToken,
    LoopParamsToken, ModelToken, UvToken, XyParamsToken, ZToken, MPC,
};
use rusqlite::params;

use crate::error::{Result, StoreError};
use crate::{DataManager, IrDb, IrResumDb, KDb, Transaction, UvDb, ZDb};

impl DataManager {
    fn lookup_unique(
        &self,
        table: &'static str,
        sql: &str,
        params: impl rusqlite::Params,
        value: f64,
    ) -> Result<Option<u32>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut id: Option<u32> = None;
        while let Some(row) = rows.next()? {
            if id.is_some() {
                return Err(StoreError::Consistency { table, value });
            }
            id = Some(row.get::<_, i64>(0)? as u32);
        }
        Ok(id)
    }

    // FRW MODELS

    pub fn tokenize_model(&self, model: &FrwModel) -> Result<ModelToken> {
        let tx = self.open_transaction()?;
        let token = self.tokenize_model_in(&tx, model)?;
        tx.commit()?;
        Ok(token)
    }

    pub(crate) fn tokenize_model_in(
        &self,
        _tx: &Transaction<'_>,
        model: &FrwModel,
    ) -> Result<ModelToken> {
        let tol = self.tolerances.model;
        let sql = format!(
            "SELECT id FROM {table} WHERE \
             ABS(omega_m - ?1) <= ?6 * MAX(ABS(?1), 1.0) AND \
             ABS(omega_cc - ?2) <= ?6 * MAX(ABS(?2), 1.0) AND \
             ABS(h - ?3) <= ?6 * MAX(ABS(?3), 1.0) AND \
             ABS(t_cmb - ?4) <= ?6 * MAX(ABS(?4), 1.0) AND \
             ABS(n_eff - ?5) <= ?6 * MAX(ABS(?5), 1.0);",
            table = self.policy.models
        );
        let fields = params![
            model.omega_m,
            model.omega_cc,
            model.h,
            model.t_cmb.raw(),
            model.n_eff,
            tol
        ];
        if let Some(id) = self.lookup_unique(self.policy.models, &sql, fields, model.omega_m)? {
            return Ok(ModelToken::new(id));
        }

        let id = self.count(self.policy.models)?;
        self.conn.execute(
            &format!(
                "INSERT INTO {table} VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                table = self.policy.models
            ),
            params![
                id,
                model.omega_m,
                model.omega_cc,
                model.h,
                model.t_cmb.raw(),
                model.n_eff
            ],
        )?;
        Ok(ModelToken::new(id))
    }

    // REDSHIFTS

    pub fn tokenize_z(&self, z: f64) -> Result<ZToken> {
        let tx = self.open_transaction()?;
        let token = self.tokenize_z_in(&tx, z)?;
        tx.commit()?;
        Ok(token)
    }

    pub(crate) fn tokenize_z_in(&self, _tx: &Transaction<'_>, z: f64) -> Result<ZToken> {
        let table = self.policy.z_config;
        // Absolute comparison at z ~ 0 (anything within one tolerance of
        // zero), relative elsewhere.
        let sql = if z.abs() > self.tolerances.z {
            format!("SELECT id FROM {table} WHERE ABS((z - ?1) / ?1) < ?2;")
        } else {
            format!("SELECT id FROM {table} WHERE ABS(z - ?1) < ?2;")
        };
        if let Some(id) = self.lookup_unique(table, &sql, params![z, self.tolerances.z], z)? {
            return Ok(ZToken::new(id));
        }

        let id = self.count(table)?;
        self.conn.execute(
            &format!("INSERT INTO {table} VALUES (?1, ?2);"),
            params![id, z],
        )?;
        Ok(ZToken::new(id))
    }

    // WAVENUMBERS, ONE TABLE PER ROLE

    fn tokenize_wavenumber(&self, table: &'static str, k: Energy) -> Result<u32> {
        let raw = k * MPC;
        let sql = format!("SELECT id FROM {table} WHERE ABS((k - ?1) / ?1) < ?2;");
        if let Some(id) = self.lookup_unique(table, &sql, params![raw, self.tolerances.k], raw)? {
            return Ok(id);
        }

        let id = self.count(table)?;
        self.conn.execute(
            &format!("INSERT INTO {table} VALUES (?1, ?2);"),
            params![id, raw],
        )?;
        Ok(id)
    }

    pub fn tokenize_k(&self, k: Energy) -> Result<KToken> {
        let tx = self.open_transaction()?;
        let token = self.tokenize_k_in(&tx, k)?;
        tx.commit()?;
        Ok(token)
    }

    pub(crate) fn tokenize_k_in(&self, _tx: &Transaction<'_>, k: Energy) -> Result<KToken> {
        Ok(KToken::new(self.tokenize_wavenumber(self.policy.k_config, k)?))
    }

    pub fn tokenize_uv(&self, k: Energy) -> Result<UvToken> {
        let tx = self.open_transaction()?;
        let token = UvToken::new(self.tokenize_wavenumber(self.policy.uv_config, k)?);
        tx.commit()?;
        Ok(token)
    }

    pub fn tokenize_ir(&self, k: Energy) -> Result<IrToken> {
        let tx = self.open_transaction()?;
        let token = IrToken::new(self.tokenize_wavenumber(self.policy.ir_config, k)?);
        tx.commit()?;
        Ok(token)
    }

    pub fn tokenize_ir_resum(&self, k: Energy) -> Result<IrResumToken> {
        let tx = self.open_transaction()?;
        let token = IrResumToken::new(self.tokenize_wavenumber(self.policy.ir_resum_config, k)?);
        tx.commit()?;
        Ok(token)
    }

    // PARAMETER BLOCKS

    pub fn tokenize_filter_params(&self, p: &FilterParams) -> Result<FilterParamsToken> {
        let tx = self.open_transaction()?;
        let table = self.policy.filter_params;
        let tol = self.tolerances.params;
        let sql = format!(
            "SELECT id FROM {table} WHERE \
             ABS(bottom_clearance - ?1) <= ?6 * MAX(ABS(?1), 1.0) AND \
             ABS(top_clearance - ?2) <= ?6 * MAX(ABS(?2), 1.0) AND \
             ABS(width - ?3) <= ?6 * MAX(ABS(?3), 1.0) AND \
             ABS(abs_tol - ?4) <= ?6 * MAX(ABS(?4), 1.0) AND \
             ABS(rel_tol - ?5) <= ?6 * MAX(ABS(?5), 1.0);"
        );
        let fields = params![
            p.bottom_clearance,
            p.top_clearance,
            p.width,
            p.abs_tol,
            p.rel_tol,
            tol
        ];
        let id = match self.lookup_unique(table, &sql, fields, p.width)? {
            Some(id) => id,
            None => {
                let id = self.count(table)?;
                self.conn.execute(
                    &format!("INSERT INTO {table} VALUES (?1, ?2, ?3, ?4, ?5, ?6);"),
                    params![
                        id,
                        p.bottom_clearance,
                        p.top_clearance,
                        p.width,
                        p.abs_tol,
                        p.rel_tol
                    ],
                )?;
                id
            }
        };
        tx.commit()?;
        Ok(FilterParamsToken::new(id))
    }

    pub fn tokenize_growth_params(&self, p: &GrowthParams) -> Result<GrowthParamsToken> {
        let tx = self.open_transaction()?;
        let table = self.policy.growth_params;
        let tol = self.tolerances.params;
        let sql = format!(
            "SELECT id FROM {table} WHERE \
             eds_mode = ?1 AND eds_ics = ?2 AND \
             ABS(abs_tol - ?3) <= ?5 * MAX(ABS(?3), 1.0) AND \
             ABS(rel_tol - ?4) <= ?5 * MAX(ABS(?4), 1.0);"
        );
        let fields = params![p.eds_mode as i64, p.eds_ics as i64, p.abs_tol, p.rel_tol, tol];
        let id = match self.lookup_unique(table, &sql, fields, p.rel_tol)? {
            Some(id) => id,
            None => {
                let id = self.count(table)?;
                self.conn.execute(
                    &format!("INSERT INTO {table} VALUES (?1, ?2, ?3, ?4, ?5);"),
                    params![id, p.eds_mode as i64, p.eds_ics as i64, p.abs_tol, p.rel_tol],
                )?;
                id
            }
        };
        tx.commit()?;
        Ok(GrowthParamsToken::new(id))
    }

    pub fn tokenize_loop_params(&self, p: &LoopParams) -> Result<LoopParamsToken> {
        let tx = self.open_transaction()?;
        let table = self.policy.loop_params;
        let tol = self.tolerances.params;
        let sql = format!(
            "SELECT id FROM {table} WHERE \
             ABS(abs_tol - ?1) <= ?3 * MAX(ABS(?1), 1.0) AND \
             ABS(rel_tol - ?2) <= ?3 * MAX(ABS(?2), 1.0);"
        );
        let id = match self.lookup_unique(
            table,
            &sql,
            params![p.abs_tol, p.rel_tol, tol],
            p.rel_tol,
        )? {
            Some(id) => id,
            None => {
                let id = self.count(table)?;
                self.conn.execute(
                    &format!("INSERT INTO {table} VALUES (?1, ?2, ?3);"),
                    params![id, p.abs_tol, p.rel_tol],
                )?;
                id
            }
        };
        tx.commit()?;
        Ok(LoopParamsToken::new(id))
    }

    pub fn tokenize_xy_params(&self, p: &MatsubaraXyParams) -> Result<XyParamsToken> {
        let tx = self.open_transaction()?;
        let table = self.policy.xy_params;
        let tol = self.tolerances.params;
        let sql = format!(
            "SELECT id FROM {table} WHERE \
             ABS(bao_scale - ?1) <= ?4 * MAX(ABS(?1), 1.0) AND \
             ABS(abs_tol - ?2) <= ?4 * MAX(ABS(?2), 1.0) AND \
             ABS(rel_tol - ?3) <= ?4 * MAX(ABS(?3), 1.0);"
        );
        let fields = params![p.bao_scale.raw(), p.abs_tol, p.rel_tol, tol];
        let id = match self.lookup_unique(table, &sql, fields, p.bao_scale.raw())? {
            Some(id) => id,
            None => {
                let id = self.count(table)?;
                self.conn.execute(
                    &format!("INSERT INTO {table} VALUES (?1, ?2, ?3, ?4);"),
                    params![id, p.bao_scale.raw(), p.abs_tol, p.rel_tol],
                )?;
                id
            }
        };
        tx.commit()?;
        Ok(XyParamsToken::new(id))
    }

    // LINEAR POWER SPECTRA

    /// Tokenise a linear spectrum by `(model, content hash)`. The file
    /// path is recorded for provenance but does not participate in
    /// identity, so moving the file on disk does not duplicate the
    /// spectrum. First registration also loads the `(k, P)` table.
    pub fn tokenize_linear_pk(&self, model: ModelToken, pk: &LinearPk) -> Result<LinearPkToken> {
        let tx = self.open_transaction()?;
        let table = self.policy.pk_linear_config;

        let sql = format!("SELECT id FROM {table} WHERE mid = ?1 AND hash = ?2;");
        if let Some(id) = self.lookup_unique(
            table,
            &sql,
            params![model.id(), pk.hash()],
            model.id() as f64,
        )? {
            tx.commit()?;
            return Ok(LinearPkToken::new(id));
        }

        let id = self.count(table)?;
        self.conn.execute(
            &format!("INSERT INTO {table} VALUES (?1, ?2, ?3, ?4);"),
            params![
                id,
                model.id(),
                pk.path().display().to_string(),
                pk.hash()
            ],
        )?;
        {
            let mut insert = self.conn.prepare(&format!(
                "INSERT INTO {data} VALUES (?1, ?2, ?3);",
                data = self.policy.pk_linear_data
            ))?;
            for (k, p) in pk.table().points() {
                insert.execute(params![id, k.raw(), p.raw()])?;
            }
        }
        tx.commit()?;
        Ok(LinearPkToken::new(id))
    }

    /// Number of rows in the linear-Pk data table, across all spectra.
    pub fn linear_pk_data_rows(&self) -> Result<u64> {
        Ok(self.count(self.policy.pk_linear_data)? as u64)
    }

    // CONFIGURATION DATABASES

    pub fn build_z_db(&self, zs: &[f64]) -> Result<ZDb> {
        zs.iter().map(|&z| Ok((self.tokenize_z(z)?, z))).collect()
    }

    pub fn build_k_db(&self, ks: &[Energy]) -> Result<KDb> {
        ks.iter().map(|&k| Ok((self.tokenize_k(k)?, k))).collect()
    }

    pub fn build_uv_db(&self, ks: &[Energy]) -> Result<UvDb> {
        ks.iter().map(|&k| Ok((self.tokenize_uv(k)?, k))).collect()
    }

    pub fn build_ir_db(&self, ks: &[Energy]) -> Result<IrDb> {
        ks.iter().map(|&k| Ok((self.tokenize_ir(k)?, k))).collect()
    }

    pub fn build_ir_resum_db(&self, ks: &[Energy]) -> Result<IrResumDb> {
        ks.iter()
            .map(|&k| Ok((self.tokenize_ir_resum(k)?, k)))
            .collect()
    }
}
