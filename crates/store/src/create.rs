//! Schema DDL.
//!
//! Every value table references its parent configuration rows; with
//! strict consistency enabled the references become real foreign keys
//! and `PRAGMA foreign_keys` is switched on, so a write referencing an
//! absent parent fails its transaction.

use rusqlite::Connection;

use crate::error::Result;
use crate::policy::Policy;
use crate::Options;

pub(crate) fn create_tables(
    conn: &Connection,
    policy: &Policy,
    options: &Options,
) -> Result<()> {
    let strict = options.strict_consistency;

    let fk = |column: &str, parent: &str| {
        if strict {
            format!(", FOREIGN KEY ({column}) REFERENCES {parent}(id)")
        } else {
            String::new()
        }
    };

    conn.execute_batch(&format!(
        "CREATE TABLE {models} (
            id INTEGER PRIMARY KEY,
            omega_m DOUBLE,
            omega_cc DOUBLE,
            h DOUBLE,
            t_cmb DOUBLE,
            n_eff DOUBLE);

        CREATE TABLE {z_config} (
            id INTEGER PRIMARY KEY,
            z DOUBLE);

        CREATE TABLE {k_config} (id INTEGER PRIMARY KEY, k DOUBLE);
        CREATE TABLE {uv_config} (id INTEGER PRIMARY KEY, k DOUBLE);
        CREATE TABLE {ir_config} (id INTEGER PRIMARY KEY, k DOUBLE);
        CREATE TABLE {ir_resum_config} (id INTEGER PRIMARY KEY, k DOUBLE);

        CREATE TABLE {filter_params} (
            id INTEGER PRIMARY KEY,
            bottom_clearance DOUBLE,
            top_clearance DOUBLE,
            width DOUBLE,
            abs_tol DOUBLE,
            rel_tol DOUBLE);

        CREATE TABLE {growth_params} (
            id INTEGER PRIMARY KEY,
            eds_mode INTEGER,
            eds_ics INTEGER,
            abs_tol DOUBLE,
            rel_tol DOUBLE);

        CREATE TABLE {loop_params} (
            id INTEGER PRIMARY KEY,
            abs_tol DOUBLE,
            rel_tol DOUBLE);

        CREATE TABLE {xy_params} (
            id INTEGER PRIMARY KEY,
            bao_scale DOUBLE,
            abs_tol DOUBLE,
            rel_tol DOUBLE);
        ",
        models = policy.models,
        z_config = policy.z_config,
        k_config = policy.k_config,
        uv_config = policy.uv_config,
        ir_config = policy.ir_config,
        ir_resum_config = policy.ir_resum_config,
        filter_params = policy.filter_params,
        growth_params = policy.growth_params,
        loop_params = policy.loop_params,
        xy_params = policy.xy_params,
    ))?;

    conn.execute_batch(&format!(
        "CREATE TABLE {pk_config} (
            id INTEGER PRIMARY KEY,
            mid INTEGER,
            path TEXT,
            hash TEXT
            {fk_mid});

        CREATE TABLE {pk_data} (
            pkid INTEGER,
            k DOUBLE,
            pk DOUBLE
            {fk_pkid});

        CREATE TABLE {pk_filter} (
            pkid INTEGER,
            params_id INTEGER,
            kid INTEGER,
            mid INTEGER,
            raw DOUBLE,
            nowiggle DOUBLE,
            converged INTEGER,
            PRIMARY KEY (pkid, params_id, kid)
            {fk_pkid2}{fk_params}{fk_kid});
        ",
        pk_config = policy.pk_linear_config,
        pk_data = policy.pk_linear_data,
        pk_filter = policy.pk_filter,
        fk_mid = fk("mid", policy.models),
        fk_pkid = fk("pkid", policy.pk_linear_config),
        fk_pkid2 = fk("pkid", policy.pk_linear_config),
        fk_params = fk("params_id", policy.filter_params),
        fk_kid = fk("kid", policy.k_config),
    ))?;

    for (table, columns) in [
        (
            policy.growth_g,
            "g_linear DOUBLE, a DOUBLE, b DOUBLE, d DOUBLE, e DOUBLE, f DOUBLE, g DOUBLE, j DOUBLE",
        ),
        (
            policy.growth_f,
            "f_linear DOUBLE, fa DOUBLE, fb DOUBLE, fd DOUBLE, fe DOUBLE, ff DOUBLE, fg DOUBLE, fj DOUBLE",
        ),
    ] {
        conn.execute_batch(&format!(
            "CREATE TABLE {table} (
                mid INTEGER,
                params_id INTEGER,
                zid INTEGER,
                {columns},
                PRIMARY KEY (mid, params_id, zid)
                {fk_mid}{fk_params}{fk_zid});",
            fk_mid = fk("mid", policy.models),
            fk_params = fk("params_id", policy.growth_params),
            fk_zid = fk("zid", policy.z_config),
        ))?;
    }

    conn.execute_batch(&format!(
        "CREATE TABLE {growth_meta} (
            mid INTEGER,
            params_id INTEGER,
            time INTEGER,
            steps INTEGER,
            PRIMARY KEY (mid, params_id)
            {fk_mid}{fk_params});",
        growth_meta = policy.growth_meta,
        fk_mid = fk("mid", policy.models),
        fk_params = fk("params_id", policy.growth_params),
    ))?;

    for table in Policy::KERNEL_TABLES {
        conn.execute_batch(&format!(
            "CREATE TABLE {table} (
                mid INTEGER,
                params_id INTEGER,
                kid INTEGER,
                pkid INTEGER,
                ir_id INTEGER,
                uv_id INTEGER,
                raw_value DOUBLE,
                raw_err DOUBLE,
                raw_regions INTEGER,
                raw_evals INTEGER,
                raw_time INTEGER,
                raw_converged INTEGER,
                nw_value DOUBLE,
                nw_err DOUBLE,
                nw_regions INTEGER,
                nw_evals INTEGER,
                nw_time INTEGER,
                nw_converged INTEGER,
                PRIMARY KEY (mid, params_id, kid, pkid, ir_id, uv_id)
                {fk_mid}{fk_params}{fk_kid}{fk_pkid}{fk_ir}{fk_uv});",
            fk_mid = fk("mid", policy.models),
            fk_params = fk("params_id", policy.loop_params),
            fk_kid = fk("kid", policy.k_config),
            fk_pkid = fk("pkid", policy.pk_linear_config),
            fk_ir = fk("ir_id", policy.ir_config),
            fk_uv = fk("uv_id", policy.uv_config),
        ))?;
    }

    for table in Policy::DD_PK_TABLES {
        conn.execute_batch(&format!(
            "CREATE TABLE {table} (
                mid INTEGER,
                growth_id INTEGER,
                loop_id INTEGER,
                init_id INTEGER,
                final_id INTEGER,
                kid INTEGER,
                zid INTEGER,
                ir_id INTEGER,
                uv_id INTEGER,
                tree_raw DOUBLE,
                tree_raw_err DOUBLE,
                tree_nw DOUBLE,
                tree_nw_err DOUBLE,
                p13_raw DOUBLE,
                p13_raw_err DOUBLE,
                p13_nw DOUBLE,
                p13_nw_err DOUBLE,
                p22_raw DOUBLE,
                p22_raw_err DOUBLE,
                p22_nw DOUBLE,
                p22_nw_err DOUBLE,
                spt_raw DOUBLE,
                spt_raw_err DOUBLE,
                spt_nw DOUBLE,
                spt_nw_err DOUBLE,
                PRIMARY KEY (mid, growth_id, loop_id, init_id, kid, zid, ir_id, uv_id)
                {fk_mid}{fk_growth}{fk_loop}{fk_init}{fk_kid}{fk_zid}{fk_ir}{fk_uv});",
            fk_mid = fk("mid", policy.models),
            fk_growth = fk("growth_id", policy.growth_params),
            fk_loop = fk("loop_id", policy.loop_params),
            fk_init = fk("init_id", policy.pk_linear_config),
            fk_kid = fk("kid", policy.k_config),
            fk_zid = fk("zid", policy.z_config),
            fk_ir = fk("ir_id", policy.ir_config),
            fk_uv = fk("uv_id", policy.uv_config),
        ))?;
    }

    conn.execute_batch(&format!(
        "CREATE TABLE {matsubara} (
            mid INTEGER,
            params_id INTEGER,
            pkid INTEGER,
            ir_resum_id INTEGER,
            x DOUBLE,
            y DOUBLE,
            converged INTEGER,
            PRIMARY KEY (mid, params_id, pkid, ir_resum_id)
            {fk_mid}{fk_params}{fk_pkid}{fk_resum});",
        matsubara = policy.matsubara_xy,
        fk_mid = fk("mid", policy.models),
        fk_params = fk("params_id", policy.xy_params),
        fk_pkid = fk("pkid", policy.pk_linear_config),
        fk_resum = fk("ir_resum_id", policy.ir_resum_config),
    ))?;

    for table in Policy::MULTIPOLE_TABLES {
        conn.execute_batch(&format!(
            "CREATE TABLE {table} (
                mid INTEGER,
                growth_id INTEGER,
                loop_id INTEGER,
                xy_id INTEGER,
                init_id INTEGER,
                final_id INTEGER,
                kid INTEGER,
                zid INTEGER,
                ir_id INTEGER,
                uv_id INTEGER,
                ir_resum_id INTEGER,
                tree DOUBLE,
                tree_resum DOUBLE,
                p13 DOUBLE,
                p13_resum DOUBLE,
                p22 DOUBLE,
                p22_resum DOUBLE,
                spt DOUBLE,
                spt_resum DOUBLE,
                PRIMARY KEY (mid, growth_id, loop_id, xy_id, init_id, kid, zid, ir_id, uv_id, ir_resum_id)
                {fk_mid}{fk_growth}{fk_loop}{fk_xy}{fk_init}{fk_kid}{fk_zid}{fk_ir}{fk_uv}{fk_resum});",
            fk_mid = fk("mid", policy.models),
            fk_growth = fk("growth_id", policy.growth_params),
            fk_loop = fk("loop_id", policy.loop_params),
            fk_xy = fk("xy_id", policy.xy_params),
            fk_init = fk("init_id", policy.pk_linear_config),
            fk_kid = fk("kid", policy.k_config),
            fk_zid = fk("zid", policy.z_config),
            fk_ir = fk("ir_id", policy.ir_config),
            fk_uv = fk("uv_id", policy.uv_config),
            fk_resum = fk("ir_resum_id", policy.ir_resum_config),
        ))?;
    }

    for table in Policy::COUNTERTERM_TABLES {
        conn.execute_batch(&format!(
            "CREATE TABLE {table} (
                mid INTEGER,
                growth_id INTEGER,
                xy_id INTEGER,
                init_id INTEGER,
                final_id INTEGER,
                kid INTEGER,
                zid INTEGER,
                ir_id INTEGER,
                uv_id INTEGER,
                ir_resum_id INTEGER,
                value DOUBLE,
                value_resum DOUBLE,
                PRIMARY KEY (mid, growth_id, xy_id, init_id, kid, zid, ir_id, uv_id, ir_resum_id)
                {fk_mid}{fk_growth}{fk_xy}{fk_init}{fk_kid}{fk_zid}{fk_ir}{fk_uv}{fk_resum});",
            fk_mid = fk("mid", policy.models),
            fk_growth = fk("growth_id", policy.growth_params),
            fk_xy = fk("xy_id", policy.xy_params),
            fk_init = fk("init_id", policy.pk_linear_config),
            fk_kid = fk("kid", policy.k_config),
            fk_zid = fk("zid", policy.z_config),
            fk_ir = fk("ir_id", policy.ir_config),
            fk_uv = fk("uv_id", policy.uv_config),
            fk_resum = fk("ir_resum_id", policy.ir_resum_config),
        ))?;
    }

    Ok(())
}
