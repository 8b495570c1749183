use std::path::PathBuf;

use oneloop_cosmology::growth::{GrowthRecord, GrowthRow, GrowthSet};
use oneloop_cosmology::loop_integral::{IntegralRow, KernelResult, LoopIntegral, LoopKernels};
use oneloop_cosmology::spectrum::{FilteredPk, LinearPk, PkTable};
use oneloop_cosmology::types::{FilterResult, GrowthResult};
use oneloop_cosmology::{frw, FilterParams, GrowthParams, LoopParams};
use oneloop_units::{LinearPkToken, ZToken, MPC, MPC3};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use crate::{DataManager, Options, StoreError};

fn open_manager(dir: &TempDir) -> DataManager {
    DataManager::open(&dir.path().join("test.sqlite"), Options::default()).unwrap()
}

fn write_spectrum(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut body = String::from("# k P\n");
    for i in 0..32 {
        let k = 10f64.powf(-3.0 + 3.0 * i as f64 / 31.0);
        let p = 1.0e4 * k.powf(-1.4);
        body.push_str(&format!("{k:.8e} {p:.8e}\n"));
    }
    std::fs::write(&path, body).unwrap();
    path
}

fn sample_growth_rows(zs: &[(ZToken, f64)]) -> Vec<GrowthRow> {
    zs.iter()
        .map(|&(z_tok, z)| GrowthRow {
            z_tok,
            z,
            record: GrowthRecord {
                value: GrowthSet {
                    linear: 1.0 / (1.0 + z),
                    a: 0.4,
                    b: 0.3,
                    d: 0.1,
                    e: 0.05,
                    f: 0.09,
                    g: 0.06,
                    j: 0.02,
                },
                rate: GrowthSet {
                    linear: 1.0,
                    a: 2.0,
                    b: 2.0,
                    d: 3.0,
                    e: 3.0,
                    f: 3.0,
                    g: 3.0,
                    j: 3.0,
                },
            },
        })
        .collect()
}

fn sample_kernels(converged: bool) -> LoopKernels {
    let row = |value: f64| IntegralRow {
        value,
        error: 0.01,
        regions: 3,
        evaluations: 51,
        time_ns: 1_000,
        converged,
    };
    let pair = |value: f64| KernelResult {
        raw: row(value),
        nowiggle: row(value * 0.99),
    };
    LoopKernels {
        aa: pair(10.0),
        ab: pair(-2.0),
        bb: pair(4.0),
        d: pair(-0.5),
        e: pair(0.2),
        f: pair(-0.4),
        g: pair(0.1),
        j1: pair(0.02),
        j2: pair(-0.07),
    }
}

#[test]
fn tokenize_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let dm = open_manager(&dir);
    let model = frw::mdr1();

    let first = dm.tokenize_model(&model).unwrap();
    let second = dm.tokenize_model(&model).unwrap();
    assert_eq!(first, second);

    let z1 = dm.tokenize_z(0.5).unwrap();
    let z2 = dm.tokenize_z(0.5).unwrap();
    assert_eq!(z1, z2);
}

#[test]
fn wavenumbers_match_within_relative_tolerance() {
    let dir = TempDir::new().unwrap();
    let dm = open_manager(&dir);

    let k = 0.1 / MPC;
    let first = dm.tokenize_k(k).unwrap();
    let nudged = dm.tokenize_k((0.1 * (1.0 + 5e-11)) / MPC).unwrap();
    let distinct = dm.tokenize_k((0.1 * (1.0 + 5e-9)) / MPC).unwrap();
    assert_eq!(first, nudged);
    assert_ne!(first, distinct);
}

#[test]
fn wavenumber_roles_tokenize_independently() {
    let dir = TempDir::new().unwrap();
    let dm = open_manager(&dir);

    let k = 0.2 / MPC;
    let generic = dm.tokenize_k(k).unwrap();
    let uv = dm.tokenize_uv(k).unwrap();
    let ir = dm.tokenize_ir(k).unwrap();
    // Same value, separate identifier spaces starting at zero.
    assert_eq!(generic.id(), 0);
    assert_eq!(uv.id(), 0);
    assert_eq!(ir.id(), 0);
}

#[test]
fn redshift_zero_uses_absolute_comparison() {
    let dir = TempDir::new().unwrap();
    let dm = open_manager(&dir);

    let zero = dm.tokenize_z(0.0).unwrap();
    let tiny = dm.tokenize_z(5e-6).unwrap();
    assert_eq!(zero, tiny);

    let half = dm.tokenize_z(0.5).unwrap();
    let nudged = dm.tokenize_z(0.5 + 4e-6).unwrap();
    assert_eq!(half, nudged);

    let one = dm.tokenize_z(1.0).unwrap();
    assert_ne!(one, half);
    assert_ne!(one, zero);
}

#[test]
fn model_tolerance_is_per_field() {
    let dir = TempDir::new().unwrap();
    let dm = open_manager(&dir);

    let base = frw::mdr1();
    let first = dm.tokenize_model(&base).unwrap();

    let nudged = frw::FrwModel {
        omega_m: base.omega_m * (1.0 + 1e-7),
        ..base
    };
    assert_eq!(dm.tokenize_model(&nudged).unwrap(), first);

    let distinct = frw::FrwModel {
        omega_m: base.omega_m * (1.0 + 1e-3),
        ..base
    };
    assert_ne!(dm.tokenize_model(&distinct).unwrap(), first);
}

#[test]
fn same_content_different_path_shares_a_token() {
    let dir = TempDir::new().unwrap();
    let dm = open_manager(&dir);
    let model = dm.tokenize_model(&frw::mdr1()).unwrap();

    let path_a = write_spectrum(&dir, "a.dat");
    let path_b = write_spectrum(&dir, "copied.dat");

    let pk_a = LinearPk::load(&path_a).unwrap();
    let tok_a = dm.tokenize_linear_pk(model, &pk_a).unwrap();
    let rows_after_first = dm.linear_pk_data_rows().unwrap();

    let pk_b = LinearPk::load(&path_b).unwrap();
    let tok_b = dm.tokenize_linear_pk(model, &pk_b).unwrap();

    assert_eq!(tok_a, tok_b);
    assert_eq!(dm.linear_pk_data_rows().unwrap(), rows_after_first);
}

#[test]
fn second_transaction_fails_loudly() {
    let dir = TempDir::new().unwrap();
    let dm = open_manager(&dir);

    let tx = dm.open_transaction().unwrap();
    match dm.open_transaction() {
        Err(StoreError::TransactionInProgress) => {}
        other => panic!("expected TransactionInProgress, got {other:?}"),
    }
    tx.commit().unwrap();
    // After commit a new transaction may open again.
    let tx = dm.open_transaction().unwrap();
    drop(tx);
    dm.open_transaction().unwrap().commit().unwrap();
}

#[test]
fn duplicate_tolerance_matches_are_a_consistency_error() {
    let dir = TempDir::new().unwrap();
    let dm = open_manager(&dir);

    // Two rows that both match z = 0.5 within tolerance can only appear
    // through store corruption; plant them directly.
    dm.conn
        .execute_batch("INSERT INTO z_config VALUES (0, 0.5); INSERT INTO z_config VALUES (1, 0.5000001);")
        .unwrap();
    match dm.tokenize_z(0.5) {
        Err(StoreError::Consistency { table, .. }) => assert_eq!(table, "z_config"),
        other => panic!("expected consistency error, got {other:?}"),
    }
}

#[test]
fn filter_work_list_is_residual() {
    let dir = TempDir::new().unwrap();
    let dm = open_manager(&dir);
    let model = frw::mdr1();
    let model_tok = dm.tokenize_model(&model).unwrap();

    let path = write_spectrum(&dir, "linear.dat");
    let pk = LinearPk::load(&path).unwrap();
    let pk_tok = dm.tokenize_linear_pk(model_tok, &pk).unwrap();

    let params = FilterParams::default();
    let params_tok = dm.tokenize_filter_params(&params).unwrap();

    let work = dm
        .build_filter_work_list(&model, model_tok, pk_tok, &pk, params_tok, &params)
        .unwrap();
    assert!(!work.is_empty());

    for item in &work {
        dm.store_filter_sample(&FilterResult {
            model_tok,
            k_tok: item.k_tok,
            pk_tok,
            params_tok,
            raw: item.pk_lin.eval(item.k),
            nowiggle: item.pk_lin.eval(item.k),
            converged: true,
        })
        .unwrap();
    }

    let residual = dm
        .build_filter_work_list(&model, model_tok, pk_tok, &pk, params_tok, &params)
        .unwrap();
    assert!(residual.is_empty());

    // The filtered spectrum reads back with the stored grid.
    let filtered = dm.find_filtered_pk(pk_tok, params_tok).unwrap();
    assert_eq!(filtered.raw.len(), work.len());
}

#[test]
fn growth_work_list_shrinks_after_store() {
    let dir = TempDir::new().unwrap();
    let dm = open_manager(&dir);
    let model = frw::mdr1();
    let model_tok = dm.tokenize_model(&model).unwrap();
    let params = GrowthParams::default();
    let params_tok = dm.tokenize_growth_params(&params).unwrap();

    let z_db = dm.build_z_db(&[0.0, 0.5, 1.0]).unwrap();
    let item = dm
        .build_growth_work_list(&model, model_tok, params_tok, &params, &z_db)
        .unwrap()
        .expect("everything missing on first run");
    assert_eq!(item.zs.len(), 3);

    dm.store_growth_sample(&GrowthResult {
        model_tok,
        params_tok,
        rows: sample_growth_rows(&item.zs),
        time_ns: 12_345,
        steps: 100,
    })
    .unwrap();

    let residual = dm
        .build_growth_work_list(&model, model_tok, params_tok, &params, &z_db)
        .unwrap();
    assert!(residual.is_none());

    // find_growth returns the rows bit-exactly.
    let rows = dm.find_growth(model_tok, params_tok, &z_db).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].record.value.a, 0.4);
}

#[test]
fn missing_growth_row_is_named() {
    let dir = TempDir::new().unwrap();
    let dm = open_manager(&dir);
    let model_tok = dm.tokenize_model(&frw::mdr1()).unwrap();
    let params_tok = dm
        .tokenize_growth_params(&GrowthParams::default())
        .unwrap();
    let z_db = dm.build_z_db(&[0.25]).unwrap();

    match dm.find_growth(model_tok, params_tok, &z_db) {
        Err(StoreError::MissingGrowth { model, params, z }) => {
            assert_eq!(model, model_tok);
            assert_eq!(params, params_tok);
            assert_eq!(z, z_db[0].0);
        }
        other => panic!("expected MissingGrowth, got {other:?}"),
    }
}

#[test]
fn loop_work_list_and_failure_flag_roundtrip() {
    let dir = TempDir::new().unwrap();
    let dm = open_manager(&dir);
    let model_tok = dm.tokenize_model(&frw::mdr1()).unwrap();
    let params = LoopParams::default();
    let params_tok = dm.tokenize_loop_params(&params).unwrap();

    let points: Vec<_> = (0..16)
        .map(|i| {
            let k = 0.01 * (i + 1) as f64;
            (k / MPC, 1.0e4 / k * MPC3)
        })
        .collect();
    let table = PkTable::new(&points).unwrap();
    let filtered = FilteredPk {
        token: LinearPkToken::new(0),
        raw: table.clone(),
        nowiggle: table,
    };

    let k_db = dm.build_k_db(&[0.05 / MPC, 0.1 / MPC]).unwrap();
    let uv_db = dm.build_uv_db(&[1.0 / MPC]).unwrap();
    let ir_db = dm.build_ir_db(&[0.001 / MPC, 0.002 / MPC]).unwrap();

    let work = dm
        .build_loop_work_list(model_tok, params_tok, &params, &filtered, &k_db, &uv_db, &ir_db)
        .unwrap();
    assert_eq!(work.len(), 4);

    // Store every configuration; one of them carries a failure flag.
    for (idx, item) in work.iter().enumerate() {
        dm.store_loop(&LoopIntegral {
            model: model_tok,
            params: params_tok,
            k: item.k_tok,
            pk_lin: filtered.token,
            uv: item.uv_tok,
            ir: item.ir_tok,
            kernels: sample_kernels(idx != 0),
        })
        .unwrap();
    }

    let residual = dm
        .build_loop_work_list(model_tok, params_tok, &params, &filtered, &k_db, &uv_db, &ir_db)
        .unwrap();
    assert!(residual.is_empty());

    // The failed configuration is still present, flag intact, so later
    // runs do not retry it.
    let stored = dm
        .find_loop(
            model_tok,
            params_tok,
            work[0].k_tok,
            filtered.token,
            work[0].ir_tok,
            work[0].uv_tok,
        )
        .unwrap();
    assert!(stored.kernels.failed());
    let ok = dm
        .find_loop(
            model_tok,
            params_tok,
            work[1].k_tok,
            filtered.token,
            work[1].ir_tok,
            work[1].uv_tok,
        )
        .unwrap();
    assert!(!ok.kernels.failed());
}

#[test]
fn redelivered_results_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let dm = open_manager(&dir);
    let model_tok = dm.tokenize_model(&frw::mdr1()).unwrap();
    let params_tok = dm
        .tokenize_growth_params(&GrowthParams::default())
        .unwrap();
    let z_db = dm.build_z_db(&[0.0, 1.0]).unwrap();

    let sample = GrowthResult {
        model_tok,
        params_tok,
        rows: sample_growth_rows(&z_db),
        time_ns: 1,
        steps: 2,
    };
    dm.store_growth_sample(&sample).unwrap();
    dm.store_growth_sample(&sample).unwrap();

    let count: i64 = dm
        .conn
        .query_row("SELECT COUNT(*) FROM growth_g_factors;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 2);
}

#[test]
fn strict_consistency_rejects_orphan_rows() {
    let dir = TempDir::new().unwrap();
    let dm = DataManager::open(
        &dir.path().join("strict.sqlite"),
        Options {
            strict_consistency: true,
        },
    )
    .unwrap();

    // No models, z rows or parameter blocks exist yet; a growth row
    // referencing them must fail its transaction.
    let result = dm.store_growth_sample(&GrowthResult {
        model_tok: oneloop_units::ModelToken::new(0),
        params_tok: oneloop_units::GrowthParamsToken::new(0),
        rows: sample_growth_rows(&[(ZToken::new(0), 0.0)]),
        time_ns: 1,
        steps: 1,
    });
    assert!(matches!(result, Err(StoreError::Sqlite(_))));
}
