//! End-to-end pipeline run over the in-process pool: every phase against
//! a scratch store, then the memoisation property - a second identical
//! run finds no residual work.

use std::path::PathBuf;

use oneloop_core::config::{ArgumentCache, SampleRange, Spacing};
use oneloop_core::master::MasterController;
use oneloop_core::testing::InlinePool;
use oneloop_cosmology::frw::mdr1;
use oneloop_cosmology::{FilterParams, GrowthParams, LoopParams, MatsubaraXyParams};
use oneloop_store::{DataManager, Options};
use tempfile::TempDir;

fn write_spectrum(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("linear.dat");
    let mut body = String::new();
    for i in 0..40 {
        let k = 10f64.powf(-3.0 + 3.2 * i as f64 / 39.0);
        // A smooth shape with a mild oscillation, vaguely CDM-like.
        let p = 2.0e4 * k / (1.0 + (k / 0.02).powf(2.8)) * (1.0 + 0.03 * (k / 0.01).sin());
        body.push_str(&format!("{k:.10e} {p:.10e}\n"));
    }
    std::fs::write(&path, body).unwrap();
    path
}

fn single(value: f64) -> SampleRange {
    SampleRange {
        min: value,
        max: value,
        steps: 1,
        spacing: Spacing::Linear,
    }
}

fn arguments(dir: &TempDir) -> ArgumentCache {
    ArgumentCache {
        container: dir.path().join("pipeline.sqlite"),
        pk_init: write_spectrum(dir),
        pk_final: None,
        model: mdr1(),
        z_samples: SampleRange {
            min: 0.0,
            max: 1.0,
            steps: 2,
            spacing: Spacing::Linear,
        },
        k_samples: single(0.1),
        uv_samples: single(0.6),
        ir_samples: single(0.005),
        ir_resum_samples: single(0.2),
        filter_params: FilterParams {
            abs_tol: 1e-6,
            rel_tol: 1e-3,
            ..FilterParams::default()
        },
        growth_params: GrowthParams::default(),
        loop_params: LoopParams {
            abs_tol: 1e-4,
            rel_tol: 1e-2,
        },
        xy_params: MatsubaraXyParams {
            abs_tol: 1e-6,
            rel_tol: 1e-3,
            ..MatsubaraXyParams::default()
        },
        workers: 2,
        strict_consistency: true,
    }
}

#[test]
fn full_pipeline_runs_and_memoises() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().unwrap();
    let args = arguments(&dir);

    let mut pool = InlinePool::new(args.workers);
    MasterController::new(args.clone()).execute(&mut pool).unwrap();
    let first_run_items = pool.items_processed(1) + pool.items_processed(2);
    assert!(first_run_items > 0, "first run must schedule work");

    // Everything the run computed is readable back through the store.
    {
        let dm = DataManager::open(&args.container, Options::default()).unwrap();
        let model_tok = dm.tokenize_model(&args.model).unwrap();
        let growth_tok = dm.tokenize_growth_params(&args.growth_params).unwrap();
        let z_db = dm.build_z_db(&args.z_grid()).unwrap();
        let rows = dm.find_growth(model_tok, growth_tok, &z_db).unwrap();
        assert_eq!(rows.len(), 2);
        // Growth weakens with redshift.
        assert!(rows[1].record.value.linear < rows[0].record.value.linear);
    }

    // A second identical invocation builds empty work lists everywhere.
    let mut idle_pool = InlinePool::new(args.workers);
    MasterController::new(args).execute(&mut idle_pool).unwrap();
    assert_eq!(idle_pool.items_processed(1), 0);
    assert_eq!(idle_pool.items_processed(2), 0);
}
