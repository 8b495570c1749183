//! Scheduler behaviour over the deterministic in-process pool.

use oneloop_core::messages::{Message, TaskKind, WorkItem, WorkResult};
use oneloop_core::scheduler::run_phase;
use oneloop_core::testing::InlinePool;
use oneloop_core::transport::WorkerPool;
use oneloop_cosmology::frw::mdr1;
use oneloop_cosmology::types::GrowthItem;
use oneloop_cosmology::GrowthParams;
use oneloop_units::{GrowthParamsToken, ModelToken, ZToken};

/// A cheap, constant-cost work item: EdS-mode growth needs no ODE run.
fn cheap_item(index: u32) -> WorkItem {
    WorkItem::Growth(GrowthItem {
        model: mdr1(),
        model_tok: ModelToken::new(0),
        params_tok: GrowthParamsToken::new(0),
        params: GrowthParams {
            eds_mode: true,
            ..GrowthParams::default()
        },
        zs: vec![(ZToken::new(index), index as f64)],
    })
}

#[test]
fn four_items_split_evenly_over_two_workers() {
    let mut pool = InlinePool::new(2);
    let items: Vec<_> = (0..4).map(cheap_item).collect();

    let mut committed = 0;
    let stats = run_phase(&mut pool, TaskKind::Growth, items, &mut |result| {
        assert!(matches!(result, WorkResult::Growth(_)));
        committed += 1;
        Ok(())
    })
    .unwrap();

    assert_eq!(stats.items, 4);
    assert_eq!(stats.results, 4);
    assert_eq!(committed, 4);
    assert_eq!(pool.items_processed(1), 2);
    assert_eq!(pool.items_processed(2), 2);
}

#[test]
fn lowest_numbered_ready_worker_is_served_first() {
    let mut pool = InlinePool::new(3);
    let items: Vec<_> = (0..6).map(cheap_item).collect();

    run_phase(&mut pool, TaskKind::Growth, items, &mut |_| Ok(())).unwrap();

    // Workers announce in id order and results requeue them in id
    // order, so dispatch cycles 1, 2, 3 deterministically.
    assert_eq!(pool.dispatch_log(), &[1, 2, 3, 1, 2, 3]);
}

#[test]
fn every_item_is_dispatched_and_collected() {
    let mut pool = InlinePool::new(2);
    let items: Vec<_> = (0..9).map(cheap_item).collect();

    let mut seen = Vec::new();
    let stats = run_phase(&mut pool, TaskKind::Growth, items, &mut |result| {
        let WorkResult::Growth(sample) = result else {
            panic!("wrong result kind");
        };
        seen.push(sample.rows[0].z_tok.id());
        Ok(())
    })
    .unwrap();

    assert_eq!(stats.results, 9);
    let mut seen_sorted = seen.clone();
    seen_sorted.sort_unstable();
    assert_eq!(seen_sorted, (0..9).collect::<Vec<_>>());
}

#[test]
fn items_to_one_worker_commit_in_dispatch_order() {
    let mut pool = InlinePool::new(1);
    let items: Vec<_> = (0..5).map(cheap_item).collect();

    let mut order = Vec::new();
    run_phase(&mut pool, TaskKind::Growth, items, &mut |result| {
        let WorkResult::Growth(sample) = result else {
            panic!("wrong result kind");
        };
        order.push(sample.rows[0].z_tok.id());
        Ok(())
    })
    .unwrap();

    assert_eq!(order, vec![0, 1, 2, 3, 4]);
}

#[test]
fn empty_work_list_touches_no_worker() {
    let mut pool = InlinePool::new(2);
    let stats = run_phase(&mut pool, TaskKind::Growth, Vec::new(), &mut |_| {
        panic!("no results expected")
    })
    .unwrap();
    assert_eq!(stats.items, 0);
    assert_eq!(pool.items_processed(1), 0);
}

#[test]
fn consecutive_phases_reuse_the_pool() {
    let mut pool = InlinePool::new(2);
    for _ in 0..3 {
        let items: Vec<_> = (0..4).map(cheap_item).collect();
        let stats = run_phase(&mut pool, TaskKind::Growth, items, &mut |_| Ok(())).unwrap();
        assert_eq!(stats.results, 4);
    }
    assert_eq!(pool.items_processed(1) + pool.items_processed(2), 12);

    pool.broadcast(&Message::Terminate).unwrap();
    assert!(pool.all_terminated());
}
