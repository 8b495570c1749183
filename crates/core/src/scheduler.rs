//! The dynamic master-worker scheduler.
//!
//! One phase at a time: broadcast `TASK_BEGIN`, feed items to workers as
//! they announce themselves or hand results back, commit every result
//! before the producing worker receives its next item, and close with
//! `TASK_END` once the queue is drained, all workers are idle and every
//! announcement of this phase has been consumed.
//!
//! Guarantees: items sent to one worker are processed and committed in
//! dispatch order; across workers commits follow message arrival; when
//! several workers are ready the lowest-numbered one is served first.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::time::Instant;

use log::{debug, info};

use crate::error::{CoreError, Result};
use crate::messages::{Message, TaskKind, WorkItem, WorkResult};
use crate::transport::{WorkerId, WorkerPool};

/// Phase accounting, reported by the master at info level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseStats {
    pub items: usize,
    pub results: usize,
}

/// Run one phase to completion. `commit` is invoked for every incoming
/// result, in arrival order, before the next dispatch to the worker
/// that produced it.
pub fn run_phase<P: WorkerPool>(
    pool: &mut P,
    kind: TaskKind,
    items: Vec<WorkItem>,
    commit: &mut dyn FnMut(WorkResult) -> Result<()>,
) -> Result<PhaseStats> {
    let timer = Instant::now();
    let total = items.len();
    info!("phase {}: {} work items", kind.name(), total);

    if total == 0 {
        info!("phase {}: nothing to do", kind.name());
        return Ok(PhaseStats {
            items: 0,
            results: 0,
        });
    }

    pool.broadcast(&Message::TaskBegin(kind))?;

    let mut pending: VecDeque<WorkItem> = items.into();
    let mut ready: BTreeSet<WorkerId> = BTreeSet::new();
    let mut announced: HashSet<WorkerId> = HashSet::new();
    let mut busy = 0usize;
    let mut results = 0usize;

    loop {
        // Dispatch to the lowest-numbered ready worker first.
        while !pending.is_empty() {
            let Some(&worker) = ready.first() else { break };
            let item = pending.pop_front().expect("pending is non-empty");
            debug!("dispatching {} item to worker {worker}", kind.name());
            pool.send(worker, &Message::NewItem(Box::new(item)))?;
            ready.remove(&worker);
            busy += 1;
        }

        if pending.is_empty() && busy == 0 && announced.len() == pool.num_workers() {
            break;
        }

        let (worker, message) = pool.recv()?;
        match message {
            Message::ReadyForWork => {
                announced.insert(worker);
                ready.insert(worker);
            }
            Message::Result(result) => {
                if result.kind() != kind {
                    return Err(CoreError::UnexpectedMessage {
                        worker,
                        got: "RESULT of a different phase",
                        phase: kind.name(),
                    });
                }
                // Commit before this worker can receive another item.
                commit(*result)?;
                results += 1;
                busy -= 1;
                ready.insert(worker);
            }
            other => {
                return Err(CoreError::UnexpectedMessage {
                    worker,
                    got: other.name(),
                    phase: kind.name(),
                });
            }
        }
    }

    pool.broadcast(&Message::TaskEnd)?;
    info!(
        "phase {}: committed {results} results in {:.2?}",
        kind.name(),
        timer.elapsed()
    );
    Ok(PhaseStats {
        items: total,
        results,
    })
}
