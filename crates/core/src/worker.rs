//! The worker loop.
//!
//! A worker blocks on its control channel, computes exactly one result
//! per `NEW_ITEM`, and exits on `TERMINATE`. It holds no state between
//! items beyond the parameter blocks travelling inside the payloads,
//! and it never touches the persistent store.

use std::io::{Read, Write};

use log::{debug, info};
use oneloop_cosmology::filter::PkFilter;
use oneloop_cosmology::growth::GrowthIntegrator;
use oneloop_cosmology::loop_integral::{LoopIntegral, LoopIntegrator};
use oneloop_cosmology::matsubara::{MatsubaraXy, MatsubaraXyCalculator};
use oneloop_cosmology::multipole::{counterterms, multipoles, Counterterms, MultipolePk};
use oneloop_cosmology::oneloop::{assemble, OneLoopPk};
use oneloop_cosmology::types::{FilterResult, GrowthResult, OneLoopResult};
use oneloop_quadrature::GenzMalik;

use crate::error::{CoreError, Result};
use crate::messages::{Message, TaskKind, WorkItem, WorkResult};
use crate::transport::StreamEndpoint;

enum State {
    Idle,
    InTask(TaskKind),
}

/// One step of the worker state machine.
pub enum Step {
    /// Messages to send back to the master; possibly none.
    Continue(Vec<Message>),
    /// TERMINATE was received.
    Terminated,
}

/// The worker state machine, transport-agnostic so the deterministic
/// in-process pool used by tests can drive the same logic as the
/// production stdio loop.
pub struct WorkerState {
    state: State,
}

impl Default for WorkerState {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerState {
    pub fn new() -> Self {
        WorkerState { state: State::Idle }
    }

    pub fn handle(&mut self, message: Message) -> Result<Step> {
        match (&self.state, message) {
            (_, Message::Terminate) => {
                info!("worker terminating");
                Ok(Step::Terminated)
            }
            (State::Idle, Message::TaskBegin(kind)) => {
                debug!("entering phase {}", kind.name());
                self.state = State::InTask(kind);
                Ok(Step::Continue(vec![Message::ReadyForWork]))
            }
            (State::InTask(_), Message::TaskEnd) => {
                self.state = State::Idle;
                Ok(Step::Continue(Vec::new()))
            }
            (State::InTask(kind), Message::NewItem(item)) => {
                if item.kind() != *kind {
                    return Err(CoreError::UnexpectedMessage {
                        worker: 0,
                        got: "NEW_ITEM of a different phase",
                        phase: kind.name(),
                    });
                }
                let result = compute(*item)?;
                Ok(Step::Continue(vec![Message::Result(Box::new(result))]))
            }
            (_, other) => Err(CoreError::UnexpectedMessage {
                worker: 0,
                got: other.name(),
                phase: "worker loop",
            }),
        }
    }
}

/// Run the worker state machine over a byte-stream endpoint until
/// `TERMINATE`.
pub fn run<R: Read, W: Write>(endpoint: &mut StreamEndpoint<R, W>) -> Result<()> {
    let mut worker = WorkerState::new();
    loop {
        let message = endpoint.recv()?.ok_or_else(|| {
            CoreError::Channel(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "master closed the control channel without TERMINATE",
            ))
        })?;
        match worker.handle(message)? {
            Step::Terminated => return Ok(()),
            Step::Continue(replies) => {
                for reply in replies {
                    endpoint.send(&reply)?;
                }
            }
        }
    }
}

/// Compute the result payload for one work item.
pub fn compute(item: WorkItem) -> Result<WorkResult> {
    Ok(match item {
        WorkItem::Filter(item) => {
            let filter = PkFilter::new(&GenzMalik, item.params);
            let sample = filter.apply(&item.model, &item.pk_lin, item.k);
            WorkResult::Filter(FilterResult {
                model_tok: item.model_tok,
                k_tok: item.k_tok,
                pk_tok: item.pk_tok,
                params_tok: item.params_tok,
                raw: sample.raw,
                nowiggle: sample.nowiggle,
                converged: sample.converged,
            })
        }
        WorkItem::Growth(item) => {
            let integrator = GrowthIntegrator::new(item.params);
            let sample = integrator.integrate(&item.model, &item.zs)?;
            WorkResult::Growth(GrowthResult {
                model_tok: item.model_tok,
                params_tok: item.params_tok,
                rows: sample.rows,
                time_ns: sample.time.as_nanos() as u64,
                steps: sample.steps,
            })
        }
        WorkItem::MatsubaraXy(item) => {
            let calculator = MatsubaraXyCalculator::new(GenzMalik, item.params);
            let (x, y, converged) = calculator.compute(item.ir_resum, &item.pk);
            WorkResult::MatsubaraXy(MatsubaraXy {
                model: item.model_tok,
                params: item.params_tok,
                pk_lin: item.pk_tok,
                ir_resum: item.ir_resum_tok,
                x,
                y,
                converged,
            })
        }
        WorkItem::Loop(item) => {
            let integrator = LoopIntegrator::new(GenzMalik, item.params);
            let kernels = integrator.integrate(item.k, item.uv, item.ir, &item.pk);
            WorkResult::Loop(LoopIntegral {
                model: item.model_tok,
                params: item.params_tok,
                k: item.k_tok,
                pk_lin: item.pk.token,
                uv: item.uv_tok,
                ir: item.ir_tok,
                kernels,
            })
        }
        WorkItem::OneLoop(item) => {
            let rows = item
                .growth
                .iter()
                .map(|row| OneLoopPk {
                    model: item.model_tok,
                    growth_params: item.growth_params_tok,
                    loop_params: item.loop_params_tok,
                    pk_init: item.pk_init_tok,
                    pk_final: item.pk_final_tok,
                    k: item.k_tok,
                    z: row.z_tok,
                    uv: item.uv_tok,
                    ir: item.ir_tok,
                    mu: assemble(
                        item.k,
                        &row.record,
                        &item.kernels,
                        &item.pk_init,
                        item.pk_final.as_ref(),
                    ),
                })
                .collect();
            WorkResult::OneLoop(OneLoopResult { rows })
        }
        WorkItem::Multipole(item) => {
            let [p0, p2, p4] = multipoles(item.k, &item.growth, &item.xy, &item.oneloop.mu);
            WorkResult::Multipole(MultipolePk {
                model: item.oneloop.model,
                growth_params: item.oneloop.growth_params,
                loop_params: item.oneloop.loop_params,
                xy_params: item.xy.params,
                pk_init: item.oneloop.pk_init,
                pk_final: item.oneloop.pk_final,
                k: item.oneloop.k,
                z: item.oneloop.z,
                uv: item.oneloop.uv,
                ir: item.oneloop.ir,
                ir_resum: item.xy.ir_resum,
                p0,
                p2,
                p4,
            })
        }
        WorkItem::Counterterm(item) => {
            let [c0, c2, c4] = counterterms(
                item.k,
                &item.growth,
                &item.xy,
                &item.pk_init,
                item.pk_final.as_ref(),
            );
            WorkResult::Counterterm(Counterterms {
                model: item.model_tok,
                growth_params: item.growth_params_tok,
                xy_params: item.xy_params_tok,
                pk_init: item.pk_init_tok,
                pk_final: item.pk_final_tok,
                k: item.k_tok,
                z: item.z_tok,
                uv: item.uv_tok,
                ir: item.ir_tok,
                ir_resum: item.ir_resum_tok,
                c0,
                c2,
                c4,
            })
        }
    })
}
