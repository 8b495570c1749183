//! Deterministic in-process worker pool for tests.
//!
//! Real [`crate::worker::WorkerState`] machines are stepped synchronously
//! inside `send`, with every message serialised and deserialised on the
//! way through, so tests exercise the actual protocol and codec while
//! keeping dispatch order fully deterministic.

use std::collections::VecDeque;

use oneloop_wire::{Decode, Encode};

use crate::error::{CoreError, Result};
use crate::messages::Message;
use crate::transport::{WorkerId, WorkerPool};
use crate::worker::{Step, WorkerState};

pub struct InlinePool {
    workers: Vec<WorkerState>,
    inbox: VecDeque<(WorkerId, Message)>,
    items_processed: Vec<usize>,
    /// Dispatch order of (worker, item index within the phase), for
    /// FIFO assertions.
    dispatch_log: Vec<WorkerId>,
    terminated: Vec<bool>,
}

impl InlinePool {
    pub fn new(count: usize) -> Self {
        InlinePool {
            workers: (0..count).map(|_| WorkerState::new()).collect(),
            inbox: VecDeque::new(),
            items_processed: vec![0; count],
            dispatch_log: Vec::new(),
            terminated: vec![false; count],
        }
    }

    /// How many items the given worker has processed in total.
    pub fn items_processed(&self, worker: WorkerId) -> usize {
        self.items_processed[worker - 1]
    }

    /// Workers the master dispatched to, in order.
    pub fn dispatch_log(&self) -> &[WorkerId] {
        &self.dispatch_log
    }

    pub fn all_terminated(&self) -> bool {
        self.terminated.iter().all(|&done| done)
    }
}

impl WorkerPool for InlinePool {
    fn num_workers(&self) -> usize {
        self.workers.len()
    }

    fn send(&mut self, worker: WorkerId, message: &Message) -> Result<()> {
        // Round-trip through the wire format, as the process pool would.
        let delivered = Message::from_slice(&message.encoded())?;
        if matches!(delivered, Message::NewItem(_)) {
            self.items_processed[worker - 1] += 1;
            self.dispatch_log.push(worker);
        }
        match self.workers[worker - 1].handle(delivered)? {
            Step::Terminated => {
                self.terminated[worker - 1] = true;
            }
            Step::Continue(replies) => {
                for reply in replies {
                    let reply = Message::from_slice(&reply.encoded())?;
                    self.inbox.push_back((worker, reply));
                }
            }
        }
        Ok(())
    }

    fn recv(&mut self) -> Result<(WorkerId, Message)> {
        // An empty inbox with the scheduler still waiting would be a
        // deadlock; surface it as a crash instead of hanging the test.
        self.inbox.pop_front().ok_or(CoreError::WorkerCrash(0))
    }
}
