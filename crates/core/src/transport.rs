//! Transports between the master and its worker pool.
//!
//! The production pool spawns one OS process per worker and frames
//! messages over the children's standard pipes; a reader thread per
//! child fans incoming frames into a single channel, so the master has
//! one blocking poll point and observes results in arrival order. There
//! is no shared memory anywhere on this path.

use std::io::{BufReader as IoBufReader, BufWriter as IoBufWriter, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, warn};
use oneloop_wire::{read_frame, write_frame, Decode, Encode};

use crate::error::{CoreError, Result};
use crate::messages::Message;

/// Worker number. Workers are numbered 1..=N with the master as 0, so a
/// pool of size N exposes ids 1..=N.
pub type WorkerId = usize;

/// What the scheduler needs from a pool of workers.
pub trait WorkerPool {
    fn num_workers(&self) -> usize;

    /// Worker ids, ascending.
    fn workers(&self) -> Vec<WorkerId> {
        (1..=self.num_workers()).collect()
    }

    fn send(&mut self, worker: WorkerId, message: &Message) -> Result<()>;

    /// Block until any worker has a message for the master.
    fn recv(&mut self) -> Result<(WorkerId, Message)>;

    /// Broadcast to every worker, lowest id first.
    fn broadcast(&mut self, message: &Message) -> Result<()> {
        for worker in self.workers() {
            self.send(worker, message)?;
        }
        Ok(())
    }
}

enum Event {
    Message(WorkerId, Message),
    Eof(WorkerId),
    Failed(WorkerId, CoreError),
}

/// A pool of worker OS processes speaking the framed wire protocol over
/// stdin/stdout.
pub struct ProcessPool {
    children: Vec<Child>,
    stdins: Vec<IoBufWriter<ChildStdin>>,
    events: Receiver<Event>,
    readers: Vec<JoinHandle<()>>,
}

impl ProcessPool {
    /// Spawn `count` workers running `command` (typically the current
    /// executable with a `--worker` flag).
    pub fn spawn(mut command_for: impl FnMut() -> Command, count: usize) -> Result<Self> {
        let (tx, events) = crossbeam_channel::unbounded();
        let mut children = Vec::with_capacity(count);
        let mut stdins = Vec::with_capacity(count);
        let mut readers = Vec::with_capacity(count);

        for worker in 1..=count {
            let mut command = command_for();
            command.stdin(Stdio::piped()).stdout(Stdio::piped());
            let mut child = command.spawn().map_err(CoreError::Spawn)?;
            let stdin = child.stdin.take().expect("stdin was piped");
            let stdout = child.stdout.take().expect("stdout was piped");
            stdins.push(IoBufWriter::new(stdin));
            readers.push(spawn_reader(worker, stdout, tx.clone()));
            children.push(child);
            debug!("spawned worker {worker}");
        }

        Ok(ProcessPool {
            children,
            stdins,
            events,
            readers,
        })
    }

    /// Broadcast TERMINATE and reap the children. Called on both clean
    /// and failed exits, so errors are logged rather than returned.
    pub fn shutdown(mut self) {
        if let Err(e) = self.broadcast(&Message::Terminate) {
            warn!("failed to broadcast TERMINATE: {e}");
        }
        for (idx, mut child) in self.children.drain(..).enumerate() {
            match child.wait() {
                Ok(status) if status.success() => {}
                Ok(status) => warn!("worker {} exited with {status}", idx + 1),
                Err(e) => warn!("failed to reap worker {}: {e}", idx + 1),
            }
        }
        for reader in self.readers.drain(..) {
            let _ = reader.join();
        }
    }
}

fn spawn_reader(worker: WorkerId, stdout: impl Read + Send + 'static, tx: Sender<Event>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut stdout = IoBufReader::new(stdout);
        loop {
            match read_frame(&mut stdout) {
                Ok(Some(frame)) => match Message::from_slice(&frame) {
                    Ok(message) => {
                        if tx.send(Event::Message(worker, message)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Event::Failed(worker, CoreError::Protocol(e)));
                        break;
                    }
                },
                Ok(None) => {
                    let _ = tx.send(Event::Eof(worker));
                    break;
                }
                Err(e) => {
                    let _ = tx.send(Event::Failed(worker, CoreError::Channel(e)));
                    break;
                }
            }
        }
    })
}

impl WorkerPool for ProcessPool {
    fn num_workers(&self) -> usize {
        self.stdins.len()
    }

    fn send(&mut self, worker: WorkerId, message: &Message) -> Result<()> {
        let stdin = &mut self.stdins[worker - 1];
        write_frame(stdin, &message.encoded())?;
        Ok(())
    }

    fn recv(&mut self) -> Result<(WorkerId, Message)> {
        match self.events.recv() {
            Ok(Event::Message(worker, message)) => Ok((worker, message)),
            Ok(Event::Eof(worker)) => Err(CoreError::WorkerCrash(worker)),
            Ok(Event::Failed(worker, e)) => {
                error!("worker {worker} channel failed: {e}");
                Err(e)
            }
            // All reader threads are gone; treat as a crash of worker 1.
            Err(_) => Err(CoreError::WorkerCrash(1)),
        }
    }
}

/// Worker-side endpoint over arbitrary byte streams (stdin/stdout in
/// production).
pub struct StreamEndpoint<R, W> {
    input: R,
    output: W,
}

impl<R: Read, W: Write> StreamEndpoint<R, W> {
    pub fn new(input: R, output: W) -> Self {
        StreamEndpoint { input, output }
    }

    /// Blocking receive. `None` means the master closed the channel.
    pub fn recv(&mut self) -> Result<Option<Message>> {
        match read_frame(&mut self.input)? {
            None => Ok(None),
            Some(frame) => Ok(Some(Message::from_slice(&frame)?)),
        }
    }

    pub fn send(&mut self, message: &Message) -> Result<()> {
        write_frame(&mut self.output, &message.encoded())?;
        Ok(())
    }
}
