use oneloop_store::StoreError;
use oneloop_wire::DecodeError;
use thiserror::Error;

use crate::transport::WorkerId;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Spectrum(#[from] oneloop_cosmology::SpectrumError),

    #[error("growth integration failed")]
    Growth(#[from] oneloop_quadrature::ode::OdeError),

    /// Unknown tag or undecodable payload on the control channel.
    #[error("protocol error: {0}")]
    Protocol(#[from] DecodeError),

    #[error("unexpected {got} from worker {worker} while {phase}")]
    UnexpectedMessage {
        worker: WorkerId,
        got: &'static str,
        phase: &'static str,
    },

    #[error("worker {0} stopped replying; aborting the current phase")]
    WorkerCrash(WorkerId),

    #[error("failed to spawn worker process")]
    Spawn(#[source] std::io::Error),

    #[error("control channel I/O failure")]
    Channel(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
