use std::path::PathBuf;

use oneloop_units::{GrowthParamsToken, IrResumToken, IrToken, KToken, LinearPkToken, ModelToken, UvToken, XyParamsToken, ZToken};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open data container {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("data container {0} exists but is not a regular file")]
    NotAFile(PathBuf),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("a transaction is already in progress")]
    TransactionInProgress,

    /// Two stored configurations both match a new value within
    /// tolerance. The store can no longer tokenise deterministically.
    #[error("consistency failure: multiple rows of {table} match value {value}")]
    Consistency { table: &'static str, value: f64 },

    #[error(
        "growth factors missing for model={model}, growth-params={params}, z={z}; \
         run the growth phase first"
    )]
    MissingGrowth {
        model: ModelToken,
        params: GrowthParamsToken,
        z: ZToken,
    },

    #[error(
        "loop kernels missing for model={model}, k={k}, Pk={pk}, IR={ir}, UV={uv}"
    )]
    MissingLoop {
        model: ModelToken,
        k: KToken,
        pk: LinearPkToken,
        ir: IrToken,
        uv: UvToken,
    },

    #[error(
        "one-loop P(k) missing for model={model}, k={k}, z={z}, IR={ir}, UV={uv}"
    )]
    MissingOneLoop {
        model: ModelToken,
        k: KToken,
        z: ZToken,
        ir: IrToken,
        uv: UvToken,
    },

    #[error(
        "Matsubara XY missing for model={model}, XY-params={params}, Pk={pk}, IR-resum={ir_resum}"
    )]
    MissingXy {
        model: ModelToken,
        params: XyParamsToken,
        pk: LinearPkToken,
        ir_resum: IrResumToken,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;
