//! Cosmology collaborators of the oneloop pipeline.
//!
//! The platform core treats everything in this crate as opaque: models
//! and parameter blocks are tokenised by the data manager, integrands are
//! real-valued functions over the unit square handed to the integration
//! driver, and the per-phase calculators turn a work item into exactly
//! one result payload. The payload types themselves (and their wire
//! codecs) live in [`types`].

pub mod filter;
pub mod frw;
pub mod growth;
pub mod loop_integral;
pub mod matsubara;
pub mod multipole;
pub mod oneloop;
pub mod params;
pub mod spectrum;
pub mod types;

pub use frw::FrwModel;
pub use params::{FilterParams, GrowthParams, LoopParams, MatsubaraXyParams};
pub use spectrum::{FilteredPk, LinearPk, PkTable, SpectrumError};
