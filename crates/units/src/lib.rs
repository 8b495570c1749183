//! Dimensional quantities and opaque database tokens.
//!
//! Everything in the pipeline is expressed in a natural system with
//! `c = hbar = 1` and Mpc as the base unit, which keeps most numbers
//! order-unity. A quantity is an `f64` tagged with an integer mass
//! dimension; arithmetic is only defined between compatible dimensions,
//! and conversion back to a bare `f64` always goes through an explicit
//! unit divisor.

mod mpc;
mod tokens;

pub use mpc::{
    Energy, Energy2, Energy3, Energy4, InverseEnergy, InverseEnergy2, InverseEnergy3,
    InverseEnergy4, EV, KELVIN, KILOGRAM, KILOMETRE, LIGHT_SPEED, METRE, MPC, MPC2, MPC3, MPC4,
    PLANCK_MASS, SECOND, SQRT_NEWTON_G,
};
pub use tokens::{
    FilterParamsToken, GrowthParamsToken, IrResumToken, IrToken, KToken, LinearPkToken,
    LoopParamsToken, ModelToken, UvToken, XyParamsToken, ZToken,
};
