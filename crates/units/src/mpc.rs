//! Mpc natural units.
//!
//! Each quantity type wraps an `f64` and carries its Mpc power in the
//! type, so mismatched dimensions are compile errors with zero runtime
//! cost. The set of cross-dimension products and ratios is enumerated
//! explicitly below; anything not listed is not a meaningful operation
//! for this pipeline.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

macro_rules! quantity {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Default)]
        #[repr(transparent)]
        pub struct $name(f64);

        impl $name {
            pub const ZERO: Self = Self(0.0);

            #[inline]
            pub const fn new(raw: f64) -> Self {
                Self(raw)
            }

            /// Underlying numerical value, in the implied power of Mpc.
            #[inline]
            pub const fn raw(self) -> f64 {
                self.0
            }

            #[inline]
            pub const fn abs(self) -> Self {
                Self(self.0.abs())
            }

            #[inline]
            pub const fn is_finite(self) -> bool {
                self.0.is_finite()
            }
        }

        impl PartialOrd for $name {
            #[inline]
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                self.0.partial_cmp(&other.0)
            }
        }

        impl Add for $name {
            type Output = Self;
            #[inline]
            fn add(self, rhs: Self) -> Self {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $name {
            type Output = Self;
            #[inline]
            fn sub(self, rhs: Self) -> Self {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $name {
            type Output = Self;
            #[inline]
            fn neg(self) -> Self {
                Self(-self.0)
            }
        }

        impl Mul<$name> for f64 {
            type Output = $name;
            #[inline]
            fn mul(self, rhs: $name) -> $name {
                $name(self * rhs.0)
            }
        }

        impl Mul<f64> for $name {
            type Output = $name;
            #[inline]
            fn mul(self, rhs: f64) -> $name {
                $name(self.0 * rhs)
            }
        }

        impl Div<f64> for $name {
            type Output = $name;
            #[inline]
            fn div(self, rhs: f64) -> $name {
                $name(self.0 / rhs)
            }
        }

        // Same-dimension ratio is dimensionless.
        impl Div for $name {
            type Output = f64;
            #[inline]
            fn div(self, rhs: Self) -> f64 {
                self.0 / rhs.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

quantity!(
    /// Wavenumber-like quantity, Mpc^-1.
    Energy
);
quantity!(Energy2);
quantity!(Energy3);
quantity!(Energy4);
quantity!(
    /// Length-like quantity, Mpc.
    InverseEnergy
);
quantity!(InverseEnergy2);
quantity!(
    /// Power-spectrum-like quantity, Mpc^3.
    InverseEnergy3
);
quantity!(InverseEnergy4);

/// `impl_mul!(A * B => C)` declares the dimensionful product of `A` and
/// `B`, in both argument orders when the types differ.
macro_rules! impl_mul {
    ($a:ident * $a2:ident => $out:ident, same) => {
        impl Mul for $a {
            type Output = $out;
            #[inline]
            fn mul(self, rhs: Self) -> $out {
                $out::new(self.raw() * rhs.raw())
            }
        }
    };
    ($a:ident * $b:ident => $out:ident) => {
        impl Mul<$b> for $a {
            type Output = $out;
            #[inline]
            fn mul(self, rhs: $b) -> $out {
                $out::new(self.raw() * rhs.raw())
            }
        }
        impl Mul<$a> for $b {
            type Output = $out;
            #[inline]
            fn mul(self, rhs: $a) -> $out {
                $out::new(self.raw() * rhs.raw())
            }
        }
    };
}

/// `impl_cancel!(A * B)` declares that `A` and `B` have opposite
/// dimensions, so their product is a bare `f64`.
macro_rules! impl_cancel {
    ($a:ident * $b:ident) => {
        impl Mul<$b> for $a {
            type Output = f64;
            #[inline]
            fn mul(self, rhs: $b) -> f64 {
                self.raw() * rhs.raw()
            }
        }
        impl Mul<$a> for $b {
            type Output = f64;
            #[inline]
            fn mul(self, rhs: $a) -> f64 {
                self.raw() * rhs.raw()
            }
        }
    };
}

/// `impl_div!(A / B => C)` declares a dimensionful quotient.
macro_rules! impl_div {
    ($a:ident / $b:ident => $out:ident) => {
        impl Div<$b> for $a {
            type Output = $out;
            #[inline]
            fn div(self, rhs: $b) -> $out {
                $out::new(self.raw() / rhs.raw())
            }
        }
    };
}

/// `impl_recip!(A => B)` declares `f64 / A -> B` (and vice versa).
macro_rules! impl_recip {
    ($a:ident => $b:ident) => {
        impl Div<$a> for f64 {
            type Output = $b;
            #[inline]
            fn div(self, rhs: $a) -> $b {
                $b::new(self / rhs.raw())
            }
        }
    };
}

impl_mul!(Energy * Energy => Energy2, same);
impl_mul!(Energy * Energy2 => Energy3);
impl_mul!(Energy * Energy3 => Energy4);
impl_mul!(Energy2 * Energy2 => Energy4, same);

impl_mul!(InverseEnergy * InverseEnergy => InverseEnergy2, same);
impl_mul!(InverseEnergy * InverseEnergy2 => InverseEnergy3);
impl_mul!(InverseEnergy * InverseEnergy3 => InverseEnergy4);
impl_mul!(InverseEnergy2 * InverseEnergy2 => InverseEnergy4, same);

impl_mul!(Energy * InverseEnergy2 => InverseEnergy);
impl_mul!(Energy * InverseEnergy3 => InverseEnergy2);
impl_mul!(Energy * InverseEnergy4 => InverseEnergy3);
impl_mul!(Energy2 * InverseEnergy3 => InverseEnergy);
impl_mul!(Energy2 * InverseEnergy4 => InverseEnergy2);
impl_mul!(Energy3 * InverseEnergy4 => InverseEnergy);

impl_cancel!(Energy * InverseEnergy);
impl_cancel!(Energy2 * InverseEnergy2);
impl_cancel!(Energy3 * InverseEnergy3);
impl_cancel!(Energy4 * InverseEnergy4);

impl_div!(InverseEnergy / InverseEnergy2 => Energy);
impl_div!(InverseEnergy2 / InverseEnergy3 => Energy);
impl_div!(InverseEnergy3 / InverseEnergy4 => Energy);
impl_div!(InverseEnergy / InverseEnergy3 => Energy2);
impl_div!(Energy / Energy2 => InverseEnergy);
impl_div!(Energy2 / Energy3 => InverseEnergy);
impl_div!(Energy2 / Energy => Energy);
impl_div!(Energy3 / Energy => Energy2);
impl_div!(Energy3 / Energy2 => Energy);
impl_div!(Energy4 / Energy2 => Energy2);
impl_div!(InverseEnergy3 / InverseEnergy => InverseEnergy2);
impl_div!(InverseEnergy3 / InverseEnergy2 => InverseEnergy);
impl_div!(InverseEnergy4 / InverseEnergy => InverseEnergy3);
impl_div!(InverseEnergy4 / InverseEnergy3 => InverseEnergy);

impl_recip!(Energy => InverseEnergy);
impl_recip!(Energy2 => InverseEnergy2);
impl_recip!(Energy3 => InverseEnergy3);
impl_recip!(InverseEnergy => Energy);
impl_recip!(InverseEnergy2 => Energy2);
impl_recip!(InverseEnergy3 => Energy3);

// Mpc is the fundamental unit.
pub const MPC: InverseEnergy = InverseEnergy::new(1.0);
pub const MPC2: InverseEnergy2 = InverseEnergy2::new(1.0);
pub const MPC3: InverseEnergy3 = InverseEnergy3::new(1.0);
pub const MPC4: InverseEnergy4 = InverseEnergy4::new(1.0);

pub const METRE: InverseEnergy = InverseEnergy::new(1.0 / 3.08567758E22);
pub const KILOMETRE: InverseEnergy = InverseEnergy::new(1000.0 / 3.08567758E22);

pub const SQRT_NEWTON_G: InverseEnergy = InverseEnergy::new(1.616199E-35 * (1.0 / 3.08567758E22));

pub const KILOGRAM: Energy = Energy::new(1.0 / (2.17651E-8 * SQRT_NEWTON_G.raw()));
pub const SECOND: InverseEnergy = InverseEnergy::new(SQRT_NEWTON_G.raw() / 5.39106E-44);
pub const KELVIN: Energy = Energy::new(1.0 / (1.416833E32 * SQRT_NEWTON_G.raw()));

// The numerical constant is sqrt(1/8pi).
pub const PLANCK_MASS: Energy = Energy::new(0.1994711402007163 / SQRT_NEWTON_G.raw());
pub const EV: Energy = Energy::new(PLANCK_MASS.raw() / 2.436E27);

pub const LIGHT_SPEED: f64 = 299792458.0 * METRE.raw() / SECOND.raw();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn products_combine_dimensions() {
        let k = Energy::new(0.1);
        let k_sq: Energy2 = k * k;
        assert_eq!(k_sq.raw(), 0.01);

        let pk = InverseEnergy3::new(1.0e4);
        let reduced: InverseEnergy2 = k * pk;
        assert_eq!(reduced.raw(), 1.0e3);
    }

    #[test]
    fn matching_dimensions_cancel() {
        let k = Energy::new(2.0);
        let s = InverseEnergy::new(0.25);
        let dimensionless: f64 = k * s;
        assert_eq!(dimensionless, 0.5);
        assert_eq!(k / Energy::new(4.0), 0.5);
    }

    #[test]
    fn reciprocal_flips_dimension() {
        let s: InverseEnergy = 1.0 / Energy::new(4.0);
        assert_eq!(s.raw(), 0.25);
        let k: Energy = 1.0 / MPC;
        assert_eq!(k.raw(), 1.0);
    }

    #[test]
    fn unit_constants_are_consistent() {
        assert!((MPC2.raw() - (MPC * MPC).raw()).abs() < f64::EPSILON);
        assert!((KILOMETRE / METRE - 1000.0).abs() < 1e-9);
        // c = 1 in natural units, up to the precision of the SI inputs.
        assert!((LIGHT_SPEED - 1.0).abs() < 1e-3);
    }
}
