//! Opaque identifiers for rows of the persistent store.
//!
//! Tokens are the currency used when talking to the data manager: every
//! persisted result references its input configurations by token, never
//! by owning handle, which keeps the entity graph acyclic. Two tokens of
//! the same kind compare equal exactly when their identifiers do.

use std::fmt;

macro_rules! token_type {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub const fn new(id: u32) -> Self {
                Self(id)
            }

            #[inline]
            pub const fn id(self) -> u32 {
                self.0
            }
        }

        impl From<u32> for $name {
            fn from(id: u32) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

token_type!(
    /// An FRW background model.
    ModelToken
);
token_type!(
    /// A redshift configuration.
    ZToken
);
token_type!(
    /// A generic wavenumber configuration.
    KToken
);
token_type!(
    /// An ultraviolet cutoff on the loop momentum.
    UvToken
);
token_type!(
    /// An infrared cutoff on the loop momentum.
    IrToken
);
token_type!(
    /// An infrared resummation scale.
    IrResumToken
);
token_type!(
    /// A registered linear power spectrum, identified by content hash.
    LinearPkToken
);
token_type!(FilterParamsToken);
token_type!(GrowthParamsToken);
token_type!(LoopParamsToken);
token_type!(XyParamsToken);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_compare_by_identifier() {
        assert_eq!(KToken::new(3), KToken::new(3));
        assert_ne!(KToken::new(3), KToken::new(4));
        assert!(ZToken::new(1) < ZToken::new(2));
    }
}
