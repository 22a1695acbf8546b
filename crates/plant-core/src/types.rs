//! Core type definitions and validation errors.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the derivation core.
///
/// Empty or reversed date ranges are not errors; they produce empty output.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    /// The resample bucket width must be strictly positive.
    #[error("bucket width must be positive, got {seconds}s")]
    InvalidBucketWidth { seconds: i64 },

    /// A configuration value failed validation.
    #[error("invalid configuration: {field}: {message}")]
    InvalidConfig {
        field: &'static str,
        message: String,
    },

    /// A request parameter is out of range.
    #[error("invalid parameter {name}: {message}")]
    InvalidParameter {
        name: &'static str,
        message: String,
    },

    /// The worker pool for day fan-out could not be created.
    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),
}

/// Generates an integer ID newtype with common trait implementations.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw database key.
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the raw key.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
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

define_id!(
    /// Identifies a material (e.g. 98% sulfuric acid, hydrogen peroxide).
    MaterialId
);

define_id!(
    /// Identifies a storage vessel (tank).
    VesselId
);

define_id!(
    /// Identifies a utility meter.
    MeterId
);
