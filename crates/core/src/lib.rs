//! Core errors and configuration shared by the fluxer crates.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod config;
pub mod error;

pub use config::{ControllerConfig, DEFAULT_FINALIZER};
pub use error::{Error, Result};
