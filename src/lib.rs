#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # fluxer
//!
//! Command-line front end for the FluxApp reconciler.
//!
//! The controller logic lives in the workspace crates:
//! - [`fluxer_core`] for configuration
//! - [`fluxer_api`] for the resource model
//! - [`fluxer_reconciler`] for the chain itself

pub use fluxer_api;
pub use fluxer_core;
pub use fluxer_reconciler;

pub mod cli;
pub mod commands;
pub mod manifest;
