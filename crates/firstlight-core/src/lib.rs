//! firstlight-core library.
//!
//! Turns per-product review events into a labeled launch cohort: each
//! product is anchored at its first review, counted over an early signal
//! window and a forward outcome window, judged against the dataset horizon,
//! and kept only if it is both eligible and fully observable. The kept set
//! filters the review and metadata datasets consistently.
//!
//! Stage order: [`event`] → [`anchor`] → [`window`] → [`horizon`] →
//! [`cohort`] → [`keep`] → [`verify`] → [`sink`]. [`pipeline`] wires them
//! together.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums per stage, each mapping to an
//!   [`error::ErrorCode`].
//! - **Logging**: `tracing` macros (`info!` per stage, `warn!` for advisory
//!   findings, `debug!` for detail).

pub mod anchor;
pub mod cohort;
pub mod config;
pub mod error;
pub mod event;
pub mod horizon;
pub mod keep;
pub mod manifest;
pub mod pipeline;
pub mod sink;
pub mod stats;
pub mod timing;
pub mod verify;
pub mod window;
