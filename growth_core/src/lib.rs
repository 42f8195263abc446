#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Growth optimizer engine (hardware-agnostic).
//!
//! This crate drives one photobioreactor unit per `GrowthOptimizer`. All host
//! interactions go through the `growth_traits` boundary traits: accessories,
//! the OD data history, the unit context, peers and the journal.
//!
//! ## Architecture
//!
//! - **Signal averaging**: two-cycle confirm-then-average OD filter (`averager`)
//! - **Turbidostat**: pump control against an OD band (`turbidostat`)
//! - **Growth rate**: exponential fit per dilution step (`growth`)
//! - **Stability**: CI95 and trend over the latest steps (`stability`)
//! - **Parameter control**: one environmental channel per unit (`channel`)
//! - **Strategies**: zig-zag sweep (`sweep`) or distributed PSO (`pso`)
//! - **Suspension**: yields to O2 evolution measurements (`suspension`)
//! - **Orchestration**: one cycle per invocation (`optimizer`), state in `state`
//!
//! ## Time
//!
//! The only time source is the `ExperimentClock` handed to the builder,
//! in whole seconds since the experiment started.

pub mod averager;
pub mod builder;
pub mod channel;
pub mod config;
pub mod conversions;
pub mod error;
pub mod growth;
pub mod hw_error;
pub mod journal;
pub mod mocks;
pub mod optimizer;
pub mod peers;
pub mod pso;
pub mod stability;
pub mod state;
pub mod status;
pub mod suspension;
pub mod sweep;
pub mod turbidostat;
pub mod util;

pub use builder::{Missing, OptimizerBuilder, Set, from_config, from_config_as};
pub use channel::{Applied, ParameterChannel, SetPoint};
pub use config::*;
pub use error::{BuildError, OptimizerError, Report, Result};
pub use journal::{ChannelJournal, JournalEntry, TracingJournal};
pub use optimizer::{GrowthOptimizer, Strategy, UnitIo};
pub use peers::ContextBoard;
pub use state::{Phase, UnitState};
pub use status::{Invocation, PumpCommand};
pub use turbidostat::OdBand;
