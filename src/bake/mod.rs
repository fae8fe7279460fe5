//! Progressive per-vertex light baking.
//!
//! Per `tick()` the call chain is
//! [`Engine`] → [`BounceController`] → [`BatchScheduler`] → [`Sampler`] →
//! [`Accumulator`].

mod accumulator;
mod config;
mod controller;
mod engine;
mod sampler;
mod scheduler;

pub use accumulator::Accumulator;
pub use config::{BakeConfig, MAX_SAMPLE_RESOLUTION};
pub use controller::{BounceController, BounceState, Phase, Tick, TickReport};
pub use engine::{BakeStats, DirtyRange, Engine};
pub use sampler::{RenderSampler, SampleCamera, Sampler};
pub use scheduler::{validate_target, BakeTarget, BatchOutcome, BatchReport, BatchScheduler};
