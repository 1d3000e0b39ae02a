//! Airbrake avionics core: fusion engine, flight-controller state machine,
//! telemetry aggregator, servo controller, and the ambient concurrency,
//! configuration and monitoring-link plumbing around them.
//!
//! `no_std` on target; built with `std` under `cfg(test)` so the pure
//! `tick()` functions in [`fusion`], [`fc`], [`telemetry`] and [`servo`] can
//! run under the host test harness, same as `drivers::roll::RollController`
//! and `drivers::filter::BiquadFilter` are plain, dependency-free structs
//! callable outside the async tasks.
#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod fc;
pub mod fusion;
pub mod monitor;
pub mod sensors;
pub mod servo;
pub mod sync;
pub mod telemetry;
pub mod types;
