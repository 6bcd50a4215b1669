//! Entity store, motion interpolation, and the reconciliation loop for
//! the Trainwatch tracker.
//!
//! This crate owns the real-time half of the system: it turns a bursty,
//! unordered stream of position updates into per-entity state and a
//! steady sequence of render events.
//!
//! # Modules
//!
//! - [`clock`] -- Wall-clock abstraction with a manual clock for tests.
//! - [`config`] -- Configuration loading from `trainwatch-config.yaml` into
//!   strongly-typed structs.
//! - [`control`] -- Stop flag and request queue shared with the loop.
//! - [`interpolate`] -- Easing, duration clamping, and cancellable tweens.
//! - [`runner`] -- The async loop multiplexing ticks, frames, and input.
//! - [`store`] -- [`EntityStore`] and per-entity [`EntityState`].
//! - [`tick`] -- [`ReconciliationEngine`]: buffering, apply, and sweep.
//! - [`trail`] -- Bounded, downsampled trails.
//!
//! [`EntityStore`]: store::EntityStore
//! [`EntityState`]: store::EntityState
//! [`ReconciliationEngine`]: tick::ReconciliationEngine

pub mod clock;
pub mod config;
pub mod control;
pub mod interpolate;
pub mod runner;
pub mod store;
pub mod tick;
pub mod trail;
