#![no_std]

// Shared logic for the spike-to-muscle bridge.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library and exposing abstractions the other crates can adopt.

pub mod bridge;
pub mod clock;
pub mod command;
pub mod link;
pub mod muscle;
pub mod telemetry;
pub mod waveform;
