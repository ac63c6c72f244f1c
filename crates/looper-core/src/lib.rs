//! Looper Core - real-time loop engine and its audio host
//!
//! This crate provides the building blocks of a single-track looper pedal:
//! - Lock-free loop engine (record, play, overdub, undo, reset)
//! - Overdub layer arena sized up front, never allocating on the audio thread
//! - Ramped post-engine gain stage
//! - CPAL audio host (capture stream, render graph, output stream)
//! - Async engine controller with cancellable setup and latency tracking
//! - YAML configuration

pub mod audio;
pub mod config;
pub mod controller;
pub mod engine;
pub mod types;
