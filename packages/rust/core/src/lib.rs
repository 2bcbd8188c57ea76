//! Core orchestration and domain logic for newsdigest.
//!
//! This crate turns a topic into search requests, waits on websets, renders
//! the report and hands it to the delivery adapters (e.g., `run_digest`).

pub mod analysis;
pub mod formatter;
pub mod monitor;
pub mod output;
pub mod pipeline;
pub mod poller;
pub mod request;
