//! Passive network observability agent
//!
//! Responsibilities:
//! - Load the eBPF classifier and attach it to every usable interface
//! - Drain the kernel ring buffer and decode wire events
//! - Aggregate events into a bounded per-MAC device catalogue
//! - Snapshot the catalogue to the local store every 30 seconds
//! - Fan out new-device / new-pattern notifications

pub mod aggregator;
pub mod classify;
pub mod device;
pub mod error;
pub mod event;
pub mod l7;
pub mod notify;
pub mod store;
pub mod tables;

#[cfg(target_os = "linux")]
pub mod probe_loader;
