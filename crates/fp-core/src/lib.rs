//! Footprint session controller library.
//!
//! This library drives one artifact-discovery session end to end:
//! - Kernel syscall tracing via supervised bpftrace probes
//! - The feedback score channel the exploration agent polls
//! - Virtual display lifetime as a scoped resource
//! - Target/agent process supervision with crash self-healing
//! - Artifact aggregation and the session report
//!
//! The binary entry point is in `main.rs`; the exploration agent is a
//! separate binary (`footprint-agent`) launched as its own OS process.

pub mod artifact;
pub mod capabilities;
pub mod display;
pub mod exit_codes;
pub mod feedback;
pub mod logging;
pub mod session;
pub mod supervise;
pub mod target_state;
pub mod tracer;
