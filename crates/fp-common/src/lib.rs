//! Shared types for the footprint artifact-discovery toolkit.
//!
//! This crate holds the vocabulary common to the controller (`fp-core`) and
//! the exploration agent (`fp-agent`):
//! - The unified error taxonomy
//! - Run/session identifiers
//! - Filesystem syscall events and the interest filter applied to them
//! - The feedback wire-protocol constants

pub mod error;
pub mod event;
pub mod feedback;
pub mod id;

pub use error::{format_error_human, Error, ErrorCategory, Result};
pub use event::{FileEvent, InterestFilter, SyscallKind};
pub use id::{generate_run_id, session_dir_name};
