//! Footprint exploration agent library.
//!
//! The agent is the other half of the closed loop: it polls the
//! controller's score channel, hashes the current UI state, and uses an
//! epsilon-greedy policy over a small action catalog to decide what to
//! do to the target next. Everything UI-facing goes through the AT-SPI
//! bridge or raw `xdotool` injection.

pub mod actions;
pub mod feedback;
pub mod knowledge;
pub mod policy;
pub mod state;
pub mod ui;
