//! Feedback wire-protocol constants.
//!
//! The controller publishes a single integer score over a loopback TCP
//! socket; the agent polls it. Request is a fixed ASCII token, response is
//! the score as decimal text, framing is connection close. Only the latest
//! value is meaningful; there is no history and no fan-out.

use std::time::Duration;

/// Loopback host both sides bind/connect to.
pub const FEEDBACK_HOST: &str = "127.0.0.1";

/// Default feedback port (single-tenant per host).
pub const FEEDBACK_PORT: u16 = 13337;

/// Fixed request token sent by the reader.
pub const FEEDBACK_REQUEST: &[u8] = b"GET";

/// Aggressive client-side timeout; the RL loop must stay live even when
/// the channel is down.
pub const FEEDBACK_TIMEOUT: Duration = Duration::from_millis(500);

/// Environment variable overriding the feedback port for the agent.
pub const FEEDBACK_PORT_ENV: &str = "FOOTPRINT_FEEDBACK_PORT";
