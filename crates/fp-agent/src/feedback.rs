//! Feedback channel client.
//!
//! Polls the controller's score service. The RL loop must stay live
//! even when the channel is down, so every failure mode collapses to
//! `(0, false)` and short timeouts bound the stall.

use fp_common::feedback::{FEEDBACK_HOST, FEEDBACK_PORT, FEEDBACK_PORT_ENV, FEEDBACK_REQUEST, FEEDBACK_TIMEOUT};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use tracing::{debug, trace};

/// Client handle for the controller's score channel.
#[derive(Debug, Clone)]
pub struct FeedbackClient {
    addr: SocketAddr,
}

impl FeedbackClient {
    pub fn new(port: u16) -> Self {
        let addr = format!("{}:{}", FEEDBACK_HOST, port)
            .parse()
            .expect("loopback address is always valid");
        FeedbackClient { addr }
    }

    /// Port from `FOOTPRINT_FEEDBACK_PORT`, falling back to the default.
    pub fn from_env() -> Self {
        let port = std::env::var(FEEDBACK_PORT_ENV)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(FEEDBACK_PORT);
        Self::new(port)
    }

    /// One poll: `(score, true)` on success, `(0, false)` on any
    /// failure (connect refused, timeout, garbled reply).
    pub fn poll(&self) -> (i64, bool) {
        match self.poll_inner() {
            Ok(score) => {
                trace!(score, "feedback poll ok");
                (score, true)
            }
            Err(e) => {
                debug!(error = %e, "feedback poll failed");
                (0, false)
            }
        }
    }

    fn poll_inner(&self) -> std::io::Result<i64> {
        let mut stream = TcpStream::connect_timeout(&self.addr, FEEDBACK_TIMEOUT)?;
        stream.set_read_timeout(Some(FEEDBACK_TIMEOUT))?;
        stream.set_write_timeout(Some(FEEDBACK_TIMEOUT))?;
        stream.write_all(FEEDBACK_REQUEST)?;

        let mut reply = String::new();
        stream.read_to_string(&mut reply)?;
        reply.trim().parse().map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("non-numeric score reply: {:?}", reply),
            )
        })
    }
}
