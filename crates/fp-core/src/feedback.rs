//! Feedback score channel.
//!
//! A tiny localhost TCP service the exploration agent polls for the
//! session's current artifact score. Protocol: the client sends the
//! literal bytes `GET`, the server replies with the score rendered as
//! ASCII decimal and closes. Anything else gets an empty reply.
//!
//! The score itself lives in an [`AtomicI64`] shared with the session
//! loop; the server thread never computes anything.

use fp_common::feedback::{FEEDBACK_HOST, FEEDBACK_REQUEST};
use fp_common::Error;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Shared, monotonically updated session score.
#[derive(Debug, Default)]
pub struct ScoreBoard {
    score: AtomicI64,
}

impl ScoreBoard {
    pub fn publish(&self, score: i64) {
        self.score.store(score, Ordering::SeqCst);
    }

    pub fn current(&self) -> i64 {
        self.score.load(Ordering::SeqCst)
    }
}

/// Localhost TCP server for the agent's score polls.
pub struct FeedbackServer {
    board: Arc<ScoreBoard>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    port: u16,
}

impl FeedbackServer {
    /// Bind the listener and start the accept thread.
    pub fn start(port: u16, board: Arc<ScoreBoard>) -> Result<Self, Error> {
        let listener = TcpListener::bind((FEEDBACK_HOST, port))
            .map_err(|e| Error::SessionAborted(format!("feedback bind {}:{}: {}", FEEDBACK_HOST, port, e)))?;
        // Nonblocking so shutdown does not hang in accept()
        listener
            .set_nonblocking(true)
            .map_err(|e| Error::SessionAborted(format!("feedback listener setup: {}", e)))?;

        let running = Arc::new(AtomicBool::new(true));
        let thread = {
            let board = Arc::clone(&board);
            let running = Arc::clone(&running);
            std::thread::Builder::new()
                .name("fp-feedback".to_string())
                .spawn(move || accept_loop(listener, &board, &running))
                .map_err(|e| Error::SessionAborted(format!("feedback thread spawn: {}", e)))?
        };

        info!(port, "feedback channel listening");
        Ok(FeedbackServer {
            board,
            running,
            thread: Some(thread),
            port,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn board(&self) -> &ScoreBoard {
        &self.board
    }

    /// Stop accepting and join the server thread. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FeedbackServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: TcpListener, board: &ScoreBoard, running: &AtomicBool) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                trace!(%peer, "feedback connection");
                if let Err(e) = serve_one(stream, board) {
                    debug!(error = %e, "feedback request failed");
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                warn!(error = %e, "feedback accept error");
                std::thread::sleep(Duration::from_millis(100));
            }
        }
    }
    debug!("feedback channel stopped");
}

/// Handle one poll: read the request, answer with the current score.
fn serve_one(mut stream: TcpStream, board: &ScoreBoard) -> std::io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_millis(500)))?;
    stream.set_write_timeout(Some(Duration::from_millis(500)))?;

    let mut buf = [0u8; 16];
    let n = stream.read(&mut buf)?;
    if &buf[..n] == FEEDBACK_REQUEST {
        stream.write_all(board.current().to_string().as_bytes())?;
    } else {
        // Unknown request: empty reply, let the client time out cheaply
        stream.write_all(b"")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream;

    fn poll(port: u16) -> String {
        let mut stream =
            TcpStream::connect((FEEDBACK_HOST, port)).expect("connect to feedback server");
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .expect("timeout");
        stream.write_all(FEEDBACK_REQUEST).expect("send request");
        let mut reply = String::new();
        stream.read_to_string(&mut reply).expect("read reply");
        reply
    }

    fn start_on_free_port(board: Arc<ScoreBoard>) -> FeedbackServer {
        // Race against other tests is tolerable: retry a few ports
        for port in 41337..41347 {
            if let Ok(server) = FeedbackServer::start(port, Arc::clone(&board)) {
                return server;
            }
        }
        panic!("no free port for feedback test");
    }

    #[test]
    fn test_serves_current_score() {
        let board = Arc::new(ScoreBoard::default());
        board.publish(42);
        let server = start_on_free_port(Arc::clone(&board));
        assert_eq!(poll(server.port()), "42");

        board.publish(-7);
        assert_eq!(poll(server.port()), "-7");
    }

    #[test]
    fn test_unknown_request_gets_empty_reply() {
        let board = Arc::new(ScoreBoard::default());
        let server = start_on_free_port(board);
        let mut stream =
            TcpStream::connect((FEEDBACK_HOST, server.port())).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .expect("timeout");
        stream.write_all(b"HELLO").expect("send");
        let mut reply = String::new();
        stream.read_to_string(&mut reply).expect("read");
        assert!(reply.is_empty());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let board = Arc::new(ScoreBoard::default());
        let mut server = start_on_free_port(board);
        server.stop();
        server.stop();
    }
}
