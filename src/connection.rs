//! Connection: per-link state owned only by locally-attached entities (§4.3, I3).
//!
//! `MsgBuf` is realized as [`bytes::Bytes`] (§4.3 "Rust realization"): an
//! already-refcounted immutable byte blob with cheap `.slice()`, which gives
//! the (offset, remaining) drain cursor for free instead of a hand-rolled
//! cursor type.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Instant;

use bytes::{Bytes, BytesMut};

bitflags::bitflags! {
    /// What this connection still must supply before leaving Unregistered (§3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HandshakeNeeds: u8 {
        const NICK     = 1 << 0;
        const USER     = 1 << 1;
        const PASS     = 1 << 2;
        const CAP_END  = 1 << 3;
        const AUTH     = 1 << 4;
    }
}

const MAX_LINE_LEN: usize = 512;

/// A single per-link connection: receive dbuffer plus priority/normal output
/// queues (§4.3).
pub struct Connection {
    pub peer_addr: SocketAddr,
    recv_buf: BytesMut,
    priority_queue: VecDeque<Bytes>,
    normal_queue: VecDeque<Bytes>,
    queued_bytes: usize,
    pub sendq_limit: usize,
    pub handshake_needs: HandshakeNeeds,
    pub last_activity: Instant,
    pub registration_started: Instant,
    /// Set by the send engine on sendq overflow; never acted on mid-fanout
    /// (§5 "mark dead, reap post-tick").
    pub dead: Option<String>,
}

impl Connection {
    pub fn new(peer_addr: SocketAddr, sendq_limit: usize) -> Self {
        let now = Instant::now();
        Self {
            peer_addr,
            recv_buf: BytesMut::with_capacity(1024),
            priority_queue: VecDeque::new(),
            normal_queue: VecDeque::new(),
            queued_bytes: 0,
            sendq_limit,
            handshake_needs: HandshakeNeeds::NICK | HandshakeNeeds::USER,
            last_activity: now,
            registration_started: now,
            dead: None,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.dead.is_some()
    }

    pub fn mark_dead(&mut self, reason: impl Into<String>) {
        if self.dead.is_none() {
            self.dead = Some(reason.into());
        }
    }

    /// Append freshly-read bytes to the receive buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.recv_buf.extend_from_slice(bytes);
        self.last_activity = Instant::now();
    }

    /// Parse one CRLF-terminated line off the receive buffer (§4.3
    /// `consume_line`). Lines over 512 bytes including CRLF are rejected by
    /// marking the connection dead rather than silently desyncing the stream.
    pub fn consume_line(&mut self) -> Option<Result<Bytes, &'static str>> {
        let pos = self.recv_buf.windows(2).position(|w| w == b"\r\n")?;
        if pos + 2 > MAX_LINE_LEN {
            self.recv_buf.clear();
            return Some(Err("line exceeds 512 bytes"));
        }
        let line = self.recv_buf.split_to(pos);
        let _ = self.recv_buf.split_to(2); // drop CRLF
        Some(Ok(line.freeze()))
    }

    /// Enqueue `msg` on the priority or normal queue (§4.5 `send_prio_to_one`
    /// vs `send_to_one`). Marks dead on sendq overflow instead of returning
    /// an error — delivery failures never propagate as `Result` (§7).
    pub fn enqueue(&mut self, msg: Bytes, priority: bool) {
        if self.is_dead() {
            return;
        }
        self.queued_bytes += msg.len();
        if priority {
            self.priority_queue.push_back(msg);
        } else {
            self.normal_queue.push_back(msg);
        }
        if self.queued_bytes > self.sendq_limit {
            self.mark_dead("SendQ exceeded");
        }
    }

    /// Write up to `writable_budget` bytes, priority queue first (P5).
    /// Returns (bytes written, queues now empty).
    pub fn drain(&mut self, mut writable_budget: usize) -> (usize, bool) {
        let mut written = 0;
        for queue in [&mut self.priority_queue, &mut self.normal_queue] {
            while writable_budget > 0 {
                let Some(front) = queue.front_mut() else {
                    break;
                };
                if front.len() <= writable_budget {
                    let chunk = queue.pop_front().unwrap();
                    writable_budget -= chunk.len();
                    self.queued_bytes -= chunk.len();
                    written += chunk.len();
                } else {
                    let taken = front.split_to(writable_budget);
                    self.queued_bytes -= taken.len();
                    written += taken.len();
                    writable_budget = 0;
                }
            }
        }
        (written, self.priority_queue.is_empty() && self.normal_queue.is_empty())
    }

    /// Pop the next chunk ready to be written to the socket, respecting
    /// priority ordering, without a byte budget (used by a writer task
    /// driven by socket readiness rather than a fixed per-tick budget).
    pub fn pop_ready(&mut self) -> Option<Bytes> {
        if let Some(chunk) = self.priority_queue.pop_front() {
            self.queued_bytes -= chunk.len();
            return Some(chunk);
        }
        let chunk = self.normal_queue.pop_front()?;
        self.queued_bytes -= chunk.len();
        Some(chunk)
    }

    pub fn has_queued(&self) -> bool {
        !self.priority_queue.is_empty() || !self.normal_queue.is_empty()
    }

    /// Idempotent: repeated calls after the first are no-ops.
    pub fn close(&mut self, reason: impl Into<String>) {
        self.mark_dead(reason);
        self.priority_queue.clear();
        self.normal_queue.clear();
        self.queued_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        Connection::new("127.0.0.1:6667".parse().unwrap(), 4096)
    }

    #[test]
    fn consume_line_splits_on_crlf() {
        let mut c = conn();
        c.feed(b"NICK alice\r\nUSER a 0 * :A\r\n");
        let l1 = c.consume_line().unwrap().unwrap();
        assert_eq!(&l1[..], b"NICK alice");
        let l2 = c.consume_line().unwrap().unwrap();
        assert_eq!(&l2[..], b"USER a 0 * :A");
        assert!(c.consume_line().is_none());
    }

    #[test]
    fn oversized_line_is_rejected() {
        let mut c = conn();
        let mut long = vec![b'a'; 511];
        long.extend_from_slice(b"\r\n");
        c.feed(&long);
        assert!(c.consume_line().unwrap().is_err());
    }

    #[test]
    fn priority_drains_before_normal() {
        let mut c = conn();
        c.enqueue(Bytes::from_static(b"normal\r\n"), false);
        c.enqueue(Bytes::from_static(b"KILL\r\n"), true);
        let (_, empty) = c.drain(1024);
        assert!(empty);
    }

    #[test]
    fn sendq_overflow_marks_dead() {
        let mut c = Connection::new("127.0.0.1:6667".parse().unwrap(), 4);
        c.enqueue(Bytes::from_static(b"too long\r\n"), false);
        assert!(c.is_dead());
    }

    #[test]
    fn close_is_idempotent() {
        let mut c = conn();
        c.enqueue(Bytes::from_static(b"hi\r\n"), false);
        c.close("bye");
        c.close("bye again");
        assert_eq!(c.dead.as_deref(), Some("bye"));
        assert!(!c.has_queued());
    }
}
