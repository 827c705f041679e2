//! XNL: the framed, authenticated, sequenced session layer carrying XCMP.
//!
//! ```text
//! CLOSED -> CONNECTING -> AUTHENTICATING -> ADDRESSED -> OPEN -> CLOSING -> CLOSED
//!                                   |
//!                                   +-> AUTH_FAILED (terminal)
//! ```
//!
//! One session owns one [`crate::transport::Transport`]; only one request is ever outstanding at
//! a time, enforced structurally by [`XnlSession::request`] taking `&mut self`.

pub mod auth;
pub mod frame;

use std::time::{Duration, Instant};

use crate::error::Error;
use crate::transport::Transport;
use frame::XnlFrame;

pub const OP_MASTER_KEY_REQUEST: u16 = 0x0002;
pub const OP_CHALLENGE: u16 = 0x0003;
pub const OP_AUTH_RESPONSE: u16 = 0x0004;
pub const OP_AUTH_ACK: u16 = 0x0005;
pub const OP_AUTH_FAILED: u16 = 0x0006;
pub const OP_PING: u16 = 0x0007;
pub const OP_CLOSE: u16 = 0x0008;
/// Opcode used for every frame that carries an XCMP request/reply payload.
pub const OP_DATA: u16 = 0x0009;

const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(5);
const KEEPALIVE_IDLE: Duration = Duration::from_secs(5);
const KEEPALIVE_DEAD: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XnlState {
    Closed,
    Connecting,
    Authenticating,
    Addressed,
    Open,
    Closing,
    AuthFailed,
}

pub struct XnlSession {
    transport: Box<dyn Transport>,
    state: XnlState,
    own_addr: u16,
    peer_addr: u16,
    next_txn: u16,
    last_sent: Instant,
    last_received: Instant,
}

impl std::fmt::Debug for XnlSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XnlSession")
            .field("state", &self.state)
            .field("own_addr", &self.own_addr)
            .field("peer_addr", &self.peer_addr)
            .field("next_txn", &self.next_txn)
            .field("last_sent", &self.last_sent)
            .field("last_received", &self.last_received)
            .finish_non_exhaustive()
    }
}

impl XnlSession {
    /// Opens the transport and drives the handshake through to `OPEN`. `family` selects the
    /// authentication transform via [`auth::respond_to_challenge`].
    pub fn open(mut transport: Box<dyn Transport>, family: &str) -> Result<Self, Error> {
        let mut session = XnlSession {
            transport: {
                transport.connect()?;
                transport
            },
            state: XnlState::Connecting,
            own_addr: 0,
            peer_addr: 0,
            next_txn: 1,
            last_sent: Instant::now(),
            last_received: Instant::now(),
        };

        log::debug!("xnl: sending master key request");
        session.state = XnlState::Authenticating;
        session.send_frame(OP_MASTER_KEY_REQUEST, &[])?;
        let challenge_frame = session.await_frame(DEFAULT_FRAME_TIMEOUT)?;
        if challenge_frame.opcode != OP_CHALLENGE || challenge_frame.payload.len() < 2 {
            return Err(Error::AuthFailed("malformed challenge frame".to_string()));
        }
        let key_id = &challenge_frame.payload[0..2];
        let challenge = &challenge_frame.payload[2..];
        let response = auth::respond_to_challenge(family, challenge)?;

        let mut payload = Vec::with_capacity(2 + response.len());
        payload.extend_from_slice(key_id);
        payload.extend_from_slice(&response);
        session.send_frame(OP_AUTH_RESPONSE, &payload)?;

        let ack = session.await_frame(DEFAULT_FRAME_TIMEOUT)?;
        match ack.opcode {
            OP_AUTH_ACK if ack.payload.len() >= 2 => {
                session.own_addr = u16::from_be_bytes([ack.payload[0], ack.payload[1]]);
                session.peer_addr = ack.src_addr;
                session.state = XnlState::Open;
                log::info!("xnl: authenticated, assigned address {:#06x}", session.own_addr);
                Ok(session)
            }
            OP_AUTH_FAILED => {
                session.state = XnlState::AuthFailed;
                Err(Error::AuthFailed("radio rejected authentication response".to_string()))
            }
            _ => {
                session.state = XnlState::AuthFailed;
                Err(Error::AuthFailed("unexpected reply to auth response".to_string()))
            }
        }
    }

    pub fn state(&self) -> XnlState {
        self.state
    }

    /// Sends one frame and waits for its reply, matched by transaction id. Only ever one request
    /// outstanding per session — `&mut self` enforces this at compile time.
    pub fn request(&mut self, opcode: u16, payload: &[u8], timeout: Duration) -> Result<XnlFrame, Error> {
        let txn = self.send_frame(opcode, payload)?;
        loop {
            let frame = self.await_frame(timeout)?;
            if frame.transaction_id == txn {
                return Ok(frame);
            }
            log::debug!("xnl: discarding frame with stale transaction id {}", frame.transaction_id);
        }
    }

    /// Sends a keep-alive ping if the session has been idle for `KEEPALIVE_IDLE`, and fails the
    /// session if no frame has arrived for `KEEPALIVE_DEAD`. Intended to be polled between
    /// programming-procedure chunks.
    pub fn tick_keepalive(&mut self) -> Result<(), Error> {
        if self.last_received.elapsed() >= KEEPALIVE_DEAD {
            return Err(Error::Timeout(KEEPALIVE_DEAD));
        }
        if self.state == XnlState::Open && self.last_sent.elapsed() >= KEEPALIVE_IDLE {
            log::trace!("xnl: sending keep-alive ping");
            self.send_frame(OP_PING, &[])?;
        }
        Ok(())
    }

    /// Sends a close frame and tears down the transport. Idempotent.
    pub fn close(&mut self) -> Result<(), Error> {
        if matches!(self.state, XnlState::Open | XnlState::Addressed) {
            self.state = XnlState::Closing;
            let _ = self.send_frame(OP_CLOSE, &[]);
        }
        self.state = XnlState::Closed;
        self.transport.disconnect()
    }

    fn send_frame(&mut self, opcode: u16, payload: &[u8]) -> Result<u16, Error> {
        let txn = self.next_txn;
        // Wraps at 2^16 but skips 0, which is reserved for unsolicited frames.
        self.next_txn = self.next_txn.wrapping_add(1).max(1);
        let frame = XnlFrame {
            dest_addr: self.peer_addr,
            src_addr: self.own_addr,
            opcode,
            transaction_id: txn,
            payload: payload.to_vec(),
        };
        self.transport.send(&frame.encode())?;
        self.last_sent = Instant::now();
        Ok(txn)
    }

    fn await_frame(&mut self, timeout: Duration) -> Result<XnlFrame, Error> {
        let len_bytes = self.transport.receive(2, timeout)?;
        let total_len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
        let body = self.transport.receive(total_len, timeout)?;
        let frame = XnlFrame::decode_body(&body)?;
        self.last_received = Instant::now();
        Ok(frame)
    }
}

impl Drop for XnlSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
