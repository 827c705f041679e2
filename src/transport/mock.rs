//! An in-memory transport backed by a responder closure, standing in for a real radio in tests.
//!
//! Every `send` is handed to `responder`, whose return value is appended to an internal byte
//! queue that subsequent `receive` calls drain — so the mock behaves like a real stream transport
//! (including partial reads across several `receive` calls) without opening a socket or port.

use std::collections::VecDeque;
use std::time::Duration;

use super::Transport;
use crate::error::Error;

pub struct MockTransport {
    connected: bool,
    responder: Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>,
    inbound: VecDeque<u8>,
}

impl MockTransport {
    pub fn new(responder: impl FnMut(&[u8]) -> Vec<u8> + Send + 'static) -> Self {
        MockTransport { connected: false, responder: Box::new(responder), inbound: VecDeque::new() }
    }
}

impl Transport for MockTransport {
    fn connect(&mut self) -> Result<(), Error> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), Error> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if !self.connected {
            return Err(Error::TransportError(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "not connected",
            )));
        }
        let reply = (self.responder)(bytes);
        self.inbound.extend(reply);
        Ok(())
    }

    fn receive(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>, Error> {
        if self.inbound.len() < n {
            return Err(Error::Timeout(timeout));
        }
        Ok(self.inbound.drain(..n).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echoes_through_responder() {
        let mut t = MockTransport::new(|req| req.to_vec());
        t.connect().unwrap();
        t.send(b"hello").unwrap();
        let reply = t.receive(5, Duration::from_millis(10)).unwrap();
        assert_eq!(reply, b"hello");
    }

    #[test]
    fn receive_without_enough_buffered_bytes_times_out() {
        let mut t = MockTransport::new(|_| Vec::new());
        t.connect().unwrap();
        t.send(b"x").unwrap();
        assert!(matches!(t.receive(10, Duration::from_millis(1)), Err(Error::Timeout(_))));
    }

    #[test]
    fn send_before_connect_is_rejected() {
        let mut t = MockTransport::new(|req| req.to_vec());
        assert!(t.send(b"x").is_err());
    }
}
