//! Transport: the duplex byte pipe underneath a programming session.
//!
//! [`Transport`] is the seam every higher layer (XNL framing, the programming procedure) is
//! written against; [`serial::SerialTransport`] and [`net::NetTransport`] are the two real
//! implementations, and [`mock::MockTransport`] stands in for both in tests.

pub mod mock;
pub mod net;
pub mod serial;

use std::time::Duration;

use crate::error::Error;

/// Default read timeout for a serial line, per §6.
pub const SERIAL_READ_TIMEOUT: Duration = Duration::from_secs(1);
/// Default radio IP, used by network transport and discovery alike.
pub const DEFAULT_RADIO_IP: &str = "192.168.10.1";
/// XNL command port on the network bridge.
pub const XNL_PORT: u16 = 8002;
/// AT debug line-protocol port, diagnostic only.
pub const AT_DEBUG_PORT: u16 = 8501;

/// A connected-or-not duplex byte channel to a radio.
///
/// Implementations retry partial sends until the full buffer is written, and accumulate partial
/// reads until either the requested length arrives or `timeout` elapses.
pub trait Transport: Send {
    fn connect(&mut self) -> Result<(), Error>;
    fn disconnect(&mut self) -> Result<(), Error>;
    fn is_connected(&self) -> bool;

    /// Writes the entire buffer, retrying on partial writes and `Interrupted` errors.
    fn send(&mut self, bytes: &[u8]) -> Result<(), Error>;

    /// Reads exactly `n` bytes, blocking with a 10 ms back-off between attempts until `timeout`
    /// elapses. Returns `Error::Timeout` if `n` bytes did not arrive in time.
    fn receive(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>, Error>;

    /// Convenience for request/reply protocols: sends `bytes`, then waits for exactly
    /// `response_len` bytes.
    fn send_command(&mut self, bytes: &[u8], response_len: usize, timeout: Duration) -> Result<Vec<u8>, Error> {
        self.send(bytes)?;
        self.receive(response_len, timeout)
    }
}

/// Blocking back-off step between partial-read attempts, shared by every real transport.
pub(crate) const POLL_BACKOFF: Duration = Duration::from_millis(10);
