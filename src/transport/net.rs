//! TCP transport to a network-bridged radio.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use super::{Transport, POLL_BACKOFF};
use crate::error::Error;

pub struct NetTransport {
    host: String,
    port: u16,
    stream: Option<TcpStream>,
}

impl NetTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        NetTransport { host: host.into(), port, stream: None }
    }
}

impl Transport for NetTransport {
    fn connect(&mut self) -> Result<(), Error> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))?;
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        log::info!("net: connected to {}:{}", self.host, self.port);
        self.stream = Some(stream);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), Error> {
        if self.stream.take().is_some() {
            log::info!("net: disconnected from {}:{}", self.host, self.port);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let stream = self.stream.as_mut().ok_or_else(|| {
            Error::TransportError(std::io::Error::new(std::io::ErrorKind::NotConnected, "not connected"))
        })?;
        let mut written = 0;
        while written < bytes.len() {
            match stream.write(&bytes[written..]) {
                Ok(0) => {
                    return Err(Error::TransportError(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "connection accepted zero bytes",
                    )))
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(POLL_BACKOFF);
                }
                Err(e) => return Err(Error::TransportError(e)),
            }
        }
        Ok(())
    }

    fn receive(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>, Error> {
        let stream = self.stream.as_mut().ok_or_else(|| {
            Error::TransportError(std::io::Error::new(std::io::ErrorKind::NotConnected, "not connected"))
        })?;
        let deadline = Instant::now() + timeout;
        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            match stream.read(&mut buf[filled..]) {
                Ok(0) => {}
                Ok(read) => filled += read,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(Error::TransportError(e)),
            }
            if filled < n {
                if Instant::now() >= deadline {
                    return Err(Error::Timeout(timeout));
                }
                std::thread::sleep(POLL_BACKOFF);
            }
        }
        Ok(buf)
    }
}
