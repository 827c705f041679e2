//! POSIX serial transport: 115200 8N1, no flow control, raw I/O.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use super::{Transport, POLL_BACKOFF, SERIAL_READ_TIMEOUT};
use crate::error::Error;

const BAUD_RATE: u32 = 115_200;

pub struct SerialTransport {
    path: String,
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl SerialTransport {
    pub fn new(path: impl Into<String>) -> Self {
        SerialTransport { path: path.into(), port: None }
    }
}

impl Transport for SerialTransport {
    fn connect(&mut self) -> Result<(), Error> {
        let port = serialport::new(&self.path, BAUD_RATE)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(SERIAL_READ_TIMEOUT)
            .open()
            .map_err(|e| Error::TransportError(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        log::info!("serial: opened {}", self.path);
        self.port = Some(port);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), Error> {
        if self.port.take().is_some() {
            log::info!("serial: closed {}", self.path);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let port = self.port.as_mut().ok_or_else(|| {
            Error::TransportError(std::io::Error::new(std::io::ErrorKind::NotConnected, "not connected"))
        })?;
        let mut written = 0;
        while written < bytes.len() {
            match port.write(&bytes[written..]) {
                Ok(0) => {
                    return Err(Error::TransportError(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "serial port accepted zero bytes",
                    )))
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::TransportError(e)),
            }
        }
        Ok(())
    }

    fn receive(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>, Error> {
        let port = self.port.as_mut().ok_or_else(|| {
            Error::TransportError(std::io::Error::new(std::io::ErrorKind::NotConnected, "not connected"))
        })?;
        let deadline = Instant::now() + timeout;
        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            match port.read(&mut buf[filled..]) {
                Ok(0) => {}
                Ok(read) => filled += read,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
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
