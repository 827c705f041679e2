//! XCMP: the request/reply command layer riding inside XNL [`crate::xnl::OP_DATA`] frames.
//!
//! Every XCMP request is `{opcode(u16 BE), body}`; every reply is `{status(u8), body}`, where a
//! non-zero status is a NACK whose body is an ASCII error message. [`XcmpClient`] turns that into
//! `Result<Vec<u8>, Error>` once, at [`XcmpClient::call`], so every typed accessor below just
//! serializes a request and parses a reply.

use std::time::Duration;

use crate::error::Error;
use crate::transforms::VersionTripletTransform;
use crate::xnl::{XnlSession, OP_DATA};

const OP_IDENTIFY: u16 = 0x0001;
const OP_PSDT: u16 = 0x0002;
const OP_SESSION_START: u16 = 0x0003;
const OP_SESSION_RESET: u16 = 0x0004;
const OP_BLOCK_READ: u16 = 0x0005;
const OP_BLOCK_WRITE: u16 = 0x0006;
const OP_CHANNEL_READ: u16 = 0x0007;

const CHANNEL_SUB_NAME: u8 = 0x01;
const CHANNEL_SUB_RX_FREQ: u8 = 0x02;
const CHANNEL_SUB_TX_FREQ: u8 = 0x03;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Read,
    Write,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifyInfo {
    pub model_name: String,
    pub serial: String,
    pub radio_id: u32,
    pub firmware_version: String,
    pub family: String,
}

pub struct XcmpClient<'a> {
    session: &'a mut XnlSession,
}

impl<'a> XcmpClient<'a> {
    pub fn new(session: &'a mut XnlSession) -> Self {
        XcmpClient { session }
    }

    pub fn identify(&mut self) -> Result<IdentifyInfo, Error> {
        let body = self.call(OP_IDENTIFY, &[])?;
        let mut cursor = Cursor::new(&body);
        let model_name = cursor.take_pstring()?;
        let serial = cursor.take_pstring()?;
        let radio_id = cursor.take_u32()?;
        let firmware_bytes = cursor.take_bytes(3)?;
        let firmware_version =
            VersionTripletTransform::to_display([firmware_bytes[0], firmware_bytes[1], firmware_bytes[2]]);
        let family = cursor.take_pstring()?;
        Ok(IdentifyInfo { model_name, serial, radio_id, firmware_version, family })
    }

    /// Queries the named partition's address range, e.g. `"CP"` for the codeplug.
    pub fn psdt(&mut self, partition: &str) -> Result<(u32, u32), Error> {
        let mut req = vec![partition.len() as u8];
        req.extend_from_slice(partition.as_bytes());
        let body = self.call(OP_PSDT, &req)?;
        let mut cursor = Cursor::new(&body);
        Ok((cursor.take_u32()?, cursor.take_u32()?))
    }

    pub fn session_start(&mut self, kind: SessionKind, session_id: u16) -> Result<(), Error> {
        let kind_byte = match kind {
            SessionKind::Read => 0u8,
            SessionKind::Write => 1u8,
        };
        let mut req = vec![kind_byte];
        req.extend_from_slice(&session_id.to_be_bytes());
        self.call(OP_SESSION_START, &req).map(drop)
    }

    pub fn session_reset(&mut self) -> Result<(), Error> {
        self.call(OP_SESSION_RESET, &[]).map(drop)
    }

    pub fn block_read(&mut self, addr: u32, len: u16) -> Result<Vec<u8>, Error> {
        let mut req = Vec::with_capacity(6);
        req.extend_from_slice(&addr.to_be_bytes());
        req.extend_from_slice(&len.to_be_bytes());
        let body = self.call(OP_BLOCK_READ, &req)?;
        if body.len() != len as usize {
            return Err(Error::XcmpError {
                opcode: OP_BLOCK_READ,
                code: 0,
                message: format!("expected {} bytes, radio returned {}", len, body.len()),
            });
        }
        Ok(body)
    }

    pub fn block_write(&mut self, addr: u32, data: &[u8]) -> Result<(), Error> {
        let mut req = Vec::with_capacity(6 + data.len());
        req.extend_from_slice(&addr.to_be_bytes());
        req.extend_from_slice(&(data.len() as u16).to_be_bytes());
        req.extend_from_slice(data);
        self.call(OP_BLOCK_WRITE, &req).map(drop)
    }

    pub fn read_channel_name(&mut self, zone: u16, channel: u16) -> Result<String, Error> {
        let body = self.channel_read(CHANNEL_SUB_NAME, zone, channel)?;
        Cursor::new(&body).take_pstring()
    }

    pub fn read_channel_rx_freq(&mut self, zone: u16, channel: u16) -> Result<u32, Error> {
        let body = self.channel_read(CHANNEL_SUB_RX_FREQ, zone, channel)?;
        Cursor::new(&body).take_u32()
    }

    pub fn read_channel_tx_freq(&mut self, zone: u16, channel: u16) -> Result<u32, Error> {
        let body = self.channel_read(CHANNEL_SUB_TX_FREQ, zone, channel)?;
        Cursor::new(&body).take_u32()
    }

    fn channel_read(&mut self, sub: u8, zone: u16, channel: u16) -> Result<Vec<u8>, Error> {
        let mut req = vec![sub];
        req.extend_from_slice(&zone.to_be_bytes());
        req.extend_from_slice(&channel.to_be_bytes());
        self.call(OP_CHANNEL_READ, &req)
    }

    /// Sends one XCMP request and returns its ACK body, retrying exactly once on timeout. A NACK
    /// (non-zero status byte) becomes `Error::XcmpError`.
    fn call(&mut self, opcode: u16, body: &[u8]) -> Result<Vec<u8>, Error> {
        let mut payload = Vec::with_capacity(2 + body.len());
        payload.extend_from_slice(&opcode.to_be_bytes());
        payload.extend_from_slice(body);

        let reply = match self.session.request(OP_DATA, &payload, REQUEST_TIMEOUT) {
            Ok(frame) => frame,
            Err(Error::Timeout(d)) => {
                log::warn!("xcmp: opcode {:#06x} timed out, retrying once", opcode);
                self.session
                    .request(OP_DATA, &payload, REQUEST_TIMEOUT)
                    .map_err(|_| Error::Timeout(d))?
            }
            Err(e) => return Err(e),
        };

        let status = *reply.payload.first().ok_or_else(|| Error::XcmpError {
            opcode,
            code: 0xff,
            message: "empty reply".to_string(),
        })?;
        if status != 0 {
            let message = String::from_utf8_lossy(&reply.payload[1..]).into_owned();
            return Err(Error::XcmpError { opcode, code: status, message });
        }
        Ok(reply.payload[1..].to_vec())
    }
}

/// A minimal forward-only byte cursor for parsing XCMP reply bodies.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Cursor { buf, pos: 0 }
    }

    fn take_bytes(&mut self, n: usize) -> Result<&'a [u8], Error> {
        let slice = self
            .buf
            .get(self.pos..self.pos + n)
            .ok_or_else(|| Error::Corrupted("XCMP reply body truncated".to_string()))?;
        self.pos += n;
        Ok(slice)
    }

    fn take_u32(&mut self) -> Result<u32, Error> {
        let b = self.take_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// A length-prefixed (one byte) ASCII/UTF-8 string.
    fn take_pstring(&mut self) -> Result<String, Error> {
        let len = self.take_bytes(1)?[0] as usize;
        let bytes = self.take_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::Corrupted("XCMP string field is not valid UTF-8".to_string()))
    }
}
