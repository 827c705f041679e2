//! The XNL frame codec: length-prefixed, big-endian, addressed frames.
//!
//! ```text
//! u16  total_len   (everything below, not including itself)
//! u16  dest_addr
//! u16  src_addr
//! u16  opcode
//! u16  transaction_id
//! u16  payload_len
//! ..   payload
//! ```

use crate::error::Error;

pub const HEADER_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XnlFrame {
    pub dest_addr: u16,
    pub src_addr: u16,
    pub opcode: u16,
    pub transaction_id: u16,
    pub payload: Vec<u8>,
}

impl XnlFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + HEADER_LEN + self.payload.len());
        let total_len = (HEADER_LEN + self.payload.len()) as u16;
        out.extend_from_slice(&total_len.to_be_bytes());
        out.extend_from_slice(&self.dest_addr.to_be_bytes());
        out.extend_from_slice(&self.src_addr.to_be_bytes());
        out.extend_from_slice(&self.opcode.to_be_bytes());
        out.extend_from_slice(&self.transaction_id.to_be_bytes());
        out.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decodes a frame whose length prefix has already been read and whose body (`total_len`
    /// bytes) is given in full.
    pub fn decode_body(body: &[u8]) -> Result<Self, Error> {
        if body.len() < HEADER_LEN {
            return Err(Error::Corrupted("XNL frame shorter than its header".to_string()));
        }
        let dest_addr = u16::from_be_bytes([body[0], body[1]]);
        let src_addr = u16::from_be_bytes([body[2], body[3]]);
        let opcode = u16::from_be_bytes([body[4], body[5]]);
        let transaction_id = u16::from_be_bytes([body[6], body[7]]);
        let payload_len = u16::from_be_bytes([body[8], body[9]]) as usize;
        let payload = body
            .get(HEADER_LEN..HEADER_LEN + payload_len)
            .ok_or_else(|| Error::Corrupted("XNL payload_len exceeds frame body".to_string()))?
            .to_vec();
        Ok(XnlFrame { dest_addr, src_addr, opcode, transaction_id, payload })
    }

    /// The `total_len` this frame would declare, i.e. how many bytes to read after the u16 length
    /// prefix.
    pub fn wire_len(&self) -> u16 {
        (HEADER_LEN + self.payload.len()) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let frame = XnlFrame {
            dest_addr: 0x1234,
            src_addr: 0x0001,
            opcode: 0x0009,
            transaction_id: 42,
            payload: vec![1, 2, 3, 4, 5],
        };
        let wire = frame.encode();
        let total_len = u16::from_be_bytes([wire[0], wire[1]]) as usize;
        assert_eq!(total_len, wire.len() - 2);
        let decoded = XnlFrame::decode_body(&wire[2..]).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn truncated_body_is_corrupted() {
        assert!(XnlFrame::decode_body(&[0, 0, 0]).is_err());
    }

    #[test]
    fn payload_len_past_body_end_is_corrupted() {
        let mut wire = XnlFrame {
            dest_addr: 0,
            src_addr: 0,
            opcode: 0,
            transaction_id: 0,
            payload: vec![1, 2],
        }
        .encode();
        // Lie about the payload length without actually including the extra byte.
        let last = wire.len();
        wire[last - 3] = 0xff;
        assert!(XnlFrame::decode_body(&wire[2..]).is_err());
    }
}
