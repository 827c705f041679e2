//! The programming procedure: read a codeplug from a radio, or validate-then-write one back.
//!
//! Both directions share the same opening moves — open XNL, identify, confirm the partition size
//! matches the model, start a session — and both run on the caller's thread, reporting progress
//! synchronously and checking `cancel` between chunks so a caller driving this from a worker
//! thread can abort cleanly.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;

use crate::codeplug::{Codeplug, Metadata};
use crate::error::Error;
use crate::model::RadioModel;
use crate::transport::Transport;
use crate::xcmp::{SessionKind, XcmpClient};
use crate::xnl::XnlSession;

/// Bytes fetched or pushed per XCMP block request. §4.I calls 256 B "typical".
const CHUNK_LEN: usize = 256;
/// The persistent-storage partition holding the codeplug image.
const PARTITION_CODEPLUG: &str = "CP";

/// Reads the codeplug partition off a radio, verifying it identifies as `model` first.
///
/// `progress` is called after every chunk with `bytes_done / size`, monotonically non-decreasing.
/// `cancel` is polled between chunks; if set, the read session is reset and the transport closed
/// before returning `Error::Aborted`.
pub fn read_codeplug(
    transport: Box<dyn Transport>,
    model: RadioModel,
    cancel: &AtomicBool,
    mut progress: impl FnMut(f64),
) -> Result<Codeplug, Error> {
    log::info!("program: opening read session for model {}", model.id());
    let mut session = XnlSession::open(transport, model.family())?;
    let result = (|| {
        let mut xcmp = XcmpClient::new(&mut session);
        let info = xcmp.identify()?;
        if info.model_name != model.id() {
            log::error!(
                "program: radio identified as {} but {} was expected",
                info.model_name,
                model.id()
            );
            return Err(Error::ModelMismatch {
                expected: model.id().to_string(),
                actual: info.model_name,
            });
        }

        let (start, end) = xcmp.psdt(PARTITION_CODEPLUG)?;
        let size = (end - start) as usize;
        if size != model.image_size() {
            log::error!(
                "program: partition size {} does not match model's expected {}",
                size,
                model.image_size()
            );
            return Err(Error::PartitionSizeMismatch { expected: model.image_size(), actual: size });
        }

        xcmp.session_start(SessionKind::Read, random_session_id())?;
        let buf = match read_partition(&mut xcmp, start, size, cancel, &mut progress) {
            Ok(buf) => buf,
            Err(e) => {
                log::warn!("program: read aborted ({}), resetting session", e);
                let _ = xcmp.session_reset();
                return Err(e);
            }
        };
        xcmp.session_reset()?;
        log::info!("program: read {} bytes from partition {}", buf.len(), PARTITION_CODEPLUG);

        let now = Utc::now();
        let metadata = Metadata {
            serial_number: Some(info.serial),
            model_name: Some(info.model_name),
            firmware_version: Some(info.firmware_version),
            created_date: now,
            last_modified: now,
            last_read_date: Some(now),
            notes: String::new(),
        };
        Codeplug::from_raw(model, buf, metadata)
    })();

    finish(session, result)
}

/// Validates `cp`, writes it to the radio identified as its model, then reads the partition back
/// and compares byte-for-byte.
///
/// Aborts before touching the transport if [`Codeplug::validate_for_write`] reports an error.
/// `progress` reflects the write loop only — verification runs after it reaches 1.0.
pub fn write_codeplug(
    transport: Box<dyn Transport>,
    cp: &Codeplug,
    cancel: &AtomicBool,
    mut progress: impl FnMut(f64),
) -> Result<(), Error> {
    if let Err(e) = cp.validate_for_write() {
        log::error!("program: refusing to write, validation failed: {}", e);
        return Err(e);
    }

    let model = cp.model().clone();
    log::info!("program: opening write session for model {}", model.id());
    let mut session = XnlSession::open(transport, model.family())?;
    let result = (|| {
        let mut xcmp = XcmpClient::new(&mut session);
        let info = xcmp.identify()?;
        if info.model_name != model.id() {
            log::error!(
                "program: radio identified as {} but {} was expected",
                info.model_name,
                model.id()
            );
            return Err(Error::ModelMismatch {
                expected: model.id().to_string(),
                actual: info.model_name,
            });
        }

        let (start, end) = xcmp.psdt(PARTITION_CODEPLUG)?;
        let size = (end - start) as usize;
        if size != model.image_size() {
            log::error!(
                "program: partition size {} does not match model's expected {}",
                size,
                model.image_size()
            );
            return Err(Error::PartitionSizeMismatch { expected: model.image_size(), actual: size });
        }

        let source = cp.as_bytes();
        xcmp.session_start(SessionKind::Write, random_session_id())?;
        if let Err(e) = write_partition(&mut xcmp, start, source, cancel, &mut progress) {
            log::warn!("program: write aborted ({}), resetting session", e);
            let _ = xcmp.session_reset();
            return Err(e);
        }
        xcmp.session_reset()?;
        log::info!("program: wrote {} bytes, starting verify read-back", source.len());

        xcmp.session_start(SessionKind::Read, random_session_id())?;
        let mut no_op = |_: f64| {};
        let readback = match read_partition(&mut xcmp, start, size, cancel, &mut no_op) {
            Ok(buf) => buf,
            Err(e) => {
                log::warn!("program: verify read-back aborted ({}), resetting session", e);
                let _ = xcmp.session_reset();
                return Err(e);
            }
        };
        xcmp.session_reset()?;

        match first_mismatch(source, &readback) {
            Some(offset) => {
                log::error!("program: verify mismatch at byte offset {}", offset);
                Err(Error::VerifyFailed(offset))
            }
            None => {
                log::info!("program: write verified, {} bytes match", source.len());
                Ok(())
            }
        }
    })();

    finish(session, result)
}

fn read_partition(
    xcmp: &mut XcmpClient<'_>,
    start: u32,
    size: usize,
    cancel: &AtomicBool,
    progress: &mut impl FnMut(f64),
) -> Result<Vec<u8>, Error> {
    let mut buf = vec![0u8; size];
    let mut done = 0usize;
    while done < size {
        if cancel.load(Ordering::SeqCst) {
            log::info!("program: read cancelled after {} of {} bytes", done, size);
            return Err(Error::Aborted(done));
        }
        let chunk_len = CHUNK_LEN.min(size - done);
        let chunk = xcmp.block_read(start + done as u32, chunk_len as u16)?;
        buf[done..done + chunk_len].copy_from_slice(&chunk);
        done += chunk_len;
        log::trace!("program: read {} of {} bytes", done, size);
        progress(done as f64 / size as f64);
    }
    Ok(buf)
}

fn write_partition(
    xcmp: &mut XcmpClient<'_>,
    start: u32,
    source: &[u8],
    cancel: &AtomicBool,
    progress: &mut impl FnMut(f64),
) -> Result<(), Error> {
    let size = source.len();
    let mut done = 0usize;
    while done < size {
        if cancel.load(Ordering::SeqCst) {
            log::info!("program: write cancelled after {} of {} bytes", done, size);
            return Err(Error::Aborted(done));
        }
        let chunk_len = CHUNK_LEN.min(size - done);
        xcmp.block_write(start + done as u32, &source[done..done + chunk_len])?;
        done += chunk_len;
        log::trace!("program: wrote {} of {} bytes", done, size);
        progress(done as f64 / size as f64);
    }
    Ok(())
}

fn first_mismatch(a: &[u8], b: &[u8]) -> Option<usize> {
    a.iter().zip(b.iter()).position(|(x, y)| x != y)
}

/// A non-zero 16-bit session id, as required by the protocol (0 is reserved).
fn random_session_id() -> u16 {
    match rand::random::<u16>() {
        0 => 1,
        n => n,
    }
}

/// Closes the XNL session regardless of outcome, preferring the procedure's own error over a
/// close failure so a caller sees why the procedure actually failed.
fn finish<T>(mut session: XnlSession, result: Result<T, Error>) -> Result<T, Error> {
    let close_result = session.close();
    match result {
        Ok(v) => close_result.map(|_| v),
        Err(e) => Err(e),
    }
}

/// Blocking read/write convenience for callers that don't need progress or cancellation.
pub fn read_codeplug_blocking(transport: Box<dyn Transport>, model: RadioModel) -> Result<Codeplug, Error> {
    read_codeplug(transport, model, &AtomicBool::new(false), |_| {})
}

pub fn write_codeplug_blocking(transport: Box<dyn Transport>, cp: &Codeplug) -> Result<(), Error> {
    write_codeplug(transport, cp, &AtomicBool::new(false), |_| {})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model;
    use crate::transport::mock::MockTransport;
    use crate::xnl::frame::XnlFrame;
    use crate::xnl::{OP_AUTH_ACK, OP_CHALLENGE, OP_DATA, OP_MASTER_KEY_REQUEST};
    use std::sync::{Arc, Mutex};

    const OP_IDENTIFY: u16 = 0x0001;
    const OP_PSDT: u16 = 0x0002;
    const OP_SESSION_START: u16 = 0x0003;
    const OP_SESSION_RESET: u16 = 0x0004;
    const OP_BLOCK_READ: u16 = 0x0005;
    const OP_BLOCK_WRITE: u16 = 0x0006;

    /// A mock radio that speaks just enough XNL/XCMP to drive the programming procedure: a fixed
    /// identify reply, a PSDT reply sized to `partition_size`, and a block store backed by
    /// `storage`. `corrupt_offset`, if set, flips a byte on the first read-back after a write so
    /// verify-mismatch scenarios can be exercised without a real radio.
    fn mock_radio(storage: Arc<Mutex<Vec<u8>>>, corrupt_offset: Option<usize>) -> MockTransport {
        let handshake_state = Arc::new(Mutex::new(0u8));
        let assigned_addr: u16 = 0x0042;
        let corrupted_once = Arc::new(Mutex::new(false));

        MockTransport::new(move |req| {
            let frame = XnlFrame::decode_body(&req[2..]).unwrap();
            let mut hs = handshake_state.lock().unwrap();
            match (*hs, frame.opcode) {
                (0, OP_MASTER_KEY_REQUEST) => {
                    *hs = 1;
                    let mut payload = vec![0x00, 0x01];
                    payload.extend_from_slice(b"challenge");
                    XnlFrame {
                        dest_addr: 0,
                        src_addr: 0x0001,
                        opcode: OP_CHALLENGE,
                        transaction_id: frame.transaction_id,
                        payload,
                    }
                    .encode()
                }
                (1, _) => {
                    *hs = 2;
                    XnlFrame {
                        dest_addr: 0,
                        src_addr: 0x0001,
                        opcode: OP_AUTH_ACK,
                        transaction_id: frame.transaction_id,
                        payload: assigned_addr.to_be_bytes().to_vec(),
                    }
                    .encode()
                }
                (_, OP_DATA) => {
                    let xcmp_opcode = u16::from_be_bytes([frame.payload[0], frame.payload[1]]);
                    let body = &frame.payload[2..];
                    let reply_body = handle_xcmp(xcmp_opcode, body, &storage, corrupt_offset, &corrupted_once);
                    let mut payload = Vec::with_capacity(1 + reply_body.len());
                    payload.push(0u8);
                    payload.extend_from_slice(&reply_body);
                    XnlFrame {
                        dest_addr: frame.src_addr,
                        src_addr: 0x0001,
                        opcode: OP_DATA,
                        transaction_id: frame.transaction_id,
                        payload,
                    }
                    .encode()
                }
                _ => Vec::new(),
            }
        })
    }

    fn handle_xcmp(
        opcode: u16,
        body: &[u8],
        storage: &Arc<Mutex<Vec<u8>>>,
        corrupt_offset: Option<usize>,
        corrupted_once: &Arc<Mutex<bool>>,
    ) -> Vec<u8> {
        match opcode {
            OP_IDENTIFY => {
                let mut out = vec![7u8];
                out.extend_from_slice(b"RDU2020");
                out.push(4);
                out.extend_from_slice(b"SN01");
                out.extend_from_slice(&1u32.to_be_bytes());
                out.extend_from_slice(&[b'F', 1, 0]);
                out.push(12);
                out.extend_from_slice(b"business-uhf");
                out
            }
            OP_PSDT => {
                let len = storage.lock().unwrap().len() as u32;
                let mut out = Vec::new();
                out.extend_from_slice(&0u32.to_be_bytes());
                out.extend_from_slice(&len.to_be_bytes());
                out
            }
            OP_SESSION_START | OP_SESSION_RESET => Vec::new(),
            OP_BLOCK_READ => {
                let addr = u32::from_be_bytes([body[0], body[1], body[2], body[3]]) as usize;
                let len = u16::from_be_bytes([body[4], body[5]]) as usize;
                let mut data = storage.lock().unwrap()[addr..addr + len].to_vec();
                if let Some(offset) = corrupt_offset {
                    if (addr..addr + len).contains(&offset) {
                        let mut once = corrupted_once.lock().unwrap();
                        if !*once {
                            data[offset - addr] ^= 0xff;
                            *once = true;
                        }
                    }
                }
                data
            }
            OP_BLOCK_WRITE => {
                let addr = u32::from_be_bytes([body[0], body[1], body[2], body[3]]) as usize;
                let len = u16::from_be_bytes([body[4], body[5]]) as usize;
                storage.lock().unwrap()[addr..addr + len].copy_from_slice(&body[6..6 + len]);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn rdu2020_model() -> RadioModel {
        model::model("RDU2020").unwrap()
    }

    #[test]
    fn read_round_trips_default_image() {
        let image = Codeplug::from_defaults(rdu2020_model()).unwrap().as_bytes().to_vec();
        let storage = Arc::new(Mutex::new(image.clone()));
        let transport = mock_radio(storage, None);

        let cp = read_codeplug(Box::new(transport), rdu2020_model(), &AtomicBool::new(false), |_| {}).unwrap();
        assert_eq!(cp.as_bytes(), image.as_slice());
        assert_eq!(cp.metadata.serial_number.as_deref(), Some("SN01"));
    }

    #[test]
    fn write_round_trips_and_reports_progress() {
        let storage = Arc::new(Mutex::new(vec![0u8; rdu2020_model().image_size()]));
        let transport = mock_radio(storage.clone(), None);

        let cp = Codeplug::from_defaults(rdu2020_model()).unwrap();
        let mut last_progress = 0.0;
        write_codeplug(Box::new(transport), &cp, &AtomicBool::new(false), |p| {
            assert!(p >= last_progress);
            last_progress = p;
        })
        .unwrap();
        assert_eq!(last_progress, 1.0);
        assert_eq!(storage.lock().unwrap().as_slice(), cp.as_bytes());
    }

    /// Scenario S5: a field written around its own constraint must still be caught by model
    /// validation before anything touches the transport.
    #[test]
    fn validation_failure_blocks_write_before_touching_transport() {
        use crate::bits::{BitWriter, Endian};

        let model = rdu2020_model();
        let mut raw = Codeplug::from_defaults(model.clone()).unwrap().as_bytes().to_vec();
        let field = model.fields().get("rdu2020.channel0.rxFreq").unwrap();
        let mut w = BitWriter::new(&mut raw);
        w.seek_bit(field.bit_offset);
        w.write_u32(9_000_000, Endian::Big);
        let cp = Codeplug::from_raw(model.clone(), raw, Metadata::new(Utc::now())).unwrap();

        let storage = Arc::new(Mutex::new(vec![0u8; model.image_size()]));
        let transport = mock_radio(storage, None);
        let err = write_codeplug(Box::new(transport), &cp, &AtomicBool::new(false), |_| {}).unwrap_err();
        assert!(matches!(err, Error::ValidationFailed(_)));
    }

    /// Scenario S6: the mock radio corrupts byte 42 on read-back; the procedure must report
    /// exactly that offset rather than silently retrying or succeeding.
    #[test]
    fn verify_mismatch_reports_offset() {
        let model = rdu2020_model();
        let storage = Arc::new(Mutex::new(vec![0u8; model.image_size()]));
        let transport = mock_radio(storage, Some(42));

        let cp = Codeplug::from_defaults(model).unwrap();
        let err = write_codeplug(Box::new(transport), &cp, &AtomicBool::new(false), |_| {}).unwrap_err();
        assert!(matches!(err, Error::VerifyFailed(42)));
    }

    #[test]
    fn cancellation_aborts_with_bytes_done() {
        let model = rdu2020_model();
        let image = Codeplug::from_defaults(model.clone()).unwrap().as_bytes().to_vec();
        let storage = Arc::new(Mutex::new(image));
        let transport = mock_radio(storage, None);

        let cancel = AtomicBool::new(false);
        let mut chunks_seen = 0;
        let err = read_codeplug(Box::new(transport), model, &cancel, |_| {
            chunks_seen += 1;
            if chunks_seen == 1 {
                cancel.store(true, Ordering::SeqCst);
            }
        })
        .unwrap_err();
        assert!(matches!(err, Error::Aborted(_)));
    }

    #[test]
    fn model_mismatch_is_reported() {
        let rdu_image = Codeplug::from_defaults(rdu2020_model()).unwrap().as_bytes().to_vec();
        let storage = Arc::new(Mutex::new(rdu_image));
        let transport = mock_radio(storage, None);

        let fake = crate::model::ModelSchema {
            id: "NOT-RDU2020",
            ..unwrap_schema()
        };
        let model = RadioModel::new(fake);
        let err = read_codeplug(Box::new(transport), model, &AtomicBool::new(false), |_| {}).unwrap_err();
        assert!(matches!(err, Error::ModelMismatch { .. }));
    }

    fn unwrap_schema() -> crate::model::ModelSchema {
        crate::model::rdu2020::Rdu2020::schema()
    }
}
