//! The on-disk codeplug file container (`.cplg`).
//!
//! Version 2 is the only format this crate writes. Version 1 (unencrypted-only, no AEAD) is
//! accepted on read for backward compatibility with files saved by older tooling and is always
//! rewritten as v2 on the next save.
//!
//! ```text
//! offset size  field
//! 0      4     magic      = ASCII "CPLG"
//! 4      2     version    = 1 or 2 (LE)
//! 6      2     flags      = bit 0: encrypted (LE)
//! 8      4     metadata_len (u32 LE)
//! 12     N     metadata_json (UTF-8)
//! 12+N   16    salt       (present only if encrypted)
//! …      12    nonce      (present only if encrypted)
//! …      M     body: {model_id_len(u16 LE), model_id utf8, raw_len(u32 LE), raw_bytes}, plus a
//!              16-byte AEAD tag appended by AES-256-GCM if encrypted
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use bitflags::bitflags;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::codeplug::{Codeplug, Metadata};
use crate::error::Error;
use crate::model;

bitflags! {
    /// The container header's `flags` field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct ContainerFlags: u16 {
        const ENCRYPTED = 0x0001;
    }
}

const MAGIC: &[u8; 4] = b"CPLG";
const VERSION_LEGACY: u16 = 1;
const VERSION_CURRENT: u16 = 2;
const PBKDF2_ROUNDS: u32 = 100_000;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// Serializes `cp` (and its attached [`Metadata`]) to the v2 container format, optionally
/// password-encrypting the body. Each call generates a fresh random salt and nonce, so two calls
/// with the same password and codeplug produce different ciphertext.
pub fn serialize(cp: &Codeplug, password: Option<&str>) -> Result<Vec<u8>, Error> {
    let metadata_json = serde_json::to_vec(&cp.metadata)
        .map_err(|e| Error::InvalidFormat(format!("metadata serialization failed: {e}")))?;

    let mut body = Vec::new();
    let model_id = cp.model().id().as_bytes();
    body.extend_from_slice(&(model_id.len() as u16).to_le_bytes());
    body.extend_from_slice(model_id);
    body.extend_from_slice(&(cp.as_bytes().len() as u32).to_le_bytes());
    body.extend_from_slice(cp.as_bytes());

    let mut header = Vec::new();
    header.extend_from_slice(MAGIC);
    header.extend_from_slice(&VERSION_CURRENT.to_le_bytes());
    let flags = if password.is_some() { ContainerFlags::ENCRYPTED } else { ContainerFlags::empty() };
    header.extend_from_slice(&flags.bits().to_le_bytes());
    header.extend_from_slice(&(metadata_json.len() as u32).to_le_bytes());
    header.extend_from_slice(&metadata_json);

    let mut out = header.clone();
    match password {
        None => out.extend_from_slice(&body),
        Some(password) => {
            let mut salt = [0u8; SALT_LEN];
            let mut nonce_bytes = [0u8; NONCE_LEN];
            rand::thread_rng().fill_bytes(&mut salt);
            rand::thread_rng().fill_bytes(&mut nonce_bytes);

            let key = derive_key(password, &salt);
            let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));
            let nonce = Nonce::from_slice(&nonce_bytes);
            let sealed = cipher
                .encrypt(nonce, aes_gcm::aead::Payload { msg: &body, aad: &header })
                .map_err(|_| Error::Corrupted("AEAD seal failed".to_string()))?;

            out.extend_from_slice(&salt);
            out.extend_from_slice(&nonce_bytes);
            out.extend_from_slice(&sealed);
        }
    }
    Ok(out)
}

/// Parses a container into a [`Codeplug`] carrying the metadata that was saved alongside it.
/// `password` is required iff the file is encrypted; a missing or wrong password is reported as
/// [`Error::MissingPassword`] / [`Error::BadPassword`] rather than [`Error::Corrupted`].
pub fn deserialize(buf: &[u8], password: Option<&str>) -> Result<Codeplug, Error> {
    if buf.len() < 12 || &buf[0..4] != MAGIC {
        return Err(Error::InvalidFormat("bad magic".to_string()));
    }
    let version = u16::from_le_bytes([buf[4], buf[5]]);
    if version != VERSION_LEGACY && version != VERSION_CURRENT {
        return Err(Error::UnsupportedVersion(version));
    }
    let flags = ContainerFlags::from_bits_truncate(u16::from_le_bytes([buf[6], buf[7]]));
    let encrypted = flags.contains(ContainerFlags::ENCRYPTED);
    if encrypted && version == VERSION_LEGACY {
        return Err(Error::UnsupportedVersion(version));
    }

    let metadata_len = read_u32(buf, 8)? as usize;
    let metadata_start: usize = 12;
    let metadata_end = metadata_start
        .checked_add(metadata_len)
        .filter(|&end| end <= buf.len())
        .ok_or_else(|| Error::Corrupted("metadata_len exceeds file length".to_string()))?;
    let header_end = metadata_end;
    let metadata: Metadata = serde_json::from_slice(&buf[metadata_start..metadata_end])
        .map_err(|e| Error::Corrupted(format!("invalid metadata JSON: {e}")))?;

    let body = if !encrypted {
        buf[header_end..].to_vec()
    } else {
        let password = password.ok_or(Error::MissingPassword)?;
        let salt_end = header_end
            .checked_add(SALT_LEN)
            .filter(|&end| end <= buf.len())
            .ok_or_else(|| Error::Corrupted("truncated salt".to_string()))?;
        let nonce_end = salt_end
            .checked_add(NONCE_LEN)
            .filter(|&end| end <= buf.len())
            .ok_or_else(|| Error::Corrupted("truncated nonce".to_string()))?;
        let salt = &buf[header_end..salt_end];
        let nonce_bytes = &buf[salt_end..nonce_end];
        let sealed = &buf[nonce_end..];

        let key = derive_key(password, salt);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));
        let nonce = Nonce::from_slice(nonce_bytes);
        cipher
            .decrypt(
                nonce,
                aes_gcm::aead::Payload { msg: sealed, aad: &buf[0..header_end] },
            )
            .map_err(|_| Error::BadPassword)?
    };

    let mut pos = 0usize;
    let model_id_len = read_u16(&body, pos)? as usize;
    pos += 2;
    let model_id = std::str::from_utf8(body.get(pos..pos + model_id_len).ok_or_else(|| {
        Error::Corrupted("truncated model id".to_string())
    })?)
    .map_err(|_| Error::Corrupted("model id is not valid UTF-8".to_string()))?
    .to_string();
    pos += model_id_len;

    let raw_len = read_u32(&body, pos)? as usize;
    pos += 4;
    let raw = body
        .get(pos..pos + raw_len)
        .ok_or_else(|| Error::Corrupted("truncated codeplug body".to_string()))?
        .to_vec();

    let model = model::model(&model_id)?;
    Codeplug::from_raw(model, raw, metadata)
}

fn derive_key(password: &str, salt: &[u8]) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2::pbkdf2_hmac::<sha2::Sha256>(password.as_bytes(), salt, PBKDF2_ROUNDS, &mut *key);
    key
}

fn read_u16(buf: &[u8], pos: usize) -> Result<u16, Error> {
    buf.get(pos..pos + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| Error::Corrupted("truncated u16 field".to_string()))
}

fn read_u32(buf: &[u8], pos: usize) -> Result<u32, Error> {
    buf.get(pos..pos + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| Error::Corrupted("truncated u32 field".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_codeplug() -> Codeplug {
        model::create_default_codeplug("RDU2020").unwrap()
    }

    #[test]
    fn unencrypted_round_trip() {
        let cp = sample_codeplug();
        let metadata = cp.metadata.clone();
        let buf = serialize(&cp, None).unwrap();
        let decoded = deserialize(&buf, None).unwrap();
        assert_eq!(decoded.as_bytes(), cp.as_bytes());
        assert_eq!(decoded.metadata, metadata);
    }

    #[test]
    fn encrypted_round_trip_matches_scenario_s4() {
        let cp = sample_codeplug();
        let buf = serialize(&cp, Some("secret")).unwrap();

        let decoded = deserialize(&buf, Some("secret")).unwrap();
        assert_eq!(decoded.as_bytes(), cp.as_bytes());

        let err = deserialize(&buf, Some("wrong")).unwrap_err();
        assert!(matches!(err, Error::BadPassword));

        let buf2 = serialize(&cp, Some("secret")).unwrap();
        assert_ne!(buf, buf2, "fresh salt/nonce must change ciphertext bytes");
    }

    #[test]
    fn missing_password_on_encrypted_file_is_reported() {
        let cp = sample_codeplug();
        let buf = serialize(&cp, Some("secret")).unwrap();
        assert!(matches!(deserialize(&buf, None), Err(Error::MissingPassword)));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut buf = serialize(&sample_codeplug(), None).unwrap();
        buf[0] = b'X';
        assert!(matches!(deserialize(&buf, None), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut buf = serialize(&sample_codeplug(), None).unwrap();
        buf[4..6].copy_from_slice(&99u16.to_le_bytes());
        assert!(matches!(deserialize(&buf, None), Err(Error::UnsupportedVersion(99))));
    }
}
