//! Payload codec applied to every stored object.
//!
//! A storage instance picks one [`Codec`] at construction and applies it to
//! every value it writes and reads. Lease objects bypass the codec.
//!
//! # Envelope format
//!
//! Encrypted payloads use the NaCl `secretbox` layout (XSalsa20-Poly1305):
//!
//! ```text
//! +----------------+----------------------+------------------------+
//! | nonce (24 B)   | Poly1305 tag (16 B)  | ciphertext (len(msg))  |
//! +----------------+----------------------+------------------------+
//! ```
//!
//! The nonce is freshly drawn from the OS CSPRNG on every encode. Because the
//! tag authenticates the whole body, a truncated or modified envelope never
//! decodes to bytes.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use crypto_secretbox::{
    Key, Nonce, XSalsa20Poly1305,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::error::ConfigError;

/// Length of the random nonce prepended to every envelope.
pub const NONCE_SIZE: usize = 24;

/// Length of the secret key.
pub const KEY_SIZE: usize = 32;

/// Length of the Poly1305 authentication tag.
pub const TAG_SIZE: usize = 16;

/// Errors produced while encoding or decoding a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// The envelope is shorter than the nonce.
    #[error("ciphertext too short: missing nonce ({len} bytes, need at least {NONCE_SIZE})")]
    MissingNonce {
        /// Length of the envelope that was supplied.
        len: usize,
    },

    /// The tag did not verify: wrong key, truncation, or corruption.
    #[error("decryption failed: invalid key or corrupted data")]
    Authentication,

    /// The secret key is all zeros and was never initialised.
    #[error("encryption key is not initialized")]
    UninitializedKey,
}

/// Codec chosen once per storage instance.
#[derive(Clone, Default)]
pub enum Codec {
    /// Values are stored as-is.
    #[default]
    Cleartext,
    /// Values are sealed with XSalsa20-Poly1305.
    Encrypted(SecretBoxCodec),
}

impl Codec {
    /// Chooses a codec from an optional key.
    ///
    /// A missing or empty key selects [`Codec::Cleartext`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEncryptionKeyLength`] when the key is
    /// non-empty and not exactly [`KEY_SIZE`] bytes.
    pub fn from_key(key: Option<&[u8]>) -> Result<Self, ConfigError> {
        match key {
            None => Ok(Self::Cleartext),
            Some(key) if key.is_empty() => Ok(Self::Cleartext),
            Some(key) => SecretBoxCodec::new(key).map(Self::Encrypted),
        }
    }

    /// Returns `true` if values are encrypted at rest.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Encrypted(_))
    }

    /// Number of bytes an encoded payload adds to the input.
    #[must_use]
    pub fn overhead(&self) -> usize {
        match self {
            Self::Cleartext => 0,
            Self::Encrypted(_) => NONCE_SIZE + TAG_SIZE,
        }
    }

    /// Encodes `plaintext` for storage.
    ///
    /// The returned buffer has exactly `plaintext.len() + self.overhead()` bytes.
    ///
    /// # Errors
    ///
    /// Fails only for the encrypted codec; see [`SecretBoxCodec::seal`].
    pub fn encode(&self, plaintext: &[u8]) -> Result<Bytes, CodecError> {
        match self {
            Self::Cleartext => Ok(Bytes::copy_from_slice(plaintext)),
            Self::Encrypted(codec) => codec.seal(plaintext),
        }
    }

    /// Decodes a stored payload.
    ///
    /// # Errors
    ///
    /// Fails only for the encrypted codec; see [`SecretBoxCodec::open`].
    pub fn decode(&self, stored: Bytes) -> Result<Bytes, CodecError> {
        match self {
            Self::Cleartext => Ok(stored),
            Self::Encrypted(codec) => codec.open(&stored),
        }
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cleartext => f.write_str("Cleartext"),
            Self::Encrypted(_) => f.write_str("Encrypted(..)"),
        }
    }
}

/// NaCl `secretbox` codec with a fixed 32-byte key.
///
/// The key is zeroed when the codec is dropped.
#[derive(Clone)]
pub struct SecretBoxCodec {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl SecretBoxCodec {
    /// Creates a codec from a 32-byte key.
    ///
    /// An all-zero key is accepted here; every later seal/open on it fails
    /// with [`CodecError::UninitializedKey`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEncryptionKeyLength`] for any other length.
    pub fn new(key: &[u8]) -> Result<Self, ConfigError> {
        let key: [u8; KEY_SIZE] = key.try_into().map_err(|_| {
            ConfigError::InvalidEncryptionKeyLength { expected: KEY_SIZE, actual: key.len() }
        })?;
        Ok(Self { key: Zeroizing::new(key) })
    }

    fn cipher(&self) -> Result<XSalsa20Poly1305, CodecError> {
        if self.key.iter().all(|b| *b == 0) {
            return Err(CodecError::UninitializedKey);
        }
        Ok(XSalsa20Poly1305::new(Key::from_slice(self.key.as_slice())))
    }

    /// Seals `plaintext` under a fresh random nonce and prepends the nonce.
    ///
    /// # Errors
    ///
    /// [`CodecError::UninitializedKey`] for an all-zero key.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Bytes, CodecError> {
        let cipher = self.cipher()?;
        let nonce = XSalsa20Poly1305::generate_nonce(&mut OsRng);
        let sealed = cipher.encrypt(&nonce, plaintext).map_err(|_| CodecError::Authentication)?;

        let mut out = BytesMut::with_capacity(NONCE_SIZE + sealed.len());
        out.put_slice(nonce.as_slice());
        out.put_slice(&sealed);
        Ok(out.freeze())
    }

    /// Splits off the nonce and opens the sealed body.
    ///
    /// An empty input opens to an empty output.
    ///
    /// # Errors
    ///
    /// - [`CodecError::UninitializedKey`] for an all-zero key
    /// - [`CodecError::MissingNonce`] when fewer than [`NONCE_SIZE`] bytes are supplied
    /// - [`CodecError::Authentication`] when the tag does not verify
    pub fn open(&self, envelope: &[u8]) -> Result<Bytes, CodecError> {
        let cipher = self.cipher()?;
        if envelope.is_empty() {
            return Ok(Bytes::new());
        }
        if envelope.len() < NONCE_SIZE {
            return Err(CodecError::MissingNonce { len: envelope.len() });
        }

        let (nonce, sealed) = envelope.split_at(NONCE_SIZE);
        let opened = cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CodecError::Authentication)?;
        Ok(Bytes::from(opened))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn key(byte: u8) -> [u8; KEY_SIZE] {
        [byte; KEY_SIZE]
    }

    #[test]
    fn test_from_key_selects_variant() {
        assert!(!Codec::from_key(None).unwrap().is_encrypted());
        assert!(!Codec::from_key(Some(&[][..])).unwrap().is_encrypted());
        assert!(Codec::from_key(Some(key(7).as_slice())).unwrap().is_encrypted());
    }

    #[test]
    fn test_from_key_rejects_wrong_length() {
        let err = Codec::from_key(Some(&[1u8; 31][..])).unwrap_err();
        assert_eq!(err, ConfigError::InvalidEncryptionKeyLength { expected: 32, actual: 31 });

        let err = Codec::from_key(Some(&[1u8; 33][..])).unwrap_err();
        assert_eq!(err, ConfigError::InvalidEncryptionKeyLength { expected: 32, actual: 33 });
    }

    #[test]
    fn test_cleartext_is_identity() {
        let codec = Codec::Cleartext;
        let encoded = codec.encode(b"-----BEGIN CERTIFICATE-----").unwrap();
        assert_eq!(&encoded[..], b"-----BEGIN CERTIFICATE-----");
        assert_eq!(codec.decode(encoded.clone()).unwrap(), encoded);
        assert_eq!(codec.overhead(), 0);
    }

    #[test]
    fn test_encrypted_layout_and_overhead() {
        let codec = Codec::from_key(Some(key(9).as_slice())).unwrap();
        let plaintext = b"private key material";
        let encoded = codec.encode(plaintext).unwrap();

        assert_eq!(codec.overhead(), 40);
        assert_eq!(encoded.len(), plaintext.len() + 40);
        assert!(!encoded.windows(plaintext.len()).any(|w| w == plaintext));
        assert_eq!(&codec.decode(encoded).unwrap()[..], plaintext);
    }

    #[test]
    fn test_fresh_nonce_per_encode() {
        let codec = Codec::from_key(Some(key(3).as_slice())).unwrap();
        let a = codec.encode(b"same input").unwrap();
        let b = codec.encode(b"same input").unwrap();
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_plaintext_round_trips() {
        let codec = Codec::from_key(Some(key(3).as_slice())).unwrap();
        let encoded = codec.encode(b"").unwrap();
        assert_eq!(encoded.len(), 40);
        assert!(codec.decode(encoded).unwrap().is_empty());
    }

    #[test]
    fn test_empty_envelope_decodes_to_empty() {
        let codec = Codec::from_key(Some(key(3).as_slice())).unwrap();
        assert!(codec.decode(Bytes::new()).unwrap().is_empty());
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let writer = Codec::from_key(Some(key(1).as_slice())).unwrap();
        let reader = Codec::from_key(Some(key(2).as_slice())).unwrap();
        let encoded = writer.encode(b"secret").unwrap();
        assert_eq!(reader.decode(encoded).unwrap_err(), CodecError::Authentication);
    }

    #[test]
    fn test_short_envelopes() {
        let codec = Codec::from_key(Some(key(5).as_slice())).unwrap();
        let encoded = codec.encode(b"certificate bytes").unwrap();

        let err = codec.decode(encoded.slice(..23)).unwrap_err();
        assert_eq!(err, CodecError::MissingNonce { len: 23 });

        for len in [24, 30, 39] {
            let err = codec.decode(encoded.slice(..len)).unwrap_err();
            assert_eq!(err, CodecError::Authentication, "len {len}");
        }

        let err = codec.decode(encoded.slice(..encoded.len() - 1)).unwrap_err();
        assert_eq!(err, CodecError::Authentication);
    }

    #[test]
    fn test_bit_flip_fails_authentication() {
        let codec = Codec::from_key(Some(key(5).as_slice())).unwrap();
        let encoded = codec.encode(b"certificate bytes").unwrap();
        let mut tampered = encoded.to_vec();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;
        assert_eq!(codec.decode(Bytes::from(tampered)).unwrap_err(), CodecError::Authentication);
    }

    #[test]
    fn test_zero_key_fails_every_call() {
        let codec = Codec::from_key(Some(&[0u8; KEY_SIZE][..])).unwrap();
        assert_eq!(codec.encode(b"x").unwrap_err(), CodecError::UninitializedKey);
        assert_eq!(codec.decode(Bytes::from_static(&[1u8; 64])).unwrap_err(), CodecError::UninitializedKey);
        assert_eq!(codec.decode(Bytes::new()).unwrap_err(), CodecError::UninitializedKey);
    }

    #[test]
    fn test_debug_redacts_key() {
        let codec = Codec::from_key(Some(key(0xAB).as_slice())).unwrap();
        let debug = format!("{codec:?}");
        assert_eq!(debug, "Encrypted(..)");
    }
}
