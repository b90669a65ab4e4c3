//! Cryptography for the local cache.
//!
//! The cache plaintext is sealed with AES-256-GCM under a key derived
//! from the cache password via PBKDF2-HMAC-SHA-256. Salt and IV are
//! freshly drawn from the injected RNG on every seal, so the same
//! plaintext never produces the same envelope twice.
//!
//! ## Security Model
//!
//! - AES-256-GCM authenticated encryption
//! - PBKDF2-HMAC-SHA-256 with 100 000 iterations
//! - Unique 16-byte salt and 12-byte IV per encryption
//! - Keys are zeroized on drop

use crate::error::{CoreError, CoreResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use recdb_codec::Value;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the PBKDF2 salt in bytes.
pub const SALT_SIZE: usize = 16;
/// Size of the GCM IV in bytes.
pub const IV_SIZE: usize = 12;
/// PBKDF2 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Development-only cache password.
///
/// This MUST be replaced by a caller-supplied password before any real
/// deployment; it exists so the pipeline runs end-to-end in development.
pub const DEV_PASSWORD: &str = "recdb-dev-password";

/// Encryption key for AES-256-GCM.
///
/// The key is automatically zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Derives a key from a password and salt with PBKDF2-HMAC-SHA-256.
    pub fn derive(password: &str, salt: &[u8]) -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut bytes);
        Self { bytes }
    }

    /// Returns the key as a byte slice.
    ///
    /// # Security
    ///
    /// Be careful with this method - don't log or serialize the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// The on-disk form of an encrypted document: salt, IV and ciphertext.
///
/// Serializes as the canonical object `{salt, iv, text}` with all
/// three fields as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherEnvelope {
    /// PBKDF2 salt.
    pub salt: [u8; SALT_SIZE],
    /// AES-GCM IV.
    pub iv: [u8; IV_SIZE],
    /// Ciphertext including the GCM tag.
    pub text: Vec<u8>,
}

impl CipherEnvelope {
    /// The envelope's canonical object literal.
    pub fn to_canonical(&self) -> Value {
        Value::Object(vec![
            ("salt".to_string(), Value::from(to_hex(&self.salt))),
            ("iv".to_string(), Value::from(to_hex(&self.iv))),
            ("text".to_string(), Value::from(to_hex(&self.text))),
        ])
    }

    /// Parses an envelope from its canonical literal.
    pub fn from_canonical(value: &Value) -> CoreResult<Self> {
        let field = |name: &str| -> CoreResult<Vec<u8>> {
            let hex = value
                .get(name)
                .and_then(Value::as_text)
                .ok_or_else(|| CoreError::invalid_envelope(format!("missing field {name:?}")))?;
            from_hex(hex).ok_or_else(|| {
                CoreError::invalid_envelope(format!("field {name:?} is not valid hex"))
            })
        };

        let salt: [u8; SALT_SIZE] = field("salt")?
            .try_into()
            .map_err(|_| CoreError::invalid_envelope("salt must be 16 bytes"))?;
        let iv: [u8; IV_SIZE] = field("iv")?
            .try_into()
            .map_err(|_| CoreError::invalid_envelope("iv must be 12 bytes"))?;
        let text = field("text")?;

        Ok(Self { salt, iv, text })
    }
}

/// Seals plaintext under a password-derived key.
///
/// Salt and IV are drawn fresh from `rng` on every call.
pub fn encrypt(
    plaintext: &[u8],
    password: &str,
    rng: &mut dyn RngCore,
) -> CoreResult<CipherEnvelope> {
    let mut salt = [0u8; SALT_SIZE];
    rng.try_fill_bytes(&mut salt)
        .map_err(|e| CoreError::encryption_failed(format!("rng failure: {e}")))?;
    let mut iv = [0u8; IV_SIZE];
    rng.try_fill_bytes(&mut iv)
        .map_err(|e| CoreError::encryption_failed(format!("rng failure: {e}")))?;

    let key = EncryptionKey::derive(password, &salt);
    let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));

    let text = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| CoreError::encryption_failed("encryption error"))?;

    Ok(CipherEnvelope { salt, iv, text })
}

/// Opens an envelope sealed with [`encrypt`].
///
/// # Errors
///
/// Fails when the password is wrong or the ciphertext was tampered
/// with (the GCM tag does not authenticate).
pub fn decrypt(envelope: &CipherEnvelope, password: &str) -> CoreResult<Vec<u8>> {
    let key = EncryptionKey::derive(password, &envelope.salt);
    let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));

    cipher
        .decrypt(Nonce::from_slice(&envelope.iv), envelope.text.as_slice())
        .map_err(|_| CoreError::decryption_failed("wrong key or corrupted ciphertext"))
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn from_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use recdb_codec::{from_json, to_canonical_json};

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let plaintext = b"{\"task\":[]}";
        let envelope = encrypt(plaintext, "password", &mut OsRng).unwrap();

        assert_ne!(envelope.text.as_slice(), plaintext.as_slice());
        assert_eq!(decrypt(&envelope, "password").unwrap(), plaintext);
    }

    #[test]
    fn wrong_password_fails() {
        let envelope = encrypt(b"secret", "password", &mut OsRng).unwrap();
        assert!(decrypt(&envelope, "not the password").is_err());
    }

    #[test]
    fn fresh_salt_and_iv_every_time() {
        let a = encrypt(b"same data", "pw", &mut OsRng).unwrap();
        let b = encrypt(b"same data", "pw", &mut OsRng).unwrap();

        assert_ne!(a.salt, b.salt);
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.text, b.text);
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let mut envelope = encrypt(b"data", "pw", &mut OsRng).unwrap();
        let last = envelope.text.len() - 1;
        envelope.text[last] ^= 0xff;

        assert!(decrypt(&envelope, "pw").is_err());
    }

    #[test]
    fn envelope_canonical_roundtrip() {
        let envelope = encrypt(b"data", "pw", &mut OsRng).unwrap();

        let bytes = to_canonical_json(&envelope.to_canonical()).unwrap();
        let parsed = CipherEnvelope::from_canonical(&from_json(&bytes).unwrap()).unwrap();
        assert_eq!(parsed, envelope);

        // Field order and hex form are part of the on-disk contract.
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with(r#"{"salt":""#));
        assert!(text.contains(r#","iv":""#));
        assert!(text.contains(r#","text":""#));
    }

    #[test]
    fn envelope_missing_fields_rejected() {
        let incomplete = Value::Object(vec![("salt".to_string(), Value::from("00"))]);
        assert!(matches!(
            CipherEnvelope::from_canonical(&incomplete),
            Err(CoreError::InvalidEnvelope { .. })
        ));

        let bad_hex = Value::Object(vec![
            ("salt".to_string(), Value::from("zz")),
            ("iv".to_string(), Value::from("00")),
            ("text".to_string(), Value::from("00")),
        ]);
        assert!(CipherEnvelope::from_canonical(&bad_hex).is_err());
    }

    #[test]
    fn derivation_is_deterministic() {
        let salt = [7u8; SALT_SIZE];
        let a = EncryptionKey::derive("pw", &salt);
        let b = EncryptionKey::derive("pw", &salt);
        let c = EncryptionKey::derive("pw", &[8u8; SALT_SIZE]);

        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), c.as_bytes());
    }

    #[test]
    fn empty_plaintext() {
        let envelope = encrypt(b"", "pw", &mut OsRng).unwrap();
        assert_eq!(decrypt(&envelope, "pw").unwrap(), b"");
    }

    #[test]
    fn hex_roundtrip() {
        assert_eq!(to_hex(&[0x00, 0xab, 0xff]), "00abff");
        assert_eq!(from_hex("00abff"), Some(vec![0x00, 0xab, 0xff]));
        assert_eq!(from_hex("0"), None);
        assert_eq!(from_hex("zz"), None);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Keep the case count down: PBKDF2 at 100k iterations is
            // deliberately slow.
            #![proptest_config(ProptestConfig::with_cases(8))]

            #[test]
            fn prop_roundtrip(plaintext in proptest::collection::vec(any::<u8>(), 0..256)) {
                let envelope = encrypt(&plaintext, "pw", &mut OsRng).unwrap();
                prop_assert_eq!(decrypt(&envelope, "pw").unwrap(), plaintext);
            }
        }
    }
}
