//! Email hashing and authenticated encryption.
//!
//! The codec derives two independent subkeys from one master key: a
//! hashing key for deterministic lookups and an encryption key for
//! storage. Hashes are keyed BLAKE3 (256-bit, hex). Ciphertexts are
//! ChaCha20-Poly1305 with a fresh random nonce per call, stored as
//! `base64(nonce || ciphertext)` together with a scheme version.

use base64ct::{Base64, Encoding};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};
use rand::{RngCore, rngs::OsRng};
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

// Key-derivation contexts, exactly 8 bytes each. Changing either one
// invalidates every stored hash or ciphertext.
const HASH_KEY_CONTEXT: &str = "emlhash1";
const ENCRYPT_KEY_CONTEXT: &str = "emlencr1";

pub const ENCRYPTION_VERSION: i16 = 1;

const MASTER_KEY_LEN: usize = 32;
const SUBKEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// The master key is malformed or too short.
    #[error("invalid email master key: {0}")]
    Configuration(String),
    /// The stored ciphertext was written by an unknown scheme version.
    #[error("unsupported encryption version: {0}")]
    UnsupportedVersion(i16),
    /// Authentication failed: the payload is corrupt or was tampered with.
    #[error("decryption failed: data may be corrupted or tampered")]
    DecryptionFailure,
}

/// Hash and ciphertext for one email, ready for the `users` table.
#[derive(Debug, Clone)]
pub struct ProcessedEmail {
    pub hash: String,
    pub ciphertext: String,
    pub version: i16,
}

/// Deterministic email hashing plus authenticated encryption.
///
/// Derived keys are read-only after construction and safe to share
/// across tasks; both are zeroized when the codec is dropped.
pub struct EmailCodec {
    hash_key: Zeroizing<[u8; SUBKEY_LEN]>,
    encrypt_key: Zeroizing<[u8; SUBKEY_LEN]>,
}

impl EmailCodec {
    /// Builds a codec from a base64-encoded master key.
    ///
    /// # Errors
    /// Returns `CryptoError::Configuration` if the key is not valid
    /// base64 or decodes to fewer than 32 bytes.
    pub fn new(master_key_b64: &str) -> Result<Self, CryptoError> {
        let mut decoded = Base64::decode_vec(master_key_b64.trim()).map_err(|_| {
            CryptoError::Configuration("master key must be valid base64".to_string())
        })?;

        if decoded.len() < MASTER_KEY_LEN {
            decoded.zeroize();
            return Err(CryptoError::Configuration(format!(
                "master key must decode to at least {MASTER_KEY_LEN} bytes"
            )));
        }

        // Only the first MASTER_KEY_LEN bytes feed the KDF.
        let mut kdf_key = [0u8; MASTER_KEY_LEN];
        kdf_key.copy_from_slice(&decoded[..MASTER_KEY_LEN]);

        let hash_key = Zeroizing::new(blake3::derive_key(HASH_KEY_CONTEXT, &kdf_key));
        let encrypt_key = Zeroizing::new(blake3::derive_key(ENCRYPT_KEY_CONTEXT, &kdf_key));

        kdf_key.zeroize();
        decoded.zeroize();

        Ok(Self {
            hash_key,
            encrypt_key,
        })
    }

    /// Deterministic 256-bit keyed hash of the normalized email, hex-encoded.
    ///
    /// Same normalized input always yields the same output, so the hash
    /// serves as the unique database lookup key and queries never touch
    /// plaintext email.
    #[must_use]
    pub fn hash_email(&self, email: &str) -> String {
        let normalized = normalize_email(email);
        blake3::keyed_hash(&self.hash_key, normalized.as_bytes())
            .to_hex()
            .to_string()
    }

    /// Encrypts the normalized email for storage.
    ///
    /// Returns `base64(nonce || ciphertext)` and the scheme version. The
    /// nonce is freshly random on every call; reuse would break
    /// confidentiality.
    ///
    /// # Errors
    /// Returns `CryptoError::DecryptionFailure`'s counterpart on the
    /// encrypt side only if the cipher itself fails, which indicates a
    /// configuration problem.
    pub fn encrypt_email(&self, email: &str) -> Result<(String, i16), CryptoError> {
        let normalized = normalize_email(email);

        let key = Key::from_slice(&*self.encrypt_key);
        let cipher = ChaCha20Poly1305::new(key);

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, normalized.as_bytes())
            .map_err(|_| CryptoError::Configuration("encryption failed".to_string()))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);

        Ok((Base64::encode_string(&payload), ENCRYPTION_VERSION))
    }

    /// Decrypts a stored `base64(nonce || ciphertext)` payload.
    ///
    /// # Errors
    /// Returns `CryptoError::UnsupportedVersion` for an unknown scheme
    /// version, and `CryptoError::DecryptionFailure` for bad base64, a
    /// short nonce, or an authentication-tag mismatch. The latter is a
    /// security-relevant event for stored data and must not be ignored.
    pub fn decrypt_email(&self, armored: &str, version: i16) -> Result<String, CryptoError> {
        if version != ENCRYPTION_VERSION {
            return Err(CryptoError::UnsupportedVersion(version));
        }

        let payload = Base64::decode_vec(armored).map_err(|_| CryptoError::DecryptionFailure)?;
        if payload.len() < NONCE_LEN {
            return Err(CryptoError::DecryptionFailure);
        }

        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let key = Key::from_slice(&*self.encrypt_key);
        let cipher = ChaCha20Poly1305::new(key);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::DecryptionFailure)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailure)
    }

    /// Hash and encrypt in one step, as used at user-creation time.
    ///
    /// # Errors
    /// Propagates any failure from `encrypt_email`.
    pub fn process_email(&self, email: &str) -> Result<ProcessedEmail, CryptoError> {
        let hash = self.hash_email(email);
        let (ciphertext, version) = self.encrypt_email(email)?;

        Ok(ProcessedEmail {
            hash,
            ciphertext,
            version,
        })
    }
}

/// Lowercase and trim, applied before every hash or encrypt.
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
