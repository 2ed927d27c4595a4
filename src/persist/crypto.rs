//! Passphrase sealing for application files.
//!
//! Layout: `nonce (12 bytes) || ChaCha20-Poly1305 ciphertext`, keyed with
//! SHA-256 of the passphrase.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::persist::PersistError;

const NONCE_LEN: usize = 12;

fn cipher(passphrase: &str) -> ChaCha20Poly1305 {
    let digest = Sha256::digest(passphrase.as_bytes());
    ChaCha20Poly1305::new(Key::from_slice(&digest))
}

pub fn seal(plaintext: &[u8], passphrase: &str) -> Result<Vec<u8>, PersistError> {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let ciphertext = cipher(passphrase)
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| PersistError::Encrypt)?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

pub fn open(sealed: &[u8], passphrase: &str) -> Result<Vec<u8>, PersistError> {
    if sealed.len() < NONCE_LEN {
        return Err(PersistError::Decrypt);
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    cipher(passphrase)
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| PersistError::Decrypt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_passphrase_fails() {
        let sealed = seal(b"application", "hunter2").unwrap();
        assert_eq!(open(&sealed, "hunter2").unwrap(), b"application");
        assert!(matches!(open(&sealed, "hunter3"), Err(PersistError::Decrypt)));
    }

    #[test]
    fn nonce_differs_between_seals() {
        let a = seal(b"same", "pw").unwrap();
        let b = seal(b"same", "pw").unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
        assert!(matches!(open(&a[..4], "pw"), Err(PersistError::Decrypt)));
    }
}
