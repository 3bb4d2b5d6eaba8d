//! SSH key inspection - fingerprints and passphrase detection.

use std::path::Path;

use base64::Engine;
use sha2::{Digest, Sha256};
use ssh_key::{HashAlg, PrivateKey};

use crate::client::{ClientError, ClientResult};

/// Check if an SSH key has a passphrase.
///
/// Returns `true` if the key is encrypted or unreadable, `false` if it loads
/// without one.
pub fn key_has_passphrase(path: impl AsRef<Path>) -> bool {
    match russh_keys::load_secret_key(path.as_ref(), None) {
        Ok(_) => false,
        Err(e) => {
            tracing::debug!("load_secret_key error: {}", e);
            true
        }
    }
}

/// Calculate the SHA256 fingerprint of an SSH key file.
///
/// Returns fingerprint in the format: `SHA256:base64hash`
pub fn key_fingerprint(path: impl AsRef<Path>) -> ClientResult<String> {
    let path = path.as_ref();

    let key_data = std::fs::read_to_string(path).map_err(|e| {
        ClientError::connection(format!("Failed to read key file {}: {}", path.display(), e))
    })?;

    if let Ok(private_key) = PrivateKey::from_openssh(&key_data) {
        return Ok(private_key.public_key().fingerprint(HashAlg::Sha256).to_string());
    }

    if let Ok(public_key) = ssh_key::PublicKey::from_openssh(&key_data) {
        return Ok(public_key.fingerprint(HashAlg::Sha256).to_string());
    }

    Err(ClientError::connection(format!(
        "Failed to parse SSH key from {}",
        path.display()
    )))
}

/// Calculate SHA256 fingerprint from wire-encoded public key bytes.
pub fn calculate_fingerprint(key_bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key_bytes);
    let hash = hasher.finalize();

    let b64 = base64::engine::general_purpose::STANDARD_NO_PAD.encode(hash);
    format!("SHA256:{}", b64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssh_key::{Algorithm, LineEnding};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_key() -> (PrivateKey, NamedTempFile) {
        let key = PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519).unwrap();
        let openssh = key.to_openssh(LineEnding::LF).unwrap();

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(openssh.as_bytes()).unwrap();
        (key, file)
    }

    #[test]
    fn test_key_has_no_passphrase() {
        let (_, file) = create_test_key();
        assert!(!key_has_passphrase(file.path()));
    }

    #[test]
    fn test_missing_key_counts_as_protected() {
        assert!(key_has_passphrase("/nonexistent/ferry/id_ed25519"));
    }

    #[test]
    fn test_fingerprint_matches_wire_encoding() {
        let (key, file) = create_test_key();
        let from_file = key_fingerprint(file.path()).unwrap();
        assert!(from_file.starts_with("SHA256:"));

        let wire = key.public_key().to_bytes().unwrap();
        assert_eq!(calculate_fingerprint(&wire), from_file);
    }
}
