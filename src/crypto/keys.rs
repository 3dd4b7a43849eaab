//! Password hashing with PBKDF2-SHA256.
//!
//! Stored form: `pbkdf2-sha256$<iterations>$<salt>$<hash>`, salt and hash
//! in unpadded standard base64. The iteration count travels with the hash
//! so it can be raised without invalidating existing accounts.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use super::CryptoError;

pub const PBKDF2_ITERATIONS: u32 = if cfg!(test) { 1_000 } else { 600_000 };
pub const KEY_LENGTH: usize = 32;
pub const SALT_LENGTH: usize = 16;
const SCHEME: &str = "pbkdf2-sha256";

/// Derived password key, zeroed on drop
#[derive(Zeroize)]
#[zeroize(drop)]
struct DerivedKey {
    bytes: [u8; KEY_LENGTH],
}

impl DerivedKey {
    fn derive(password: &str, salt: &[u8], iterations: u32) -> Self {
        let mut bytes = [0u8; KEY_LENGTH];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut bytes);
        Self { bytes }
    }
}

/// Generate a cryptographically random salt
pub fn generate_salt() -> [u8; SALT_LENGTH] {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

pub fn hash_password(password: &str) -> String {
    let salt = generate_salt();
    let key = DerivedKey::derive(password, &salt, PBKDF2_ITERATIONS);
    format!(
        "{SCHEME}${PBKDF2_ITERATIONS}${}${}",
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(key.bytes)
    )
}

/// Check `password` against a stored hash in constant time.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, CryptoError> {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(expected), None) =
        (parts.next(), parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(CryptoError::MalformedHash);
    };
    if scheme != SCHEME {
        return Err(CryptoError::UnsupportedScheme(scheme.to_string()));
    }
    let iterations: u32 = iterations.parse().map_err(|_| CryptoError::MalformedHash)?;
    let salt = STANDARD_NO_PAD.decode(salt).map_err(|_| CryptoError::MalformedHash)?;
    let mut expected = STANDARD_NO_PAD
        .decode(expected)
        .map_err(|_| CryptoError::MalformedHash)?;
    if iterations == 0 || expected.len() != KEY_LENGTH {
        return Err(CryptoError::MalformedHash);
    }

    let key = DerivedKey::derive(password, &salt, iterations);
    let matches: bool = key.bytes[..].ct_eq(&expected[..]).into();
    expected.zeroize();
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let stored = hash_password("correct horse battery");
        assert!(stored.starts_with("pbkdf2-sha256$"));
        assert!(verify_password("correct horse battery", &stored).unwrap());
        assert!(!verify_password("correct horse battery!", &stored).unwrap());
    }

    #[test]
    fn same_password_different_salt() {
        assert_ne!(hash_password("s3cret-passphrase"), hash_password("s3cret-passphrase"));
    }

    #[test]
    fn malformed_hashes_rejected() {
        assert!(matches!(verify_password("x", "garbage"), Err(CryptoError::MalformedHash)));
        assert!(matches!(
            verify_password("x", "bcrypt$10$abc$def"),
            Err(CryptoError::UnsupportedScheme(_))
        ));
        assert!(verify_password("x", "pbkdf2-sha256$0$AAAA$AAAA").is_err());
        assert!(verify_password("x", "pbkdf2-sha256$1000$AAAA$AAAA").is_err());
    }

    #[test]
    fn generate_salt_is_random() {
        assert_ne!(generate_salt(), generate_salt());
    }
}
