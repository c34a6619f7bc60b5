//! Server-side password hardening
//!
//! Clients never send a raw password. They submit `"<derived>:<clientSalt>"`,
//! where `derived` is produced client-side. The server runs the whole string
//! through Argon2id with its own random salt and stores
//! `"<serverHash>:<clientSalt>:<serverSalt>"` (hash and server salt base64).
//! The client salt is handed back unauthenticated so clients can re-derive.

use argon2::Argon2;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};

/// Server salt length in bytes
pub const SERVER_SALT_LEN: usize = 32;

const HASH_LEN: usize = 32;

/// Harden a client-submitted password with a fresh server salt.
pub fn hash_password(password: &str) -> Result<String> {
    let mut salt = [0u8; SERVER_SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    hash_with_salt_bytes(password, &salt)
}

/// Harden a client-submitted password with a known base64 server salt.
pub fn hash_password_with_salt(password: &str, salt_b64: &str) -> Result<String> {
    let salt = STANDARD
        .decode(salt_b64)
        .map_err(|_| Error::validation("Invalid password salt"))?;
    hash_with_salt_bytes(password, &salt)
}

/// Check a client-submitted password against a stored hash.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split(':');
    let (Some(stored_hash), Some(_client_salt), Some(server_salt), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    let Ok(expected) = STANDARD.decode(stored_hash) else {
        return false;
    };
    let Ok(salt) = STANDARD.decode(server_salt) else {
        return false;
    };
    let Ok(actual) = derive(password, &salt) else {
        return false;
    };

    actual.ct_eq(expected.as_slice()).into()
}

/// The client salt portion of a stored password.
pub fn client_salt(stored: &str) -> Option<&str> {
    stored.split(':').nth(1)
}

fn hash_with_salt_bytes(password: &str, salt: &[u8]) -> Result<String> {
    let client_salt = password.split(':').nth(1).unwrap_or_default();
    let hash = derive(password, salt)?;
    Ok(format!(
        "{}:{}:{}",
        STANDARD.encode(hash),
        client_salt,
        STANDARD.encode(salt)
    ))
}

fn derive(password: &str, salt: &[u8]) -> Result<Vec<u8>> {
    let mut output = vec![0u8; HASH_LEN];
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut output)
        .map_err(|e| Error::Internal(format!("password hash failed: {}", e)))?;
    Ok(output)
}
