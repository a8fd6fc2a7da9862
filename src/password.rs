//! Password utilities

use argon2::Argon2;
use argon2::password_hash::PasswordHash;
use argon2::password_hash::PasswordHasher;
use argon2::password_hash::PasswordVerifier;
use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use thiserror::Error;

/// Password hashing errors
#[derive(Debug, Error)]
pub enum Error {
    /// The password could not be hashed
    #[error("Could not hash password: {0}")]
    Hash(String),

    /// The stored hash is not a valid PHC string
    #[error("Invalid password hash: {0}")]
    InvalidHash(String),
}

/// Generate a new random secret
pub fn generate() -> String {
    SaltString::generate(&mut OsRng).to_string()
}

/// Hash a given password
///
/// Argon2id with a random salt, the result is a PHC string
pub fn hash(password: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hashed_password| hashed_password.to_string())
        .map_err(|err| Error::Hash(err.to_string()))
}

/// Verify a given password against a given hash
pub fn verify(hashed_password: &str, password: &str) -> Result<bool, Error> {
    let parsed_hash =
        PasswordHash::new(hashed_password).map_err(|err| Error::InvalidHash(err.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hashed_password = hash("verysecret").unwrap();

        assert_ne!("verysecret", hashed_password);
        assert!(hashed_password.starts_with("$argon2"));
        assert!(verify(&hashed_password, "verysecret").unwrap());
        assert!(!verify(&hashed_password, "notsosecret").unwrap());
    }

    #[test]
    fn test_hash_is_salted() {
        assert_ne!(hash("verysecret").unwrap(), hash("verysecret").unwrap());
    }

    #[test]
    fn test_verify_invalid_hash() {
        assert!(verify("plaintext", "plaintext").is_err());
    }
}
