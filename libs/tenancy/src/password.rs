//! Password hashing for the accounts provisioning creates.

/// Hash a password for storage.
///
/// # Errors
/// Returns the underlying bcrypt error (e.g. on empty cost misuse).
pub fn hash_password(plain: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(plain, bcrypt::DEFAULT_COST)
}

/// Verify a password against a stored hash. Any verification failure counts
/// as a mismatch.
#[must_use]
pub fn verify_password(plain: &str, hashed: &str) -> bool {
    bcrypt::verify(plain, hashed).unwrap_or(false)
}
