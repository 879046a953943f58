use argon2::{
    Argon2,
    password_hash::{
        self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};

/// Argon2id PHC string for a roster password cell.
pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);

    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// `Ok(false)` on mismatch; `Err` only when `hashed` is not a PHC string.
pub fn verify_password(password: &str, hashed: &str) -> Result<bool, password_hash::Error> {
    let parsed = PasswordHash::new(hashed)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hashed = hash_password("rahasia123").unwrap();
        assert!(hashed.starts_with("$argon2id$"));
        assert!(verify_password("rahasia123", &hashed).unwrap());
        assert!(!verify_password("rahasia124", &hashed).unwrap());
    }

    #[test]
    fn plaintext_cell_is_an_error() {
        assert!(verify_password("rahasia123", "rahasia123").is_err());
    }
}
