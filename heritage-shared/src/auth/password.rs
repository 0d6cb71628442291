/// Password hashing with Argon2id
///
/// Hashes are stored in PHC string format, so parameters and salt travel with
/// the hash and verification needs nothing else.
///
/// - Memory: 64 MiB
/// - Iterations: 3
/// - Parallelism: 4 lanes
///
/// # Example
///
/// ```
/// use heritage_shared::auth::password::{hash_password, verify_password};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("Gr4ndma's-recipe")?;
/// assert!(verify_password("Gr4ndma's-recipe", &hash)?);
/// assert!(!verify_password("wrong", &hash)?);
/// # Ok(())
/// # }
/// ```

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, ParamsBuilder, Version,
};
use std::sync::OnceLock;

const MEMORY_COST_KIB: u32 = 65536;
const TIME_COST: u32 = 3;
const PARALLELISM: u32 = 4;

/// Minimum accepted password length, in characters
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Error type for password hashing operations
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashError(String),

    #[error("Failed to verify password: {0}")]
    VerifyError(String),

    #[error("Invalid password hash format: {0}")]
    InvalidHash(String),
}

fn hasher() -> Result<Argon2<'static>, PasswordError> {
    let params = ParamsBuilder::new()
        .m_cost(MEMORY_COST_KIB)
        .t_cost(TIME_COST)
        .p_cost(PARALLELISM)
        .output_len(32)
        .build()
        .map_err(|e| PasswordError::HashError(format!("Invalid parameters: {}", e)))?;

    Ok(Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params))
}

/// Hashes a password with a fresh random salt
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashError(e.to_string()))?;

    Ok(hash.to_string())
}

/// Checks a password against a stored PHC hash
///
/// `Ok(false)` means the password is wrong; `Err` means the hash itself is
/// unusable.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerifyError(e.to_string())),
    }
}

/// Hash of a throwaway password, computed once with the real parameters
fn dummy_hash() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| hash_password("not-a-real-account-password").ok())
        .as_deref()
}

/// Verifies against the account's hash, or a dummy one when there is no account
///
/// Both branches pay for one Argon2 verification, so response time does not
/// reveal whether an email is registered. No hash always yields `Ok(false)`.
pub fn verify_account_password(password: &str, hash: Option<&str>) -> Result<bool, PasswordError> {
    match hash {
        Some(hash) => verify_password(password, hash),
        None => {
            if let Some(dummy) = dummy_hash() {
                verify_password(password, dummy)?;
            }
            Ok(false)
        }
    }
}

/// Rejects weak passwords
///
/// Requires at least [`MIN_PASSWORD_LENGTH`] characters with an uppercase
/// letter, a lowercase letter, a digit and a non-alphanumeric character.
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        ));
    }

    let checks: [(fn(char) -> bool, &str); 4] = [
        (char::is_uppercase, "Password must contain at least one uppercase letter"),
        (char::is_lowercase, "Password must contain at least one lowercase letter"),
        (char::is_numeric, "Password must contain at least one digit"),
        (|c| !c.is_alphanumeric(), "Password must contain at least one special character"),
    ];

    for (check, message) in checks {
        if !password.chars().any(check) {
            return Err(message.to_string());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password_format() {
        let hash = hash_password("Heirloom#1").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hash.contains("v=19"));
        assert!(hash.contains("m=65536"));
        assert!(hash.contains("t=3"));
        assert!(hash.contains("p=4"));
    }

    #[test]
    fn test_same_password_different_salts() {
        let first = hash_password("Heirloom#1").unwrap();
        let second = hash_password("Heirloom#1").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_verify_password() {
        let hash = hash_password("Heirloom#1").unwrap();

        assert!(verify_password("Heirloom#1", &hash).unwrap());
        assert!(!verify_password("heirloom#1", &hash).unwrap());
        assert!(!verify_password("", &hash).unwrap());
    }

    #[test]
    fn test_verify_password_rejects_garbage_hash() {
        assert!(matches!(
            verify_password("x", "not-a-hash"),
            Err(PasswordError::InvalidHash(_))
        ));
    }

    #[test]
    fn test_unicode_password_roundtrip() {
        let password = "Tạo-Mật-Khẩu-9";
        let hash = hash_password(password).unwrap();
        assert!(verify_password(password, &hash).unwrap());
    }

    #[test]
    fn test_strength_accepts_strong_passwords() {
        for password in ["MyP@ssw0rd!", "Str0ng!Pass", "S3cur3$Family"] {
            assert!(validate_password_strength(password).is_ok(), "{}", password);
        }
    }

    #[test]
    fn test_strength_rejections() {
        let cases = [
            ("Sh0rt!", "at least 8 characters"),
            ("lowercase1!", "uppercase letter"),
            ("UPPERCASE1!", "lowercase letter"),
            ("NoDigits!!", "digit"),
            ("NoSpecial123", "special character"),
        ];

        for (password, expected) in cases {
            let err = validate_password_strength(password).unwrap_err();
            assert!(err.contains(expected), "{}: {}", password, err);
        }
    }

    #[test]
    fn test_unknown_account_runs_a_verification() {
        assert!(dummy_hash().is_some_and(|h| h.starts_with("$argon2id$")));

        // Even the dummy's own password must not log anyone in
        assert!(!verify_account_password("not-a-real-account-password", None).unwrap());
        assert!(!verify_account_password("Heirloom#1", None).unwrap());

        let hash = hash_password("Heirloom#1").unwrap();
        assert!(verify_account_password("Heirloom#1", Some(&hash)).unwrap());
        assert!(!verify_account_password("Heirloom#2", Some(&hash)).unwrap());
    }
}
