use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;
use tracing::error;

use crate::error::ApiError;

const MINIMUM_LENGTH: usize = 6;
const REQUIRED_SPECIAL_CHARS: &str = "-_!@#$%^&*()+=[]{}|\\:;\"'<>,.?/~`";

/// Enforced on every password-setting path: registration, reset, change.
pub fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.is_empty() {
        return Err(ApiError::Validation(
            "Password field cannot be empty.".into(),
        ));
    }
    if password.chars().count() < MINIMUM_LENGTH {
        return Err(ApiError::Validation(format!(
            "Password must be at least {MINIMUM_LENGTH} characters long."
        )));
    }
    if !password.chars().any(|c| REQUIRED_SPECIAL_CHARS.contains(c)) {
        return Err(ApiError::Validation(
            "Password must contain at least one special character (-, _, !, @, #, $, %, etc.)."
                .into(),
        ));
    }
    Ok(())
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_of(err: ApiError) -> String {
        err.to_string()
    }

    #[test]
    fn empty_password_has_its_own_message() {
        let msg = message_of(validate_password("").unwrap_err());
        assert!(msg.contains("cannot be empty"));
    }

    #[test]
    fn short_passwords_rejected_with_length_message() {
        for pw in ["a", "ab!", "abcd!"] {
            let msg = message_of(validate_password(pw).unwrap_err());
            assert!(msg.contains("at least 6 characters"), "password {pw:?}");
        }
    }

    #[test]
    fn missing_special_character_rejected_with_special_message() {
        for pw in ["abcdef", "longpassword1", "OnlyLetters99"] {
            let msg = message_of(validate_password(pw).unwrap_err());
            assert!(msg.contains("special character"), "password {pw:?}");
        }
    }

    #[test]
    fn valid_passwords_accepted() {
        for pw in ["abc-de", "p@ssword", "hello!", "______", "a.b.c.d"] {
            assert!(validate_password(pw).is_ok(), "password {pw:?}");
        }
    }

    #[test]
    fn length_checked_before_special_characters() {
        // Five plain letters: too short AND missing a special char; length wins.
        let msg = message_of(validate_password("abcde").unwrap_err());
        assert!(msg.contains("at least 6 characters"));
    }

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(verify_password(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = "correct-horse-battery-staple";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = verify_password("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }
}
