use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use time::{Duration, OffsetDateTime};

/// Verification and reset codes share one lifetime.
pub const CODE_TTL_MINUTES: i64 = 15;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// 6-digit zero-padded code, uniform over the full 000000-999999 range.
/// Collisions across users are tolerated; codes are only matched per email.
pub fn generate_verification_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..=999_999);
    format!("{n:06}")
}

pub fn code_expiry(now: OffsetDateTime) -> OffsetDateTime {
    now + Duration::minutes(CODE_TTL_MINUTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_regex_accepts_plausible_addresses() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("a.b+c@sub.domain.org"));
    }

    #[test]
    fn email_regex_rejects_junk() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("spaces in@example.com"));
        assert!(!is_valid_email("user@nodot"));
    }

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..100 {
            let code = generate_verification_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn code_expiry_is_fifteen_minutes_out() {
        let now = OffsetDateTime::UNIX_EPOCH;
        assert_eq!(code_expiry(now) - now, Duration::minutes(15));
    }
}
