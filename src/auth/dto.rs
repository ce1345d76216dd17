use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo::User;

/// Request body for registration; re-registering an unverified email
/// resends the code and overwrites the pending account.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

/// What the presented code is for. Absent means signup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyPurpose {
    #[default]
    Signup,
    Reset,
}

#[derive(Debug, Deserialize)]
pub struct VerificationRequest {
    pub email: String,
    pub code: String,
    #[serde(rename = "type", default)]
    pub purpose: VerifyPurpose,
}

/// Password-grant login form (`username` carries the email).
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PasswordChangeRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct NewPassword {
    pub new_password: String,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Partial profile update. The outer `Option` tracks field presence: an
/// absent field leaves the stored value untouched, while an explicit null
/// clears it.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default, deserialize_with = "double_option")]
    pub name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub voice_preference: Option<Option<String>>,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub is_verified: bool,
    pub voice_preference: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            is_verified: user.is_verified,
            voice_preference: user.voice_preference,
            created_at: user.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_purpose_defaults_to_signup() {
        let req: VerificationRequest =
            serde_json::from_str(r#"{"email":"a@b.c","code":"123456"}"#).unwrap();
        assert_eq!(req.purpose, VerifyPurpose::Signup);

        let req: VerificationRequest =
            serde_json::from_str(r#"{"email":"a@b.c","code":"123456","type":"reset"}"#).unwrap();
        assert_eq!(req.purpose, VerifyPurpose::Reset);

        let req: VerificationRequest =
            serde_json::from_str(r#"{"email":"a@b.c","code":"123456","type":"signup"}"#).unwrap();
        assert_eq!(req.purpose, VerifyPurpose::Signup);
    }

    #[test]
    fn profile_update_tracks_field_presence() {
        let req: UpdateProfileRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.name, None);
        assert_eq!(req.voice_preference, None);

        let req: UpdateProfileRequest = serde_json::from_str(r#"{"name":"X"}"#).unwrap();
        assert_eq!(req.name, Some(Some("X".into())));
        assert_eq!(req.voice_preference, None);

        let req: UpdateProfileRequest = serde_json::from_str(r#"{"name":null}"#).unwrap();
        assert_eq!(req.name, Some(None));
        assert_eq!(req.voice_preference, None);

        let req: UpdateProfileRequest =
            serde_json::from_str(r#"{"voice_preference":"male_uk"}"#).unwrap();
        assert_eq!(req.name, None);
        assert_eq!(req.voice_preference, Some(Some("male_uk".into())));
    }

    #[test]
    fn user_response_hides_password_hash() {
        let user = User {
            id: Uuid::new_v4(),
            email: "test@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            name: Some("Test".into()),
            is_verified: true,
            verification_code: None,
            code_expires_at: None,
            voice_preference: Some("female_us".into()),
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        let json = serde_json::to_string(&UserResponse::from(user)).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(json.contains("is_verified"));
        assert!(!json.contains("argon2id"));
    }
}
