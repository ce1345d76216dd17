use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};

use crate::auth::repo::User;
use crate::config::JwtConfig;
use crate::error::ApiError;
use crate::state::AppState;

/// Restriction embedded in a token limiting it to one purpose.
/// Full-access tokens carry no scope at all.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenScope {
    PasswordReset,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user email
    pub exp: usize,
    pub iat: usize,
    pub iss: String,
    pub aud: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<TokenScope>,
}

#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub reset_ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
            access_ttl_minutes,
            reset_ttl_minutes,
        } = state.config.jwt.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            access_ttl: Duration::from_secs((access_ttl_minutes as u64) * 60),
            reset_ttl: Duration::from_secs((reset_ttl_minutes as u64) * 60),
        }
    }
}

impl JwtKeys {
    fn sign_with_scope(
        &self,
        email: &str,
        scope: Option<TokenScope>,
        ttl: Duration,
    ) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: email.to_string(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            scope,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(email = %email, scope = ?scope, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, email: &str) -> anyhow::Result<String> {
        self.sign_with_scope(email, None, self.access_ttl)
    }

    pub fn sign_reset(&self, email: &str) -> anyhow::Result<String> {
        self.sign_with_scope(email, Some(TokenScope::PasswordReset), self.reset_ttl)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(email = %data.claims.sub, scope = ?data.claims.scope, "jwt verified");
        Ok(data.claims)
    }
}

fn bearer_claims(parts: &Parts, state: &AppState) -> Result<Claims, ApiError> {
    let auth_header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".into()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header".into()))?;

    let keys = JwtKeys::from_ref(state);
    keys.verify(token).map_err(|_| {
        warn!("invalid or expired token");
        ApiError::Unauthorized("Invalid or expired token".into())
    })
}

/// Extractor for verified-account endpoints: validates the bearer token,
/// loads the user and rejects unverified accounts.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let claims = bearer_claims(parts, state)?;
        if claims.scope.is_some() {
            return Err(ApiError::Unauthorized("Access token required".into()));
        }

        let user = User::find_by_email(&state.db, &claims.sub)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Could not validate credentials".into()))?;

        if !user.is_verified {
            return Err(ApiError::Forbidden("Account is not verified".into()));
        }

        Ok(CurrentUser(user))
    }
}

/// Extractor for the password-reset confirmation endpoint: only tokens
/// scoped to `password_reset` are accepted, verified or not.
pub struct ResetUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for ResetUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let credentials_error = || {
            ApiError::Unauthorized("Could not validate credentials for password reset".into())
        };

        let claims = bearer_claims(parts, state)?;
        if claims.scope != Some(TokenScope::PasswordReset) {
            return Err(credentials_error());
        }

        let user = User::find_by_email(&state.db, &claims.sub)
            .await?
            .ok_or_else(credentials_error)?;

        Ok(ResetUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys() -> JwtKeys {
        let state = AppState::fake();
        JwtKeys::from_ref(&state)
    }

    #[tokio::test]
    async fn sign_and_verify_access_token() {
        let keys = make_keys();
        let token = keys.sign_access("user@example.com").expect("sign access");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, "user@example.com");
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.scope, None);
    }

    #[tokio::test]
    async fn reset_token_carries_password_reset_scope() {
        let keys = make_keys();
        let token = keys.sign_reset("user@example.com").expect("sign reset");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.scope, Some(TokenScope::PasswordReset));
    }

    #[tokio::test]
    async fn reset_token_expires_sooner_than_access_token() {
        let keys = make_keys();
        let access = keys
            .verify(&keys.sign_access("u@e.com").unwrap())
            .unwrap();
        let reset = keys.verify(&keys.sign_reset("u@e.com").unwrap()).unwrap();
        assert!(reset.exp < access.exp);
    }

    #[tokio::test]
    async fn verify_rejects_wrong_issuer_or_audience() {
        let good = make_keys();
        let mut bad = make_keys();
        bad.issuer = "someone-else".into();
        let token = good.sign_access("u@e.com").expect("sign access");
        assert!(bad.verify(&token).is_err());
    }

    #[test]
    fn scope_is_omitted_from_full_access_claims() {
        let claims = Claims {
            sub: "u@e.com".into(),
            exp: 2,
            iat: 1,
            iss: "i".into(),
            aud: "a".into(),
            scope: None,
        };
        let value = serde_json::to_value(&claims).unwrap();
        assert!(value.get("scope").is_none());

        let claims = Claims {
            scope: Some(TokenScope::PasswordReset),
            ..claims
        };
        let value = serde_json::to_value(&claims).unwrap();
        assert_eq!(value["scope"], "password_reset");
    }
}
