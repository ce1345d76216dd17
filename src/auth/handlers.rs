use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{post, put},
    Form, Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            EmailRequest, LoginForm, MessageResponse, NewPassword, PasswordChangeRequest,
            RegisterRequest, TokenResponse, UpdateProfileRequest, UserResponse,
            VerificationRequest, VerifyPurpose,
        },
        jwt::{CurrentUser, JwtKeys, ResetUser},
        password::{hash_password, validate_password, verify_password},
        repo::User,
        services::{code_expiry, generate_verification_code, is_valid_email},
    },
    error::ApiError,
    mailer::{send_password_reset_email, send_verification_email, MailError},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/resend-verification", post(resend_verification))
        .route("/verify", post(verify))
        .route("/token", post(login))
        .route("/send-reset-code", post(send_reset_code))
        .route("/reset-password", post(reset_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users/me",
            axum::routing::get(get_me).put(update_me).delete(delete_me),
        )
        .route("/users/me/password", put(change_password))
}

/// Registration and resend emails are fire-and-forget: the account mutation
/// already committed and a lost email is recoverable via resend.
fn notify_verification_in_background(state: &AppState, email: String, code: String) {
    let mailer = state.mailer.clone();
    tokio::spawn(async move {
        if let Err(e) = send_verification_email(mailer.as_ref(), &email, &code).await {
            warn!(error = %e, email = %email, "background verification email failed");
        }
    });
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::Validation("Invalid email".into()));
    }
    validate_password(&payload.password)?;

    let code = generate_verification_code();
    let expires_at = code_expiry(OffsetDateTime::now_utc());

    if let Some(user) = User::find_by_email(&state.db, &payload.email).await? {
        if user.is_verified {
            warn!(email = %payload.email, "register conflict with verified account");
            return Err(ApiError::Conflict(
                "User with this email already exists and is verified. Please log in instead."
                    .into(),
            ));
        }
        // Abandoned signup: the latest registration attempt wins.
        let hash = hash_password(&payload.password)?;
        User::refresh_pending(
            &state.db,
            user.id,
            payload.name.as_deref(),
            &hash,
            &code,
            expires_at,
        )
        .await?;
        notify_verification_in_background(&state, payload.email.clone(), code);
        info!(email = %payload.email, "pending registration refreshed");
        return Ok((
            StatusCode::CREATED,
            Json(MessageResponse::new("Verification code sent.")),
        ));
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create_unverified(
        &state.db,
        &payload.email,
        &hash,
        payload.name.as_deref(),
        &code,
        expires_at,
    )
    .await?;
    notify_verification_in_background(&state, payload.email.clone(), code);

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Verification code sent.")),
    ))
}

#[instrument(skip(state, payload))]
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(mut payload): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    let user = User::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or_else(|| ApiError::NotFound("Account not found.".into()))?;

    if user.is_verified {
        return Err(ApiError::Validation("Account is already verified.".into()));
    }

    let code = generate_verification_code();
    User::refresh_code(
        &state.db,
        user.id,
        &code,
        code_expiry(OffsetDateTime::now_utc()),
    )
    .await?;
    notify_verification_in_background(&state, payload.email.clone(), code);

    info!(email = %payload.email, "verification code reissued");
    Ok(Json(MessageResponse::new("New verification code sent.")))
}

#[instrument(skip(state, payload))]
pub async fn verify(
    State(state): State<AppState>,
    Json(mut payload): Json<VerificationRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();
    let now = OffsetDateTime::now_utc();

    let user = User::find_by_email(&state.db, &payload.email).await?;
    let keys = JwtKeys::from_ref(&state);

    match payload.purpose {
        VerifyPurpose::Reset => {
            let user = user
                .filter(|u| u.code_matches(&payload.code, now))
                .ok_or_else(|| {
                    warn!(email = %payload.email, "reset code check failed");
                    ApiError::Validation("Invalid or expired verification code.".into())
                })?;
            // The code stays valid here; it is consumed when the password is
            // actually reset, so the short-lived scoped token gates the window.
            let token = keys.sign_reset(&user.email)?;
            info!(email = %user.email, "password reset token issued");
            Ok(Json(TokenResponse::bearer(token)))
        }
        VerifyPurpose::Signup => {
            let user = user
                .filter(|u| u.code_matches(&payload.code, now))
                .ok_or_else(|| {
                    warn!(email = %payload.email, "signup verification failed");
                    ApiError::Validation("Invalid email or verification code.".into())
                })?;
            User::mark_verified(&state.db, user.id).await?;
            let token = keys.sign_access(&user.email)?;
            info!(email = %user.email, "account verified");
            Ok(Json(TokenResponse::bearer(token)))
        }
    }
}

#[instrument(skip(state, form))]
pub async fn login(
    State(state): State<AppState>,
    Form(mut form): Form<LoginForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    form.username = form.username.trim().to_lowercase();

    let Some(user) = User::find_by_email(&state.db, &form.username).await? else {
        warn!(email = %form.username, "login unknown email");
        return Err(ApiError::Unauthorized("Incorrect email or password".into()));
    };

    if !verify_password(&form.password, &user.password_hash)? {
        warn!(email = %form.username, user_id = %user.id, "login invalid password");
        return Err(ApiError::Unauthorized("Incorrect email or password".into()));
    }

    if !user.is_verified {
        return Err(ApiError::Forbidden("Please verify your email first.".into()));
    }

    let token = JwtKeys::from_ref(&state).sign_access(&user.email)?;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(TokenResponse::bearer(token)))
}

#[instrument(skip(state, payload))]
pub async fn send_reset_code(
    State(state): State<AppState>,
    Json(mut payload): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    let user = User::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or_else(|| ApiError::NotFound("Account with this email does not exist.".into()))?;

    let code = generate_verification_code();
    User::refresh_code(
        &state.db,
        user.id,
        &code,
        code_expiry(OffsetDateTime::now_utc()),
    )
    .await?;

    // Unlike registration, this send is awaited: the caller needs to know
    // whether the reset code actually went out.
    send_password_reset_email(state.mailer.as_ref(), &user.email, &code)
        .await
        .map_err(|e| match e {
            MailError::Timeout => {
                ApiError::UpstreamTimeout("Email service timed out. Please try again.".into())
            }
            MailError::Transport(msg) => {
                warn!(error = %msg, email = %user.email, "password reset email failed");
                ApiError::Upstream(
                    "Failed to send password reset email. Please try again later.".into(),
                )
            }
        })?;

    info!(email = %user.email, "password reset code sent");
    Ok(Json(MessageResponse::new(
        "Password reset code sent successfully.",
    )))
}

#[instrument(skip(state, user, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    ResetUser(user): ResetUser,
    Json(payload): Json<NewPassword>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate_password(&payload.new_password)?;

    let hash = hash_password(&payload.new_password)?;
    User::set_password(&state.db, user.id, &hash).await?;

    info!(user_id = %user.id, "password reset completed");
    Ok(Json(MessageResponse::new(
        "Your password has been successfully reset.",
    )))
}

#[instrument(skip(user))]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

#[instrument(skip(state, user, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    // Absent fields keep their stored value; explicit nulls clear it.
    let name = match payload.name {
        Some(value) => value,
        None => user.name.clone(),
    };
    let voice_preference = match payload.voice_preference {
        Some(value) => value,
        None => user.voice_preference.clone(),
    };

    let updated = User::apply_profile(
        &state.db,
        user.id,
        name.as_deref(),
        voice_preference.as_deref(),
    )
    .await?;

    info!(user_id = %user.id, "profile updated");
    Ok(Json(UserResponse::from(updated)))
}

#[instrument(skip(state, user))]
pub async fn delete_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<MessageResponse>, ApiError> {
    User::delete(&state.db, user.id).await?;
    info!(user_id = %user.id, "account deleted");
    Ok(Json(MessageResponse::new("Account deleted successfully")))
}

#[instrument(skip(state, user, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<PasswordChangeRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !verify_password(&payload.current_password, &user.password_hash)? {
        return Err(ApiError::Validation(
            "Current password is incorrect".into(),
        ));
    }
    validate_password(&payload.new_password)?;

    let hash = hash_password(&payload.new_password)?;
    User::set_password(&state.db, user.id, &hash).await?;

    info!(user_id = %user.id, "password changed");
    Ok(Json(MessageResponse::new("Password updated successfully")))
}
