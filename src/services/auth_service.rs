use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use rand::RngCore;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, Set, TransactionTrait,
    ActiveValue::NotSet,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::auth::{
        AuthResponse, ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest,
        ResetTokenResponse,
    },
    entity::{
        carts,
        password_reset_tokens::{
            ActiveModel as ResetTokenActive, Column as ResetTokenCol, Entity as ResetTokens,
        },
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, UserRole},
    },
    error::{AppError, AppResult},
    response::ApiResponse,
    state::AppState,
};

/// Reset tokens are valid for one hour from issue.
const RESET_TOKEN_TTL_HOURS: i64 = 1;

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

fn verify_password(password: &str, stored_hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(stored_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub async fn register(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<AuthResponse>> {
    let txn = state.orm.begin().await?;

    let exist = Users::find()
        .filter(
            Condition::any()
                .add(UserCol::Email.eq(payload.email.as_str()))
                .add(UserCol::Phone.eq(payload.phone.as_str())),
        )
        .one(&txn)
        .await?;
    if exist.is_some() {
        return Err(AppError::Conflict(
            "Email or phone is already registered".into(),
        ));
    }

    // Hashing happens here, explicitly, never in a persistence hook.
    let password_hash = hash_password(&payload.password)?;

    let user = UserActive {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name),
        email: Set(payload.email),
        phone: Set(payload.phone),
        password_hash: Set(password_hash),
        role: Set(payload.role.unwrap_or(UserRole::Customer)),
        address: Set(payload.address),
        city: Set(payload.city),
        state: Set(payload.state),
        pincode: Set(payload.pincode),
        dental_coins: Set(0),
        profile_image: Set(None),
        created_at: NotSet,
    }
    .insert(&txn)
    .await?;

    // Every user owns exactly one cart, created empty at registration.
    carts::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.id),
        total_items: Set(0),
        total_price: Set(Decimal::ZERO),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    let token = state.tokens.issue(user.id, user.role.clone())?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.id),
        "user_register",
        Some("users"),
        Some(serde_json::json!({ "user_id": user.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "User created",
        AuthResponse {
            token,
            user: user.into(),
        },
        None,
    ))
}

pub async fn login(
    state: &AppState,
    payload: LoginRequest,
    required_role: Option<UserRole>,
) -> AppResult<ApiResponse<AuthResponse>> {
    let user = Users::find()
        .filter(
            Condition::any()
                .add(UserCol::Email.eq(payload.email.as_str()))
                .add(UserCol::Phone.eq(payload.email.as_str())),
        )
        .one(&state.orm)
        .await?;

    let user = match user {
        Some(u) => u,
        None => return Err(AppError::Unauthorized("Invalid email".into())),
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(AppError::Unauthorized("Incorrect password".into()));
    }

    if let Some(role) = required_role {
        if user.role != role {
            return Err(AppError::Forbidden);
        }
    }

    let token = state.tokens.issue(user.id, user.role.clone())?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.id),
        "user_login",
        Some("users"),
        Some(serde_json::json!({ "user_id": user.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Logged in",
        AuthResponse {
            token,
            user: user.into(),
        },
        None,
    ))
}

pub async fn forgot_password(
    state: &AppState,
    payload: ForgotPasswordRequest,
) -> AppResult<ApiResponse<ResetTokenResponse>> {
    let user = Users::find()
        .filter(UserCol::Email.eq(payload.email.as_str()))
        .one(&state.orm)
        .await?;
    let user = match user {
        Some(u) => u,
        None => return Err(AppError::NotFound("User".into())),
    };

    let token = generate_reset_token();
    let expires_at = Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS);

    ResetTokenActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.id),
        token: Set(token.clone()),
        expires_at: Set(expires_at.into()),
        used: Set(false),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    tracing::info!(user_id = %user.id, "password reset token issued");

    Ok(ApiResponse::success(
        "Reset token issued",
        ResetTokenResponse { token },
        None,
    ))
}

pub async fn reset_password(
    state: &AppState,
    token: &str,
    payload: ResetPasswordRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let txn = state.orm.begin().await?;

    let record = ResetTokens::find()
        .filter(ResetTokenCol::Token.eq(token))
        .one(&txn)
        .await?;
    let record = match record {
        Some(r) => r,
        None => return Err(AppError::InvalidToken),
    };

    // Single use and time boxed; the caller cannot tell which check failed.
    if record.used || record.expires_at < Utc::now() {
        return Err(AppError::InvalidToken);
    }

    let user = Users::find_by_id(record.user_id).one(&txn).await?;
    let user = match user {
        Some(u) => u,
        None => return Err(AppError::InvalidToken),
    };

    let password_hash = hash_password(&payload.password)?;

    let mut user_active: UserActive = user.into();
    user_active.password_hash = Set(password_hash);
    let user = user_active.update(&txn).await?;

    let mut token_active: ResetTokenActive = record.into();
    token_active.used = Set(true);
    token_active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.id),
        "password_reset",
        Some("users"),
        Some(serde_json::json!({ "user_id": user.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Password updated",
        serde_json::json!({}),
        None,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_tokens_are_64_hex_chars() {
        let token = generate_reset_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_reset_token());
    }

    #[test]
    fn password_hash_verifies_and_rejects() {
        let hash = hash_password("hunter2").unwrap();
        assert!(!hash.contains("hunter2"));
        assert!(verify_password("hunter2", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }
}
