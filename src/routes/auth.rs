use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::Principal;
use crate::db::users::{ensure_identity_available, fetch_user, fetch_user_by_email};
use crate::errors::{AppError, AppResult};
use crate::models::user::{
    AuthResponse, ChangePasswordRequest, LoginRequest, ProfileUpdateRequest, RegisterRequest, Role, User,
    NAME_MAX, USERNAME_MAX, USERNAME_MIN,
};
use crate::response::{ApiJson, ApiResponse};
use crate::utils::{hash_password, normalize_email, required_text, utc_now, verify_password};

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 400, description = "Validation failed or username/email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<AuthResponse>>)> {
    let username = validate_username(&payload.username)?;
    let name = required_text(&payload.name, "Name", NAME_MAX)?;
    let email = normalize_email(&payload.email)?;
    let password_hash = hash_password(&payload.password)?;

    ensure_identity_available(&state.pool, Some(&username), Some(&email), None).await?;

    let now = utc_now();
    let user_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO users (id, username, name, email, password_hash, role, avatar, is_active, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, NULL, 1, ?, ?)",
    )
    .bind(user_id)
    .bind(&username)
    .bind(&name)
    .bind(&email)
    .bind(password_hash)
    .bind(Role::Developer.as_str())
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let user: User = fetch_user(&state.pool, user_id).await?.try_into()?;
    let token = state.jwt.encode(user.id)?;

    tracing::info!(user_id = %user.id, username = %user.username, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(AuthResponse { token, user }).with_message("User registered successfully")),
    ))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials or deactivated account")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> AppResult<Json<ApiResponse<AuthResponse>>> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::bad_request("Please provide email and password"));
    }

    let email = payload.email.trim().to_lowercase();
    let db_user = fetch_user_by_email(&state.pool, &email)
        .await?
        .ok_or_else(|| AppError::unauthorized("Invalid credentials"))?;

    if !verify_password(&payload.password, &db_user.password_hash)? {
        return Err(AppError::unauthorized("Invalid credentials"));
    }

    if !db_user.is_active {
        return Err(AppError::unauthorized("Account is deactivated"));
    }

    let token = state.jwt.encode(db_user.id)?;
    let user: User = db_user.try_into()?;

    Ok(Json(
        ApiResponse::ok(AuthResponse { token, user }).with_message("Login successful"),
    ))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Current user", body = User))
)]
pub async fn me(State(state): State<AppState>, principal: Principal) -> AppResult<Json<ApiResponse<User>>> {
    let user: User = fetch_user(&state.pool, principal.id).await?.try_into()?;
    Ok(Json(ApiResponse::ok(user)))
}

#[utoipa::path(
    put,
    path = "/api/auth/profile",
    tag = "Auth",
    request_body = ProfileUpdateRequest,
    responses((status = 200, description = "Profile updated", body = User))
)]
pub async fn update_profile(
    State(state): State<AppState>,
    principal: Principal,
    ApiJson(payload): ApiJson<ProfileUpdateRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    let user = apply_profile_changes(&state, principal.id, payload).await?;
    Ok(Json(ApiResponse::ok(user).with_message("Profile updated successfully")))
}

#[utoipa::path(
    put,
    path = "/api/auth/change-password",
    tag = "Auth",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Current password is incorrect or new password too short")
    )
)]
pub async fn change_password(
    State(state): State<AppState>,
    principal: Principal,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    if payload.current_password.is_empty() || payload.new_password.is_empty() {
        return Err(AppError::bad_request("Please provide current and new password"));
    }

    let db_user = fetch_user(&state.pool, principal.id).await?;
    if !verify_password(&payload.current_password, &db_user.password_hash)? {
        return Err(AppError::bad_request("Current password is incorrect"));
    }

    let password_hash = hash_password(&payload.new_password)?;
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(utc_now())
        .bind(principal.id)
        .execute(&state.pool)
        .await?;

    tracing::info!(user_id = %principal.id, "password changed");

    Ok(Json(
        ApiResponse::ok(serde_json::Value::Null).with_message("Password changed successfully"),
    ))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Logout acknowledged"))
)]
pub async fn logout(_principal: Principal) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    Ok(Json(
        ApiResponse::ok(serde_json::Value::Null).with_message("Logged out successfully"),
    ))
}

pub(crate) fn validate_username(raw: &str) -> AppResult<String> {
    let username = raw.trim();
    let length = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&length) {
        return Err(AppError::bad_request(format!(
            "Username must be between {USERNAME_MIN} and {USERNAME_MAX} characters"
        )));
    }
    Ok(username.to_string())
}

/// Shared by the self-service profile endpoint and the user update endpoint.
pub(crate) async fn apply_profile_changes(
    state: &AppState,
    user_id: Uuid,
    payload: ProfileUpdateRequest,
) -> AppResult<User> {
    let current = fetch_user(&state.pool, user_id).await?;

    let username = payload.username.as_deref().map(validate_username).transpose()?;
    let name = payload
        .name
        .as_deref()
        .map(|name| required_text(name, "Name", NAME_MAX))
        .transpose()?;
    let email = payload.email.as_deref().map(normalize_email).transpose()?;

    ensure_identity_available(&state.pool, username.as_deref(), email.as_deref(), Some(user_id)).await?;

    sqlx::query("UPDATE users SET username = ?, name = ?, email = ?, avatar = ?, updated_at = ? WHERE id = ?")
        .bind(username.unwrap_or(current.username))
        .bind(name.unwrap_or(current.name))
        .bind(email.unwrap_or(current.email))
        .bind(payload.avatar.or(current.avatar))
        .bind(utc_now())
        .bind(user_id)
        .execute(&state.pool)
        .await?;

    fetch_user(&state.pool, user_id).await?.try_into()
}
