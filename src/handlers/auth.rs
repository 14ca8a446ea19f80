use crate::auth::{issue_session, revoke_session, revoke_user_sessions, verify_password, AuthUser};
use crate::db::now_unix;
use crate::errors::{AppError, AppResult};
use crate::models::{
    ChangePasswordRequest, Client, LoginRequest, LoginResponse, MobileLoginRequest, User,
};
use crate::state::AppState;
use crate::store::users;
use axum::{extract::State, http::StatusCode, Json};
use tracing::{info, warn};

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    authenticate(&state, &payload.email, &payload.password, Client::Web)
        .await
        .map(Json)
}

pub async fn mobile_login(
    State(state): State<AppState>,
    Json(payload): Json<MobileLoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    authenticate(&state, &payload.login, &payload.password, Client::Mobile)
        .await
        .map(Json)
}

async fn authenticate(
    state: &AppState,
    login: &str,
    password: &str,
    client: Client,
) -> AppResult<LoginResponse> {
    let conn = state.db.lock().await;
    let user = match users::find_login(&conn, login)? {
        Some((user, hash)) if user.active && verify_password(password, &hash) => user,
        _ => {
            warn!(client = client.as_str(), "failed sign-in attempt");
            return Err(AppError::unauthorized("invalid credentials"));
        }
    };

    let (allowed, ttl_secs) = match client {
        Client::Web => (
            user.role.is_staff(),
            state.config.web_session_hours.saturating_mul(3600),
        ),
        Client::Mobile => (
            !user.role.is_staff(),
            state.config.mobile_session_days.saturating_mul(86_400),
        ),
    };
    if !allowed {
        warn!(user_id = %user.id, client = client.as_str(), "sign-in from wrong client");
        return Err(AppError::forbidden(match client {
            Client::Web => "families sign in through the mobile app",
            Client::Mobile => "staff sign in through the web dashboard",
        }));
    }

    let (token, expires_at) = issue_session(&conn, &user.id, client, ttl_secs, now_unix())?;
    info!(user_id = %user.id, role = user.role.as_str(), client = client.as_str(), "signed in");
    Ok(LoginResponse {
        token,
        expires_at,
        user,
    })
}

pub async fn logout(State(state): State<AppState>, auth: AuthUser) -> AppResult<StatusCode> {
    let conn = state.db.lock().await;
    revoke_session(&conn, &auth.token)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(auth: AuthUser) -> Json<User> {
    Json(auth.user)
}

pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<StatusCode> {
    let conn = state.db.lock().await;
    let current = users::password_hash(&conn, auth.id())?;
    if !verify_password(&payload.current_password, &current) {
        return Err(AppError::unauthorized("current password is incorrect"));
    }
    users::set_password(&conn, auth.id(), &payload.new_password)?;
    revoke_user_sessions(&conn, auth.id(), Some(&auth.token))?;
    info!(user_id = %auth.id(), "password changed");
    Ok(StatusCode::NO_CONTENT)
}
