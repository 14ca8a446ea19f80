use crate::errors::{AppError, AppResult};
use crate::models::{Client, Role, User};
use crate::state::AppState;
use crate::store::users;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use rand_core::{OsRng, RngCore};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use tracing::warn;

pub const MIN_PASSWORD_LEN: usize = 8;
const TOKEN_BYTES: usize = 32;

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(AppError::internal)
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

pub fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Returns the bearer token; only its hash is stored.
pub fn issue_session(
    conn: &Connection,
    user_id: &str,
    client: Client,
    ttl_secs: i64,
    now: i64,
) -> AppResult<(String, i64)> {
    conn.execute(
        "DELETE FROM sessions WHERE user_id = ? AND expires_at <= ?",
        params![user_id, now],
    )?;

    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let token = hex::encode(bytes);
    let expires_at = now.saturating_add(ttl_secs);
    conn.execute(
        "INSERT INTO sessions(token_hash, user_id, client, created_at, expires_at)
         VALUES (?, ?, ?, ?, ?)",
        params![hash_token(&token), user_id, client, now, expires_at],
    )?;
    Ok((token, expires_at))
}

pub fn resolve_session(conn: &Connection, token: &str, now: i64) -> AppResult<User> {
    let session: Option<(String, i64)> = conn
        .query_row(
            "SELECT user_id, expires_at FROM sessions WHERE token_hash = ?",
            [hash_token(token)],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;

    let Some((user_id, expires_at)) = session else {
        return Err(AppError::unauthorized("invalid session"));
    };
    if expires_at <= now {
        return Err(AppError::unauthorized("session expired"));
    }

    let user = users::find_user(conn, &user_id)?;
    if !user.active {
        return Err(AppError::unauthorized("account disabled"));
    }
    Ok(user)
}

pub fn revoke_session(conn: &Connection, token: &str) -> AppResult<()> {
    conn.execute("DELETE FROM sessions WHERE token_hash = ?", [hash_token(token)])?;
    Ok(())
}

pub fn revoke_user_sessions(conn: &Connection, user_id: &str, keep_token: Option<&str>) -> AppResult<()> {
    match keep_token {
        Some(token) => conn.execute(
            "DELETE FROM sessions WHERE user_id = ? AND token_hash <> ?",
            params![user_id, hash_token(token)],
        )?,
        None => conn.execute("DELETE FROM sessions WHERE user_id = ?", [user_id])?,
    };
    Ok(())
}

/// Authenticated caller, resolved from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

impl AuthUser {
    pub fn require(&self, roles: &[Role]) -> AppResult<()> {
        if roles.contains(&self.user.role) {
            Ok(())
        } else {
            Err(AppError::forbidden("not permitted for this role"))
        }
    }

    pub fn require_admin(&self) -> AppResult<()> {
        self.require(&[Role::Admin])
    }

    pub fn require_staff(&self) -> AppResult<()> {
        self.require(&[Role::Admin, Role::Teacher])
    }

    pub fn id(&self) -> &str {
        &self.user.id
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AppError::unauthorized("missing bearer token"))?
            .to_string();

        let conn = state.db.lock().await;
        let user = resolve_session(&conn, &token, crate::db::now_unix()).map_err(|err| {
            warn!("rejected session: {}", err.message);
            err
        })?;
        Ok(Self { user, token })
    }
}
