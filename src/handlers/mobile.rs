use crate::auth::AuthUser;
use crate::dashboard::{self, Dashboard, PaymentEntry};
use crate::errors::AppResult;
use crate::models::Role;
use crate::state::AppState;
use axum::{extract::State, Json};

pub async fn dashboard(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Dashboard>> {
    auth.require(&[Role::Parent, Role::Student])?;
    let conn = state.db.lock().await;
    Ok(Json(dashboard::build_dashboard(&conn, &auth.user)?))
}

pub async fn payments(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<PaymentEntry>>> {
    auth.require(&[Role::Parent, Role::Student])?;
    let conn = state.db.lock().await;
    Ok(Json(dashboard::payment_history(&conn, &auth.user)?))
}
