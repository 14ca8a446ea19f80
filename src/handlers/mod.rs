pub mod attendance;
pub mod auth;
pub mod classes;
pub mod contact;
pub mod mobile;
pub mod notifications;
pub mod payments;
pub mod people;

use crate::errors::AppResult;
use crate::store::users::validate_date;
use axum::Json;
use chrono::{Local, NaiveDate};
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn session_date_or_today(raw: Option<&str>) -> AppResult<NaiveDate> {
    match raw.map(str::trim).filter(|d| !d.is_empty()) {
        Some(date) => validate_date(date),
        None => Ok(today()),
    }
}
