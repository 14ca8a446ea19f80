pub mod app;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod notify;
pub mod qr;
pub mod state;
pub mod store;

pub use app::router;
pub use config::Config;
pub use state::AppState;
