use crate::config::Config;
use crate::notify::{LogNotifier, Notifier};
use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: Arc<Config>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(conn: Connection, config: Config) -> Self {
        Self::with_notifier(conn, config, Arc::new(LogNotifier))
    }

    pub fn with_notifier(conn: Connection, config: Config, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            config: Arc::new(config),
            notifier,
        }
    }
}
