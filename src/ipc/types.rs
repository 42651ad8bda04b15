use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::config::AppConfig;
use crate::retry::RetryPolicy;
use crate::session::CheckinView;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// Check-in screen for the currently selected class, if any.
    pub view: Option<CheckinView>,
    pub retry: RetryPolicy,
    pub default_taken_by: Option<String>,
}

impl AppState {
    pub fn new(config: &AppConfig) -> Self {
        AppState {
            workspace: None,
            db: None,
            view: None,
            retry: config.retry_policy(),
            default_taken_by: config.default_taken_by.clone(),
        }
    }
}
