use std::path::PathBuf;

use serde::Deserialize;

use crate::grades::GradeSession;
use crate::roster::Roster;
use crate::store::SqliteStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub store: Option<SqliteStore>,
    pub roster: Option<Roster>,
    pub session: GradeSession,
}

impl AppState {
    pub fn new() -> AppState {
        AppState {
            workspace: None,
            store: None,
            roster: None,
            session: GradeSession::new(),
        }
    }
}
