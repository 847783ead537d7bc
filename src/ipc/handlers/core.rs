use std::path::PathBuf;

use serde_json::json;

use crate::grades::GradeSession;
use crate::ipc::error::{err, ok, store_err};
use crate::ipc::types::{AppState, Request};
use crate::roster::Roster;
use crate::store::SqliteStore;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

/// Opens the workspace store, runs the one-shot roster migration and
/// loads the roster — the migration always runs before the roster is
/// first read, on every process start. Any open pair of a previous
/// workspace is dropped with the workspace.
fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    let store = match SqliteStore::open(&path) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "store_open_failed", e.to_string(), None),
    };
    let roster = match Roster::init(&store) {
        Ok(r) => r,
        Err(e) => return store_err(&req.id, e),
    };

    tracing::info!(
        "workspace open: {} ({} subjects, {} students)",
        path.to_string_lossy(),
        roster.subjects.len(),
        roster.students.len()
    );
    state.workspace = Some(path.clone());
    state.store = Some(store);
    state.roster = Some(roster);
    state.session = GradeSession::new();
    ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
