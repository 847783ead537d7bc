use serde_json::json;

use crate::ipc::error::{err, ok, store_err};
use crate::ipc::types::{AppState, Request};

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(roster) = state.roster.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    ok(&req.id, json!({ "subjects": roster.subjects }))
}

fn handle_roster_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(roster) = state.roster.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    ok(&req.id, json!({ "students": roster.students }))
}

/// Re-fetches the authoritative copy; another device may have edited the
/// roster since the workspace was opened.
fn handle_roster_reload(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(roster) = state.roster.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if let Err(e) = roster.reload(store) {
        return store_err(&req.id, e);
    }
    ok(
        &req.id,
        json!({ "subjects": roster.subjects, "students": roster.students }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "roster.list" => Some(handle_roster_list(state, req)),
        "roster.reload" => Some(handle_roster_reload(state, req)),
        _ => None,
    }
}
