use serde_json::json;

use crate::grading::Grade;
use crate::ipc::error::{err, ok, repo_err, store_err};
use crate::ipc::types::{AppState, Request};
use crate::templates;

fn require_str<'a>(req: &'a Request, key: &str) -> Result<&'a str, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {key}"), None))
}

/// Selects the `(subject, template, student)` pair the grading session
/// works on. Any pending edit of the previously selected pair is flushed
/// before the new pair's authoritative copy is loaded.
fn handle_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let subject = match require_str(req, "subject") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let template_id = match require_str(req, "templateId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let student = match require_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    // Entries are addressed by student name; an off-roster name still
    // works but is worth a trace.
    if let Some(roster) = state.roster.as_ref() {
        if !roster.has_student(student) {
            tracing::debug!("grading a student not on the roster: {}", student);
        }
    }

    let template = match templates::load_by_id(store, template_id) {
        Ok(Some(t)) => t,
        Ok(None) => return err(&req.id, "not_found", "template not found", None),
        Err(e) => return store_err(&req.id, e),
    };
    if let Err(e) = state.session.open(store, subject, template, student) {
        return store_err(&req.id, e);
    }
    ok(&req.id, json!({ "entries": state.session.entries() }))
}

fn handle_set_points(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let criterion = match require_str(req, "criterion") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    // Whatever the free-text field held; the engine coerces.
    let raw_points = req.params.get("points").cloned().unwrap_or(json!(null));

    match state.session.set_points(store, criterion, &raw_points) {
        Ok((grade, points)) => ok(
            &req.id,
            json!({ "criterion": criterion, "grade": grade.as_label(), "points": points }),
        ),
        Err(e) => repo_err(&req.id, e),
    }
}

fn handle_set_label(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let criterion = match require_str(req, "criterion") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let label = match require_str(req, "grade") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(grade) = Grade::from_label(label) else {
        return err(&req.id, "bad_params", format!("unknown grade: {label}"), None);
    };

    match state.session.set_label(store, criterion, grade) {
        Ok(()) => ok(&req.id, json!({ "criterion": criterion, "grade": grade.as_label() })),
        Err(e) => repo_err(&req.id, e),
    }
}

/// Retries a write that failed earlier; a clean session is a no-op.
fn handle_flush(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match state.session.flush(store) {
        Ok(flushed) => ok(&req.id, json!({ "flushed": flushed })),
        Err(e) => store_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.open" => Some(handle_open(state, req)),
        "grades.setPoints" => Some(handle_set_points(state, req)),
        "grades.setLabel" => Some(handle_set_label(state, req)),
        "grades.flush" => Some(handle_flush(state, req)),
        _ => None,
    }
}
