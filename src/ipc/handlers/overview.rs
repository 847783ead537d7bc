use serde_json::json;

use crate::grades;
use crate::ipc::error::{err, ok, store_err};
use crate::ipc::types::{AppState, Request};
use crate::templates;

/// The aggregation view: one row per roster member, in roster order,
/// with the normalized entry set for the chosen template. One store read
/// per student — the store has no batch read.
fn handle_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (Some(store), Some(roster)) = (state.store.as_ref(), state.roster.as_ref()) else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let subject = match req.params.get("subject").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing subject", None),
    };
    let template_id = match req.params.get("templateId").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing templateId", None),
    };

    let template = match templates::load_by_id(store, template_id) {
        Ok(Some(t)) => t,
        Ok(None) => return err(&req.id, "not_found", "template not found", None),
        Err(e) => return store_err(&req.id, e),
    };
    let all = match grades::read_all_for_template(store, subject, template_id, &roster.students)
    {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, e),
    };

    let rows: Vec<serde_json::Value> = roster
        .students
        .iter()
        .map(|student| {
            let set = all.get(&student.name).cloned().unwrap_or_default();
            json!({
                "name": student.name,
                "class": student.class,
                "grades": set.grades,
                "points": set.points,
            })
        })
        .collect();

    ok(&req.id, json!({ "template": template, "rows": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "overview.open" => Some(handle_open(state, req)),
        _ => None,
    }
}
