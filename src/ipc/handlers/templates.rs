use serde_json::json;

use crate::ipc::error::{err, ok, repo_err, store_err};
use crate::ipc::types::{AppState, Request};
use crate::shapes;
use crate::templates::{self, TemplateDraft};

fn require_str<'a>(req: &'a Request, key: &str) -> Result<&'a str, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {key}"), None))
}

fn handle_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (Some(store), Some(roster)) = (state.store.as_ref(), state.roster.as_ref()) else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match require_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let subject = match require_str(req, "subject") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(raw_criteria) = req.params.get("criteria") else {
        return err(&req.id, "bad_params", "missing criteria", None);
    };

    let draft = TemplateDraft {
        name: name.to_string(),
        subject: subject.to_string(),
        criteria: shapes::criteria(raw_criteria),
    };
    match templates::save(store, &roster.subjects, draft) {
        Ok(t) => ok(&req.id, json!({ "templateId": t.id.clone(), "template": t })),
        Err(e) => repo_err(&req.id, e),
    }
}

fn handle_bulk_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (Some(store), Some(roster)) = (state.store.as_ref(), state.roster.as_ref()) else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match require_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let subject = match require_str(req, "subject") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let text = match require_str(req, "text") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match templates::save_bulk(store, &roster.subjects, name, subject, text) {
        Ok(t) => ok(
            &req.id,
            json!({ "templateId": t.id.clone(), "totalPoints": t.total_points, "template": t }),
        ),
        Err(e) => repo_err(&req.id, e),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let subject = match require_str(req, "subject") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match templates::list_by_subject(store, subject) {
        Ok(list) => ok(&req.id, json!({ "templates": list })),
        Err(e) => store_err(&req.id, e),
    }
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let template_id = match require_str(req, "templateId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match templates::load_by_id(store, template_id) {
        Ok(Some(t)) => ok(&req.id, json!({ "template": t })),
        Ok(None) => err(&req.id, "not_found", "template not found", None),
        Err(e) => store_err(&req.id, e),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let template_id = match require_str(req, "templateId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match templates::delete(store, template_id) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => store_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "templates.save" => Some(handle_save(state, req)),
        "templates.bulkCreate" => Some(handle_bulk_create(state, req)),
        "templates.list" => Some(handle_list(state, req)),
        "templates.get" => Some(handle_get(state, req)),
        "templates.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
