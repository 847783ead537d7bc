use serde_json::json;

use crate::error::{RepoError, StoreError};

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Store failures get a generic retry-prompting message; the concrete
/// reason goes to the log and the details field, not the user.
pub fn store_err(id: &str, e: StoreError) -> serde_json::Value {
    tracing::error!("store operation failed: {}", e);
    err(
        id,
        "store_unavailable",
        "could not reach the store, please try again",
        Some(json!({ "reason": e.to_string() })),
    )
}

pub fn repo_err(id: &str, e: RepoError) -> serde_json::Value {
    match e {
        RepoError::Validation(msg) => err(id, "validation_failed", msg, None),
        RepoError::Store(e) => store_err(id, e),
    }
}
