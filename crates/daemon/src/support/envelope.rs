#![forbid(unsafe_code)]

use rg_storage::StoreError;
use serde_json::{Value, json};

pub(crate) fn op_error(code: &str, message: &str) -> Value {
    json!({
        "code": code,
        "message": message.trim(),
    })
}

/// Stable code for a store failure; callers branch on the code, not the text.
pub(crate) fn store_error_code(err: &StoreError) -> &'static str {
    if err.is_retryable() {
        return "RETRYABLE";
    }
    match err {
        StoreError::NotFound { .. } | StoreError::UnknownId => "NOT_FOUND",
        StoreError::InvalidInput(_) => "INVALID_INPUT",
        StoreError::Conflict(_) => "CONFLICT",
        StoreError::InvalidTransition { .. } => "INVALID_TRANSITION",
        StoreError::Io(_) | StoreError::Sql(_) => "STORE_ERROR",
    }
}

pub(crate) fn store_error(err: StoreError) -> Value {
    let code = store_error_code(&err);
    if code == "STORE_ERROR" {
        tracing::error!(error = %err, "store failure");
    }
    op_error(code, &err.to_string())
}

pub(crate) fn response_ok(id: &Value, op: &str, result: Value) -> Value {
    json!({
        "id": id,
        "success": true,
        "op": op,
        "result": result,
    })
}

pub(crate) fn response_error(id: &Value, op: Option<&str>, error: Value) -> Value {
    json!({
        "id": id,
        "success": false,
        "op": op,
        "error": error,
    })
}
