//! Response envelopes. Every reply is one JSON line:
//! `{id, ok: true, result}` or `{id, ok: false, error: {code, message, details?}}`.

use serde_json::{json, Value};
use tracing::warn;

use crate::error::{MtmError, MtmResult};

pub fn ok(id: &str, result: Value) -> Value {
    json!({ "id": id, "ok": true, "result": result })
}

/// Envelope-level failure (`bad_params`, `no_workspace`, ...).
pub fn err(id: &str, code: &str, message: impl Into<String>, details: Option<Value>) -> Value {
    let mut error = json!({ "code": code, "message": message.into() });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({ "id": id, "ok": false, "error": error })
}

/// Domain failure; the code and details come from the error itself.
/// Validation and lookup misses are routine and not logged.
pub fn fail(id: &str, e: &MtmError) -> Value {
    match e {
        MtmError::Validation(_) | MtmError::NotFound(_) => {}
        _ => warn!(request = id, code = e.code(), error = %e, "request failed"),
    }
    err(id, e.code(), e.to_string(), e.details())
}

pub fn reply(id: &str, result: MtmResult<Value>) -> Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => fail(id, &e),
    }
}
