use rusqlite::Connection;
use serde_json::Value;

use crate::ipc::error::{err, fail};
use crate::ipc::types::Request;
use crate::pages::{self, Page};

/// Integer param; numeric strings are accepted too.
pub fn param_i64(params: &Value, key: &str) -> Option<i64> {
    match params.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn param_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

pub fn param_bool(params: &Value, key: &str) -> Option<bool> {
    match params.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        _ => None,
    }
}

/// Loads `params.pageid`, scoped to `params.instance` when given.
pub fn page_from_params(conn: &Connection, req: &Request) -> Result<Page, Value> {
    let Some(pageid) = param_i64(&req.params, "pageid") else {
        return Err(err(&req.id, "bad_params", "missing params.pageid", None));
    };
    let instance = param_str(&req.params, "instance");
    pages::get_page(conn, pageid, instance).map_err(|e| fail(&req.id, &e))
}
