use crate::ipc::error::{err, fail, ok, reply};
use crate::ipc::helpers::{page_from_params, param_str};
use crate::ipc::types::{AppState, Request};
use crate::pages;
use crate::tools::effective_settings;
use serde_json::{json, Map, Value};

fn handle_settings_schema(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let page = match page_from_params(conn, req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let handler = match state.registry.resolve(&page.tool) {
        Ok(h) => h,
        Err(e) => return fail(&req.id, &e),
    };
    let values = match effective_settings(conn, handler, &page) {
        Ok(v) => v,
        Err(e) => return fail(&req.id, &e),
    };

    let fields: Vec<Value> = handler
        .settings_schema(&page)
        .iter()
        .map(|def| {
            json!({
                "name": def.name,
                "kind": def.kind,
                "default": def.default,
                "value": values.get(def.name),
            })
        })
        .collect();
    ok(&req.id, json!({ "tool": page.tool, "fields": fields }))
}

fn handle_settings_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let page = match page_from_params(conn, req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let stored = match pages::get_settings(conn, &page.tool, page.id) {
        Ok(v) => v,
        Err(e) => return fail(&req.id, &e),
    };
    let effective = match state
        .registry
        .resolve(&page.tool)
        .and_then(|h| effective_settings(conn, h, &page))
    {
        Ok(v) => v,
        Err(e) => return fail(&req.id, &e),
    };
    ok(
        &req.id,
        json!({ "pageid": page.id, "stored": stored, "effective": effective }),
    )
}

fn apply(state: &AppState, req: &Request, submitted: &Map<String, Value>) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let page = match page_from_params(conn, req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let result = state
        .registry
        .resolve(&page.tool)
        .and_then(|h| h.apply_settings(conn, &page, submitted));
    reply(&req.id, result.map(|accepted| json!({ "pageid": page.id, "applied": accepted })))
}

fn handle_settings_apply(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(values) = req.params.get("values").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "params.values must be an object", None);
    };
    apply(state, req, values)
}

fn handle_settings_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(name) = param_str(&req.params, "name") else {
        return err(&req.id, "bad_params", "missing params.name", None);
    };
    let Some(value) = req.params.get("value") else {
        return err(&req.id, "bad_params", "missing params.value", None);
    };
    let mut submitted = Map::new();
    submitted.insert(name.to_string(), value.clone());
    apply(state, req, &submitted)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.schema" => Some(handle_settings_schema(state, req)),
        "settings.get" => Some(handle_settings_get(state, req)),
        "settings.apply" => Some(handle_settings_apply(state, req)),
        "settings.set" => Some(handle_settings_set(state, req)),
        _ => None,
    }
}
